//! Energy-aware pod scheduling
//!
//! The admission loop consumes pod change events and binds unscheduled pods
//! belonging to this scheduler; the decision engine implements the MALE
//! (Most Available-battery, Least-Effort) placement policy.

mod admission;
mod decision;

pub use admission::{AdmissionConfig, AdmissionLoop};
pub use decision::choose_node;
