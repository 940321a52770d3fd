//! Control plane library for the robotic fleet cluster
//!
//! This crate provides the core functionality for:
//! - Energy-aware pod scheduling (MALE policy) over a pod watch
//! - Resource pressure monitoring and pod migration
//! - Node state aggregation from cluster and telemetry data
//! - Policy engine and checkpoint/restore collaborator boundaries
//! - Health checks and observability

pub mod checkpoint;
pub mod cluster;
pub mod health;
pub mod migration;
pub mod models;
pub mod observability;
pub mod policy;
pub mod resources;
pub mod scheduling;
pub mod state;
pub mod telemetry;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ControlPlaneMetrics, StructuredLogger};
