//! Destination scoring for migrations
//!
//! Candidates are scored by resource headroom: the average of the CPU and
//! memory availability percentages. The source node is never a candidate,
//! and nodes whose headroom cannot fit the pod's requirement are discarded.

use crate::models::{NodeState, ResourceRequest};
use std::collections::BTreeMap;
use tracing::debug;

/// Pick the best destination node for a migration, or `None` when no node
/// satisfies the requirement.
///
/// The state map iterates in sorted name order, so a score tie resolves to
/// the lexicographically smallest node name.
pub fn find_target_node(
    states: &BTreeMap<String, NodeState>,
    source_node: &str,
    required: ResourceRequest,
) -> Option<String> {
    let mut best: Option<(&str, f64)> = None;

    for state in states.values() {
        if state.name == source_node {
            continue;
        }

        let cpu_available = state.cpu_allocatable - state.cpu_used;
        let mem_available = state.mem_allocatable - state.mem_used;
        if cpu_available < required.cpu || mem_available < required.memory {
            continue;
        }

        let cpu_score = if state.cpu_allocatable > 0.0 {
            cpu_available / state.cpu_allocatable * 100.0
        } else {
            0.0
        };
        let mem_score = if state.mem_allocatable > 0.0 {
            mem_available / state.mem_allocatable * 100.0
        } else {
            0.0
        };
        let score = (cpu_score + mem_score) / 2.0;

        let better = match best {
            Some((_, best_score)) => score > best_score,
            None => true,
        };
        if better {
            best = Some((&state.name, score));
        }
    }

    let choice = best.map(|(name, score)| {
        debug!(node = %name, score = score, "Selected migration target");
        name.to_string()
    });
    if choice.is_none() {
        debug!(source = %source_node, "No node satisfies the migration requirement");
    }
    choice
}
