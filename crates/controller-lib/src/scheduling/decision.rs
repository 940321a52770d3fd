//! MALE placement policy
//!
//! Most Available-battery, Least-Effort: among nodes with a known battery
//! reading, the strictly highest reading wins. When no node reported a
//! battery within the lookback window, the policy falls back to the first
//! node of the original candidate list, ignoring resource fit entirely.

use crate::models::{NodeInfo, NodeState};
use std::collections::BTreeMap;
use tracing::debug;

/// Pick the bind target for one unscheduled pod.
///
/// Never errors: absent telemetry degrades to the first-candidate fallback.
/// The state map is keyed in sorted name order, so a battery tie resolves
/// to the lexicographically smallest node name.
pub fn choose_node(
    states: &BTreeMap<String, NodeState>,
    candidates: &[NodeInfo],
) -> Option<String> {
    let mut best: Option<(&str, f64)> = None;
    for state in states.values() {
        if let Some(wh) = state.battery_wh {
            let better = match best {
                Some((_, best_wh)) => wh > best_wh,
                None => true,
            };
            if better {
                best = Some((&state.name, wh));
            }
        }
    }

    if let Some((name, wh)) = best {
        debug!(node = %name, battery_wh = wh, "MALE policy selected highest-energy node");
        return Some(name.to_string());
    }

    // No battery data anywhere: first candidate, resource fit ignored
    let fallback = candidates.first().map(|n| n.name.clone());
    debug!(node = ?fallback, "No battery readings, falling back to first candidate");
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(name: &str, battery_wh: Option<f64>) -> NodeState {
        NodeState {
            name: name.to_string(),
            cpu_allocatable: 4.0,
            mem_allocatable: 8.0e9,
            cpu_used: 0.0,
            mem_used: 0.0,
            pod_count: 0,
            battery_wh,
            position: None,
        }
    }

    fn node(name: &str) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            cpu_allocatable: 4.0,
            mem_allocatable: 8.0e9,
            labels: Default::default(),
        }
    }

    fn state_map(states: Vec<NodeState>) -> BTreeMap<String, NodeState> {
        states.into_iter().map(|s| (s.name.clone(), s)).collect()
    }

    #[test]
    fn test_highest_battery_wins() {
        let states = state_map(vec![
            state("n1", Some(10.0)),
            state("n2", Some(40.0)),
            state("n3", Some(25.0)),
        ]);
        let candidates = [node("n1"), node("n2"), node("n3")];
        assert_eq!(choose_node(&states, &candidates), Some("n2".to_string()));
    }

    #[test]
    fn test_nodes_without_battery_are_ignored() {
        let states = state_map(vec![
            state("n1", None),
            state("n2", Some(5.0)),
            state("n3", None),
        ]);
        let candidates = [node("n1"), node("n2"), node("n3")];
        assert_eq!(choose_node(&states, &candidates), Some("n2".to_string()));
    }

    #[test]
    fn test_all_absent_falls_back_to_first_candidate() {
        let states = state_map(vec![state("n1", None), state("n2", None)]);
        // Candidate ordering comes from the original unfiltered list, not
        // from the sorted state map
        let candidates = [node("n2"), node("n1")];
        assert_eq!(choose_node(&states, &candidates), Some("n2".to_string()));
    }

    #[test]
    fn test_tie_breaks_to_smallest_name() {
        let states = state_map(vec![state("n2", Some(30.0)), state("n1", Some(30.0))]);
        let candidates = [node("n2"), node("n1")];
        assert_eq!(choose_node(&states, &candidates), Some("n1".to_string()));
    }

    #[test]
    fn test_empty_candidates_yield_none() {
        assert_eq!(choose_node(&BTreeMap::new(), &[]), None);
    }
}
