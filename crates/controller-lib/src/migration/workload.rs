//! Workload detection
//!
//! Decides whether a pod belongs to a higher-level replicated workload that
//! can be repositioned with a placement-constraint patch instead of a
//! per-pod eviction. Detection is a replaceable strategy so the default
//! label-key heuristic can be hardened without touching the executor.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Strategy mapping pod labels to an optional owning-workload name
pub type WorkloadDetector =
    Arc<dyn Fn(&BTreeMap<String, String>) -> Option<String> + Send + Sync>;

/// Default heuristic: the value of the first label whose key contains
/// `deployment` or `app` (case-insensitive), in sorted key order.
///
/// Known to be fragile against labels like `app.kubernetes.io/managed-by`;
/// swap the detector when the fleet uses richer label conventions.
pub fn label_heuristic(labels: &BTreeMap<String, String>) -> Option<String> {
    for (key, value) in labels {
        let key = key.to_lowercase();
        if key.contains("deployment") || key.contains("app") {
            return Some(value.clone());
        }
    }
    None
}

/// The default detector as a boxed strategy
pub fn default_detector() -> WorkloadDetector {
    Arc::new(label_heuristic)
}
