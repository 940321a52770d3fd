//! Kubernetes resource quantity parsing
//!
//! Quantities arrive as heterogeneous unit strings (`"100m"`, `"2"`,
//! `"512Mi"`). Everything is normalized to plain numbers: cores for CPU,
//! bytes for memory. Unrecognized formats normalize to zero instead of
//! failing, so a malformed manifest degrades a single pod's accounting
//! rather than aborting a whole aggregation cycle.

use crate::models::ResourceRequest;
use std::collections::BTreeMap;

const BINARY_SUFFIXES: [(&str, f64); 4] = [
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
];

/// Parse one quantity string into a plain number.
///
/// `"100m"` -> 0.1 core, `"2"` -> 2.0, `"1Gi"` -> 2^30 bytes. Parsing is
/// idempotent on already-numeric input.
pub fn parse_quantity(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0.0;
    }

    // Millicores
    if let Some(value) = raw.strip_suffix('m') {
        return value.parse::<f64>().unwrap_or(0.0) / 1000.0;
    }

    // Plain cores or bytes
    if let Ok(value) = raw.parse::<f64>() {
        return value;
    }

    // Binary memory units
    for (suffix, multiplier) in BINARY_SUFFIXES {
        if let Some(value) = raw.strip_suffix(suffix) {
            return value.parse::<f64>().unwrap_or(0.0) * multiplier;
        }
    }

    0.0
}

/// Sum a requests map (`cpu`/`memory` keys) into a normalized request
pub fn parse_requests(requests: &BTreeMap<String, String>) -> ResourceRequest {
    ResourceRequest {
        cpu: requests.get("cpu").map(|q| parse_quantity(q)).unwrap_or(0.0),
        memory: requests
            .get("memory")
            .map(|q| parse_quantity(q))
            .unwrap_or(0.0),
    }
}
