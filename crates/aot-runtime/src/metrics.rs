// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Export profiling metrics.
//!
//! [`PassMetrics`] records wall time and node counts for every pass the
//! export session runs.

use std::time::Duration;

/// Metrics for a single pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PassRecord {
    /// Pass name.
    pub name: String,
    /// Wall-clock time spent in the pass.
    pub duration: Duration,
    /// Node count of the input graph.
    pub nodes_before: usize,
    /// Node count of the output graph.
    pub nodes_after: usize,
}

/// Aggregate metrics for one export.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PassMetrics {
    /// Per-pass records in execution order.
    pub passes: Vec<PassRecord>,
    /// Sum of all pass durations.
    pub total_duration: Duration,
}

impl PassMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, duration: Duration, nodes_before: usize, nodes_after: usize) {
        self.total_duration += duration;
        self.passes.push(PassRecord {
            name: name.into(),
            duration,
            nodes_before,
            nodes_after,
        });
    }

    pub fn get(&self, name: &str) -> Option<&PassRecord> {
        self.passes.iter().find(|p| p.name == name)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let passes = self
            .passes
            .iter()
            .map(|p| {
                format!(
                    "{} {:.2}ms ({}→{} nodes)",
                    p.name,
                    p.duration.as_secs_f64() * 1000.0,
                    p.nodes_before,
                    p.nodes_after
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Export: {:.2}ms total over {} passes: {}",
            self.total_duration.as_secs_f64() * 1000.0,
            self.passes.len(),
            passes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let m = PassMetrics::new();
        assert_eq!(m.total_duration, Duration::ZERO);
        assert!(m.summary().contains("0 passes"));
    }

    #[test]
    fn test_record() {
        let mut m = PassMetrics::new();
        m.record("capture", Duration::from_millis(2), 0, 5);
        m.record("partition", Duration::from_millis(3), 5, 1);

        assert_eq!(m.total_duration, Duration::from_millis(5));
        assert_eq!(m.get("partition").unwrap().nodes_after, 1);
        assert!(m.get("lower").is_none());

        let s = m.summary();
        assert!(s.contains("Export:"));
        assert!(s.contains("partition"));
        assert!(s.contains("5→1 nodes"));
    }
}
