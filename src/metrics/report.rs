//! Iteration report: labeled scalar metrics produced once per training
//! iteration by the learner, the collector pool, and the trainer.
//!
//! A report is a flat map of metric name to value. Producers either set a
//! value outright or accumulate into it (timing counters that several
//! mini-batch workers contribute to). The trainer prints a fixed, curated
//! subset at the end of each iteration and forwards the full map to the
//! metrics sink.

use std::collections::HashMap;

/// Labeled scalar metrics for one training iteration.
#[derive(Debug, Clone, Default)]
pub struct Report {
    values: HashMap<String, f64>,
}

impl Report {
    /// Create an empty report.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a metric, overwriting any previous value.
    pub fn set(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    /// Add to a metric, treating a missing entry as zero.
    pub fn accum(&mut self, name: &str, value: f64) {
        *self.values.entry(name.to_string()).or_insert(0.0) += value;
    }

    /// Get a metric value.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Whether the report contains a metric.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterate over all metrics in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of metrics recorded.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the report is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Format one metric as `name: value`, with large counters printed as
    /// integers.
    pub fn single_to_string(&self, name: &str) -> String {
        match self.get(name) {
            Some(v) if v.fract() == 0.0 && v.abs() >= 1000.0 => {
                format!("{}: {}", name, v as i64)
            }
            Some(v) => format!("{}: {:.5}", name, v),
            None => format!("{}: -", name),
        }
    }
}

/// Display order for the end-of-iteration console summary.
///
/// A leading `-` marks an indented sub-entry; an empty string is a blank
/// separator line.
pub const REPORT_DISPLAY_ORDER: &[&str] = &[
    "Average Episode Reward",
    "Average Step Reward",
    "Policy Entropy",
    "Value Function Loss",
    "",
    "Mean KL Divergence",
    "SB3 Clip Fraction",
    "Policy Update Magnitude",
    "Value Function Update Magnitude",
    "",
    "Collected Steps/Second",
    "Overall Steps/Second",
    "",
    "Collection Time",
    "-Policy Infer Time",
    "-Env Step Time",
    "Consumption Time",
    "-PPO Learn Time",
    "Collect-Consume Overlap Time",
    "Total Iteration Time",
    "",
    "Cumulative Model Updates",
    "Cumulative Timesteps",
    "",
    "Timesteps Collected",
];

/// Log the curated iteration summary through the `log` facade.
pub fn display_report(report: &Report) {
    for entry in REPORT_DISPLAY_ORDER {
        if entry.is_empty() {
            log::info!("");
            continue;
        }

        let mut name: &str = entry;
        let mut indent = 0;
        while let Some(rest) = name.strip_prefix('-') {
            indent += 1;
            name = rest;
        }

        let prefix = if indent > 0 {
            format!("{} - ", " ".repeat((indent - 1) * 3))
        } else {
            String::new()
        };

        log::info!("{}{}", prefix, report.single_to_string(name));
    }
}
