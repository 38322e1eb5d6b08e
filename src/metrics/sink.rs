//! External metrics sink boundary.
//!
//! The trainer pushes one [`Report`] per iteration to an optional sink
//! (a dashboard uploader, a CSV writer, ...). The sink establishes a stable
//! run identifier at construction; the trainer persists that identifier in
//! checkpoints so a resumed run keeps appending to the same external run.

use super::report::Report;

/// Receives one report per training iteration.
pub trait MetricsSink: Send {
    /// Stable identifier for this run, established when the sink was built.
    fn run_id(&self) -> &str;

    /// Push one iteration's metrics.
    fn send(&mut self, report: &Report);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        id: String,
        sent: usize,
    }

    impl MetricsSink for RecordingSink {
        fn run_id(&self) -> &str {
            &self.id
        }

        fn send(&mut self, _report: &Report) {
            self.sent += 1;
        }
    }

    #[test]
    fn test_sink_receives_reports() {
        let mut sink = RecordingSink {
            id: "run-42".to_string(),
            sent: 0,
        };

        let mut report = Report::new();
        report.set("Timesteps Collected", 100.0);

        sink.send(&report);
        sink.send(&report);

        assert_eq!(sink.run_id(), "run-42");
        assert_eq!(sink.sent, 2);
    }
}
