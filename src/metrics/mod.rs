//! Training metrics: the per-iteration report and the external sink
//! boundary.

pub mod report;
pub mod sink;

pub use report::{display_report, Report, REPORT_DISPLAY_ORDER};
pub use sink::MetricsSink;
