//! Shared value types.

pub mod usage_metrics;

pub use usage_metrics::UsageMetrics;
