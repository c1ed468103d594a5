//! Store metrics collection.
//!
//! Provides functions for recording store-related metrics.

use metrics::{counter, histogram};
use std::time::Instant;

/// Record store operation duration.
pub fn record_operation_duration(operation: &str, duration_secs: f64) {
    histogram!(
        "store_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Record a failed store operation.
pub fn record_operation_failure(operation: &str) {
    counter!(
        "store_operation_failures_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a default value written to an empty path.
pub fn record_seed(kind: &str) {
    counter!("store_seeds_total", "kind" => kind.to_string()).increment(1);
}

/// A helper to time store operations and record metrics.
///
/// Usage:
/// ```ignore
/// let timer = OperationTimer::new("get");
/// let result = store.get(&path).await;
/// timer.finish(result.is_ok());
/// ```
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Create a new timer for the given operation name.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration, and a failure when `ok` is false.
    pub fn finish(self, ok: bool) {
        record_operation_duration(self.operation, self.start.elapsed().as_secs_f64());
        if !ok {
            record_operation_failure(self.operation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_timer_creation() {
        let timer = OperationTimer::new("get");
        assert_eq!(timer.operation, "get");
    }

    #[test]
    fn test_finish_without_recorder() {
        // Recording with no global recorder installed is a no-op.
        OperationTimer::new("set").finish(false);
        record_seed("containers");
    }
}
