//! # Scan Options
//!
//! Execution settings for a scan. Every field has a default, so an empty
//! JSON object `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "max-concurrent-tasks": 8,
//!   "failure-policy": "best-effort",
//!   "ordering": "ordered",
//!   "file-order": "partition-values"
//! }
//! ```

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// What to do when reading one data file fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Cancel in-flight tasks and fail the whole scan.
    #[default]
    AbortOnFirstError,
    /// Skip the file, record a warning and keep going.
    BestEffort,
}

/// Order of batches in the assembled dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputOrdering {
    /// Task order from the planner, batch order within a task.
    #[default]
    Ordered,
    /// Batches of a task are appended as soon as the task completes.
    Unordered,
}

/// Order in which the planner emits a snapshot's files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileOrder {
    /// The order files appear in the snapshot's manifests.
    #[default]
    Manifest,
    /// Sorted by partition tuple, then by file path.
    PartitionValues,
}

/// Options controlling how a scan is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ScanOptions {
    /// Upper bound on data files read at the same time.
    pub max_concurrent_tasks: usize,
    pub failure_policy: FailurePolicy,
    pub ordering: OutputOrdering,
    pub file_order: FileOrder,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
            failure_policy: FailurePolicy::default(),
            ordering: OutputOrdering::default(),
            file_order: FileOrder::default(),
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency limit; zero is treated as one.
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_ordering(mut self, ordering: OutputOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_file_order(mut self, file_order: FileOrder) -> Self {
        self.file_order = file_order;
        self
    }

    /// Shorthand for [`FailurePolicy::BestEffort`].
    pub fn best_effort(self) -> Self {
        self.with_failure_policy(FailurePolicy::BestEffort)
    }

    /// The effective concurrency limit, never below one.
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_tasks.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ScanOptions::default();
        assert!(options.max_concurrent_tasks >= 1);
        assert_eq!(options.failure_policy, FailurePolicy::AbortOnFirstError);
        assert_eq!(options.ordering, OutputOrdering::Ordered);
        assert_eq!(options.file_order, FileOrder::Manifest);
    }

    #[test]
    fn test_partial_json() {
        let options: ScanOptions =
            serde_json::from_str(r#"{"failure-policy": "best-effort", "max-concurrent-tasks": 2}"#)
                .unwrap();
        assert_eq!(options.failure_policy, FailurePolicy::BestEffort);
        assert_eq!(options.max_concurrent_tasks, 2);
        assert_eq!(options.ordering, OutputOrdering::Ordered);

        let empty: ScanOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.file_order, FileOrder::Manifest);
    }

    #[test]
    fn test_builder() {
        let options = ScanOptions::new()
            .with_max_concurrent_tasks(0)
            .with_ordering(OutputOrdering::Unordered)
            .with_file_order(FileOrder::PartitionValues)
            .best_effort();
        assert_eq!(options.concurrency(), 1);
        assert_eq!(options.ordering, OutputOrdering::Unordered);
        assert_eq!(options.file_order, FileOrder::PartitionValues);
        assert_eq!(options.failure_policy, FailurePolicy::BestEffort);
    }
}
