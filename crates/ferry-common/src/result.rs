//! Outcome of one pipeline execution.

use serde::{Deserialize, Serialize};

/// Counters and status reported by a finished run.
///
/// Per-node results of a clustered run are folded together with
/// [`RunResult::add`]: counters and errors are summed, success is the
/// conjunction of every node's success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub lines_input: u64,
    #[serde(default)]
    pub lines_output: u64,
    #[serde(default)]
    pub lines_updated: u64,
    #[serde(default)]
    pub lines_read: u64,
    #[serde(default)]
    pub lines_written: u64,
    #[serde(default)]
    pub lines_rejected: u64,
}

impl Default for RunResult {
    fn default() -> Self {
        Self::success()
    }
}

impl RunResult {
    /// A successful result with all counters at zero.
    pub fn success() -> Self {
        Self {
            success: true,
            error_count: 0,
            lines_input: 0,
            lines_output: 0,
            lines_updated: 0,
            lines_read: 0,
            lines_written: 0,
            lines_rejected: 0,
        }
    }

    /// A failed result carrying the given number of errors.
    pub fn failure(error_count: u64) -> Self {
        Self {
            success: false,
            error_count,
            ..Self::success()
        }
    }

    /// Fold another result into this one.
    pub fn add(&mut self, other: &RunResult) {
        self.success = self.success && other.success;
        self.error_count += other.error_count;
        self.lines_input += other.lines_input;
        self.lines_output += other.lines_output;
        self.lines_updated += other.lines_updated;
        self.lines_read += other.lines_read;
        self.lines_written += other.lines_written;
        self.lines_rejected += other.lines_rejected;
    }

    /// Combine any number of results; an empty input yields a success.
    pub fn aggregate<'a>(results: impl IntoIterator<Item = &'a RunResult>) -> Self {
        results.into_iter().fold(Self::success(), |mut acc, r| {
            acc.add(r);
            acc
        })
    }

    /// Record one more error and mark the result failed.
    pub fn record_error(&mut self) {
        self.error_count += 1;
        self.success = false;
    }
}
