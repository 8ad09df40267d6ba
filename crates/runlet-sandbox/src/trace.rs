//! The execution trace: an ordered record of everything a handler did.
//!
//! One [`AnalyticsSink`] exists per invocation. It lives in the isolate's
//! `OpState` while code runs, is taken back out afterwards, and its
//! ordered `outputs` become the immutable trace returned to the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which resource a metric entry measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    /// Wall-clock handler time in milliseconds.
    #[serde(rename = "executionTime")]
    ExecutionTime,
    /// V8 used-heap delta in bytes, sampled immediately before and after
    /// the handler call. May be negative after a GC.
    #[serde(rename = "memoryUsed")]
    MemoryUsed,
    /// Number of sandboxed `fetch` calls made.
    #[serde(rename = "apiCallCount")]
    ApiCallCount,
}

/// One entry of an execution trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TraceEntry {
    /// A `console.log` line from handler code.
    Log {
        /// Stringified, space-joined arguments.
        message: String,
    },
    /// A `console.error` line, a thrown exception, or a timeout.
    Error {
        /// Human-readable failure text.
        message: String,
    },
    /// A resource metric, appended by the driver on success.
    Metric {
        /// What was measured.
        metric: MetricKind,
        /// Measured value.
        value: i64,
    },
    /// The serialized handler result.
    Output {
        /// Objects and arrays arrive JSON-stringified; primitives pass
        /// through unchanged.
        message: Value,
    },
}

impl TraceEntry {
    /// Whether this entry reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, TraceEntry::Error { .. })
    }
}

/// Per-invocation accumulator threaded through every capability op.
///
/// Never shared between invocations: the driver creates one, puts it into
/// the fresh isolate's `OpState`, and takes it back when the run ends.
#[derive(Debug, Default)]
pub struct AnalyticsSink {
    /// Sandboxed `fetch` invocations so far.
    pub api_call_count: u64,
    /// Ordered trace entries.
    pub outputs: Vec<TraceEntry>,
}

impl AnalyticsSink {
    /// Append a log entry.
    pub fn push_log(&mut self, message: impl Into<String>) {
        self.outputs.push(TraceEntry::Log {
            message: message.into(),
        });
    }

    /// Append an error entry.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.outputs.push(TraceEntry::Error {
            message: message.into(),
        });
    }
}
