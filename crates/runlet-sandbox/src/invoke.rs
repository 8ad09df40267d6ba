//! Invocation facade: context assembly, driver dispatch, and the outcome
//! envelope callers consume.

use serde::Serialize;
use serde_json::{json, Map, Value};

use runlet_access::{FunctionRecord, OwnerSecrets};
use runlet_error::EngineError;

use crate::context::build_context;
use crate::driver::{RunOutcome, SandboxExecutor};
use crate::trace::{MetricKind, TraceEntry};

/// The resource metrics of one successful invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValues {
    /// Wall-clock handler time in milliseconds.
    pub execution_time: i64,
    /// V8 used-heap delta in bytes.
    pub memory_used: i64,
    /// Sandboxed HTTP calls made.
    pub api_call_count: i64,
}

/// Everything one invocation produced, split by entry kind.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationSummary {
    /// The handler's return value; `None` when it returned `undefined` or
    /// the invocation failed.
    pub result: Option<Value>,
    /// Error entry messages, in order.
    pub errors: Vec<String>,
    /// Log entry messages, in order.
    pub logs: Vec<String>,
    /// Metrics, present only on success.
    pub metrics: Option<MetricValues>,
    /// The full ordered trace.
    pub trace: Vec<TraceEntry>,
}

impl InvocationSummary {
    /// Whether the invocation completed without error entries.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn from_outcome(outcome: RunOutcome) -> Self {
        let mut errors = Vec::new();
        let mut logs = Vec::new();
        let mut metrics: Option<MetricValues> = None;

        for entry in &outcome.trace {
            match entry {
                TraceEntry::Log { message } => logs.push(message.clone()),
                TraceEntry::Error { message } => errors.push(message.clone()),
                TraceEntry::Metric { metric, value } => {
                    let values = metrics.get_or_insert_with(MetricValues::default);
                    match metric {
                        MetricKind::ExecutionTime => values.execution_time = *value,
                        MetricKind::MemoryUsed => values.memory_used = *value,
                        MetricKind::ApiCallCount => values.api_call_count = *value,
                    }
                }
                TraceEntry::Output { .. } => {}
            }
        }

        Self {
            result: outcome.result,
            errors,
            logs,
            metrics,
            trace: outcome.trace,
        }
    }
}

/// Run one function invocation end to end.
///
/// Rejects non-object request arguments up front; `null` counts as an
/// empty object. The record is expected to come out of the access
/// resolver, so no further authorization happens here.
pub async fn invoke_function(
    executor: &SandboxExecutor,
    record: &FunctionRecord,
    secrets: &OwnerSecrets,
    request_args: &Value,
) -> Result<InvocationSummary, EngineError> {
    let args: Map<String, Value> = match request_args {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => {
            return Err(EngineError::InvalidArguments(
                "request arguments must be a JSON object".into(),
            ))
        }
    };

    let context = build_context(secrets, &record.arguments, &args);

    tracing::info!(
        function = %record.slug,
        arg_count = args.len(),
        "invoking function"
    );

    let outcome = executor.run(&record.code, &context).await?;
    Ok(InvocationSummary::from_outcome(outcome))
}

/// Produce the caller-facing envelope for a finished invocation.
///
/// Success: `{"status": "success", "data": result}`. Failure: `{"status":
/// "error", "message": first error}`. With `debug` set, the result,
/// metrics, and full trace ride along under `"debug"`.
pub fn into_envelope(summary: &InvocationSummary, debug: bool) -> Value {
    let mut envelope = if let Some(first) = summary.errors.first() {
        json!({
            "status": "error",
            "message": first,
        })
    } else {
        json!({
            "status": "success",
            "data": summary.result.clone().unwrap_or(Value::Null),
        })
    };

    if debug {
        envelope["debug"] = json!({
            "result": summary.result,
            "metrics": summary.metrics,
            "logs": summary.logs,
            "trace": summary.trace,
        });
    }

    envelope
}
