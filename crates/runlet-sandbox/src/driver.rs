//! Execution driver — creates fresh V8 isolates and runs user-registered
//! handler functions.
//!
//! Each invocation gets a brand new runtime. No state leaks between calls.
//!
//! V8 isolates are `!Send`, so all JsRuntime operations run on a dedicated
//! thread with its own single-threaded tokio runtime. The public API is
//! fully async and `Send`-safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;

use runlet_error::EngineError;

use crate::ops::{runlet_ext, ExecutionResult, HttpClient, MaxResponseSize};
use crate::trace::{AnalyticsSink, MetricKind, TraceEntry};
use crate::validator::validate_code;

/// Capability bootstrap executed in every fresh isolate before user code.
const BOOTSTRAP_JS: &str = include_str!("bootstrap.js");

/// Configuration for the execution driver.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum wall-clock time for one invocation, evaluation included.
    pub timeout: Duration,
    /// Maximum size of user-registered code in bytes.
    pub max_code_size: usize,
    /// V8 heap limit in bytes.
    pub max_heap_size: usize,
    /// Maximum concurrent invocations.
    pub max_concurrent: usize,
    /// Maximum HTTP response body bytes handed back to the isolate.
    pub max_response_size: usize,
    /// Per-request timeout for sandboxed HTTP calls.
    pub http_request_timeout: Duration,
    /// User-Agent header sent on sandboxed HTTP calls.
    pub user_agent: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_code_size: 64 * 1024,        // 64 KB
            max_heap_size: 64 * 1024 * 1024, // 64 MB
            max_concurrent: 8,
            max_response_size: 8 * 1024 * 1024, // 8 MB
            http_request_timeout: Duration::from_secs(30),
            user_agent: concat!("runlet/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// The outcome of one invocation: the handler's return value plus the
/// ordered trace.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// The handler's return value. `None` when the handler returned
    /// `undefined` or the invocation failed.
    pub result: Option<Value>,
    /// Everything the invocation emitted, in order.
    pub trace: Vec<TraceEntry>,
}

impl RunOutcome {
    /// The first error entry's message, if the invocation failed.
    pub fn first_error(&self) -> Option<&str> {
        self.trace.iter().find_map(|entry| match entry {
            TraceEntry::Error { message } => Some(message.as_str()),
            _ => None,
        })
    }
}

/// The execution driver. Creates a fresh V8 isolate for each invocation.
///
/// This is `Send + Sync` safe — all V8 operations are dispatched to a
/// dedicated thread internally. A concurrency semaphore limits the number
/// of simultaneous isolates.
pub struct SandboxExecutor {
    config: SandboxConfig,
    semaphore: Arc<Semaphore>,
    http: reqwest::Client,
}

impl SandboxExecutor {
    /// Create a new driver with the given configuration.
    pub fn new(config: SandboxConfig) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| EngineError::Internal(e.into()))?;
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Ok(Self {
            config,
            semaphore,
            http,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run user-registered code against an invocation context.
    ///
    /// Evaluates the code, requires it to have defined a global `handler`
    /// function, calls the handler with the context, and returns its result
    /// with the full trace. Handler failures and timeouts surface as error
    /// entries inside the trace, not as `Err`; `Err` is reserved for
    /// validation, the missing-handler case, and host faults.
    pub async fn run(
        &self,
        code: &str,
        context: &Map<String, Value>,
    ) -> Result<RunOutcome, EngineError> {
        tracing::info!(code_len = code.len(), "invocation starting");

        validate_code(code, self.config.max_code_size)?;

        let _permit = self.semaphore.clone().try_acquire_owned().map_err(|_| {
            EngineError::ConcurrencyLimit {
                max: self.config.max_concurrent,
            }
        })?;

        let code = code.to_string();
        let context = Value::Object(context.clone());
        let config = self.config.clone();
        let http = self.http.clone();

        // V8 isolates are !Send — run everything on a dedicated thread
        let (tx, rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    if tx.send(Err(EngineError::Internal(e.into()))).is_err() {
                        tracing::warn!("invocation result receiver dropped");
                    }
                    return;
                }
            };
            let result = rt.block_on(run_in_isolate(&config, &code, &context, http));
            if tx.send(result).is_err() {
                tracing::warn!("invocation result receiver dropped before result was sent");
            }
        });

        let result = rx
            .await
            .map_err(|_| EngineError::Internal(anyhow::anyhow!("sandbox thread panicked")))?;

        match &result {
            Ok(outcome) => match outcome.first_error() {
                None => tracing::info!(trace_len = outcome.trace.len(), "invocation complete"),
                Some(msg) => tracing::warn!(error = %msg, "invocation failed in handler"),
            },
            Err(e) => tracing::warn!(error = %e, "invocation rejected"),
        }

        result
    }
}

/// State for the near-heap-limit callback.
struct HeapLimitState {
    handle: v8::IsolateHandle,
    /// Set once when the limit trips, so the callback can use a shared `&`
    /// reference instead of `&mut`.
    triggered: AtomicBool,
}

/// V8 near-heap-limit callback. Terminates execution and grants 1MB grace
/// for the termination to propagate cleanly.
extern "C" fn near_heap_limit_callback(
    data: *mut std::ffi::c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` points to the Box<HeapLimitState> allocated in
    // run_in_isolate. The Box outlives this callback because the watchdog
    // thread is joined before heap_state is dropped, and V8 only invokes
    // the callback while the isolate is running.
    let state = unsafe { &*(data as *const HeapLimitState) };
    if !state.triggered.swap(true, Ordering::SeqCst) {
        state.handle.terminate_execution();
    }
    current_heap_limit + 1024 * 1024
}

/// One full invocation on the current thread (must be called from a
/// dedicated thread, not the main tokio runtime).
async fn run_in_isolate(
    config: &SandboxConfig,
    code: &str,
    context: &Value,
    http: reqwest::Client,
) -> Result<RunOutcome, EngineError> {
    let mut runtime = create_runtime(config, http);

    runtime
        .execute_script("[runlet:bootstrap]", BOOTSTRAP_JS)
        .map_err(|e| EngineError::Internal(anyhow::anyhow!("bootstrap failed: {e}")))?;

    // --- Set up heap limit callback ---
    let heap_state = Box::new(HeapLimitState {
        handle: runtime.v8_isolate().thread_safe_handle(),
        triggered: AtomicBool::new(false),
    });
    runtime.v8_isolate().add_near_heap_limit_callback(
        near_heap_limit_callback,
        &*heap_state as *const HeapLimitState as *mut std::ffi::c_void,
    );

    // --- Set up CPU watchdog over evaluation plus handler call ---
    let watchdog_handle = runtime.v8_isolate().thread_safe_handle();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog_timed_out = timed_out.clone();
    let timeout = config.timeout;
    let (cancel_tx, cancel_rx) = std::sync::mpsc::channel::<()>();

    let watchdog = std::thread::spawn(move || {
        if let Err(std::sync::mpsc::RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(timeout) {
            watchdog_timed_out.store(true, Ordering::SeqCst);
            watchdog_handle.terminate_execution();
        }
    });

    let outcome = drive_invocation(
        &mut runtime,
        config,
        code,
        context,
        &timed_out,
        &heap_state.triggered,
    )
    .await;

    // Cancel the watchdog and wait for it before the runtime (and the heap
    // state it points at) drops.
    let _ = cancel_tx.send(());
    let _ = watchdog.join();

    let mut outcome = outcome?;

    if heap_state.triggered.load(Ordering::SeqCst) {
        strip_trailing_success(&mut outcome);
        push_error(
            &mut outcome,
            format!(
                "Execution exceeded the memory limit of {} MB",
                config.max_heap_size / (1024 * 1024)
            ),
        );
    } else if timed_out.load(Ordering::SeqCst) {
        strip_trailing_success(&mut outcome);
        push_error(
            &mut outcome,
            format!(
                "Execution timed out exceeded {} seconds",
                config.timeout.as_secs()
            ),
        );
    }

    Ok(outcome)
}

/// Evaluate the code, probe for the handler, call it, and collect the trace.
///
/// Never reports timeouts or heap kills itself; the caller owns those flags
/// and rewrites the outcome afterwards.
async fn drive_invocation(
    runtime: &mut JsRuntime,
    config: &SandboxConfig,
    code: &str,
    context: &Value,
    timed_out: &AtomicBool,
    heap_triggered: &AtomicBool,
) -> Result<RunOutcome, EngineError> {
    let killed = || timed_out.load(Ordering::SeqCst) || heap_triggered.load(Ordering::SeqCst);
    // --- Phase 1: evaluate the user's code ---
    if let Err(e) = runtime.execute_script("[runlet:user]", code.to_string()) {
        // Termination surfaces here as a generic JS error; the caller
        // rewrites it from the watchdog flags.
        let mut outcome = take_outcome(runtime, None);
        if !killed() {
            push_error(&mut outcome, clean_js_message(&e.to_string()));
        }
        return Ok(outcome);
    }

    // --- Phase 2: require a global handler function ---
    let has_handler = {
        let probe = runtime
            .execute_script("[runlet:probe]", "typeof globalThis.handler === 'function'")
            .map_err(|e| EngineError::Internal(anyhow::anyhow!("handler probe failed: {e}")))?;
        let scope = &mut runtime.handle_scope();
        v8::Local::new(scope, probe).is_true()
    };
    if !has_handler {
        return Err(EngineError::HandlerNotDefined);
    }

    // --- Phase 3: call the handler against the deadline ---
    let started = Instant::now();
    let heap_before = used_heap_size(runtime);

    let invoke = format!(
        r#"
        (async (__ctx) => {{
            try {{
                const __r = await globalThis.handler(__ctx);
                __host.setResult(JSON.stringify({{
                    ok: __r === undefined ? null : __r,
                    undef: __r === undefined
                }}));
            }} catch (e) {{
                __host.setResult(JSON.stringify({{
                    err: (e && e.message) ? String(e.message) : String(e)
                }}));
            }}
        }})({context});
        "#
    );

    let loop_error = match runtime.execute_script("[runlet:invoke]", invoke) {
        Ok(_) => {
            match tokio::time::timeout(
                config.timeout,
                runtime.run_event_loop(PollEventLoopOptions::default()),
            )
            .await
            {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => {
                    // The event loop outlived the deadline while parked on a
                    // pending op; the watchdog only catches CPU-bound code.
                    timed_out.store(true, Ordering::SeqCst);
                    return Ok(take_outcome(runtime, None));
                }
            }
        }
        Err(e) => Some(e.to_string()),
    };

    let elapsed_ms = started.elapsed().as_millis() as i64;
    let heap_delta = used_heap_size(runtime) as i64 - heap_before as i64;

    // The result slot wins over an event-loop error: if the handler already
    // resolved, a failure in some stray dangling promise does not undo it.
    let envelope = {
        let state = runtime.op_state();
        let state = state.borrow();
        state
            .try_borrow::<ExecutionResult>()
            .and_then(|r| serde_json::from_str::<Value>(&r.0).ok())
    };

    match envelope {
        Some(envelope) if envelope.get("err").is_none() => {
            let undef = envelope
                .get("undef")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let value = envelope.get("ok").cloned().unwrap_or(Value::Null);
            let api_call_count = {
                let state = runtime.op_state();
                let state = state.borrow();
                state
                    .try_borrow::<AnalyticsSink>()
                    .map(|sink| sink.api_call_count as i64)
                    .unwrap_or(0)
            };
            let mut outcome = take_outcome(
                runtime,
                if undef { None } else { Some(value.clone()) },
            );
            outcome.trace.push(TraceEntry::Metric {
                metric: MetricKind::ExecutionTime,
                value: elapsed_ms,
            });
            outcome.trace.push(TraceEntry::Metric {
                metric: MetricKind::MemoryUsed,
                value: heap_delta,
            });
            outcome.trace.push(TraceEntry::Metric {
                metric: MetricKind::ApiCallCount,
                value: api_call_count,
            });
            outcome.trace.push(TraceEntry::Output {
                message: output_message(if undef { &Value::Null } else { &value }),
            });
            Ok(outcome)
        }
        Some(envelope) => {
            let message = envelope
                .get("err")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            let mut outcome = take_outcome(runtime, None);
            if !killed() {
                push_error(&mut outcome, clean_js_message(&message));
            }
            Ok(outcome)
        }
        None => {
            let mut outcome = take_outcome(runtime, None);
            if !killed() {
                let message = loop_error
                    .map(|e| clean_js_message(&e))
                    .unwrap_or_else(|| "no result returned from handler".to_string());
                push_error(&mut outcome, message);
            }
            Ok(outcome)
        }
    }
}

/// Create a fresh JsRuntime with the capability extension loaded, heap
/// limits set, and per-invocation state installed.
fn create_runtime(config: &SandboxConfig, http: reqwest::Client) -> JsRuntime {
    let create_params = v8::CreateParams::default().heap_limits(0, config.max_heap_size);

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![runlet_ext::init_ops()],
        create_params: Some(create_params),
        ..Default::default()
    });

    {
        let op_state = runtime.op_state();
        let mut state = op_state.borrow_mut();
        state.put(AnalyticsSink::default());
        state.put(HttpClient(http));
        state.put(MaxResponseSize(config.max_response_size));
    }

    runtime
}

/// Pull the trace back out of the isolate and pair it with the result.
fn take_outcome(runtime: &mut JsRuntime, result: Option<Value>) -> RunOutcome {
    let sink = runtime
        .op_state()
        .borrow_mut()
        .try_take::<AnalyticsSink>()
        .unwrap_or_default();
    RunOutcome {
        result,
        trace: sink.outputs,
    }
}

fn used_heap_size(runtime: &mut JsRuntime) -> u64 {
    let mut stats = v8::HeapStatistics::default();
    runtime.v8_isolate().get_heap_statistics(&mut stats);
    stats.used_heap_size() as u64
}

/// Objects and arrays are JSON-stringified in the output entry; primitives
/// pass through unchanged.
fn output_message(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => {
            Value::String(serde_json::to_string(value).unwrap_or_default())
        }
        other => other.clone(),
    }
}

fn push_error(outcome: &mut RunOutcome, message: impl Into<String>) {
    outcome.trace.push(TraceEntry::Error {
        message: message.into(),
    });
    outcome.result = None;
}

/// Drop any metric and output entries appended before a late kill was
/// noticed, so failed invocations never carry success entries.
fn strip_trailing_success(outcome: &mut RunOutcome) {
    while matches!(
        outcome.trace.last(),
        Some(TraceEntry::Metric { .. } | TraceEntry::Output { .. })
    ) {
        outcome.trace.pop();
    }
    outcome.result = None;
}

/// Reduce a raw V8 error to its message: first line only, with the
/// `Uncaught ` prefix and any `SomethingError: ` class prefix removed.
fn clean_js_message(raw: &str) -> String {
    let first_line = raw.lines().next().unwrap_or(raw).trim();
    let without_uncaught = first_line.strip_prefix("Uncaught ").unwrap_or(first_line);
    if let Some((class, rest)) = without_uncaught.split_once(": ") {
        if class.ends_with("Error") && class.chars().all(|c| c.is_ascii_alphanumeric()) {
            return rest.to_string();
        }
    }
    without_uncaught.to_string()
}
