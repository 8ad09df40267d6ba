#![warn(missing_docs)]

//! # runlet-sandbox
//!
//! The V8 capability sandbox and execution driver for the Runlet function
//! engine.
//!
//! User-registered JavaScript runs inside a fresh `deno_core` isolate per
//! invocation. The isolate sees only the installed capability surface —
//! `console`, `fetch`, `setTimeout`, `utils.date`, `Buffer`,
//! `URLSearchParams`, `RestClient` — plus the global `handler` slot the
//! code must fill. Everything the invocation does is recorded as an
//! ordered trace of log, error, metric, and output entries.
//!
//! [`invoke_function`] is the front door: it backfills argument defaults,
//! assembles the secrets-bearing context, runs the driver, and splits the
//! trace into the summary shape callers consume.

pub mod context;
pub mod date;
pub mod driver;
pub mod invoke;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod ops;
pub mod trace;
pub mod validator;

pub use context::{build_context, DEFAULT_TIME_ZONE, USER_VARS_KEY};
pub use driver::{RunOutcome, SandboxConfig, SandboxExecutor};
pub use invoke::{into_envelope, invoke_function, InvocationSummary, MetricValues};
pub use trace::{AnalyticsSink, MetricKind, TraceEntry};
pub use validator::validate_code;
