//! Typed error types for the Runlet function engine.
//!
//! Provides [`EngineError`] — the canonical error type for everything that
//! happens *before* or *around* a sandbox run: access resolution, argument
//! validation, code validation, and capacity limits.
//!
//! Errors raised *inside* the sandbox (thrown exceptions, syntax errors,
//! timeouts) are deliberately not represented here; those fold into the
//! invocation trace so the caller can inspect partial output alongside the
//! failure reason.

use thiserror::Error;

/// Canonical error type for Runlet engine operations.
///
/// All variants are `#[non_exhaustive]` to allow future additions without
/// breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The function does not exist or is not visible to the caller.
    ///
    /// Returned for both "no such function" and "function exists but the
    /// caller holds no access tier" — a non-owner must not be able to
    /// distinguish the two.
    #[error("Function not found.")]
    NotFound,

    /// The evaluated code never assigned or declared a handler entry point.
    #[error("Handler function is not defined.")]
    HandlerNotDefined,

    /// The caller-supplied request arguments are malformed.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Code failed pre-execution validation checks.
    #[error("code validation failed: {reason}")]
    ValidationFailed {
        /// What went wrong.
        reason: String,
    },

    /// Code exceeds the configured maximum size.
    #[error("code exceeds maximum size of {max} bytes (got {actual})")]
    CodeTooLarge {
        /// Maximum allowed size.
        max: usize,
        /// Actual size.
        actual: usize,
    },

    /// Too many concurrent sandbox executions.
    #[error("concurrency limit reached (max {max} concurrent executions)")]
    ConcurrencyLimit {
        /// Maximum allowed concurrent executions.
        max: usize,
    },

    /// Invalid engine or sandbox configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An internal error (catch-all for unexpected failures).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Returns a static error code string for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::HandlerNotDefined => "HANDLER_NOT_DEFINED",
            Self::InvalidArguments(_) => "INVALID_ARGUMENTS",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::CodeTooLarge { .. } => "CODE_TOO_LARGE",
            Self::ConcurrencyLimit { .. } => "CONCURRENCY_LIMIT",
            Self::Config(_) => "CONFIG",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Returns the HTTP-equivalent status for this error.
    ///
    /// The engine itself does not speak HTTP; the excluded web layer maps
    /// these onto real responses.
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::HandlerNotDefined => 400,
            Self::InvalidArguments(_) => 400,
            Self::ValidationFailed { .. } => 400,
            Self::CodeTooLarge { .. } => 400,
            Self::ConcurrencyLimit { .. } => 429,
            Self::Config(_) => 500,
            Self::Internal(_) => 500,
        }
    }
}

// Compile-time assertion: EngineError must be Send + Sync + 'static
const _: fn() = || {
    fn assert_bounds<T: Send + Sync + 'static>() {}
    assert_bounds::<EngineError>();
};
