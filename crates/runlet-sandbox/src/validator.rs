//! Pre-execution code validation.
//!
//! The V8 isolate is the real security boundary; these checks catch the
//! obvious escape attempts before an isolate is even spun up and give the
//! author a clearer error than a runtime ReferenceError would.

use runlet_error::EngineError;

/// Patterns rejected outright. Everything here is also unreachable inside
/// the isolate, so matches are early feedback rather than enforcement.
const BANNED_PATTERNS: &[&str] = &[
    "eval(",
    "import(",
    "require(",
    "Deno.",
    "__proto__",
    "constructor.constructor",
    "process.env",
    "process.exit",
    "process.binding",
];

/// Validate user-registered code before execution.
pub fn validate_code(code: &str, max_size: usize) -> Result<(), EngineError> {
    if code.len() > max_size {
        return Err(EngineError::CodeTooLarge {
            max: max_size,
            actual: code.len(),
        });
    }

    if code.trim().is_empty() {
        return Err(EngineError::ValidationFailed {
            reason: "code is empty".into(),
        });
    }

    for pattern in BANNED_PATTERNS {
        if code.contains(pattern) {
            return Err(EngineError::ValidationFailed {
                reason: format!("banned pattern: {pattern}"),
            });
        }
    }

    Ok(())
}
