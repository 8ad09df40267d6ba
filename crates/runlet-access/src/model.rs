//! Function records and argument specs.
//!
//! These are read-only from the engine's perspective: the excluded CRUD
//! layer creates and edits them, the engine only resolves and executes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Declared type of a function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    /// A UTF-8 string value.
    String,
    /// A JSON number.
    Number,
    /// A JSON boolean.
    Boolean,
}

/// One declared argument of a function.
///
/// Argument names are unique within a function; the CRUD layer enforces
/// this, the engine relies on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    /// Argument name, unique within the owning function.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub arg_type: ArgType,
    /// Optional default, backfilled when the caller omits the argument.
    ///
    /// Only a non-empty string or a finite number counts as a usable
    /// default at invocation time.
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the caller must supply this argument.
    #[serde(default)]
    pub is_required: bool,
}

impl ArgumentSpec {
    /// Shorthand for an optional string argument with a default.
    pub fn string(name: &str, default: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            arg_type: ArgType::String,
            default_value: default.map(|d| Value::String(d.to_string())),
            description: None,
            is_required: false,
        }
    }
}

/// A user-registered function, as resolved for execution.
///
/// The repository attaches argument specs and tags eagerly so that the
/// engine never needs a second query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Opaque unique id.
    pub id: Uuid,
    /// Human slug, unique per owner.
    pub slug: String,
    /// Owning user.
    pub owner_user_id: String,
    /// Handler source code.
    pub code: String,
    /// Hidden from every tier except the owner.
    pub is_private: bool,
    /// Visible to subscribers and collections only when published.
    pub is_published: bool,
    /// Declared arguments, in declaration order.
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}
