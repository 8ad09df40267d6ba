//! Invocation context construction.
//!
//! Merges the owner's secrets (credential echo subsets, profile, free-form
//! variables) with the caller's request arguments — after default-value
//! backfilling — into the single object handed to the handler.
//!
//! The builder is a pure function of its inputs: building twice with
//! identical inputs yields structurally identical contexts. The result
//! holds live credentials and must never be persisted or logged verbatim.

use runlet_access::{ArgumentSpec, OwnerSecrets};
use serde_json::{Map, Value};

/// Time zone injected when the owner's profile has none.
pub const DEFAULT_TIME_ZONE: &str = "America/New_York";

/// Key under which the owner's secrets block lives in the context.
pub const USER_VARS_KEY: &str = "userVars";

/// Build the invocation context for one call.
///
/// The returned map has the shape `{ "userVars": {…}, …request_args }`:
/// request arguments are spread at the top level *after* `userVars` is
/// set, so a request argument can add or override top-level fields but
/// can never replace the `userVars` block itself.
pub fn build_context(
    secrets: &OwnerSecrets,
    specs: &[ArgumentSpec],
    request_args: &Map<String, Value>,
) -> Map<String, Value> {
    let args = backfill_defaults(specs, request_args.clone());

    let mut context = Map::new();
    context.insert(USER_VARS_KEY.to_string(), Value::Object(user_vars(secrets)));
    for (key, value) in args {
        if key != USER_VARS_KEY {
            context.insert(key, value);
        }
    }
    context
}

/// Copy declared defaults into absent, null, or empty-string arguments.
///
/// A default only applies when it is a non-empty string or a finite
/// number; anything else leaves the argument untouched.
fn backfill_defaults(
    specs: &[ArgumentSpec],
    mut args: Map<String, Value>,
) -> Map<String, Value> {
    for spec in specs {
        let missing = match args.get(&spec.name) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if !missing {
            continue;
        }
        if let Some(default) = &spec.default_value {
            let usable = match default {
                Value::String(s) => !s.is_empty(),
                Value::Number(n) => n.as_f64().is_some_and(f64::is_finite),
                _ => false,
            };
            if usable {
                args.insert(spec.name.clone(), default.clone());
            }
        }
    }
    args
}

/// Assemble the `userVars` block: credential echo subsets, then profile,
/// then the owner's free-form variables flattened in.
fn user_vars(secrets: &OwnerSecrets) -> Map<String, Value> {
    let mut vars = Map::new();

    for credential in &secrets.credentials {
        if credential.service.is_empty() {
            continue;
        }
        let prefix = service_prefix(&credential.service);
        let token_key = format!("{prefix}_ACCESS_TOKEN");
        // One credential wins per service: the default one, else the
        // first seen.
        if credential.is_default || !vars.contains_key(&token_key) {
            vars.insert(token_key, Value::String(credential.access_token.clone()));
            vars.insert(
                format!("{prefix}_ID_TOKEN"),
                Value::String(credential.id_token.clone().unwrap_or_default()),
            );
            vars.insert(
                format!("{prefix}_EMAIL_ADDRESS"),
                Value::String(credential.primary_email.clone().unwrap_or_default()),
            );
        }
    }

    vars.insert(
        "USER_NAME".to_string(),
        Value::String(secrets.profile.user_name.clone().unwrap_or_default()),
    );
    vars.insert(
        "USER_TIMEZONE".to_string(),
        Value::String(
            secrets
                .profile
                .time_zone
                .clone()
                .unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string()),
        ),
    );

    for (key, value) in &secrets.variables {
        vars.insert(key.clone(), Value::String(value.clone()));
    }

    vars
}

/// Uppercase a service name into a variable prefix: every run of
/// non-alphanumeric characters collapses into one `_`.
fn service_prefix(service: &str) -> String {
    service
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_ascii_uppercase()
}
