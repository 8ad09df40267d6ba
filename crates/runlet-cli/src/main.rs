#![warn(missing_docs)]

//! Local runner for Runlet user functions.
//!
//! Registers a function file in an in-memory repository, resolves access
//! for the given caller, invokes it in the sandbox, and prints the
//! outcome envelope as JSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use runlet_access::{
    resolve, AccessTier, FunctionRecord, MemoryRepository, MemorySecrets, OwnerSecrets, Profile,
    SecretsProvider,
};
use runlet_config::RunletConfig;
use runlet_sandbox::{into_envelope, invoke_function, SandboxConfig, SandboxExecutor};

#[derive(Parser, Debug)]
#[command(
    name = "runlet",
    version,
    about = "Run a user function in the Runlet sandbox"
)]
struct Args {
    /// Path to a JavaScript file that defines a global `handler`
    code: PathBuf,

    /// Request arguments as a JSON object
    #[arg(long, default_value = "{}", value_name = "JSON")]
    args: String,

    /// Caller user id; also owns the registered function
    #[arg(long, default_value = "local")]
    user: String,

    /// Slug the function is registered under
    #[arg(long, default_value = "local-function")]
    slug: String,

    /// Config file (TOML), with `${ENV}` expansion
    #[arg(long, env = "RUNLET_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Owner time zone for `userVars.USER_TIMEZONE`
    #[arg(long, value_name = "TZ")]
    time_zone: Option<String>,

    /// Extra `KEY=VALUE` pairs flattened into `userVars` (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,

    /// Include the result, metrics, and full trace in the output
    #[arg(long)]
    debug: bool,
}

/// Build SandboxConfig from config overrides.
fn build_sandbox_config(config: &RunletConfig) -> SandboxConfig {
    let mut sandbox = SandboxConfig::default();
    if let Some(timeout) = config.sandbox.timeout_secs {
        sandbox.timeout = std::time::Duration::from_secs(timeout);
    }
    if let Some(heap) = config.sandbox.max_heap_mb {
        sandbox.max_heap_size = heap * 1024 * 1024;
    }
    if let Some(concurrent) = config.sandbox.max_concurrent {
        sandbox.max_concurrent = concurrent;
    }
    if let Some(code_kb) = config.sandbox.max_code_size_kb {
        sandbox.max_code_size = code_kb * 1024;
    }
    if let Some(timeout) = config.http.request_timeout_secs {
        sandbox.http_request_timeout = std::time::Duration::from_secs(timeout);
    }
    if let Some(ref agent) = config.http.user_agent {
        sandbox.user_agent = agent.clone();
    }
    sandbox
}

fn load_config(path: Option<&Path>) -> Result<RunletConfig> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            RunletConfig::from_file_with_env(path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => Ok(RunletConfig::from_toml("")?),
    }
}

fn parse_vars(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .with_context(|| format!("--var expects KEY=VALUE, got '{pair}'"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    let sandbox_config = build_sandbox_config(&config);

    let code = std::fs::read_to_string(&args.code)
        .with_context(|| format!("failed to read {}", args.code.display()))?;
    let request_args: serde_json::Value =
        serde_json::from_str(&args.args).context("--args must be valid JSON")?;

    let record = FunctionRecord {
        id: Uuid::new_v4(),
        slug: args.slug.clone(),
        owner_user_id: args.user.clone(),
        code,
        is_private: true,
        is_published: false,
        arguments: vec![],
        tags: vec![],
    };

    let mut repo = MemoryRepository::new();
    repo.add_function(record);

    let mut secrets_store = MemorySecrets::new();
    secrets_store.insert(
        &args.user,
        OwnerSecrets {
            profile: Profile {
                user_name: Some(args.user.clone()),
                time_zone: args.time_zone.clone(),
            },
            variables: parse_vars(&args.vars)?,
            ..Default::default()
        },
    );

    let grant = resolve(&repo, &args.user, &args.slug, &AccessTier::ALL).await?;
    tracing::info!(function = %grant.function.slug, tier = ?grant.tier, "function resolved");

    let secrets = secrets_store.owner_secrets(&grant.function.owner_user_id).await?;

    let executor = SandboxExecutor::new(sandbox_config)?;
    let summary = invoke_function(&executor, &grant.function, &secrets, &request_args).await?;

    let envelope = into_envelope(&summary, args.debug);
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
