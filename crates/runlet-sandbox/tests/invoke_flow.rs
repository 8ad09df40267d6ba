//! Full pipeline tests: access resolution, context build, invocation,
//! and the caller-facing envelope.

use serde_json::{json, Value};
use uuid::Uuid;

use runlet_access::{
    resolve, AccessTier, ArgumentSpec, FunctionRecord, MemoryRepository, Profile, OwnerSecrets,
};
use runlet_error::EngineError;
use runlet_sandbox::{into_envelope, invoke_function, SandboxConfig, SandboxExecutor};

fn record(owner: &str, slug: &str, code: &str, private: bool) -> FunctionRecord {
    FunctionRecord {
        id: Uuid::new_v4(),
        slug: slug.into(),
        owner_user_id: owner.into(),
        code: code.into(),
        is_private: private,
        is_published: true,
        arguments: vec![ArgumentSpec::string("greeting", Some("Hello"))],
        tags: vec![],
    }
}

fn secrets() -> OwnerSecrets {
    OwnerSecrets {
        profile: Profile {
            user_name: Some("alice".into()),
            time_zone: Some("UTC".into()),
        },
        ..Default::default()
    }
}

const GREETER: &str = r#"
    function handler(ctx) {
        return ctx.greeting + " " + ctx.userVars.USER_NAME;
    }
"#;

#[tokio::test]
async fn owner_invocation_end_to_end() {
    let mut repo = MemoryRepository::new();
    repo.add_function(record("alice", "greeter", GREETER, true));
    let grant = resolve(&repo, "alice", "greeter", &AccessTier::ALL)
        .await
        .unwrap();
    assert_eq!(grant.tier, AccessTier::Owner);

    let exec = SandboxExecutor::new(SandboxConfig::default()).unwrap();
    let summary = invoke_function(&exec, &grant.function, &secrets(), &json!({}))
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.result, Some(json!("Hello alice")));

    let envelope = into_envelope(&summary, false);
    assert_eq!(envelope["status"], "success");
    assert_eq!(envelope["data"], "Hello alice");
}

#[tokio::test]
async fn request_args_override_defaults_through_the_pipeline() {
    let mut repo = MemoryRepository::new();
    repo.add_function(record("alice", "greeter", GREETER, true));
    let grant = resolve(&repo, "alice", "greeter", &AccessTier::ALL)
        .await
        .unwrap();

    let exec = SandboxExecutor::new(SandboxConfig::default()).unwrap();
    let summary = invoke_function(
        &exec,
        &grant.function,
        &secrets(),
        &json!({"greeting": "Howdy"}),
    )
    .await
    .unwrap();

    assert_eq!(summary.result, Some(json!("Howdy alice")));
}

#[tokio::test]
async fn private_function_stays_invisible_to_strangers() {
    let mut repo = MemoryRepository::new();
    repo.add_function(record("alice", "greeter", GREETER, true));
    let err = resolve(&repo, "mallory", "greeter", &AccessTier::ALL)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NotFound));
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn non_object_args_are_rejected() {
    let exec = SandboxExecutor::new(SandboxConfig::default()).unwrap();
    let record = record("alice", "greeter", GREETER, true);

    let err = invoke_function(&exec, &record, &secrets(), &json!("a string"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArguments(_)));

    // null means "no arguments", not a malformed request
    let summary = invoke_function(&exec, &record, &secrets(), &Value::Null)
        .await
        .unwrap();
    assert_eq!(summary.result, Some(json!("Hello alice")));
}

#[tokio::test]
async fn handler_failure_surfaces_in_the_envelope() {
    let exec = SandboxExecutor::new(SandboxConfig::default()).unwrap();
    let record = record(
        "alice",
        "pie-thrower",
        r#"function handler(ctx) { throw 'I am a pie!'; }"#,
        true,
    );

    let summary = invoke_function(&exec, &record, &secrets(), &json!({}))
        .await
        .unwrap();

    assert!(!summary.is_success());
    assert!(summary.metrics.is_none());

    let envelope = into_envelope(&summary, true);
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["message"], "I am a pie!");
    assert_eq!(envelope["debug"]["trace"][0]["type"], "error");
}
