//! End-to-end pipeline scenarios over scripted models.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use devmatrix::{CognitiveCore, RunBudgets, RunContext, RunStatus, SpecDocument, StackDescriptor};
use devmatrix_core::cancellation::CancellationToken;
use devmatrix_core::model::compliance::{GroundTruth, RuleTriple};
use devmatrix_core::model::endpoint::HttpMethod;
use devmatrix_core::model::validation::RuleKind;
use devmatrix_core::retry::RetryPolicy;
use devmatrix_testing::ScriptedCompletionModel;
use std::sync::Arc;

const SPEC_TEXT: &str = "# Users\n\
User{id: UUID unique required, email: String format=email unique required, name: String minLength=2 maxLength=100 required}\n\
The system must manage users through GET /users and POST /users.\n";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One handler covering every prompt contract in the pipeline.
fn scripted_model() -> ScriptedCompletionModel {
    ScriptedCompletionModel::new().with_handler(|prompt| Ok(canned(prompt)))
}

/// Canonical canned response for every prompt contract.
fn canned(prompt: &str) -> String {
    if prompt.contains("PASS 1") {
        r#"{"requirements": [{"id": "REQ-001", "text": "manage users", "ambiguities": []}]}"#
            .to_string()
    } else if prompt.contains("PASS 2") {
        r#"{"modules": [{"name": "models", "purpose": "entities"},
                        {"name": "services", "purpose": "logic"},
                        {"name": "routes", "purpose": "http"}]}"#
            .to_string()
    } else if prompt.contains("PASS 3") {
        r#"{"contracts": [{"module": "services", "types": ["UserService"],
             "methods": [{"name": "create_user",
                          "inputs": {"email": "string"},
                          "outputs": {"user": "User"}}]}]}"#
            .to_string()
    } else if prompt.contains("PASS 4") {
        r#"{"integrations": [{"from_module": "services", "to_module": "services",
                              "shared_entities": ["User"]}]}"#
            .to_string()
    } else if prompt.contains("PASS 5") || prompt.contains("PASS 6") {
        r#"{"tasks": [
             {"id": "t1", "purpose": "validate user payload", "domain": "crud",
              "inputs": {"email": "string"}, "outputs": {"valid": "boolean"},
              "predecessors": []},
             {"id": "t2", "purpose": "persist user", "domain": "crud",
              "inputs": {"email": "string"}, "outputs": {"user": "User"},
              "predecessors": ["t1"]}]}"#
            .to_string()
    } else if prompt.contains("STRATEGY") {
        r#"{"approach": "from_scratch", "algorithm": "straightforward", "steps": ["do it"]}"#
            .to_string()
    } else if prompt.contains("IMPLEMENTATION") {
        let marker = prompt
            .lines()
            .find_map(|l| l.strip_prefix("TASK PURPOSE: "))
            .unwrap_or("task")
            .replace(' ', "_");
        format!(r#"{{"path": "services/{marker}.py", "content": "def {marker}(): ...\n"}}"#)
    } else if prompt.contains("REFINEMENT") {
        r#"{"approved": true, "issues": [], "content": null}"#.to_string()
    } else {
        // Validation-extraction prompts: nothing beyond the direct and
        // pattern stages.
        "[]".to_string()
    }
}

fn ground_truth() -> GroundTruth {
    GroundTruth {
        entities: vec!["User".into()],
        endpoints: vec![
            (HttpMethod::Get, "/users".into()),
            (HttpMethod::Post, "/users".into()),
        ],
        validations: vec![
            RuleTriple::new("User", "id", RuleKind::Uniqueness),
            RuleTriple::new("User", "id", RuleKind::Presence),
            RuleTriple::new("User", "id", RuleKind::Format),
            RuleTriple::new("User", "email", RuleKind::Presence),
            RuleTriple::new("User", "email", RuleKind::Uniqueness),
            RuleTriple::new("User", "email", RuleKind::Format),
            RuleTriple::new("User", "name", RuleKind::Presence),
            RuleTriple::new("User", "name", RuleKind::Range),
        ],
    }
}

fn core(model: ScriptedCompletionModel) -> CognitiveCore {
    CognitiveCore::builder(Arc::new(model))
        .with_retry_policy(RetryPolicy::fixed(3, 0))
        .build()
}

fn context() -> RunContext {
    RunContext::new(
        SpecDocument::from_text(SPEC_TEXT).unwrap(),
        StackDescriptor::default(),
    )
    .with_ground_truth(ground_truth())
}

#[tokio::test]
async fn minimal_crud_run_reaches_full_compliance() {
    init_tracing();
    let core = core(scripted_model());
    core.open().await.unwrap();

    let output = core.run(context()).await;

    assert_eq!(output.report.status, RunStatus::Success);
    assert!((output.report.overall_compliance - 1.0).abs() < 1e-9);
    assert_eq!(output.report.entity_coverage, Some(1.0));
    assert_eq!(output.report.endpoint_coverage, Some(1.0));
    assert_eq!(output.report.validation_coverage, Some(1.0));

    let files = output.files.unwrap();
    // All eight extracted rules are registered in the artifact.
    let schemas = files.get_text("schemas.py").unwrap();
    for (attribute, kind) in [
        ("id", "uniqueness"),
        ("id", "presence"),
        ("id", "format"),
        ("email", "presence"),
        ("email", "uniqueness"),
        ("email", "format"),
        ("name", "presence"),
        ("name", "range"),
    ] {
        assert!(
            schemas.contains(&format!("(\"User\", \"{attribute}\", \"{kind}\")")),
            "missing ({attribute}, {kind}) in:\n{schemas}"
        );
    }

    // Every phase checkpointed successfully.
    let phases: Vec<&str> = output.report.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(
        phases,
        vec![
            "spec_parse",
            "validation_extraction",
            "classification",
            "planning",
            "atomization",
            "dag_build",
            "synthesis",
            "compliance",
            "repair",
            "learning",
        ]
    );
    assert!(output.report.phases.iter().all(|p| p.success));
    assert!(output.report.tokens_consumed > 0);

    core.close().await.unwrap();
}

#[tokio::test]
async fn cancellation_mid_synthesis_discards_the_file_map() {
    init_tracing();
    let token = CancellationToken::new();
    let trip = token.clone();

    // Trip the token during the first strategy call: in-flight work
    // completes, later layers never start.
    let model = ScriptedCompletionModel::new().with_handler(move |prompt| {
        if prompt.contains("STRATEGY") {
            trip.cancel();
        }
        Ok(canned(prompt))
    });

    let core = core(model);
    let output = core.run_with_token(context(), token).await;

    assert_eq!(output.report.status, RunStatus::Cancelled);
    assert!(output.files.is_none(), "partial file map must be discarded");
    // Synthesis was reached; repair never ran.
    assert!(output
        .report
        .phases
        .iter()
        .any(|p| p.phase == "synthesis"));
    assert!(!output.report.phases.iter().any(|p| p.phase == "repair"));
}

#[tokio::test]
async fn planning_that_never_converges_fails_the_run() {
    init_tracing();
    let model = ScriptedCompletionModel::new().with_handler(|prompt| {
        if prompt.contains("PASS 1") {
            Ok(r#"{"requirements": []}"#.to_string())
        } else if prompt.contains("PASS 2") {
            Ok(r#"{"modules": []}"#.to_string())
        } else {
            Ok("[]".to_string())
        }
    });

    let core = core(model);
    let output = core.run(context()).await;

    assert_eq!(output.report.status, RunStatus::Failed);
    assert!(output.files.is_none());
    let failure = output.report.failure.unwrap();
    assert_eq!(failure.phase, "planning");
    assert!(failure.message.contains("planning failed"));
}

#[tokio::test]
async fn malformed_spec_fails_at_parse() {
    init_tracing();
    let core = core(scripted_model());
    let ctx = RunContext::new(
        SpecDocument::from_text("nothing structured here at all").unwrap(),
        StackDescriptor::default(),
    );
    let output = core.run(ctx).await;

    assert_eq!(output.report.status, RunStatus::Failed);
    let failure = output.report.failure.unwrap();
    assert_eq!(failure.phase, "spec_parse");
}

#[tokio::test]
async fn token_budget_exhaustion_is_fatal() {
    init_tracing();
    let core = core(scripted_model());
    let budgets = RunBudgets {
        max_tokens: Some(1),
        ..Default::default()
    };
    let ctx = RunContext::new(
        SpecDocument::from_text(SPEC_TEXT).unwrap(),
        StackDescriptor::default(),
    )
    .with_budgets(budgets);

    let output = core.run(ctx).await;
    assert_eq!(output.report.status, RunStatus::Failed);
    let failure = output.report.failure.unwrap();
    assert!(failure.message.contains("token budget exhausted"));
}

#[tokio::test]
async fn run_artifacts_are_persisted_per_run_id() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let core = CognitiveCore::builder(Arc::new(scripted_model()))
        .with_retry_policy(RetryPolicy::fixed(3, 0))
        .with_artifact_root(dir.path())
        .build();

    let output = core.run(context()).await;
    assert_eq!(output.report.status, RunStatus::Success);

    let run_dir = dir.path().join(output.report.run_id.to_string());
    assert!(run_dir.join("run_report.json").exists());
    assert!(run_dir.join("schemas.py").exists());
}

#[tokio::test]
async fn repeated_runs_promote_patterns_at_the_quorum() {
    init_tracing();
    let core = core(scripted_model());
    core.open().await.unwrap();

    let first = core.run(context()).await;
    assert_eq!(first.report.status, RunStatus::Success);
    assert_eq!(first.report.promoted_patterns, 0);

    let second = core.run(context()).await;
    assert_eq!(second.report.promoted_patterns, 0);

    // Third identical run reaches the usage quorum for both task
    // signatures.
    let third = core.run(context()).await;
    assert_eq!(third.report.promoted_patterns, 2);
    assert_eq!(core.patterns().promoted_count(), 2);
}
