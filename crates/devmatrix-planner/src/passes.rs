//! The six-pass masterplan planner.
//!
//! Each pass is one deterministic LLM invocation with structured JSON
//! output. When a pass's output violates an invariant of the plan so far,
//! the pass is reissued with the violation stated as an explicit
//! constraint, up to two retries; non-convergence raises `PlanningFailed`,
//! which is fatal for the run.

use crate::plan::{
    ArchitectureDesign, IntegrationPoint, MasterPlan, ModuleContract, RequirementsAnalysis,
};
use devmatrix_core::completion::{CompletionModel, CompletionParams, TokenUsage};
use devmatrix_core::json::extract_first_json_object;
use devmatrix_core::model::requirement::{Domain, Requirement};
use devmatrix_core::model::task::{
    AtomicTask, PerformanceTier, SecurityTier, MODULE_TASK_LINE_BUDGET,
    NARROW_TASK_LINE_BUDGET,
};
use devmatrix_core::retry::RetryPolicy;
use devmatrix_core::{Error, ErrorKind, Result};
use devmatrix_spec::parser::ParsedSpec;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reissues allowed per pass on invariant violation.
const MAX_REISSUES: u32 = 2;

/// Wire format for tasks in pass 5/6 responses.
#[derive(Debug, Deserialize)]
struct TaskJson {
    id: String,
    purpose: String,
    #[serde(default)]
    domain: Option<Domain>,
    #[serde(default)]
    inputs: BTreeMap<String, String>,
    #[serde(default)]
    outputs: BTreeMap<String, String>,
    #[serde(default)]
    constraints: Vec<String>,
    #[serde(default)]
    security: Option<SecurityTier>,
    #[serde(default)]
    performance: Option<PerformanceTier>,
    #[serde(default)]
    idempotent: bool,
    #[serde(default)]
    predecessors: Vec<String>,
    #[serde(default)]
    line_budget: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TaskListJson {
    tasks: Vec<TaskJson>,
}

impl TaskJson {
    fn into_task(self) -> AtomicTask {
        let line_budget = self
            .line_budget
            .unwrap_or(NARROW_TASK_LINE_BUDGET)
            .clamp(1, MODULE_TASK_LINE_BUDGET);
        AtomicTask {
            id: self.id,
            purpose: self.purpose,
            inputs: self.inputs,
            outputs: self.outputs,
            constraints: self.constraints,
            domain: self.domain.unwrap_or(Domain::General),
            security: self.security.unwrap_or_default(),
            performance: self.performance.unwrap_or_default(),
            idempotent: self.idempotent,
            predecessors: self.predecessors,
            line_budget,
        }
    }
}

/// The multi-pass planner over a shared completion capability.
pub struct MultiPassPlanner {
    model: Arc<dyn CompletionModel>,
    params: CompletionParams,
    policy: RetryPolicy,
}

impl MultiPassPlanner {
    /// Create a planner with deterministic decoding.
    #[must_use]
    pub fn new(model: Arc<dyn CompletionModel>, params: CompletionParams) -> Self {
        Self {
            model,
            params,
            policy: RetryPolicy::exponential(3),
        }
    }

    /// Override the retry schedule for transient failures.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run all six refinement passes.
    pub async fn plan(
        &self,
        parsed: &ParsedSpec,
        requirements: &[Requirement],
        usage: &mut TokenUsage,
    ) -> Result<MasterPlan> {
        let mut plan = MasterPlan::default();

        // Pass 1: requirements analysis.
        plan.analysis = self
            .run_pass(&pass1_prompt(requirements), usage, |value| {
                let analysis: RequirementsAnalysis = from_value(value)?;
                Ok(analysis)
            })
            .await?;
        info!(normalized = plan.analysis.requirements.len(), "pass 1 complete");

        // Pass 2: architecture design.
        plan.architecture = self
            .run_pass(&pass2_prompt(parsed, &plan.analysis), usage, |value| {
                let architecture: ArchitectureDesign = from_value(value)?;
                if architecture.modules.is_empty() {
                    return Err(violation("architecture must choose at least one module"));
                }
                Ok(architecture)
            })
            .await?;
        info!(modules = plan.architecture.modules.len(), "pass 2 complete");

        // Pass 3: contract definition; every contract must belong to a
        // chosen module.
        let architecture = plan.architecture.clone();
        plan.contracts = self
            .run_pass(&pass3_prompt(&architecture), usage, move |value| {
                #[derive(Deserialize)]
                struct Contracts {
                    #[serde(default)]
                    contracts: Vec<ModuleContract>,
                }
                let contracts: Contracts = from_value(value)?;
                for contract in &contracts.contracts {
                    if !architecture.has_module(&contract.module) {
                        return Err(violation(format!(
                            "contract names module '{}' absent from the architecture",
                            contract.module
                        )));
                    }
                }
                Ok(contracts.contracts)
            })
            .await?;
        info!(contracts = plan.contracts.len(), "pass 3 complete");

        // Pass 4: integration points; both ends must be contracted modules.
        let contracted: HashSet<String> =
            plan.contracts.iter().map(|c| c.module.clone()).collect();
        plan.integrations = self
            .run_pass(&pass4_prompt(&plan.contracts), usage, move |value| {
                #[derive(Deserialize)]
                struct Integrations {
                    #[serde(default)]
                    integrations: Vec<IntegrationPoint>,
                }
                let integrations: Integrations = from_value(value)?;
                for point in &integrations.integrations {
                    for module in [&point.from_module, &point.to_module] {
                        if !contracted.contains(module) {
                            return Err(violation(format!(
                                "integration references uncontracted module '{module}'"
                            )));
                        }
                    }
                }
                Ok(integrations.integrations)
            })
            .await?;
        info!(integrations = plan.integrations.len(), "pass 4 complete");

        // Pass 5: atomic breakdown.
        plan.tasks = self
            .run_pass(&pass5_prompt(&plan.contracts), usage, |value| {
                let list: TaskListJson = from_value(value)?;
                let tasks: Vec<AtomicTask> =
                    list.tasks.into_iter().map(TaskJson::into_task).collect();
                validate_tasks(&tasks)?;
                Ok(tasks)
            })
            .await?;
        info!(tasks = plan.tasks.len(), "pass 5 complete");

        // Pass 6: validation & optimization over the full task list.
        let prior = plan.tasks.clone();
        plan.tasks = self
            .run_pass(&pass6_prompt(&prior), usage, |value| {
                let list: TaskListJson = from_value(value)?;
                let tasks: Vec<AtomicTask> =
                    list.tasks.into_iter().map(TaskJson::into_task).collect();
                if tasks.is_empty() {
                    return Err(violation("optimization may not drop every task"));
                }
                validate_tasks(&tasks)?;
                Ok(tasks)
            })
            .await?;
        info!(tasks = plan.tasks.len(), "pass 6 complete");

        Ok(plan)
    }

    /// Run one pass: complete, parse, validate; reissue with the violation
    /// as an explicit constraint up to twice.
    async fn run_pass<T, F>(&self, prompt: &str, usage: &mut TokenUsage, parse: F) -> Result<T>
    where
        F: Fn(serde_json::Value) -> Result<T>,
    {
        let mut current = prompt.to_string();
        let mut last_violation = String::new();

        for issue in 0..=MAX_REISSUES {
            if issue > 0 {
                tokio::time::sleep(self.policy.delay_for(issue)).await;
            }

            let completion = match self.model.complete(&current, &self.params).await {
                Ok(completion) => completion,
                Err(err) if err.kind() == ErrorKind::Transient && issue < MAX_REISSUES => {
                    debug!(issue, error = %err, "transient planning failure");
                    continue;
                }
                Err(err) => {
                    return Err(Error::PlanningFailed(format!("pass call failed: {err}")))
                }
            };
            usage.absorb(completion.usage);

            match extract_first_json_object(&completion.text).and_then(&parse) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    last_violation = err.to_string();
                    warn!(issue, violation = %last_violation, "pass violated an invariant, reissuing");
                    current = format!(
                        "{prompt}\n\nCONSTRAINT: your previous output was rejected: \
                         {last_violation}. Produce output satisfying this constraint."
                    );
                }
            }
        }

        Err(Error::PlanningFailed(format!(
            "pass did not converge after {MAX_REISSUES} reissues: {last_violation}"
        )))
    }
}

fn from_value<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::StructuredParse(format!("pass output shape mismatch: {e}")))
}

fn violation(message: impl Into<String>) -> Error {
    Error::Invariant(message.into())
}

/// Plan-local task invariants: unique ids, declared I/O, declared
/// predecessors exist, no cycles, no unreachable tasks.
fn validate_tasks(tasks: &[AtomicTask]) -> Result<()> {
    let mut ids = HashSet::new();
    for task in tasks {
        if !ids.insert(task.id.as_str()) {
            return Err(violation(format!("duplicate task id '{}'", task.id)));
        }
        if task.outputs.is_empty() {
            return Err(violation(format!(
                "task '{}' declares no outputs",
                task.id
            )));
        }
    }
    for task in tasks {
        for predecessor in &task.predecessors {
            if !ids.contains(predecessor.as_str()) {
                return Err(violation(format!(
                    "task '{}' declares undeclared predecessor '{predecessor}'",
                    task.id
                )));
            }
        }
    }

    // Cycle check by iterative layer relaxation; anything never resolved is
    // on or behind a cycle, which also covers unreachability.
    let mut resolved: HashSet<&str> = HashSet::new();
    loop {
        let before = resolved.len();
        for task in tasks {
            if resolved.contains(task.id.as_str()) {
                continue;
            }
            if task
                .predecessors
                .iter()
                .all(|p| resolved.contains(p.as_str()))
            {
                resolved.insert(task.id.as_str());
            }
        }
        if resolved.len() == before {
            break;
        }
    }
    if resolved.len() != tasks.len() {
        let stuck: Vec<&str> = tasks
            .iter()
            .filter(|t| !resolved.contains(t.id.as_str()))
            .map(|t| t.id.as_str())
            .collect();
        return Err(violation(format!(
            "tasks unreachable or cyclic: {}",
            stuck.join(", ")
        )));
    }
    Ok(())
}

fn pass1_prompt(requirements: &[Requirement]) -> String {
    let requirements_json = serde_json::to_string_pretty(requirements).unwrap_or_default();
    format!(
        r#"PASS 1 - REQUIREMENTS ANALYSIS

Normalize each requirement into a single unambiguous sentence and tag any
remaining ambiguities.

REQUIREMENTS:
{requirements_json}

Respond with ONLY a JSON object:
{{"requirements": [{{"id": "...", "text": "...", "ambiguities": ["..."]}}]}}"#
    )
}

fn pass2_prompt(parsed: &ParsedSpec, analysis: &RequirementsAnalysis) -> String {
    let entities: Vec<&str> = parsed.entities.iter().map(|e| e.name.as_str()).collect();
    let analysis_json = serde_json::to_string_pretty(analysis).unwrap_or_default();
    format!(
        r#"PASS 2 - ARCHITECTURE DESIGN

Choose the module skeleton for a backend application. The conventional
skeleton is: core, models, services, routes, middleware, migrations, tests.

ENTITIES: {entities:?}

NORMALIZED REQUIREMENTS:
{analysis_json}

Respond with ONLY a JSON object:
{{"modules": [{{"name": "...", "purpose": "..."}}]}}"#
    )
}

fn pass3_prompt(architecture: &ArchitectureDesign) -> String {
    let architecture_json = serde_json::to_string_pretty(architecture).unwrap_or_default();
    format!(
        r#"PASS 3 - CONTRACT DEFINITION

Fix each module's public interface: exposed types and method signatures
with typed inputs and outputs. Only name modules from the architecture.

ARCHITECTURE:
{architecture_json}

Respond with ONLY a JSON object:
{{"contracts": [{{"module": "...", "types": ["..."],
   "methods": [{{"name": "...", "inputs": {{"arg": "type"}}, "outputs": {{"ret": "type"}}}}]}}]}}"#
    )
}

fn pass4_prompt(contracts: &[ModuleContract]) -> String {
    let contracts_json = serde_json::to_string_pretty(contracts).unwrap_or_default();
    format!(
        r#"PASS 4 - INTEGRATION POINTS

Resolve inter-module dependencies and the entities shared across each
boundary. Only name contracted modules.

CONTRACTS:
{contracts_json}

Respond with ONLY a JSON object:
{{"integrations": [{{"from_module": "...", "to_module": "...", "shared_entities": ["..."]}}]}}"#
    )
}

fn pass5_prompt(contracts: &[ModuleContract]) -> String {
    let contracts_json = serde_json::to_string_pretty(contracts).unwrap_or_default();
    format!(
        r#"PASS 5 - ATOMIC BREAKDOWN

Split every contract method into atomic tasks. Narrow units are budgeted at
{NARROW_TASK_LINE_BUDGET} output lines; cohesive module tasks may use up to
{MODULE_TASK_LINE_BUDGET}. Every task declares typed inputs and outputs and
lists only previously declared task ids as predecessors.

CONTRACTS:
{contracts_json}

Respond with ONLY a JSON object:
{{"tasks": [{{"id": "...", "purpose": "...", "domain": "crud",
   "inputs": {{"name": "type"}}, "outputs": {{"name": "type"}},
   "constraints": ["..."], "security": "low", "performance": "low",
   "idempotent": false, "predecessors": [], "line_budget": {NARROW_TASK_LINE_BUDGET}}}]}}"#
    )
}

fn pass6_prompt(tasks: &[AtomicTask]) -> String {
    let tasks_json = serde_json::to_string_pretty(tasks).unwrap_or_default();
    format!(
        r#"PASS 6 - VALIDATION AND OPTIMIZATION

Validate and optimize the task list: merge trivial duplicates, order
predecessors correctly, and ensure every task has declared inputs/outputs,
every predecessor exists, no task is unreachable, and there are no cycles.
Return the full corrected task list.

TASKS:
{tasks_json}

Respond with ONLY a JSON object with the same task schema:
{{"tasks": [...]}}"#
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use devmatrix_core::model::spec::SpecDocument;
    use devmatrix_spec::parser::SpecParser;
    use devmatrix_testing::ScriptedCompletionModel;
    use parking_lot::Mutex;
    use std::sync::Arc as StdArc;

    fn parsed() -> ParsedSpec {
        SpecParser::new()
            .parse(&SpecDocument::from_text("User{id: UUID unique required}").unwrap())
            .unwrap()
    }

    fn requirements() -> Vec<Requirement> {
        vec![Requirement::new("REQ-001", "The system must create users")]
    }

    fn scripted_happy_path() -> ScriptedCompletionModel {
        ScriptedCompletionModel::new()
            .on_prompt_containing(
                "PASS 1",
                r#"{"requirements": [{"id": "REQ-001", "text": "create users", "ambiguities": []}]}"#,
            )
            .on_prompt_containing(
                "PASS 2",
                r#"{"modules": [{"name": "models", "purpose": "entities"},
                               {"name": "services", "purpose": "logic"},
                               {"name": "routes", "purpose": "http"}]}"#,
            )
            .on_prompt_containing(
                "PASS 3",
                r#"{"contracts": [{"module": "services", "types": ["UserService"],
                     "methods": [{"name": "create_user",
                                  "inputs": {"email": "string"},
                                  "outputs": {"user": "User"}}]}]}"#,
            )
            .on_prompt_containing(
                "PASS 4",
                r#"{"integrations": []}"#,
            )
            .on_prompt_containing(
                "PASS 5",
                r#"{"tasks": [
                     {"id": "t1", "purpose": "validate user input", "domain": "crud",
                      "inputs": {"email": "string"}, "outputs": {"valid": "boolean"},
                      "predecessors": []},
                     {"id": "t2", "purpose": "persist user", "domain": "crud",
                      "inputs": {"email": "string"}, "outputs": {"user": "User"},
                      "predecessors": ["t1"]}]}"#,
            )
            .on_prompt_containing(
                "PASS 6",
                r#"{"tasks": [
                     {"id": "t1", "purpose": "validate user input", "domain": "crud",
                      "inputs": {"email": "string"}, "outputs": {"valid": "boolean"},
                      "predecessors": []},
                     {"id": "t2", "purpose": "persist user", "domain": "crud",
                      "inputs": {"email": "string"}, "outputs": {"user": "User"},
                      "predecessors": ["t1"]}]}"#,
            )
    }

    fn planner(model: ScriptedCompletionModel) -> MultiPassPlanner {
        MultiPassPlanner::new(Arc::new(model), CompletionParams::deterministic("planner"))
            .with_retry_policy(RetryPolicy::fixed(3, 0))
    }

    #[tokio::test]
    async fn six_passes_produce_a_masterplan() {
        let model = scripted_happy_path();
        let mut usage = TokenUsage::default();
        let plan = planner(model.clone())
            .plan(&parsed(), &requirements(), &mut usage)
            .await
            .unwrap();

        assert_eq!(plan.architecture.modules.len(), 3);
        assert_eq!(plan.contracts.len(), 1);
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[1].predecessors, vec!["t1".to_string()]);
        assert_eq!(model.call_count(), 6);
        assert!(usage.total() > 0);
    }

    #[tokio::test]
    async fn undeclared_predecessor_reissues_pass_with_constraint() {
        // First pass-5 answer declares an unknown predecessor; the reissued
        // prompt carries the violation and the second answer is valid.
        let bad_then_good = StdArc::new(Mutex::new(0u32));
        let counter = StdArc::clone(&bad_then_good);

        let model = scripted_happy_path().with_handler(move |prompt| {
            if prompt.contains("PASS 5") {
                let mut count = counter.lock();
                *count += 1;
                if *count == 1 {
                    return Ok(r#"{"tasks": [{"id": "t1", "purpose": "p",
                        "outputs": {"x": "y"}, "predecessors": ["missing"]}]}"#
                        .to_string());
                }
                assert!(prompt.contains("CONSTRAINT"), "reissue must carry the violation");
                assert!(prompt.contains("missing"));
                return Ok(r#"{"tasks": [{"id": "t1", "purpose": "p",
                    "outputs": {"x": "y"}, "predecessors": []}]}"#
                    .to_string());
            }
            scripted_responses(prompt)
        });

        let mut usage = TokenUsage::default();
        let plan = planner(model)
            .plan(&parsed(), &requirements(), &mut usage)
            .await
            .unwrap();
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(*bad_then_good.lock(), 2, "pass 5 was issued exactly twice");
    }

    fn scripted_responses(prompt: &str) -> devmatrix_core::Result<String> {
        let response = if prompt.contains("PASS 1") {
            r#"{"requirements": []}"#
        } else if prompt.contains("PASS 2") {
            r#"{"modules": [{"name": "services", "purpose": "logic"}]}"#
        } else if prompt.contains("PASS 3") {
            r#"{"contracts": [{"module": "services", "types": [], "methods": []}]}"#
        } else if prompt.contains("PASS 4") {
            r#"{"integrations": []}"#
        } else {
            r#"{"tasks": [{"id": "t1", "purpose": "p", "outputs": {"x": "y"}, "predecessors": []}]}"#
        };
        Ok(response.to_string())
    }

    #[tokio::test]
    async fn persistent_violation_raises_planning_failed() {
        let model = ScriptedCompletionModel::new().with_handler(|prompt| {
            if prompt.contains("PASS 1") {
                Ok(r#"{"requirements": []}"#.to_string())
            } else {
                // Pass 2 keeps answering with an empty module list.
                Ok(r#"{"modules": []}"#.to_string())
            }
        });
        let mut usage = TokenUsage::default();
        let err = planner(model)
            .plan(&parsed(), &requirements(), &mut usage)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PlanningFailed(_)));
    }

    #[tokio::test]
    async fn contract_for_unknown_module_is_reissued() {
        let issued = StdArc::new(Mutex::new(0u32));
        let counter = StdArc::clone(&issued);
        let model = scripted_happy_path().with_handler(move |prompt| {
            if prompt.contains("PASS 3") {
                let mut count = counter.lock();
                *count += 1;
                if *count == 1 {
                    return Ok(
                        r#"{"contracts": [{"module": "nonexistent", "types": [], "methods": []}]}"#
                            .to_string(),
                    );
                }
                return Ok(
                    r#"{"contracts": [{"module": "services", "types": [], "methods": []}]}"#
                        .to_string(),
                );
            }
            scripted_responses(prompt)
        });

        let mut usage = TokenUsage::default();
        let plan = planner(model)
            .plan(&parsed(), &requirements(), &mut usage)
            .await
            .unwrap();
        assert_eq!(plan.contracts[0].module, "services");
        assert_eq!(*issued.lock(), 2);
    }

    #[test]
    fn validate_tasks_rejects_cycles() {
        let t1 = AtomicTask::new("a", "p", Domain::Crud)
            .with_output("x", "y")
            .with_predecessors(vec!["b".into()]);
        let t2 = AtomicTask::new("b", "p", Domain::Crud)
            .with_output("x", "y")
            .with_predecessors(vec!["a".into()]);
        let err = validate_tasks(&[t1, t2]).unwrap_err();
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn validate_tasks_rejects_missing_outputs() {
        let task = AtomicTask::new("a", "p", Domain::Crud);
        assert!(validate_tasks(&[task]).is_err());
    }

    #[test]
    fn task_json_clamps_line_budget() {
        let json: TaskJson = serde_json::from_str(
            r#"{"id": "t", "purpose": "p", "outputs": {"x": "y"}, "line_budget": 500}"#,
        )
        .unwrap();
        assert_eq!(json.into_task().line_budget, MODULE_TASK_LINE_BUDGET);
    }
}
