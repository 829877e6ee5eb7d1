//! Stage C: LLM-inferred rules through three specialized prompt contracts.
//!
//! Every call renders a prompt with the target subset and the required JSON
//! schema, invokes the model with deterministic parameters, and parses the
//! first JSON array out of the response. Parse failures retry with a
//! reminder appended, transient failures retry with backoff; after three
//! attempts the call contributes nothing.

use crate::catalog::entity_for_path;
use crate::parser::ParsedSpec;
use devmatrix_core::completion::{CompletionModel, CompletionParams, TokenUsage};
use devmatrix_core::json::extract_first_json_array;
use devmatrix_core::model::endpoint::Endpoint;
use devmatrix_core::model::entity::Entity;
use devmatrix_core::model::validation::{
    Provenance, RuleKind, ValidationRule, ValidationRuleSet,
};
use devmatrix_core::retry::RetryPolicy;
use devmatrix_core::{Error, ErrorKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;

const RULE_SCHEMA: &str = r#"[
  {
    "entity": "<entity name>",
    "attribute": "<field name>",
    "kind": "<one of the allowed kinds>",
    "condition": "<machine-interpretable predicate or null>",
    "error_message": "<user-facing message>",
    "confidence": <0.0-1.0>,
    "rationale": "<why this rule holds>"
  }
]"#;

/// The LLM extraction stage: field-level, endpoint-level, and cross-entity
/// prompt contracts over a shared completion capability.
pub struct LlmStage {
    model: Arc<dyn CompletionModel>,
    params: CompletionParams,
    policy: RetryPolicy,
}

/// Wire format for one rule in a model response.
#[derive(Debug, Deserialize)]
struct RuleJson {
    entity: Option<String>,
    attribute: Option<String>,
    kind: String,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    rationale: Option<String>,
}

impl LlmStage {
    /// Create the stage over a completion model.
    #[must_use]
    pub fn new(model: Arc<dyn CompletionModel>, params: CompletionParams) -> Self {
        Self {
            model,
            params,
            policy: RetryPolicy::exponential(MAX_ATTEMPTS),
        }
    }

    /// Override the retry schedule (tests use a fast fixed policy).
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run all three prompt contracts. Individual call failures degrade to
    /// empty contributions; the stage itself never errors.
    pub async fn extract(&self, parsed: &ParsedSpec, usage: &mut TokenUsage) -> ValidationRuleSet {
        let mut rules = ValidationRuleSet::new();

        // Field-level: one call per entity.
        for entity in &parsed.entities {
            let prompt = field_level_prompt(entity);
            let allowed = [
                RuleKind::Presence,
                RuleKind::Format,
                RuleKind::Uniqueness,
                RuleKind::Range,
            ];
            rules.extend(self.call_for_rules(&prompt, &allowed, usage).await);
        }

        // Endpoint-level: one call per entity's endpoints, batched.
        for (entity_name, endpoints) in endpoints_by_entity(parsed) {
            let prompt = endpoint_level_prompt(&entity_name, &endpoints);
            let allowed = [
                RuleKind::Presence,
                RuleKind::Format,
                RuleKind::Uniqueness,
                RuleKind::WorkflowConstraint,
            ];
            rules.extend(self.call_for_rules(&prompt, &allowed, usage).await);
        }

        // Cross-entity: one call per run.
        if !parsed.entities.is_empty() {
            let prompt = cross_entity_prompt(&parsed.entities, &parsed.business_rules);
            let allowed = [
                RuleKind::Relationship,
                RuleKind::StockConstraint,
                RuleKind::WorkflowConstraint,
                RuleKind::StatusTransition,
            ];
            rules.extend(self.call_for_rules(&prompt, &allowed, usage).await);
        }

        rules
    }

    /// One prompt, up to three attempts, empty set on final failure.
    async fn call_for_rules(
        &self,
        prompt: &str,
        allowed: &[RuleKind],
        usage: &mut TokenUsage,
    ) -> ValidationRuleSet {
        let mut current = prompt.to_string();

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(self.policy.delay_for(attempt - 1)).await;
            }

            let completion = match self.model.complete(&current, &self.params).await {
                Ok(completion) => completion,
                Err(err) if err.kind() == ErrorKind::Transient && attempt < MAX_ATTEMPTS => {
                    debug!(attempt, error = %err, "transient extraction failure");
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "llm extraction call failed, contributing nothing");
                    return ValidationRuleSet::new();
                }
            };
            usage.absorb(completion.usage);

            match parse_rules(&completion.text, allowed) {
                Ok(rules) => return rules,
                Err(err) if attempt < MAX_ATTEMPTS => {
                    debug!(attempt, error = %err, "extraction parse failure, reminding");
                    current = format!(
                        "{prompt}\n\nREMINDER: your previous answer was not a valid JSON \
                         array matching the schema. Respond with ONLY the JSON array."
                    );
                }
                Err(err) => {
                    warn!(error = %err, "llm extraction unparseable after retries");
                    return ValidationRuleSet::new();
                }
            }
        }

        ValidationRuleSet::new()
    }
}

/// Parse a model response into rules, dropping items with unknown kinds or
/// kinds outside the allowed set for this call.
fn parse_rules(response: &str, allowed: &[RuleKind]) -> Result<ValidationRuleSet, Error> {
    let value = extract_first_json_array(response)?;
    let items: Vec<RuleJson> = serde_json::from_value(value)
        .map_err(|e| Error::StructuredParse(format!("rule array shape mismatch: {e}")))?;

    let mut rules = ValidationRuleSet::new();
    for item in items {
        let Ok(kind) = serde_json::from_value::<RuleKind>(serde_json::Value::String(
            item.kind.trim().to_lowercase(),
        )) else {
            debug!(kind = %item.kind, "dropping rule with unknown kind");
            continue;
        };
        if !allowed.contains(&kind) {
            continue;
        }
        let (Some(entity), Some(attribute)) = (item.entity, item.attribute) else {
            continue;
        };

        let mut rule = ValidationRule::new(
            entity,
            attribute,
            kind,
            Provenance::llm(
                item.confidence.unwrap_or(0.7),
                item.rationale.unwrap_or_else(|| "model inference".into()),
            ),
        );
        if let Some(condition) = item.condition.filter(|c| !c.trim().is_empty()) {
            rule = rule.with_condition(condition);
        }
        if let Some(message) = item.error_message {
            rule = rule.with_message(message);
        }
        rules.push(rule);
    }
    Ok(rules)
}

/// Group endpoints by the entity their route resolves to.
fn endpoints_by_entity(parsed: &ParsedSpec) -> BTreeMap<String, Vec<Endpoint>> {
    let mut grouped: BTreeMap<String, Vec<Endpoint>> = BTreeMap::new();
    for endpoint in &parsed.endpoints {
        if let Some(entity) = entity_for_path(&parsed.entities, &endpoint.path) {
            grouped
                .entry(entity.name.clone())
                .or_default()
                .push(endpoint.clone());
        }
    }
    grouped
}

fn field_level_prompt(entity: &Entity) -> String {
    let entity_json = serde_json::to_string_pretty(entity).unwrap_or_default();
    format!(
        r#"You are extracting field-level validation rules for a backend application.

ENTITY:
{entity_json}

Emit presence, format, uniqueness, and range rules grounded in field
semantics: UUID fields imply format=uuid, DateTime fields imply ISO-8601,
email-named fields imply format=email. Do not invent fields.

Allowed kinds: presence, format, uniqueness, range.

Respond with ONLY a JSON array matching this schema:
{RULE_SCHEMA}"#
    )
}

fn endpoint_level_prompt(entity_name: &str, endpoints: &[Endpoint]) -> String {
    let endpoints_json = serde_json::to_string_pretty(endpoints).unwrap_or_default();
    format!(
        r#"You are extracting endpoint-level validation rules for the `{entity_name}` resource.

ENDPOINTS:
{endpoints_json}

Emit request-body presence and format rules, content-type format rules, and
response-schema conformance rules. Read the status codes: a 409 response
implies a uniqueness constraint, 401/403 responses imply authorization
constraints (kind workflow_constraint).

Allowed kinds: presence, format, uniqueness, workflow_constraint.

Respond with ONLY a JSON array matching this schema:
{RULE_SCHEMA}"#
    )
}

fn cross_entity_prompt(entities: &[Entity], business_rules: &[String]) -> String {
    let entities_json = serde_json::to_string_pretty(entities).unwrap_or_default();
    let rules_text = if business_rules.is_empty() {
        "(none stated)".to_string()
    } else {
        business_rules.join("\n")
    };
    format!(
        r#"You are extracting cross-entity validation rules for a backend application.

ENTITIES:
{entities_json}

BUSINESS RULES FROM THE SPECIFICATION:
{rules_text}

Emit relationship rules for every foreign key, stock_constraint rules for
quantity/inventory interactions, workflow_constraint rules for stateful
preconditions, and status_transition rules for enumerated state fields.

Allowed kinds: relationship, stock_constraint, workflow_constraint, status_transition.

Respond with ONLY a JSON array matching this schema:
{RULE_SCHEMA}"#
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::parser::SpecParser;
    use devmatrix_core::model::spec::SpecDocument;
    use devmatrix_testing::ScriptedCompletionModel;

    fn parse(text: &str) -> ParsedSpec {
        SpecParser::new()
            .parse(&SpecDocument::from_text(text).unwrap())
            .unwrap()
    }

    fn stage(model: ScriptedCompletionModel) -> LlmStage {
        LlmStage::new(
            Arc::new(model),
            CompletionParams::deterministic("extractor"),
        )
        .with_retry_policy(RetryPolicy::fixed(MAX_ATTEMPTS, 0))
    }

    #[tokio::test]
    async fn field_level_rules_are_parsed_and_filtered() {
        let model = ScriptedCompletionModel::new().on_prompt_containing(
            "field-level validation",
            r#"```json
[{"entity": "User", "attribute": "id", "kind": "format",
  "condition": "format: uuid", "confidence": 0.9, "rationale": "uuid field"},
 {"entity": "User", "attribute": "id", "kind": "relationship",
  "condition": "not allowed here"}]
```"#,
        );
        let parsed = parse("User{id: UUID required}");
        let mut usage = TokenUsage::default();
        let rules = stage(model).extract(&parsed, &mut usage).await;

        // relationship is outside the field-level allowed set
        assert_eq!(rules.len(), 1);
        let rule = rules.get("User", "id", RuleKind::Format).unwrap();
        assert_eq!(rule.provenance.confidence, 0.9);
        assert!(usage.total() > 0);
    }

    #[tokio::test]
    async fn cross_entity_call_happens_once_per_run() {
        let model = ScriptedCompletionModel::new().on_prompt_containing(
            "cross-entity validation",
            r#"[{"entity": "OrderItem", "attribute": "quantity", "kind": "stock_constraint",
                 "condition": "product.stock >= orderitem.quantity", "confidence": 0.8,
                 "rationale": "stock may not go negative"}]"#,
        );
        let parsed = parse(
            "Order{customer_id: UUID fk Customer}\nOrderItem{order_id fk Order, quantity Integer}\nProduct{stock Integer}",
        );
        let mut usage = TokenUsage::default();
        let rules = stage(model.clone()).extract(&parsed, &mut usage).await;

        assert!(rules
            .get("OrderItem", "quantity", RuleKind::StockConstraint)
            .is_some());
        let cross_calls = model
            .prompts()
            .iter()
            .filter(|p| p.contains("cross-entity validation"))
            .count();
        assert_eq!(cross_calls, 1);
    }

    #[tokio::test]
    async fn parse_failures_retry_with_reminder_then_go_empty() {
        let model = ScriptedCompletionModel::new().with_response("not json at all");
        let parsed = parse("User{id: UUID required}");
        let mut usage = TokenUsage::default();
        let rules = stage(model.clone()).extract(&parsed, &mut usage).await;

        assert!(rules.is_empty());
        // 3 attempts for the field-level call; later prompts get the
        // reminder suffix.
        let field_prompts: Vec<String> = model
            .prompts()
            .into_iter()
            .filter(|p| p.contains("field-level validation"))
            .collect();
        assert_eq!(field_prompts.len(), 3);
        assert!(field_prompts[1].contains("REMINDER"));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let model = ScriptedCompletionModel::new().on_prompt_containing(
            "field-level validation",
            r#"[{"entity": "User", "attribute": "id", "kind": "presence", "confidence": 0.9}]"#,
        );
        model.fail_next();
        let parsed = parse("User{id: UUID required}");
        let mut usage = TokenUsage::default();
        let rules = stage(model).extract(&parsed, &mut usage).await;
        assert!(rules.get("User", "id", RuleKind::Presence).is_some());
    }

    #[tokio::test]
    async fn unknown_kinds_are_dropped_not_fatal() {
        let model = ScriptedCompletionModel::new().on_prompt_containing(
            "field-level validation",
            r#"[{"entity": "User", "attribute": "id", "kind": "cardinality"},
                {"entity": "User", "attribute": "id", "kind": "presence"}]"#,
        );
        let parsed = parse("User{id: UUID required}");
        let mut usage = TokenUsage::default();
        let rules = stage(model).extract(&parsed, &mut usage).await;
        assert_eq!(rules.len(), 1);
    }
}
