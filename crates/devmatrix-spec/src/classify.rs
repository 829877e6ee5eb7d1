//! Requirements classification and the requirement dependency graph.

use devmatrix_core::model::requirement::{Domain, Requirement, RequirementKind};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use tracing::warn;

/// A dependency edge between requirements, with the classifier's confidence
/// in it. Cycle breaking removes the lowest-confidence edge.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyEdge {
    /// Predecessor requirement id
    pub from: String,
    /// Dependent requirement id
    pub to: String,
    /// Edge confidence in [0, 1]
    pub confidence: f64,
}

/// Accuracy/precision of the classification against expected domains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierMetrics {
    /// Fraction of requirements whose domain matched the expectation
    pub accuracy: f64,
    /// Matched fraction among requirements classified into a specific
    /// (non-general) domain
    pub precision: f64,
}

/// Result of requirement classification.
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    /// Requirements with domain and kind assigned
    pub requirements: Vec<Requirement>,
    /// Surviving dependency edges (acyclic)
    pub edges: Vec<DependencyEdge>,
    /// Edges removed to break cycles
    pub removed_edges: Vec<DependencyEdge>,
    /// Metrics, when expected domains were supplied
    pub metrics: Option<ClassifierMetrics>,
}

const EXPLICIT_EDGE_CONFIDENCE: f64 = 0.9;
const INFERRED_EDGE_CONFIDENCE: f64 = 0.55;

/// Keyword-driven requirement classifier.
#[derive(Debug, Clone, Default)]
pub struct RequirementsClassifier;

impl RequirementsClassifier {
    /// Create a classifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classify requirements and build their dependency graph.
    #[must_use]
    pub fn classify(&self, requirements: &[Requirement]) -> ClassificationOutcome {
        self.classify_with_expected(requirements, None)
    }

    /// Classify with an expected domain per requirement id for metric
    /// computation.
    #[must_use]
    pub fn classify_with_expected(
        &self,
        requirements: &[Requirement],
        expected: Option<&HashMap<String, Domain>>,
    ) -> ClassificationOutcome {
        let mut classified: Vec<Requirement> = requirements
            .iter()
            .map(|r| {
                let mut r = r.clone();
                r.domain = classify_domain(&r.text);
                r.kind = classify_kind(&r.text);
                r
            })
            .collect();

        let mut edges = collect_edges(&classified);
        let removed_edges = break_cycles(&classified, &mut edges);

        // Surviving edges become the predecessors on each requirement.
        for requirement in &mut classified {
            requirement.predecessors = edges
                .iter()
                .filter(|e| e.to == requirement.id)
                .map(|e| e.from.clone())
                .collect();
        }

        let metrics = expected.map(|expected| compute_metrics(&classified, expected));

        ClassificationOutcome {
            requirements: classified,
            edges,
            removed_edges,
            metrics,
        }
    }
}

fn classify_domain(text: &str) -> Domain {
    let lower = text.to_lowercase();
    let table: [(&[&str], Domain); 8] = [
        (
            &["login", "password", "token", "authenticat", "session", "sign up", "register"],
            Domain::Authentication,
        ),
        (
            &["payment", "invoice", "billing", "charge", "refund", "checkout"],
            Domain::Payment,
        ),
        (
            &["workflow", "approval", "approve", "transition", "state machine"],
            Domain::Workflow,
        ),
        (&["search", "filter", "query", "find by"], Domain::Search),
        (
            &["notif", "email", "sms", "push message", "alert"],
            Domain::Notification,
        ),
        (
            &["report", "export", "aggregate", "statistics", "dashboard"],
            Domain::Reporting,
        ),
        (
            &["webhook", "third-party", "third party", "external service", "integrat"],
            Domain::Integration,
        ),
        (
            &["create", "update", "delete", "list", "read", "store", "retrieve", "crud"],
            Domain::Crud,
        ),
    ];

    for (keywords, domain) in table {
        if keywords.iter().any(|k| lower.contains(k)) {
            return domain;
        }
    }
    Domain::General
}

fn classify_kind(text: &str) -> RequirementKind {
    let lower = text.to_lowercase();
    const NON_FUNCTIONAL: [&str; 9] = [
        "performance",
        "latency",
        "throughput",
        "scalab",
        "availability",
        "uptime",
        "concurrent users",
        "response time",
        "encrypt",
    ];
    if NON_FUNCTIONAL.iter().any(|k| lower.contains(k)) {
        RequirementKind::NonFunctional
    } else {
        RequirementKind::Functional
    }
}

fn collect_edges(requirements: &[Requirement]) -> Vec<DependencyEdge> {
    let ids: HashMap<&str, ()> = requirements.iter().map(|r| (r.id.as_str(), ())).collect();
    let mut edges = Vec::new();

    for requirement in requirements {
        // Explicitly declared predecessors.
        for predecessor in &requirement.predecessors {
            if ids.contains_key(predecessor.as_str()) && predecessor != &requirement.id {
                edges.push(DependencyEdge {
                    from: predecessor.clone(),
                    to: requirement.id.clone(),
                    confidence: EXPLICIT_EDGE_CONFIDENCE,
                });
            }
        }

        // Inferred: text that presumes an authenticated caller depends on
        // the authentication requirements.
        let lower = requirement.text.to_lowercase();
        if requirement.domain != Domain::Authentication
            && (lower.contains("authenticated") || lower.contains("logged in") || lower.contains("authorized"))
        {
            for auth in requirements
                .iter()
                .filter(|r| r.domain == Domain::Authentication && r.id != requirement.id)
            {
                edges.push(DependencyEdge {
                    from: auth.id.clone(),
                    to: requirement.id.clone(),
                    confidence: INFERRED_EDGE_CONFIDENCE,
                });
            }
        }
    }

    edges.dedup_by(|a, b| a.from == b.from && a.to == b.to);
    edges
}

/// Remove lowest-confidence edges until the graph is acyclic. Returns the
/// removed edges.
fn break_cycles(
    requirements: &[Requirement],
    edges: &mut Vec<DependencyEdge>,
) -> Vec<DependencyEdge> {
    let mut removed = Vec::new();

    loop {
        let mut graph: DiGraph<&str, f64> = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        for requirement in requirements {
            nodes.insert(&requirement.id, graph.add_node(&requirement.id));
        }
        for edge in edges.iter() {
            if let (Some(&from), Some(&to)) =
                (nodes.get(edge.from.as_str()), nodes.get(edge.to.as_str()))
            {
                graph.add_edge(from, to, edge.confidence);
            }
        }

        match toposort(&graph, None) {
            Ok(_) => return removed,
            Err(cycle) => {
                let node_id = graph[cycle.node_id()].to_string();
                // Drop the weakest edge touching the cycle participant.
                let Some((index, _)) = edges
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.from == node_id || e.to == node_id)
                    .min_by(|(_, a), (_, b)| {
                        a.confidence
                            .partial_cmp(&b.confidence)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                else {
                    return removed;
                };
                let edge = edges.remove(index);
                warn!(
                    from = %edge.from,
                    to = %edge.to,
                    confidence = edge.confidence,
                    "breaking requirement dependency cycle"
                );
                removed.push(edge);
            }
        }
    }
}

fn compute_metrics(
    requirements: &[Requirement],
    expected: &HashMap<String, Domain>,
) -> ClassifierMetrics {
    let mut total = 0usize;
    let mut matched = 0usize;
    let mut committed = 0usize;
    let mut committed_matched = 0usize;

    for requirement in requirements {
        let Some(&expected_domain) = expected.get(&requirement.id) else {
            continue;
        };
        total += 1;
        if requirement.domain == expected_domain {
            matched += 1;
        }
        if requirement.domain != Domain::General {
            committed += 1;
            if requirement.domain == expected_domain {
                committed_matched += 1;
            }
        }
    }

    ClassifierMetrics {
        accuracy: if total == 0 {
            1.0
        } else {
            matched as f64 / total as f64
        },
        precision: if committed == 0 {
            1.0
        } else {
            committed_matched as f64 / committed as f64
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn req(id: &str, text: &str) -> Requirement {
        Requirement::new(id, text)
    }

    #[test]
    fn domains_are_keyword_driven() {
        let reqs = vec![
            req("R1", "Users must be able to register with a password"),
            req("R2", "The system must create and update products"),
            req("R3", "Admins should export a monthly sales report"),
            req("R4", "Checkout must charge the saved payment method"),
        ];
        let outcome = RequirementsClassifier::new().classify(&reqs);
        let domains: Vec<Domain> = outcome.requirements.iter().map(|r| r.domain).collect();
        assert_eq!(
            domains,
            vec![
                Domain::Authentication,
                Domain::Crud,
                Domain::Reporting,
                Domain::Payment
            ]
        );
    }

    #[test]
    fn non_functional_requirements_are_detected() {
        let reqs = vec![
            req("R1", "The API must respond within a 200ms response time"),
            req("R2", "Users must be able to delete their account"),
        ];
        let outcome = RequirementsClassifier::new().classify(&reqs);
        assert_eq!(outcome.requirements[0].kind, RequirementKind::NonFunctional);
        assert_eq!(outcome.requirements[1].kind, RequirementKind::Functional);
    }

    #[test]
    fn explicit_predecessors_become_edges() {
        let mut later = req("R2", "Orders must be created for a customer");
        later.predecessors = vec!["R1".into()];
        let reqs = vec![req("R1", "Customers must be stored"), later];

        let outcome = RequirementsClassifier::new().classify(&reqs);
        assert_eq!(outcome.edges.len(), 1);
        assert_eq!(outcome.edges[0].from, "R1");
        assert_eq!(outcome.edges[0].confidence, 0.9);
        assert_eq!(outcome.requirements[1].predecessors, vec!["R1".to_string()]);
    }

    #[test]
    fn authenticated_text_infers_auth_dependency() {
        let reqs = vec![
            req("R1", "Users must login with a password"),
            req("R2", "Authenticated users must be able to create orders"),
        ];
        let outcome = RequirementsClassifier::new().classify(&reqs);
        assert!(outcome
            .edges
            .iter()
            .any(|e| e.from == "R1" && e.to == "R2" && e.confidence < 0.9));
    }

    #[test]
    fn cycles_are_broken_at_the_weakest_edge() {
        let mut a = req("R1", "Users must login with a password");
        let mut b = req("R2", "Authenticated users must create records");
        // Explicit (0.9) edge R2 -> R1 plus the inferred (0.55) R1 -> R2
        // edge forms a cycle; the inferred edge must be the one removed.
        a.predecessors = vec!["R2".into()];
        b.predecessors = vec![];
        let outcome = RequirementsClassifier::new().classify(&[a, b]);

        assert_eq!(outcome.removed_edges.len(), 1);
        assert_eq!(outcome.removed_edges[0].confidence, 0.55);
        assert_eq!(outcome.edges.len(), 1);
        assert_eq!(outcome.edges[0].from, "R2");
    }

    #[test]
    fn graph_is_acyclic_after_classification() {
        let mut a = req("R1", "A must follow");
        let mut b = req("R2", "B must follow");
        let mut c = req("R3", "C must follow");
        a.predecessors = vec!["R3".into()];
        b.predecessors = vec!["R1".into()];
        c.predecessors = vec!["R2".into()];
        let outcome = RequirementsClassifier::new().classify(&[a, b, c]);
        // One edge of the three-cycle must go.
        assert_eq!(outcome.removed_edges.len(), 1);
        assert_eq!(outcome.edges.len(), 2);
    }

    #[test]
    fn metrics_reflect_expected_domains() {
        let reqs = vec![
            req("R1", "Users must login with a password"),
            req("R2", "The system must create products"),
            req("R3", "Something unclassifiable must happen"),
        ];
        let expected: HashMap<String, Domain> = HashMap::from([
            ("R1".to_string(), Domain::Authentication),
            ("R2".to_string(), Domain::Search),
            ("R3".to_string(), Domain::General),
        ]);
        let outcome =
            RequirementsClassifier::new().classify_with_expected(&reqs, Some(&expected));
        let metrics = outcome.metrics.unwrap();
        // R1 correct, R2 wrong (crud vs search), R3 correct (general)
        assert!((metrics.accuracy - 2.0 / 3.0).abs() < 1e-9);
        // Committed: R1 (right), R2 (wrong) -> precision 0.5
        assert!((metrics.precision - 0.5).abs() < 1e-9);
    }
}
