//! Semantic compliance coordination
//!
//! Two phases. [`plan`] is pure: it orders semantic assertions by priority and
//! greedily admits them under a token budget. [`execute`] dispatches the plan
//! to a [`ReasoningCapability`] with bounded concurrency, a per-request
//! timeout and cooperative cancellation. A failed request degrades only its
//! own assertion.

use crate::assertion::{AssertionDefinition, AssertionKind};
use crate::error::CapabilityError;
use async_trait::async_trait;
use crucible_types::{Degraded, DegradedKind, Finding, FindingOrigin, Location, Priority};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Conservative characters-per-token ratio for cost estimates
pub const CHARS_PER_TOKEN: usize = 3;

/// Estimated tokens for sending `text` with `prompt`
pub fn estimate_tokens(text: &str, prompt: &str) -> usize {
    (text.chars().count() + prompt.chars().count()).div_ceil(CHARS_PER_TOKEN)
}

/// A request to evaluate one assertion against one text
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceRequest {
    pub assertion_id: String,
    pub file_path: String,
    pub text: String,
    pub prompt: String,
    pub model_hint: Option<String>,
    pub timeout: Duration,
}

/// Structured answer from the reasoning capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub violated: bool,
    pub explanation: String,
    /// Line the violation refers to, when the capability names one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// External reasoning capability
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    /// Evaluate one request; the coordinator applies the timeout
    async fn submit(&self, request: &ComplianceRequest) -> Result<Verdict, CapabilityError>;
}

/// Why an assertion was not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    BudgetExhausted,
}

/// An assertion left out of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedAssertion {
    pub id: String,
    pub priority: Priority,
    pub estimated_tokens: usize,
    pub reason: SkipReason,
}

/// Deterministic selection of semantic assertions to run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SemanticPlan {
    /// Selected assertions in priority order
    pub selected: Vec<AssertionDefinition>,
    pub skipped: Vec<SkippedAssertion>,
    pub budget: usize,
    pub planned_tokens: usize,
}

/// Order semantic assertions by priority and admit those that fit `budget`
///
/// Ties keep declaration order. An assertion that does not fit is skipped
/// whole and the next one is still considered.
pub fn plan(assertions: &[AssertionDefinition], text: &str, budget: usize) -> SemanticPlan {
    let mut ordered: Vec<&AssertionDefinition> = assertions
        .iter()
        .filter(|a| a.kind == AssertionKind::Semantic)
        .collect();
    // sort_by_key is stable
    ordered.sort_by_key(|a| std::cmp::Reverse(a.priority));

    let mut plan = SemanticPlan {
        budget,
        ..SemanticPlan::default()
    };
    let mut remaining = budget;

    for assertion in ordered {
        let cost = estimate_tokens(text, assertion.compliance_prompt.as_deref().unwrap_or(""));
        if cost <= remaining {
            remaining -= cost;
            plan.planned_tokens += cost;
            plan.selected.push(assertion.clone());
        } else {
            debug!(
                "Skipping semantic assertion '{}': needs {} tokens, {} left",
                assertion.id, cost, remaining
            );
            plan.skipped.push(SkippedAssertion {
                id: assertion.id.clone(),
                priority: assertion.priority,
                estimated_tokens: cost,
                reason: SkipReason::BudgetExhausted,
            });
        }
    }

    plan
}

/// Dispatch settings
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    pub timeout: Duration,
    pub concurrency: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            concurrency: 4,
        }
    }
}

/// Outcome of running a plan
#[derive(Debug, Clone, Default, Serialize)]
pub struct SemanticReport {
    pub findings: Vec<Finding>,
    pub degraded: Vec<Degraded>,
    /// Requests that returned a verdict
    pub completed: usize,
}

/// Run a plan against one file's text
///
/// Results are reported in plan order regardless of completion order. Requests
/// still pending when `cancel` fires are recorded as cancelled; completed ones
/// are kept.
pub async fn execute(
    plan: &SemanticPlan,
    file_path: &str,
    text: &str,
    capability: &dyn ReasoningCapability,
    options: ExecuteOptions,
    cancel: &CancellationToken,
) -> SemanticReport {
    if plan.selected.is_empty() {
        return SemanticReport::default();
    }

    info!(
        "Running {} semantic assertion(s) on {} ({} tokens planned)",
        plan.selected.len(),
        file_path,
        plan.planned_tokens
    );

    let semaphore = Semaphore::new(options.concurrency.max(1));
    let mut pending = Vec::with_capacity(plan.selected.len());
    for assertion in &plan.selected {
        let request = ComplianceRequest {
            assertion_id: assertion.id.clone(),
            file_path: file_path.to_string(),
            text: text.to_string(),
            prompt: assertion.compliance_prompt.clone().unwrap_or_default(),
            model_hint: assertion.model_hint.clone(),
            timeout: options.timeout,
        };
        let semaphore = &semaphore;
        pending.push(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| CapabilityError::Cancelled)?;
            submit_bounded(capability, request, cancel).await
        });
    }
    // join_all keeps input order
    let outcomes = join_all(pending).await;

    let mut report = SemanticReport::default();
    for (assertion, outcome) in plan.selected.iter().zip(outcomes) {
        match outcome {
            Ok(verdict) => {
                report.completed += 1;
                if verdict.violated {
                    let location = Location::new(file_path, verdict.line.unwrap_or(1).max(1));
                    report.findings.push(
                        Finding::new(
                            &assertion.id,
                            &assertion.message,
                            assertion.severity,
                            location,
                            FindingOrigin::Semantic,
                        )
                        .with_explanation(verdict.explanation),
                    );
                }
            }
            Err(e) => {
                warn!("Semantic assertion '{}' failed: {}", assertion.id, e);
                let kind = match e {
                    CapabilityError::Timeout(_) => DegradedKind::Timeout,
                    CapabilityError::Cancelled => DegradedKind::Cancelled,
                    _ => DegradedKind::Capability,
                };
                report
                    .degraded
                    .push(Degraded::new(kind, format!("{}:{}", file_path, assertion.id), e.to_string()));
            }
        }
    }

    report
}

/// Plan and execute in one call
pub async fn select_and_run(
    assertions: &[AssertionDefinition],
    file_path: &str,
    text: &str,
    budget: usize,
    capability: &dyn ReasoningCapability,
    options: ExecuteOptions,
    cancel: &CancellationToken,
) -> (SemanticPlan, SemanticReport) {
    let plan = plan(assertions, text, budget);
    let report = execute(&plan, file_path, text, capability, options, cancel).await;
    (plan, report)
}

async fn submit_bounded(
    capability: &dyn ReasoningCapability,
    request: ComplianceRequest,
    cancel: &CancellationToken,
) -> Result<Verdict, CapabilityError> {
    if cancel.is_cancelled() {
        return Err(CapabilityError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CapabilityError::Cancelled),
        outcome = tokio::time::timeout(request.timeout, capability.submit(&request)) => {
            outcome.unwrap_or(Err(CapabilityError::Timeout(request.timeout)))
        }
    }
}

/// Read a verdict from free-form model output
///
/// Accepts fenced or bare JSON, with `violated`/`explanation` or the older
/// `compliant`/`reasoning` shape.
pub fn parse_verdict(raw: &str) -> Result<Verdict, CapabilityError> {
    let body = strip_code_fence(raw.trim());
    let json = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => return Err(CapabilityError::Malformed("no JSON object in response".to_string())),
    };

    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| CapabilityError::Malformed(e.to_string()))?;

    let violated = match (
        value.get("violated").and_then(serde_json::Value::as_bool),
        value.get("compliant").and_then(serde_json::Value::as_bool),
    ) {
        (Some(violated), _) => violated,
        (None, Some(compliant)) => !compliant,
        (None, None) => {
            return Err(CapabilityError::Malformed(
                "response has neither 'violated' nor 'compliant'".to_string(),
            ))
        }
    };

    let explanation = ["explanation", "reasoning"]
        .iter()
        .find_map(|key| value.get(*key).and_then(serde_json::Value::as_str))
        .unwrap_or_default()
        .to_string();

    let line = value
        .get("line")
        .and_then(serde_json::Value::as_u64)
        .and_then(|l| usize::try_from(l).ok());

    Ok(Verdict {
        violated,
        explanation,
        line,
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_types::Severity;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Script {
        Answer(&'static str),
        Hang,
        Fail,
    }

    struct ScriptedCapability {
        scripts: HashMap<&'static str, Script>,
        calls: AtomicUsize,
    }

    impl ScriptedCapability {
        fn new(scripts: Vec<(&'static str, Script)>) -> Self {
            Self {
                scripts: scripts.into_iter().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReasoningCapability for ScriptedCapability {
        async fn submit(&self, request: &ComplianceRequest) -> Result<Verdict, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.scripts.get(request.assertion_id.as_str()) {
                Some(Script::Answer(raw)) => parse_verdict(raw),
                Some(Script::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(CapabilityError::Request("unreachable".into()))
                }
                Some(Script::Fail) | None => Err(CapabilityError::Unavailable("offline".into())),
            }
        }
    }

    fn sem(id: &str, priority: Priority, prompt_len: usize) -> AssertionDefinition {
        AssertionDefinition::semantic(id, "p".repeat(prompt_len), priority)
            .with_severity(Severity::High)
    }

    fn options() -> ExecuteOptions {
        ExecuteOptions {
            timeout: Duration::from_millis(100),
            concurrency: 2,
        }
    }

    #[test]
    fn test_plan_orders_by_priority_stably() {
        let assertions = vec![
            sem("low", Priority::Low, 3),
            sem("crit-a", Priority::Critical, 3),
            sem("med", Priority::Medium, 3),
            sem("crit-b", Priority::Critical, 3),
        ];
        let plan = plan(&assertions, "", 100);
        let ids: Vec<_> = plan.selected.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["crit-a", "crit-b", "med", "low"]);
        assert_eq!(plan.planned_tokens, 4);
    }

    #[test]
    fn test_plan_skips_but_continues() {
        // text of 30 chars: costs are 10 + prompt/3
        let text = "x".repeat(30);
        let assertions = vec![
            sem("big", Priority::Critical, 300), // 110
            sem("small", Priority::High, 3),     // 11
        ];
        let plan = plan(&assertions, &text, 50);
        assert_eq!(plan.selected.len(), 1);
        assert_eq!(plan.selected[0].id, "small");
        assert_eq!(plan.skipped[0].id, "big");
        assert_eq!(plan.skipped[0].reason, SkipReason::BudgetExhausted);
    }

    #[test]
    fn test_budget_monotonicity() {
        let text = "fn main() {}".repeat(10);
        let assertions: Vec<_> = (0..8)
            .map(|i| sem(&format!("a{i}"), Priority::Medium, i * 40))
            .collect();

        let mut previous = usize::MAX;
        for budget in (0..=600).rev().step_by(25) {
            let run = plan(&assertions, &text, budget).selected.len();
            assert!(run <= previous);
            previous = run;
        }
        assert_eq!(plan(&assertions, &text, 0).selected.len(), 0);
    }

    #[test]
    fn test_pattern_assertions_not_planned() {
        let assertions = vec![AssertionDefinition::pattern("p", "x", Severity::Low)];
        assert!(plan(&assertions, "x", 1000).selected.is_empty());
    }

    #[tokio::test]
    async fn test_zero_budget_runs_nothing() {
        let capability = ScriptedCapability::new(vec![]);
        let (plan, report) = select_and_run(
            &[sem("a", Priority::Critical, 3)],
            "a.py",
            "code",
            0,
            &capability,
            options(),
            &CancellationToken::new(),
        )
        .await;
        assert!(plan.selected.is_empty());
        assert!(report.findings.is_empty());
        assert!(report.degraded.is_empty());
        assert_eq!(capability.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_degrade_individually() {
        let capability = ScriptedCapability::new(vec![
            ("violated", Script::Answer(r#"{"violated": true, "explanation": "no auth check", "line": 7}"#)),
            ("clean", Script::Answer("```json\n{\"compliant\": true, \"reasoning\": \"ok\"}\n```")),
            ("garbled", Script::Answer("I think it is fine")),
            ("slow", Script::Hang),
            ("down", Script::Fail),
        ]);
        let assertions: Vec<_> = ["violated", "clean", "garbled", "slow", "down"]
            .iter()
            .map(|id| sem(id, Priority::High, 3))
            .collect();

        let (_, report) = select_and_run(
            &assertions,
            "api.py",
            "def handler(): pass",
            10_000,
            &capability,
            options(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(report.completed, 2);
        assert_eq!(report.findings.len(), 1);
        let finding = &report.findings[0];
        assert_eq!(finding.assertion_id, "violated");
        assert_eq!(finding.location.line, 7);
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.explanation.as_deref(), Some("no auth check"));

        let kinds: Vec<_> = report.degraded.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DegradedKind::Capability, DegradedKind::Timeout, DegradedKind::Capability]
        );
    }

    #[tokio::test]
    async fn test_cancellation_keeps_completed_results() {
        let capability = ScriptedCapability::new(vec![
            ("fast", Script::Answer(r#"{"violated": true, "explanation": "x"}"#)),
            ("slow", Script::Hang),
        ]);
        let assertions = vec![sem("fast", Priority::High, 3), sem("slow", Priority::High, 3)];
        let plan = plan(&assertions, "code", 10_000);
        let cancel = CancellationToken::new();
        let opts = ExecuteOptions {
            timeout: Duration::from_secs(3600),
            concurrency: 2,
        };

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = execute(&plan, "a.py", "code", &capability, opts, &cancel).await;
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.degraded.len(), 1);
        assert_eq!(report.degraded[0].kind, DegradedKind::Cancelled);
    }

    struct Counting {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ReasoningCapability for Counting {
        async fn submit(&self, _request: &ComplianceRequest) -> Result<Verdict, CapabilityError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Verdict {
                violated: true,
                explanation: String::new(),
                line: None,
            })
        }
    }

    #[tokio::test]
    async fn test_execute_on_spawned_task_is_bounded_and_ordered() {
        let capability = Arc::new(Counting {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let assertions: Vec<_> = (0..6)
            .map(|i| sem(&format!("a{i}"), Priority::Medium, 3))
            .collect();
        let plan = plan(&assertions, "code", 10_000);

        let shared = capability.clone();
        let report = tokio::spawn(async move {
            execute(&plan, "a.py", "code", shared.as_ref(), options(), &CancellationToken::new()).await
        })
        .await
        .unwrap();

        assert_eq!(report.completed, 6);
        assert!(capability.peak.load(Ordering::SeqCst) <= 2);
        let ids: Vec<_> = report.findings.iter().map(|f| f.assertion_id.as_str()).collect();
        assert_eq!(ids, vec!["a0", "a1", "a2", "a3", "a4", "a5"]);
    }

    #[test]
    fn test_parse_verdict_shapes() {
        let v = parse_verdict("Here you go:\n{\"violated\": false, \"explanation\": \"fine\"}").unwrap();
        assert!(!v.violated);
        assert_eq!(v.explanation, "fine");

        let v = parse_verdict("```\n{\"compliant\": false, \"reasoning\": \"missing check\"}\n```").unwrap();
        assert!(v.violated);
        assert_eq!(v.explanation, "missing check");

        assert!(parse_verdict("{\"status\": \"ok\"}").is_err());
        assert!(parse_verdict("").is_err());
    }
}
