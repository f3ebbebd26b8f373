use crate::evaluate::normalize::{normalize, NormalizedResults};
use crate::tasks::traits::Evaluator;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use verity_settings::EvaluationSettings;
use verity_types::EvaluationContext;

/// An evaluator that returned an error instead of an output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorFailure {
    pub evaluator: String,
    pub error: String,
}

/// Everything the evaluators produced for one case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseResults {
    pub name: String,
    pub results: NormalizedResults,
    pub failures: Vec<EvaluatorFailure>,
}

impl CaseResults {
    /// True when no evaluator failed and every assertion passed
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.results.all_passed()
    }
}

// first free key among `key`, `key_2`, `key_3`, ...
fn unique_key(key: String, used: &mut HashSet<String>) -> String {
    if used.insert(key.clone()) {
        return key;
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{key}_{suffix}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Runs every evaluator against one context
///
/// At most `max_concurrency` evaluators are in flight at once. Outputs are merged in
/// evaluator order, so key collisions resolve the same way on every run.
#[instrument(skip_all, fields(case = %ctx.name, evaluators = evaluators.len()))]
pub async fn evaluate_case(
    ctx: &EvaluationContext,
    evaluators: &[Arc<dyn Evaluator>],
    max_concurrency: usize,
) -> CaseResults {
    let outputs: Vec<_> = stream::iter(evaluators)
        .map(|evaluator| async move { (evaluator.name(), evaluator.evaluate(ctx).await) })
        .buffered(max_concurrency.max(1))
        .collect()
        .await;

    let mut case = CaseResults {
        name: ctx.name.clone(),
        ..Default::default()
    };
    let mut used = HashSet::new();

    for (name, output) in outputs {
        match output {
            Ok(output) => {
                for (key, reason) in normalize(name, output) {
                    let key = unique_key(key, &mut used);
                    case.results.insert(key, reason);
                }
            }
            Err(err) => {
                warn!("Evaluator '{}' failed: {}", name, err);
                case.failures.push(EvaluatorFailure {
                    evaluator: name.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    debug!(
        "Case '{}' produced {} results and {} failures",
        case.name,
        case.results.len(),
        case.failures.len()
    );
    case
}

/// [`evaluate_case`] bounded by the configured `max_concurrency`
pub async fn evaluate_case_with_settings(
    ctx: &EvaluationContext,
    evaluators: &[Arc<dyn Evaluator>],
    settings: &EvaluationSettings,
) -> CaseResults {
    evaluate_case(ctx, evaluators, settings.max_concurrency).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;
    use crate::tasks::comparison::{Equals, IsInstance};
    use crate::tasks::expression::Expression;
    use async_trait::async_trait;
    use serde_json::json;
    use verity_types::{EvaluationReason, EvaluatorOutput};

    #[derive(Debug)]
    struct Fixed(&'static str, f64);

    #[async_trait]
    impl Evaluator for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn evaluate(
            &self,
            _ctx: &EvaluationContext,
        ) -> Result<EvaluatorOutput, EvaluationError> {
            Ok(EvaluationReason::bare(self.1).into())
        }
    }

    fn context() -> EvaluationContext {
        EvaluationContext::new("case", json!({"x": 1}), json!(42))
    }

    #[tokio::test]
    async fn test_collects_results_and_failures() {
        let evaluators: Vec<Arc<dyn Evaluator>> = vec![
            Arc::new(Equals::new(json!(42))),
            Arc::new(IsInstance::new("str")),
            Arc::new(Expression::new("ctx.missing")),
        ];

        let case = evaluate_case(&context(), &evaluators, 2).await;
        assert_eq!(case.name, "case");
        assert_eq!(case.results.assertions.len(), 2);
        assert_eq!(case.results.assertions["Equals"], EvaluationReason::bare(true));
        assert_eq!(case.failures.len(), 1);
        assert_eq!(case.failures[0].evaluator, "Expression");
        assert!(!case.passed());
    }

    #[tokio::test]
    async fn test_duplicate_keys_are_suffixed() {
        let evaluators: Vec<Arc<dyn Evaluator>> = vec![
            Arc::new(Fixed("score", 0.1)),
            Arc::new(Fixed("score", 0.2)),
            Arc::new(Fixed("score", 0.3)),
        ];

        let case = evaluate_case(&context(), &evaluators, 0).await;
        let scores = &case.results.scores;
        assert_eq!(scores["score"], EvaluationReason::bare(0.1));
        assert_eq!(scores["score_2"], EvaluationReason::bare(0.2));
        assert_eq!(scores["score_3"], EvaluationReason::bare(0.3));
        assert!(case.passed());
    }

    #[tokio::test]
    async fn test_runs_with_settings() {
        let settings = EvaluationSettings {
            max_concurrency: 1,
            ..EvaluationSettings::default()
        };
        let evaluators: Vec<Arc<dyn Evaluator>> = vec![
            Arc::new(Fixed("first", 1.0)),
            Arc::new(Equals::new(json!(42))),
        ];

        let case = evaluate_case_with_settings(&context(), &evaluators, &settings).await;
        assert_eq!(case.results.len(), 2);
        assert_eq!(case.results.scores["first"], EvaluationReason::bare(1.0));
        assert!(case.passed());
    }

    #[tokio::test]
    async fn test_no_evaluators() {
        let case = evaluate_case(&context(), &[], 4).await;
        assert!(case.results.is_empty());
        assert!(case.failures.is_empty());
    }
}
