use crate::error::EvaluationError;
use crate::evaluate::trace::SpanMatcher;
use crate::tasks::traits::Evaluator;
use async_trait::async_trait;
use tracing::debug;
use verity_types::trace::SpanQuery;
use verity_types::{EvaluationContext, EvaluationReason, EvaluatorOutput};

/// Passes when at least one span anywhere in the recorded tree satisfies the query
#[derive(Debug, Clone)]
pub struct HasMatchingSpan {
    query: SpanQuery,
    matcher: SpanMatcher,
    evaluation_name: Option<String>,
}

impl HasMatchingSpan {
    /// Compiles the query; invalid regexes or durations fail here
    pub fn new(query: SpanQuery) -> Result<Self, EvaluationError> {
        let matcher = SpanMatcher::compile(&query)?;
        Ok(Self {
            query,
            matcher,
            evaluation_name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.evaluation_name = Some(name.into());
        self
    }

    pub fn query(&self) -> &SpanQuery {
        &self.query
    }
}

#[async_trait]
impl Evaluator for HasMatchingSpan {
    fn name(&self) -> &str {
        self.evaluation_name.as_deref().unwrap_or("HasMatchingSpan")
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<EvaluatorOutput, EvaluationError> {
        match ctx.span_tree() {
            Ok(tree) => Ok(self.matcher.any(tree).into()),
            Err(err) => {
                debug!("Span tree unavailable for case '{}': {}", ctx.name, err);
                Ok(EvaluationReason::fail(format!("Span tree unavailable: {err}")).into())
            }
        }
    }
}
