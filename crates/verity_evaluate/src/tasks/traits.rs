use crate::error::EvaluationError;
use async_trait::async_trait;
use std::fmt::Debug;
use verity_types::{EvaluationContext, EvaluatorOutput};

/// Base trait for all evaluators
///
/// Evaluators are configured once and reused across many contexts. They hold no per-run
/// state, so a single instance can be shared between concurrent evaluations.
#[async_trait]
pub trait Evaluator: Debug + Send + Sync {
    /// Name used as the result key when the output is normalized
    fn name(&self) -> &str;

    /// Score one task run
    /// # Arguments
    /// * `context` - The evaluation context of the run
    /// # Returns
    /// The raw evaluator output. Errors are not caught here and propagate to the caller
    async fn evaluate(&self, context: &EvaluationContext)
        -> Result<EvaluatorOutput, EvaluationError>;
}
