use crate::error::EvaluationError;
use crate::tasks::traits::Evaluator;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};
use verity_types::judge::{Grader, ModelSettings};
use verity_types::{EvaluationContext, EvaluationReason, EvaluatorOutput};

/// Grades the output against a natural-language rubric with a remote model.
///
/// Each evaluation awaits exactly one grader call. Retries, timeouts and caching belong
/// to the grader; its errors are passed through unchanged.
#[derive(Clone)]
pub struct LLMJudge {
    pub rubric: String,
    pub include_input: bool,
    pub model: Option<String>,
    pub model_settings: Option<ModelSettings>,
    pub evaluation_name: Option<String>,
    grader: Arc<dyn Grader>,
}

impl fmt::Debug for LLMJudge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LLMJudge")
            .field("rubric", &self.rubric)
            .field("include_input", &self.include_input)
            .field("model", &self.model)
            .field("model_settings", &self.model_settings)
            .finish_non_exhaustive()
    }
}

impl LLMJudge {
    pub fn new(rubric: impl Into<String>, grader: Arc<dyn Grader>) -> Self {
        Self {
            rubric: rubric.into(),
            include_input: false,
            model: None,
            model_settings: None,
            evaluation_name: None,
            grader,
        }
    }

    pub fn with_input(mut self) -> Self {
        self.include_input = true;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = Some(settings);
        self
    }
}

#[async_trait]
impl Evaluator for LLMJudge {
    fn name(&self) -> &str {
        self.evaluation_name.as_deref().unwrap_or("LLMJudge")
    }

    #[instrument(skip_all, fields(case = %ctx.name))]
    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<EvaluatorOutput, EvaluationError> {
        let model = self.model.as_deref();
        let settings = self.model_settings.as_ref();

        let grading = if self.include_input {
            self.grader
                .grade_input_output(&ctx.inputs, &ctx.output, &self.rubric, model, settings)
                .await?
        } else {
            self.grader
                .grade_output(&ctx.output, &self.rubric, model, settings)
                .await?
        };

        debug!("Grader returned pass={}", grading.pass);
        Ok(EvaluationReason::new(grading.pass, Some(grading.reason)).into())
    }
}
