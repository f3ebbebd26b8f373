use crate::error::EvaluationError;
use crate::expression::{CompiledExpression, ExpressionError};
use crate::tasks::traits::Evaluator;
use async_trait::async_trait;
use verity_types::{EvaluationContext, EvaluatorOutput};

/// Evaluates an expression over `ctx` and returns its value as-is.
///
/// Not part of the default evaluator set; registries must opt in explicitly.
#[derive(Debug, Clone)]
pub struct Expression {
    expression: String,
    // parse errors are reported on evaluation, like every other expression error
    compiled: Result<CompiledExpression, ExpressionError>,
    evaluation_name: Option<String>,
}

impl Expression {
    pub fn new(expression: impl Into<String>) -> Self {
        let expression = expression.into();
        let compiled = CompiledExpression::compile(&expression);
        Self {
            expression,
            compiled,
            evaluation_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.evaluation_name = Some(name.into());
        self
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

#[async_trait]
impl Evaluator for Expression {
    fn name(&self) -> &str {
        self.evaluation_name.as_deref().unwrap_or("Expression")
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<EvaluatorOutput, EvaluationError> {
        let compiled = self.compiled.as_ref().map_err(Clone::clone)?;
        let value = compiled.evaluate(ctx)?;
        Ok(EvaluatorOutput::try_from(value)?)
    }
}
