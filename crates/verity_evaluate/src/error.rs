use crate::expression::ExpressionError;
use thiserror::Error;
use verity_types::error::{GradingError, TypeError};

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error(transparent)]
    TypeError(#[from] TypeError),

    #[error(transparent)]
    GradingError(#[from] GradingError),

    #[error(transparent)]
    ExpressionError(#[from] ExpressionError),

    #[error(transparent)]
    RegexError(#[from] regex::Error),

    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),

    #[error("Evaluator '{0}' is not allowed by this registry")]
    EvaluatorNotAllowed(String),

    #[error("LLMJudge requires a grader but none was configured")]
    MissingGrader,

    #[error("Invalid evaluator configuration: {0}")]
    InvalidConfiguration(String),
}
