use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypeError {
    #[error("Span '{span_id}' ends before it starts")]
    InvalidSpanInterval { span_id: String },

    #[error("Duplicate span id: {0}")]
    DuplicateSpanId(String),

    #[error("Span '{0}' is part of a parent cycle")]
    SpanCycle(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Unsupported evaluator output: {0}")]
    UnsupportedOutput(String),

    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
}

/// Failure reported by the grading collaborator. Carried through evaluators untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradingError {
    #[error("Grading request failed: {0}")]
    RequestError(String),

    #[error("Invalid grading response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

/// Type error raised by an operator applied to unsupported operands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct OperandError(pub String);
