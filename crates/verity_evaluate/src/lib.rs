pub mod error;
pub mod evaluate;
pub mod expression;
pub mod tasks;

pub use error::EvaluationError;
pub use evaluate::evaluator::{
    evaluate_case, evaluate_case_with_settings, CaseResults, EvaluatorFailure,
};
pub use evaluate::normalize::{normalize, NormalizedResults};
pub use evaluate::trace::SpanMatcher;
pub use expression::{CompiledExpression, ExpressionError};
pub use tasks::comparison::{Contains, Equals, EqualsExpected, IsInstance, MaxDuration};
pub use tasks::expression::Expression;
pub use tasks::judge::LLMJudge;
pub use tasks::registry::{
    EvaluatorKind, EvaluatorRegistry, EvaluatorSpec, ExpressionSpec, HasMatchingSpanSpec,
    LLMJudgeSpec, MaxDurationSpec, DEFAULT_EVALUATORS,
};
pub use tasks::trace::HasMatchingSpan;
pub use tasks::traits::Evaluator;
