use crate::error::EvaluationError;
use crate::tasks::comparison::{Contains, Equals, EqualsExpected, IsInstance, MaxDuration};
use crate::tasks::expression::Expression;
use crate::tasks::judge::LLMJudge;
use crate::tasks::trace::HasMatchingSpan;
use crate::tasks::traits::Evaluator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use verity_settings::EvaluationSettings;
use verity_types::judge::{Grader, ModelSettings};
use verity_types::trace::SpanQuery;
use verity_types::DurationSpec;

/// Built-in evaluator variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaluatorKind {
    Equals,
    EqualsExpected,
    Contains,
    IsInstance,
    MaxDuration,
    LLMJudge,
    HasMatchingSpan,
    Expression,
}

impl fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Evaluators that may run without explicit opt-in. Expression evaluation is never part of it.
pub const DEFAULT_EVALUATORS: &[EvaluatorKind] = &[
    EvaluatorKind::Equals,
    EvaluatorKind::EqualsExpected,
    EvaluatorKind::Contains,
    EvaluatorKind::IsInstance,
    EvaluatorKind::MaxDuration,
    EvaluatorKind::LLMJudge,
    EvaluatorKind::HasMatchingSpan,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxDurationSpec {
    pub seconds: DurationSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMJudgeSpec {
    pub rubric: String,

    #[serde(default)]
    pub include_input: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_settings: Option<ModelSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HasMatchingSpanSpec {
    pub query: SpanQuery,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionSpec {
    pub expression: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_name: Option<String>,
}

/// Serialized evaluator configuration, e.g. `{"equals": {"value": 1}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorSpec {
    Equals(Equals),
    EqualsExpected(EqualsExpected),
    Contains(Contains),
    IsInstance(IsInstance),
    MaxDuration(MaxDurationSpec),
    #[serde(rename = "llm_judge")]
    LLMJudge(LLMJudgeSpec),
    HasMatchingSpan(HasMatchingSpanSpec),
    Expression(ExpressionSpec),
}

impl EvaluatorSpec {
    pub fn kind(&self) -> EvaluatorKind {
        match self {
            EvaluatorSpec::Equals(_) => EvaluatorKind::Equals,
            EvaluatorSpec::EqualsExpected(_) => EvaluatorKind::EqualsExpected,
            EvaluatorSpec::Contains(_) => EvaluatorKind::Contains,
            EvaluatorSpec::IsInstance(_) => EvaluatorKind::IsInstance,
            EvaluatorSpec::MaxDuration(_) => EvaluatorKind::MaxDuration,
            EvaluatorSpec::LLMJudge(_) => EvaluatorKind::LLMJudge,
            EvaluatorSpec::HasMatchingSpan(_) => EvaluatorKind::HasMatchingSpan,
            EvaluatorSpec::Expression(_) => EvaluatorKind::Expression,
        }
    }
}

/// Builds evaluators from specs, enforcing which kinds may run
#[derive(Debug, Clone)]
pub struct EvaluatorRegistry {
    allowed: HashSet<EvaluatorKind>,
    grader: Option<Arc<dyn Grader>>,
    default_judge_model: Option<String>,
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluatorRegistry {
    /// Registry allowing exactly [`DEFAULT_EVALUATORS`]
    pub fn new() -> Self {
        Self {
            allowed: DEFAULT_EVALUATORS.iter().copied().collect(),
            grader: None,
            default_judge_model: None,
        }
    }

    pub fn from_settings(settings: &EvaluationSettings) -> Self {
        let mut registry = Self::new();
        if settings.allow_expressions {
            warn!("Expression evaluators enabled from settings");
            registry = registry.allow(EvaluatorKind::Expression);
        }
        registry.default_judge_model = settings.judge_model.clone();
        registry
    }

    pub fn allow(mut self, kind: EvaluatorKind) -> Self {
        self.allowed.insert(kind);
        self
    }

    pub fn deny(mut self, kind: EvaluatorKind) -> Self {
        self.allowed.remove(&kind);
        self
    }

    pub fn with_grader(mut self, grader: Arc<dyn Grader>) -> Self {
        self.grader = Some(grader);
        self
    }

    pub fn with_default_judge_model(mut self, model: impl Into<String>) -> Self {
        self.default_judge_model = Some(model.into());
        self
    }

    pub fn is_allowed(&self, kind: EvaluatorKind) -> bool {
        self.allowed.contains(&kind)
    }

    /// Constructs the evaluator described by `spec`
    /// # Arguments
    /// * `spec` - Evaluator configuration
    /// # Returns
    /// The evaluator, or an error when its kind is not allowed or its configuration is invalid
    #[instrument(skip_all, fields(kind = %spec.kind()))]
    pub fn build(&self, spec: EvaluatorSpec) -> Result<Arc<dyn Evaluator>, EvaluationError> {
        let kind = spec.kind();
        if !self.is_allowed(kind) {
            return Err(EvaluationError::EvaluatorNotAllowed(kind.to_string()));
        }

        let evaluator: Arc<dyn Evaluator> = match spec {
            EvaluatorSpec::Equals(equals) => Arc::new(equals),
            EvaluatorSpec::EqualsExpected(equals) => Arc::new(equals),
            EvaluatorSpec::Contains(contains) => Arc::new(contains),
            EvaluatorSpec::IsInstance(is_instance) => {
                if is_instance.type_name.trim().is_empty() {
                    return Err(EvaluationError::InvalidConfiguration(
                        "IsInstance type_name must not be empty".to_string(),
                    ));
                }
                Arc::new(is_instance)
            }
            EvaluatorSpec::MaxDuration(spec) => {
                let mut evaluator = MaxDuration::new(spec.seconds)?;
                evaluator.evaluation_name = spec.evaluation_name;
                Arc::new(evaluator)
            }
            EvaluatorSpec::LLMJudge(spec) => Arc::new(self.build_judge(spec)?),
            EvaluatorSpec::HasMatchingSpan(spec) => {
                let evaluator = HasMatchingSpan::new(spec.query)?;
                Arc::new(match spec.evaluation_name {
                    Some(name) => evaluator.with_name(name),
                    None => evaluator,
                })
            }
            EvaluatorSpec::Expression(spec) => {
                let evaluator = Expression::new(spec.expression);
                Arc::new(match spec.evaluation_name {
                    Some(name) => evaluator.with_name(name),
                    None => evaluator,
                })
            }
        };

        debug!("Built evaluator '{}'", evaluator.name());
        Ok(evaluator)
    }

    fn build_judge(&self, spec: LLMJudgeSpec) -> Result<LLMJudge, EvaluationError> {
        let grader = self.grader.clone().ok_or(EvaluationError::MissingGrader)?;
        if spec.rubric.trim().is_empty() {
            return Err(EvaluationError::InvalidConfiguration(
                "LLMJudge rubric must not be empty".to_string(),
            ));
        }

        let mut judge = LLMJudge::new(spec.rubric, grader);
        judge.include_input = spec.include_input;
        judge.model = spec.model.or_else(|| self.default_judge_model.clone());
        judge.model_settings = spec.model_settings;
        judge.evaluation_name = spec.evaluation_name;
        Ok(judge)
    }

    pub fn build_all(
        &self,
        specs: Vec<EvaluatorSpec>,
    ) -> Result<Vec<Arc<dyn Evaluator>>, EvaluationError> {
        specs.into_iter().map(|spec| self.build(spec)).collect()
    }

    /// Parses a serialized spec and builds it
    pub fn build_from_value(&self, value: Value) -> Result<Arc<dyn Evaluator>, EvaluationError> {
        let spec: EvaluatorSpec = serde_json::from_value(value)?;
        self.build(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_set_excludes_expression() {
        assert!(!DEFAULT_EVALUATORS.contains(&EvaluatorKind::Expression));
        assert_eq!(DEFAULT_EVALUATORS.len(), 7);
        assert!(!EvaluatorRegistry::new().is_allowed(EvaluatorKind::Expression));
    }

    #[test]
    fn test_spec_deserialization() {
        let spec: EvaluatorSpec = serde_json::from_value(json!({"equals": {"value": 1}})).unwrap();
        assert_eq!(spec.kind(), EvaluatorKind::Equals);

        let spec: EvaluatorSpec = serde_json::from_value(json!({"equals_expected": {}})).unwrap();
        assert_eq!(spec.kind(), EvaluatorKind::EqualsExpected);

        let spec: EvaluatorSpec =
            serde_json::from_value(json!({"contains": {"value": "x", "case_sensitive": false}}))
                .unwrap();
        let EvaluatorSpec::Contains(contains) = spec else {
            panic!("expected contains");
        };
        assert!(!contains.case_sensitive);
        assert!(!contains.as_strings);

        let spec: EvaluatorSpec =
            serde_json::from_value(json!({"llm_judge": {"rubric": "polite"}})).unwrap();
        assert_eq!(spec.kind(), EvaluatorKind::LLMJudge);

        let spec: EvaluatorSpec = serde_json::from_value(
            json!({"has_matching_span": {"query": {"name_equals": "child1"}}}),
        )
        .unwrap();
        assert_eq!(spec.kind(), EvaluatorKind::HasMatchingSpan);
    }

    #[test]
    fn test_expression_requires_opt_in() {
        let spec = json!({"expression": {"expression": "ctx.output > 0"}});

        let err = EvaluatorRegistry::new()
            .build_from_value(spec.clone())
            .unwrap_err();
        assert!(matches!(err, EvaluationError::EvaluatorNotAllowed(kind) if kind == "Expression"));

        let registry = EvaluatorRegistry::new().allow(EvaluatorKind::Expression);
        assert_eq!(registry.build_from_value(spec).unwrap().name(), "Expression");
    }

    #[test]
    fn test_configuration_errors() {
        let registry = EvaluatorRegistry::new();

        let err = registry
            .build_from_value(json!({"llm_judge": {"rubric": "polite"}}))
            .unwrap_err();
        assert!(matches!(err, EvaluationError::MissingGrader));

        let err = registry
            .build_from_value(json!({"max_duration": {"seconds": -1.0}}))
            .unwrap_err();
        assert!(matches!(err, EvaluationError::TypeError(_)));

        let err = registry
            .build_from_value(json!({"has_matching_span": {"query": {"name_matches_regex": "("}}}))
            .unwrap_err();
        assert!(matches!(err, EvaluationError::RegexError(_)));

        let err = registry
            .build_from_value(json!({"unknown": {}}))
            .unwrap_err();
        assert!(matches!(err, EvaluationError::SerdeError(_)));
    }
}
