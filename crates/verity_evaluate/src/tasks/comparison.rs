use crate::error::EvaluationError;
use crate::tasks::traits::Evaluator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use verity_types::value::{contains_value, str_form, truncated_repr, values_equal, ValueExt};
use verity_types::{DurationSpec, EvaluationContext, EvaluationReason, EvaluatorOutput};

const KEY_REPR_LENGTH: usize = 30;
const VALUE_REPR_LENGTH: usize = 100;
const OUTPUT_REPR_LENGTH: usize = 200;

fn default_true() -> bool {
    true
}

/// Output equals a fixed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equals {
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_name: Option<String>,
}

impl Equals {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            evaluation_name: None,
        }
    }
}

#[async_trait]
impl Evaluator for Equals {
    fn name(&self) -> &str {
        self.evaluation_name.as_deref().unwrap_or("Equals")
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<EvaluatorOutput, EvaluationError> {
        Ok(values_equal(&ctx.output, &self.value).into())
    }
}

/// Output equals the case's expected output. Produces an empty result when none was given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EqualsExpected {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_name: Option<String>,
}

#[async_trait]
impl Evaluator for EqualsExpected {
    fn name(&self) -> &str {
        self.evaluation_name.as_deref().unwrap_or("EqualsExpected")
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<EvaluatorOutput, EvaluationError> {
        Ok(match &ctx.expected_output {
            Some(expected) => values_equal(&ctx.output, expected).into(),
            None => EvaluatorOutput::empty(),
        })
    }
}

/// Output contains a value.
///
/// Mappings are checked key by key, other containers by membership and strings by
/// substring. Unsupported operand types are reported as a failed check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contains {
    pub value: Value,

    #[serde(default = "default_true")]
    pub case_sensitive: bool,

    #[serde(default)]
    pub as_strings: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_name: Option<String>,
}

impl Contains {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            case_sensitive: true,
            as_strings: false,
            evaluation_name: None,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    pub fn as_strings(mut self) -> Self {
        self.as_strings = true;
        self
    }

    /// Returns the failure reason, `None` when the check passes
    pub fn check(&self, output: &Value) -> Option<String> {
        let both_strings = self.value.is_string() && output.is_string();
        if self.as_strings || both_strings {
            return self.check_strings(output);
        }

        match (output, &self.value) {
            (Value::Object(actual), Value::Object(expected)) => {
                Self::check_mapping(actual, expected)
            }
            (Value::Object(_), value) => match contains_value(output, value) {
                Ok(true) => None,
                Ok(false) => Some(format!(
                    "Output {} does not contain provided value as a key",
                    truncated_repr(output, OUTPUT_REPR_LENGTH)
                )),
                Err(e) => Some(format!("Containment check failed: {e}")),
            },
            (_, value) => match contains_value(output, value) {
                Ok(true) => None,
                Ok(false) => Some(format!(
                    "Output {} does not contain provided value",
                    truncated_repr(output, OUTPUT_REPR_LENGTH)
                )),
                Err(e) => Some(format!("Containment check failed: {e}")),
            },
        }
    }

    fn check_strings(&self, output: &Value) -> Option<String> {
        let (mut output_str, mut expected_str) = (str_form(output), str_form(&self.value));
        if !self.case_sensitive {
            output_str = output_str.to_lowercase();
            expected_str = expected_str.to_lowercase();
        }
        if output_str.contains(&expected_str) {
            return None;
        }
        Some(format!(
            "Output string {} does not contain expected string {}",
            truncated_repr(&Value::String(output_str), VALUE_REPR_LENGTH),
            truncated_repr(&Value::String(expected_str), VALUE_REPR_LENGTH)
        ))
    }

    // first missing or differing key wins, in the expected mapping's order
    fn check_mapping(actual: &Map<String, Value>, expected: &Map<String, Value>) -> Option<String> {
        for (key, expected_value) in expected {
            let key_repr = truncated_repr(&Value::String(key.clone()), KEY_REPR_LENGTH);
            match actual.get(key) {
                None => {
                    return Some(format!(
                        "Output dictionary does not contain expected key {key_repr}"
                    ))
                }
                Some(actual_value) if !values_equal(actual_value, expected_value) => {
                    return Some(format!(
                        "Output dictionary has different value for key {key_repr}: {} != {}",
                        truncated_repr(actual_value, VALUE_REPR_LENGTH),
                        truncated_repr(expected_value, VALUE_REPR_LENGTH)
                    ))
                }
                Some(_) => {}
            }
        }
        None
    }
}

#[async_trait]
impl Evaluator for Contains {
    fn name(&self) -> &str {
        self.evaluation_name.as_deref().unwrap_or("Contains")
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<EvaluatorOutput, EvaluationError> {
        let reason = self.check(&ctx.output);
        Ok(EvaluatorOutput::reason(reason.is_none(), reason))
    }
}

/// Output's runtime type, or one of its ancestors, has the given name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsInstance {
    pub type_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_name: Option<String>,
}

impl IsInstance {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            evaluation_name: None,
        }
    }
}

#[async_trait]
impl Evaluator for IsInstance {
    fn name(&self) -> &str {
        self.evaluation_name.as_deref().unwrap_or("IsInstance")
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<EvaluatorOutput, EvaluationError> {
        let kind = ctx.output.kind();
        if kind.is_named(&self.type_name) {
            return Ok(EvaluationReason::bare(true).into());
        }
        Ok(EvaluationReason::fail(format!("output is of type {kind}")).into())
    }
}

/// Run duration does not exceed a limit
#[derive(Debug, Clone, PartialEq)]
pub struct MaxDuration {
    pub limit: Duration,
    pub evaluation_name: Option<String>,
}

impl MaxDuration {
    /// Fails on negative or non-finite second counts
    pub fn new(seconds: impl Into<DurationSpec>) -> Result<Self, EvaluationError> {
        Ok(Self {
            limit: seconds.into().to_duration()?,
            evaluation_name: None,
        })
    }
}

#[async_trait]
impl Evaluator for MaxDuration {
    fn name(&self) -> &str {
        self.evaluation_name.as_deref().unwrap_or("MaxDuration")
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> Result<EvaluatorOutput, EvaluationError> {
        Ok((ctx.duration <= self.limit).into())
    }
}
