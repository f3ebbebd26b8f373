use crate::error::GradingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;

/// Provider-specific model parameters forwarded to the grader untouched
pub type ModelSettings = Map<String, Value>;

/// Verdict returned by a grader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingOutput {
    #[serde(alias = "passed")]
    pub pass: bool,

    pub reason: String,
}

impl GradingOutput {
    pub fn new(pass: bool, reason: impl Into<String>) -> Self {
        GradingOutput {
            pass,
            reason: reason.into(),
        }
    }
}

/// Remote model client that grades output against a rubric.
///
/// Implementations own transport, retries and timeouts. Callers await each method once.
#[async_trait]
pub trait Grader: Debug + Send + Sync {
    async fn grade_output(
        &self,
        output: &Value,
        rubric: &str,
        model: Option<&str>,
        model_settings: Option<&ModelSettings>,
    ) -> Result<GradingOutput, GradingError>;

    async fn grade_input_output(
        &self,
        inputs: &Value,
        output: &Value,
        rubric: &str,
        model: Option<&str>,
        model_settings: Option<&ModelSettings>,
    ) -> Result<GradingOutput, GradingError>;
}
