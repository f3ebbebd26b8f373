use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use verity_types::error::GradingError;
use verity_types::judge::{Grader, GradingOutput, ModelSettings};

/// Arguments of one grader invocation
#[derive(Debug, Clone, PartialEq)]
pub struct GradeCall {
    /// Set only for input/output grading
    pub inputs: Option<Value>,
    pub output: Value,
    pub rubric: String,
    pub model: Option<String>,
    pub model_settings: Option<ModelSettings>,
}

/// Grader returning a canned response and recording every call
#[derive(Debug)]
pub struct MockGrader {
    response: Result<GradingOutput, GradingError>,
    calls: Mutex<Vec<GradeCall>>,
}

impl MockGrader {
    pub fn new(pass: bool, reason: impl Into<String>) -> Self {
        Self::with_response(Ok(GradingOutput::new(pass, reason)))
    }

    pub fn failing(error: GradingError) -> Self {
        Self::with_response(Err(error))
    }

    pub fn with_response(response: Result<GradingOutput, GradingError>) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<GradeCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: GradeCall) -> Result<GradingOutput, GradingError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        self.response.clone()
    }
}

#[async_trait]
impl Grader for MockGrader {
    async fn grade_output(
        &self,
        output: &Value,
        rubric: &str,
        model: Option<&str>,
        model_settings: Option<&ModelSettings>,
    ) -> Result<GradingOutput, GradingError> {
        self.record(GradeCall {
            inputs: None,
            output: output.clone(),
            rubric: rubric.to_string(),
            model: model.map(str::to_string),
            model_settings: model_settings.cloned(),
        })
    }

    async fn grade_input_output(
        &self,
        inputs: &Value,
        output: &Value,
        rubric: &str,
        model: Option<&str>,
        model_settings: Option<&ModelSettings>,
    ) -> Result<GradingOutput, GradingError> {
        self.record(GradeCall {
            inputs: Some(inputs.clone()),
            output: output.clone(),
            rubric: rubric.to_string(),
            model: model.map(str::to_string),
            model_settings: model_settings.cloned(),
        })
    }
}
