use crate::trace::{SpanTree, SpanTreeRecordingError};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Snapshot of one task run that evaluators score against.
///
/// Built once after the task finishes; evaluators only ever see it by shared reference.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub name: String,
    pub inputs: Value,
    pub output: Value,
    pub expected_output: Option<Value>,
    pub metadata: Option<Value>,
    pub duration: Duration,
    pub attributes: Map<String, Value>,
    pub metrics: Map<String, Value>,
    pub span_tree: Result<Arc<SpanTree>, SpanTreeRecordingError>,
}

impl Default for EvaluationContext {
    fn default() -> Self {
        EvaluationContext {
            name: String::new(),
            inputs: Value::Null,
            output: Value::Null,
            expected_output: None,
            metadata: None,
            duration: Duration::ZERO,
            attributes: Map::new(),
            metrics: Map::new(),
            span_tree: Err(SpanTreeRecordingError::default()),
        }
    }
}

impl EvaluationContext {
    pub fn new(name: impl Into<String>, inputs: Value, output: Value) -> Self {
        EvaluationContext {
            name: name.into(),
            inputs,
            output,
            ..Default::default()
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    pub fn with_expected_output(mut self, expected: Value) -> Self {
        self.expected_output = Some(expected);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn with_span_tree(mut self, tree: impl Into<Arc<SpanTree>>) -> Self {
        self.span_tree = Ok(tree.into());
        self
    }

    pub fn with_recording_error(mut self, error: SpanTreeRecordingError) -> Self {
        self.span_tree = Err(error);
        self
    }

    pub fn span_tree(&self) -> Result<&SpanTree, &SpanTreeRecordingError> {
        self.span_tree.as_deref()
    }

    /// Attribute-style lookup of a context field as a JSON value
    ///
    /// An absent expected output reads as null. Duration is reported in float seconds.
    pub fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "name" => Value::String(self.name.clone()),
            "inputs" => self.inputs.clone(),
            "output" => self.output.clone(),
            "expected_output" => self.expected_output.clone().unwrap_or(Value::Null),
            "metadata" => self.metadata.clone().unwrap_or(Value::Null),
            "duration" => Value::from(self.duration.as_secs_f64()),
            "attributes" => Value::Object(self.attributes.clone()),
            "metrics" => Value::Object(self.metrics.clone()),
            _ => return None,
        };
        Some(value)
    }
}
