use crate::error::TypeError;
use crate::value::{truncated_repr, DEFAULT_REPR_LENGTH};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Single verdict value: pass/fail, numeric score or categorical label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvaluationScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Label(String),
}

impl EvaluationScalar {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EvaluationScalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EvaluationScalar::Int(i) => Some(*i as f64),
            EvaluationScalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            EvaluationScalar::Label(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for EvaluationScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationScalar::Bool(b) => write!(f, "{b}"),
            EvaluationScalar::Int(i) => write!(f, "{i}"),
            EvaluationScalar::Float(v) => write!(f, "{v}"),
            EvaluationScalar::Label(s) => f.write_str(s),
        }
    }
}

impl From<bool> for EvaluationScalar {
    fn from(value: bool) -> Self {
        EvaluationScalar::Bool(value)
    }
}

impl From<i64> for EvaluationScalar {
    fn from(value: i64) -> Self {
        EvaluationScalar::Int(value)
    }
}

impl From<f64> for EvaluationScalar {
    fn from(value: f64) -> Self {
        EvaluationScalar::Float(value)
    }
}

impl From<&str> for EvaluationScalar {
    fn from(value: &str) -> Self {
        EvaluationScalar::Label(value.to_string())
    }
}

impl From<String> for EvaluationScalar {
    fn from(value: String) -> Self {
        EvaluationScalar::Label(value)
    }
}

impl TryFrom<Value> for EvaluationScalar {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(EvaluationScalar::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(EvaluationScalar::Int(i)),
                None => n.as_f64().map(EvaluationScalar::Float).ok_or_else(|| {
                    TypeError::UnsupportedOutput(format!("number {n} is out of range"))
                }),
            },
            Value::String(s) => Ok(EvaluationScalar::Label(s)),
            other => Err(TypeError::UnsupportedOutput(truncated_repr(
                &other,
                DEFAULT_REPR_LENGTH,
            ))),
        }
    }
}

/// Normalized verdict with an optional explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReason {
    pub value: EvaluationScalar,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EvaluationReason {
    /// Empty reasons are stored as `None`
    pub fn new<S: Into<String>>(value: impl Into<EvaluationScalar>, reason: Option<S>) -> Self {
        let reason = reason.map(Into::into).filter(|r| !r.is_empty());
        EvaluationReason {
            value: value.into(),
            reason,
        }
    }

    pub fn bare(value: impl Into<EvaluationScalar>) -> Self {
        EvaluationReason {
            value: value.into(),
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::new(false, Some(reason))
    }
}

/// Entry of a multi-metric result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricOutput {
    Reason(EvaluationReason),
    Scalar(EvaluationScalar),
}

impl From<MetricOutput> for EvaluationReason {
    fn from(value: MetricOutput) -> Self {
        match value {
            MetricOutput::Reason(reason) => reason,
            MetricOutput::Scalar(scalar) => EvaluationReason::bare(scalar),
        }
    }
}

/// Raw result of one evaluator invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvaluatorOutput {
    Scalar(EvaluationScalar),
    Reason(EvaluationReason),
    Metrics(BTreeMap<String, MetricOutput>),
}

impl EvaluatorOutput {
    /// Result that contributes nothing to a report
    pub fn empty() -> Self {
        EvaluatorOutput::Metrics(BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, EvaluatorOutput::Metrics(m) if m.is_empty())
    }

    pub fn reason(value: impl Into<EvaluationScalar>, reason: Option<String>) -> Self {
        EvaluatorOutput::Reason(EvaluationReason::new(value, reason))
    }
}

impl From<bool> for EvaluatorOutput {
    fn from(value: bool) -> Self {
        EvaluatorOutput::Scalar(EvaluationScalar::Bool(value))
    }
}

impl From<EvaluationScalar> for EvaluatorOutput {
    fn from(value: EvaluationScalar) -> Self {
        EvaluatorOutput::Scalar(value)
    }
}

impl From<EvaluationReason> for EvaluatorOutput {
    fn from(value: EvaluationReason) -> Self {
        EvaluatorOutput::Reason(value)
    }
}

fn metric_from_value(value: Value) -> Result<MetricOutput, TypeError> {
    match value {
        Value::Object(mut map) if map.contains_key("value") => {
            let scalar = EvaluationScalar::try_from(map.remove("value").unwrap_or(Value::Null))?;
            let reason = match map.remove("reason") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s),
                Some(other) => {
                    return Err(TypeError::UnsupportedOutput(format!(
                        "reason must be a string, got {}",
                        truncated_repr(&other, DEFAULT_REPR_LENGTH)
                    )))
                }
            };
            Ok(MetricOutput::Reason(EvaluationReason::new(scalar, reason)))
        }
        other => EvaluationScalar::try_from(other).map(MetricOutput::Scalar),
    }
}

impl TryFrom<Value> for EvaluatorOutput {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(key, entry)| metric_from_value(entry).map(|metric| (key, metric)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(EvaluatorOutput::Metrics),
            other => EvaluationScalar::try_from(other).map(EvaluatorOutput::Scalar),
        }
    }
}
