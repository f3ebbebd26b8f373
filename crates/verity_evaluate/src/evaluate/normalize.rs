use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use verity_types::{EvaluationReason, EvaluationScalar, EvaluatorOutput};

/// Flattens one raw evaluator output into named reasons
///
/// Scalars and reasons are keyed by the evaluator name. Metric maps contribute one entry
/// per sub-metric; an empty map contributes nothing.
pub fn normalize(name: &str, output: EvaluatorOutput) -> BTreeMap<String, EvaluationReason> {
    match output {
        EvaluatorOutput::Scalar(value) => {
            BTreeMap::from([(name.to_string(), EvaluationReason::bare(value))])
        }
        EvaluatorOutput::Reason(reason) => BTreeMap::from([(name.to_string(), reason)]),
        EvaluatorOutput::Metrics(metrics) => metrics
            .into_iter()
            .map(|(key, metric)| (key, EvaluationReason::from(metric)))
            .collect(),
    }
}

/// Normalized results grouped by value type, the shape reports consume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResults {
    pub assertions: BTreeMap<String, EvaluationReason>,
    pub scores: BTreeMap<String, EvaluationReason>,
    pub labels: BTreeMap<String, EvaluationReason>,
}

impl NormalizedResults {
    pub fn insert(&mut self, key: String, reason: EvaluationReason) {
        let bucket = match reason.value {
            EvaluationScalar::Bool(_) => &mut self.assertions,
            EvaluationScalar::Int(_) | EvaluationScalar::Float(_) => &mut self.scores,
            EvaluationScalar::Label(_) => &mut self.labels,
        };
        bucket.insert(key, reason);
    }

    pub fn len(&self) -> usize {
        self.assertions.len() + self.scores.len() + self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when every assertion passed
    pub fn all_passed(&self) -> bool {
        self.assertions
            .values()
            .all(|reason| reason.value.as_bool().unwrap_or(false))
    }
}

impl FromIterator<(String, EvaluationReason)> for NormalizedResults {
    fn from_iter<I: IntoIterator<Item = (String, EvaluationReason)>>(iter: I) -> Self {
        let mut results = NormalizedResults::default();
        for (key, reason) in iter {
            results.insert(key, reason);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verity_types::MetricOutput;

    #[test]
    fn test_normalize_shapes() {
        let results = normalize("Equals", EvaluatorOutput::from(true));
        assert_eq!(results["Equals"], EvaluationReason::bare(true));

        let results = normalize(
            "Contains",
            EvaluatorOutput::reason(false, Some("missing".to_string())),
        );
        assert_eq!(results["Contains"].reason.as_deref(), Some("missing"));

        let metrics = BTreeMap::from([
            (
                "accuracy".to_string(),
                MetricOutput::Scalar(EvaluationScalar::Float(0.9)),
            ),
            (
                "tone".to_string(),
                MetricOutput::Reason(EvaluationReason::new("polite", Some("calm"))),
            ),
        ]);
        let results = normalize("Judge", EvaluatorOutput::Metrics(metrics));
        assert_eq!(results.len(), 2);
        assert!(!results.contains_key("Judge"));
        assert_eq!(results["accuracy"].value, EvaluationScalar::Float(0.9));

        assert!(normalize("EqualsExpected", EvaluatorOutput::empty()).is_empty());
    }

    #[test]
    fn test_grouping() {
        let results: NormalizedResults = [
            ("a".to_string(), EvaluationReason::bare(true)),
            ("b".to_string(), EvaluationReason::bare(0.5)),
            ("c".to_string(), EvaluationReason::bare("label")),
            ("d".to_string(), EvaluationReason::fail("nope")),
        ]
        .into_iter()
        .collect();

        assert_eq!(results.assertions.len(), 2);
        assert_eq!(results.scores.len(), 1);
        assert_eq!(results.labels.len(), 1);
        assert!(!results.all_passed());
    }
}
