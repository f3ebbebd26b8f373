use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Duration given either as plain seconds or as a duration value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
    Seconds(f64),
    Duration(Duration),
}

impl DurationSpec {
    pub fn to_duration(&self) -> Result<Duration, TypeError> {
        match self {
            DurationSpec::Duration(d) => Ok(*d),
            DurationSpec::Seconds(secs) => Duration::try_from_secs_f64(*secs)
                .map_err(|e| TypeError::InvalidDuration(format!("{secs}: {e}"))),
        }
    }
}

impl From<Duration> for DurationSpec {
    fn from(value: Duration) -> Self {
        DurationSpec::Duration(value)
    }
}

impl From<f64> for DurationSpec {
    fn from(value: f64) -> Self {
        DurationSpec::Seconds(value)
    }
}

/// Declarative predicate over a single span.
///
/// Every clause that is set must hold. A query with no clauses matches every span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_equals: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_matches_regex: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_attributes: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_attribute_keys: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_duration: Option<DurationSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<DurationSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_depth: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_child_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_child_count: Option<usize>,

    /// At least `min_matching_children` immediate children must match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub some_child_has: Option<Box<SpanQuery>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_matching_children: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub some_descendant_has: Option<Box<SpanQuery>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub some_ancestor_has: Option<Box<SpanQuery>>,

    #[serde(rename = "not", skip_serializing_if = "Option::is_none")]
    pub not_: Option<Box<SpanQuery>>,

    #[serde(rename = "and", skip_serializing_if = "Option::is_none")]
    pub and_: Option<Vec<SpanQuery>>,

    #[serde(rename = "or", skip_serializing_if = "Option::is_none")]
    pub or_: Option<Vec<SpanQuery>>,
}

impl SpanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name_equals = Some(name.into());
        self
    }

    pub fn with_name_containing(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    pub fn with_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_matches_regex = Some(pattern.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.has_attributes
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    pub fn with_attribute_key(mut self, key: impl Into<String>) -> Self {
        self.has_attribute_keys
            .get_or_insert_with(Vec::new)
            .push(key.into());
        self
    }

    pub fn with_min_duration(mut self, duration: impl Into<DurationSpec>) -> Self {
        self.min_duration = Some(duration.into());
        self
    }

    pub fn with_max_duration(mut self, duration: impl Into<DurationSpec>) -> Self {
        self.max_duration = Some(duration.into());
        self
    }

    pub fn with_depth_range(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_depth = min;
        self.max_depth = max;
        self
    }

    pub fn with_child(mut self, query: SpanQuery, min_matching: usize) -> Self {
        self.some_child_has = Some(Box::new(query));
        self.min_matching_children = Some(min_matching);
        self
    }

    pub fn with_descendant(mut self, query: SpanQuery) -> Self {
        self.some_descendant_has = Some(Box::new(query));
        self
    }

    pub fn with_ancestor(mut self, query: SpanQuery) -> Self {
        self.some_ancestor_has = Some(Box::new(query));
        self
    }

    pub fn negate(query: SpanQuery) -> Self {
        SpanQuery {
            not_: Some(Box::new(query)),
            ..Default::default()
        }
    }

    pub fn all_of(queries: Vec<SpanQuery>) -> Self {
        SpanQuery {
            and_: Some(queries),
            ..Default::default()
        }
    }

    pub fn any_of(queries: Vec<SpanQuery>) -> Self {
        SpanQuery {
            or_: Some(queries),
            ..Default::default()
        }
    }
}
