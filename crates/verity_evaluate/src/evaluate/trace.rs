use crate::error::EvaluationError;
use regex::Regex;
// Core matching logic for span queries used by HasMatchingSpan
use serde_json::{Map, Value};
use std::time::Duration;
use verity_types::trace::{SpanQuery, SpanRef, SpanTree};
use verity_types::value::values_equal;

/// A [`SpanQuery`] compiled for matching.
///
/// Regexes and durations are validated once here, so a malformed query fails when the
/// evaluator is built rather than on first use. Matching itself is pure and can be shared
/// across threads against the same tree.
#[derive(Debug, Clone)]
pub struct SpanMatcher {
    name_equals: Option<String>,
    name_contains: Option<String>,
    name_regex: Option<Regex>,
    has_attributes: Option<Map<String, Value>>,
    has_attribute_keys: Option<Vec<String>>,
    min_duration: Option<Duration>,
    max_duration: Option<Duration>,
    min_depth: Option<usize>,
    max_depth: Option<usize>,
    min_child_count: Option<usize>,
    max_child_count: Option<usize>,
    some_child_has: Option<(Box<SpanMatcher>, usize)>,
    some_descendant_has: Option<Box<SpanMatcher>>,
    some_ancestor_has: Option<Box<SpanMatcher>>,
    not_: Option<Box<SpanMatcher>>,
    and_: Option<Vec<SpanMatcher>>,
    or_: Option<Vec<SpanMatcher>>,
}

fn compile_boxed(
    query: &Option<Box<SpanQuery>>,
) -> Result<Option<Box<SpanMatcher>>, EvaluationError> {
    query
        .as_deref()
        .map(|q| SpanMatcher::compile(q).map(Box::new))
        .transpose()
}

fn compile_all(
    queries: &Option<Vec<SpanQuery>>,
) -> Result<Option<Vec<SpanMatcher>>, EvaluationError> {
    queries
        .as_ref()
        .map(|qs| qs.iter().map(SpanMatcher::compile).collect::<Result<Vec<_>, _>>())
        .transpose()
}

impl SpanMatcher {
    pub fn compile(query: &SpanQuery) -> Result<Self, EvaluationError> {
        let name_regex = query
            .name_matches_regex
            .as_deref()
            .map(Regex::new)
            .transpose()?;

        let min_duration = query.min_duration.map(|d| d.to_duration()).transpose()?;
        let max_duration = query.max_duration.map(|d| d.to_duration()).transpose()?;

        let some_child_has = match &query.some_child_has {
            Some(child) => Some((
                Box::new(SpanMatcher::compile(child)?),
                query.min_matching_children.unwrap_or(1),
            )),
            None => None,
        };

        Ok(SpanMatcher {
            name_equals: query.name_equals.clone(),
            name_contains: query.name_contains.clone(),
            name_regex,
            has_attributes: query.has_attributes.clone(),
            has_attribute_keys: query.has_attribute_keys.clone(),
            min_duration,
            max_duration,
            min_depth: query.min_depth,
            max_depth: query.max_depth,
            min_child_count: query.min_child_count,
            max_child_count: query.max_child_count,
            some_child_has,
            some_descendant_has: compile_boxed(&query.some_descendant_has)?,
            some_ancestor_has: compile_boxed(&query.some_ancestor_has)?,
            not_: compile_boxed(&query.not_)?,
            and_: compile_all(&query.and_)?,
            or_: compile_all(&query.or_)?,
        })
    }

    /// True if every clause of the query holds for `span`
    pub fn matches(&self, span: SpanRef<'_>) -> bool {
        if let Some(name) = &self.name_equals {
            if span.name() != name.as_str() {
                return false;
            }
        }

        if let Some(fragment) = &self.name_contains {
            if !span.name().contains(fragment.as_str()) {
                return false;
            }
        }

        if let Some(regex) = &self.name_regex {
            // search semantics, not a full match
            if !regex.is_match(span.name()) {
                return false;
            }
        }

        if let Some(expected) = &self.has_attributes {
            let all_present = expected.iter().all(|(key, value)| {
                span.attribute(key)
                    .is_some_and(|actual| values_equal(actual, value))
            });
            if !all_present {
                return false;
            }
        }

        if let Some(keys) = &self.has_attribute_keys {
            if !keys.iter().all(|key| span.attributes().contains_key(key)) {
                return false;
            }
        }

        let duration = span.duration();
        if self.min_duration.is_some_and(|min| duration < min) {
            return false;
        }
        if self.max_duration.is_some_and(|max| duration > max) {
            return false;
        }

        let depth = span.depth();
        if self.min_depth.is_some_and(|min| depth < min) {
            return false;
        }
        if self.max_depth.is_some_and(|max| depth > max) {
            return false;
        }

        let child_count = span.child_count();
        if self.min_child_count.is_some_and(|min| child_count < min) {
            return false;
        }
        if self.max_child_count.is_some_and(|max| child_count > max) {
            return false;
        }

        if let Some(descendant) = &self.some_descendant_has {
            if !span.descendants().any(|d| descendant.matches(d)) {
                return false;
            }
        }

        if let Some(ancestor) = &self.some_ancestor_has {
            if !span.ancestors().any(|a| ancestor.matches(a)) {
                return false;
            }
        }

        if let Some((child, threshold)) = &self.some_child_has {
            let matching = span.children().filter(|c| child.matches(*c)).count();
            if matching < *threshold {
                return false;
            }
        }

        if let Some(negated) = &self.not_ {
            if negated.matches(span) {
                return false;
            }
        }

        if let Some(all) = &self.and_ {
            if !all.iter().all(|m| m.matches(span)) {
                return false;
            }
        }

        if let Some(any) = &self.or_ {
            if !any.iter().any(|m| m.matches(span)) {
                return false;
            }
        }

        true
    }

    /// True if any span in the tree matches, checked in pre-order over every node
    pub fn any(&self, tree: &SpanTree) -> bool {
        tree.iter().any(|span| self.matches(span))
    }

    pub fn find<'a>(&'a self, tree: &'a SpanTree) -> impl Iterator<Item = SpanRef<'a>> + 'a {
        tree.iter().filter(move |span| self.matches(*span))
    }

    pub fn first<'a>(&self, tree: &'a SpanTree) -> Option<SpanRef<'a>> {
        tree.iter().find(|span| self.matches(*span))
    }
}
