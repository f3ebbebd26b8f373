pub mod query;

use crate::error::TypeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub use query::{DurationSpec, SpanQuery};

/// Marker stored in an evaluation context when no span tree was captured for the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanTreeRecordingError {
    pub message: String,
}

impl SpanTreeRecordingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for SpanTreeRecordingError {
    fn default() -> Self {
        Self::new("spans were not recorded")
    }
}

impl fmt::Display for SpanTreeRecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SpanTreeRecordingError {}

/// Flat span as exported by the tracing layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub span_id: String,

    #[serde(default)]
    pub parent_span_id: Option<String>,

    pub name: String,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct SpanNode {
    pub span_id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub attributes: Map<String, Value>,
    duration: Duration,
    depth: usize,
    // index into the owning tree; only used for upward queries
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Span hierarchy recorded during a single task run.
///
/// Nodes live in one arena. A node owns the indices of its children, and keeps the
/// index of its parent so ancestor queries can walk upward.
#[derive(Debug, Clone, Default)]
pub struct SpanTree {
    nodes: Vec<SpanNode>,
    roots: Vec<usize>,
    index_by_id: HashMap<String, usize>,
}

impl SpanTree {
    /// Builds a tree from flat span records
    ///
    /// Records whose parent is not part of the batch become roots. Siblings are ordered
    /// by start time.
    /// # Arguments
    /// * `records` - The span records of one run, in any order
    /// # Returns
    /// The assembled tree or a TypeError for invalid intervals, duplicate ids or cycles
    pub fn from_records(records: Vec<SpanRecord>) -> Result<Self, TypeError> {
        let mut index_by_id: HashMap<String, usize> = HashMap::with_capacity(records.len());
        let mut parent_ids = Vec::with_capacity(records.len());
        let mut nodes = Vec::with_capacity(records.len());

        for record in records {
            let duration = record
                .end_time
                .signed_duration_since(record.start_time)
                .to_std()
                .map_err(|_| TypeError::InvalidSpanInterval {
                    span_id: record.span_id.clone(),
                })?;

            if index_by_id
                .insert(record.span_id.clone(), nodes.len())
                .is_some()
            {
                return Err(TypeError::DuplicateSpanId(record.span_id));
            }

            parent_ids.push(record.parent_span_id);
            nodes.push(SpanNode {
                span_id: record.span_id,
                name: record.name,
                start_time: record.start_time,
                end_time: record.end_time,
                attributes: record.attributes,
                duration,
                depth: 0,
                parent: None,
                children: Vec::new(),
            });
        }

        let mut roots = Vec::new();
        for (idx, parent_id) in parent_ids.iter().enumerate() {
            match parent_id.as_ref().and_then(|id| index_by_id.get(id)) {
                Some(&parent_idx) if parent_idx != idx => {
                    nodes[idx].parent = Some(parent_idx);
                    nodes[parent_idx].children.push(idx);
                }
                Some(_) => return Err(TypeError::SpanCycle(nodes[idx].span_id.clone())),
                None => roots.push(idx),
            }
        }

        let mut tree = SpanTree {
            nodes,
            roots,
            index_by_id,
        };
        tree.sort_by_start_time();
        tree.assign_depths()?;

        debug!(
            "Built span tree with {} spans and {} roots",
            tree.nodes.len(),
            tree.roots.len()
        );

        Ok(tree)
    }

    fn sort_by_start_time(&mut self) {
        let starts: Vec<DateTime<Utc>> = self.nodes.iter().map(|n| n.start_time).collect();
        self.roots.sort_by_key(|&idx| starts[idx]);
        for node in self.nodes.iter_mut() {
            node.children.sort_by_key(|&idx| starts[idx]);
        }
    }

    /// Sets every node's depth from the roots down; nodes that cannot be reached sit on a cycle
    fn assign_depths(&mut self) -> Result<(), TypeError> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&r| (r, 0)).collect();

        while let Some((idx, depth)) = stack.pop() {
            visited[idx] = true;
            self.nodes[idx].depth = depth;
            for &child in self.nodes[idx].children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }

        match visited.iter().position(|seen| !seen) {
            Some(idx) => Err(TypeError::SpanCycle(self.nodes[idx].span_id.clone())),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = SpanRef<'_>> + '_ {
        self.roots.iter().map(move |&index| SpanRef { tree: self, index })
    }

    /// Pre-order traversal over every span in the tree
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            tree: self,
            stack: self.roots.iter().rev().copied().collect(),
        }
    }

    pub fn get(&self, span_id: &str) -> Option<SpanRef<'_>> {
        self.index_by_id
            .get(span_id)
            .map(|&index| SpanRef { tree: self, index })
    }
}

/// Borrowed handle to one span of a tree
#[derive(Clone, Copy)]
pub struct SpanRef<'a> {
    tree: &'a SpanTree,
    index: usize,
}

impl<'a> SpanRef<'a> {
    pub fn node(&self) -> &'a SpanNode {
        &self.tree.nodes[self.index]
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn span_id(&self) -> &'a str {
        &self.node().span_id
    }

    pub fn attributes(&self) -> &'a Map<String, Value> {
        &self.node().attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&'a Value> {
        self.node().attributes.get(key)
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.node().start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.node().end_time
    }

    pub fn duration(&self) -> Duration {
        self.node().duration
    }

    /// Distance from the root; roots have depth 0
    pub fn depth(&self) -> usize {
        self.node().depth
    }

    pub fn parent(&self) -> Option<SpanRef<'a>> {
        self.node().parent.map(|index| SpanRef {
            tree: self.tree,
            index,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = SpanRef<'a>> + 'a {
        let tree = self.tree;
        tree.nodes[self.index]
            .children
            .iter()
            .map(move |&index| SpanRef { tree, index })
    }

    pub fn child_count(&self) -> usize {
        self.node().children.len()
    }

    /// Parent chain, nearest first
    pub fn ancestors(&self) -> Ancestors<'a> {
        Ancestors {
            next: self.parent(),
        }
    }

    /// Pre-order traversal of the subtree below this span, excluding the span itself
    pub fn descendants(&self) -> PreOrder<'a> {
        PreOrder {
            tree: self.tree,
            stack: self.node().children.iter().rev().copied().collect(),
        }
    }
}

impl fmt::Debug for SpanRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanRef")
            .field("span_id", &self.span_id())
            .field("name", &self.name())
            .field("depth", &self.depth())
            .finish()
    }
}

pub struct PreOrder<'a> {
    tree: &'a SpanTree,
    stack: Vec<usize>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = SpanRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.stack.pop()?;
        self.stack
            .extend(self.tree.nodes[index].children.iter().rev().copied());
        Some(SpanRef {
            tree: self.tree,
            index,
        })
    }
}

pub struct Ancestors<'a> {
    next: Option<SpanRef<'a>>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = SpanRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(id: &str, parent: Option<&str>, name: &str, start: i64, end: i64) -> SpanRecord {
        SpanRecord {
            span_id: id.to_string(),
            parent_span_id: parent.map(str::to_string),
            name: name.to_string(),
            start_time: Utc.timestamp_millis_opt(start).unwrap(),
            end_time: Utc.timestamp_millis_opt(end).unwrap(),
            attributes: Map::new(),
        }
    }

    fn sample_tree() -> SpanTree {
        // records deliberately out of order
        SpanTree::from_records(vec![
            record("3", Some("2"), "grandchild", 40, 50),
            record("2", Some("0"), "child2", 30, 60),
            record("0", None, "root", 0, 100),
            record("1", Some("0"), "child1", 10, 20),
        ])
        .unwrap()
    }

    #[test]
    fn test_pre_order_traversal() {
        let tree = sample_tree();
        let names: Vec<&str> = tree.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["root", "child1", "child2", "grandchild"]);
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.roots().count(), 1);
    }

    #[test]
    fn test_parent_links_and_depth() {
        let tree = sample_tree();
        let grandchild = tree.get("3").unwrap();
        assert_eq!(grandchild.depth(), 2);

        let ancestors: Vec<&str> = grandchild.ancestors().map(|s| s.name()).collect();
        assert_eq!(ancestors, vec!["child2", "root"]);

        let root = tree.get("0").unwrap();
        assert!(root.parent().is_none());
        assert_eq!(root.child_count(), 2);

        let descendants: Vec<&str> = root.descendants().map(|s| s.name()).collect();
        assert_eq!(descendants, vec!["child1", "child2", "grandchild"]);
    }

    #[test]
    fn test_lookup_by_id() {
        let tree = sample_tree();
        for span in tree.iter() {
            let found = tree.get(span.span_id()).unwrap();
            assert_eq!(found.name(), span.name());
        }
        assert!(tree.get("missing").is_none());
        assert!(SpanTree::default().get("0").is_none());
    }

    #[test]
    fn test_span_duration() {
        let tree = sample_tree();
        assert_eq!(tree.get("2").unwrap().duration(), Duration::from_millis(30));
    }

    #[test]
    fn test_orphans_become_roots() {
        let tree = SpanTree::from_records(vec![
            record("a", Some("missing"), "orphan", 5, 6),
            record("b", None, "root", 0, 10),
        ])
        .unwrap();
        let roots: Vec<&str> = tree.roots().map(|s| s.name()).collect();
        assert_eq!(roots, vec!["root", "orphan"]);
    }

    #[test]
    fn test_invalid_records() {
        let err = SpanTree::from_records(vec![record("a", None, "bad", 10, 5)]).unwrap_err();
        assert!(matches!(err, TypeError::InvalidSpanInterval { .. }));

        let err = SpanTree::from_records(vec![
            record("a", None, "one", 0, 1),
            record("a", None, "two", 0, 1),
        ])
        .unwrap_err();
        assert!(matches!(err, TypeError::DuplicateSpanId(_)));

        let err = SpanTree::from_records(vec![
            record("a", Some("b"), "one", 0, 1),
            record("b", Some("a"), "two", 0, 1),
        ])
        .unwrap_err();
        assert!(matches!(err, TypeError::SpanCycle(_)));
    }

    #[test]
    fn test_record_deserialization() {
        let record: SpanRecord = serde_json::from_value(json!({
            "span_id": "1",
            "name": "root",
            "start_time": "2024-01-01T00:00:00Z",
            "end_time": "2024-01-01T00:00:01Z",
            "attributes": {"key": "value"}
        }))
        .unwrap();
        assert!(record.parent_span_id.is_none());
        assert_eq!(record.attributes["key"], json!("value"));
    }
}
