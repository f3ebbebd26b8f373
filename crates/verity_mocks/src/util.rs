use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Map, Value};
use verity_types::trace::{SpanRecord, SpanTree};

/// Builds span records on a fixed clock so fixtures are deterministic
pub struct SpanBuilder {
    base_time: DateTime<Utc>,
    next_span_id: u32,
}

impl Default for SpanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpanBuilder {
    pub fn new() -> Self {
        Self {
            base_time: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
            next_span_id: 0,
        }
    }

    fn next_id(&mut self) -> String {
        let id = format!("span_{}", self.next_span_id);
        self.next_span_id += 1;
        id
    }

    /// Span starting `offset_ms` after the builder's base time
    pub fn create_span(
        &mut self,
        name: impl Into<String>,
        parent_id: Option<&str>,
        offset_ms: i64,
        duration_ms: i64,
    ) -> SpanRecord {
        let start_time = self.base_time + Duration::milliseconds(offset_ms);
        let end_time = start_time + Duration::milliseconds(duration_ms);

        SpanRecord {
            span_id: self.next_id(),
            parent_span_id: parent_id.map(str::to_string),
            name: name.into(),
            start_time,
            end_time,
            attributes: Map::new(),
        }
    }

    pub fn with_attributes(mut span: SpanRecord, attrs: Vec<(&str, Value)>) -> SpanRecord {
        span.attributes
            .extend(attrs.into_iter().map(|(k, v)| (k.to_string(), v)));
        span
    }
}

/// Assembles fixture records into a tree. Panics on malformed fixtures.
pub fn build_tree(records: Vec<SpanRecord>) -> SpanTree {
    SpanTree::from_records(records).expect("fixture spans should form a valid tree")
}

/// root -> {child1 (key=value), child2 -> grandchild (nested=true)}
pub fn create_simple_trace() -> Vec<SpanRecord> {
    let mut builder = SpanBuilder::new();

    let root = builder.create_span("root", None, 0, 100);
    let child1 = SpanBuilder::with_attributes(
        builder.create_span("child1", Some("span_0"), 10, 20),
        vec![("key", json!("value"))],
    );
    let child2 = builder.create_span("child2", Some("span_0"), 40, 50);
    let grandchild = SpanBuilder::with_attributes(
        builder.create_span("grandchild", Some("span_2"), 50, 30),
        vec![("nested", json!(true))],
    );

    vec![root, child1, child2, grandchild]
}

/// init -> process -> {db_query, finalize}
pub fn create_nested_trace() -> Vec<SpanRecord> {
    let mut builder = SpanBuilder::new();

    vec![
        builder.create_span("init", None, 0, 300),
        builder.create_span("process", Some("span_0"), 50, 200),
        builder.create_span("db_query", Some("span_1"), 60, 100),
        builder.create_span("finalize", Some("span_1"), 180, 50),
    ]
}

pub fn create_trace_with_attributes() -> Vec<SpanRecord> {
    let mut builder = SpanBuilder::new();

    let root = SpanBuilder::with_attributes(
        builder.create_span("root", None, 0, 150),
        vec![
            ("http.method", json!("POST")),
            ("http.status_code", json!(200)),
            ("http.url", json!("https://api.example.com/users")),
        ],
    );

    let api_call = SpanBuilder::with_attributes(
        builder.create_span("api_call", Some("span_0"), 20, 100),
        vec![
            ("model", json!("gpt-4")),
            ("tokens.input", json!(150)),
            ("tokens.output", json!(300)),
            ("cost", json!(0.045)),
            ("response", json!({"success": true, "data": {"id": 12345}})),
        ],
    );

    vec![root, api_call]
}

/// Single chain alternating tool calls and agent runs
pub fn create_sequence_pattern_trace() -> Vec<SpanRecord> {
    let mut builder = SpanBuilder::new();

    vec![
        builder.create_span("start", None, 0, 600),
        builder.create_span("call_tool", Some("span_0"), 10, 500),
        builder.create_span("run_agent", Some("span_1"), 20, 400),
        builder.create_span("call_tool", Some("span_2"), 30, 300),
        builder.create_span("run_agent", Some("span_3"), 40, 200),
        builder.create_span("finish", Some("span_4"), 50, 30),
    ]
}
