//! Structural walk: accumulate per-path observations over a document set.

use indexmap::IndexMap;
use serde_json::{Number, Value};
use store::{document::is_system_field, Document};

use crate::sdl::naming::is_graphql_name;

/// The primitive kind of one JSON observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

/// Running statistics over observed numbers.
#[derive(Debug, Clone, Default)]
pub struct NumberStats {
    pub seen: bool,
    pub all_integers: bool,
    pub within_i32: bool,
}

impl NumberStats {
    fn observe(&mut self, number: &Number) {
        let is_integer = number.is_i64() || number.is_u64();
        let within_i32 = number
            .as_i64()
            .map(|n| i32::try_from(n).is_ok())
            .unwrap_or(false);
        if !self.seen {
            self.seen = true;
            self.all_integers = is_integer;
            self.within_i32 = within_i32;
        } else {
            self.all_integers &= is_integer;
            self.within_i32 &= within_i32;
        }
    }
}

/// Accumulated observations for one field path.
#[derive(Debug, Clone, Default)]
pub struct FieldObservation {
    /// Parents (documents or enclosing objects) in which the field
    /// appeared. Never exceeds the parent's own occurrence count.
    pub count: usize,
    /// Kind of every direct observation, nulls included.
    pub kinds: std::collections::BTreeSet<ValueKind>,
    pub numbers: NumberStats,
    /// Kinds of array elements, when arrays were observed.
    pub element_kinds: std::collections::BTreeSet<ValueKind>,
    pub element_numbers: NumberStats,
    /// Object observations (direct or as array elements); the
    /// denominator for child-field nullability.
    pub object_count: usize,
    /// Child observations for object values (and object array elements).
    pub children: IndexMap<String, FieldObservation>,
    /// An object was observed at the nesting limit; its children were
    /// not recorded.
    pub truncated: bool,
}

impl FieldObservation {
    pub fn saw_null(&self) -> bool {
        self.kinds.contains(&ValueKind::Null)
    }

    /// Kinds excluding null: what actually constrains the type.
    pub fn non_null_kinds(&self) -> Vec<ValueKind> {
        self.kinds.iter().copied().filter(|k| *k != ValueKind::Null).collect()
    }

    fn observe(&mut self, value: &Value, depth: usize, max_depth: usize) {
        self.count += 1;
        self.kinds.insert(ValueKind::of(value));
        match value {
            Value::Number(number) => self.numbers.observe(number),
            Value::Object(map) => self.observe_object(map, depth, max_depth),
            Value::Array(items) => {
                for item in items {
                    self.element_kinds.insert(ValueKind::of(item));
                    match item {
                        Value::Number(number) => self.element_numbers.observe(number),
                        Value::Object(map) => self.observe_object(map, depth, max_depth),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn observe_object(
        &mut self,
        map: &serde_json::Map<String, Value>,
        depth: usize,
        max_depth: usize,
    ) {
        self.object_count += 1;
        if depth >= max_depth {
            self.truncated = true;
            return;
        }
        for (name, value) in map {
            if !is_graphql_name(name) {
                continue;
            }
            self.children
                .entry(name.clone())
                .or_default()
                .observe(value, depth + 1, max_depth);
        }
    }
}

/// Walk every document, producing insertion-ordered observations for the
/// top-level fields. System fields and names that are not legal GraphQL
/// names are skipped.
pub fn observe_documents(
    documents: &[Document],
    max_depth: usize,
) -> IndexMap<String, FieldObservation> {
    let mut observations: IndexMap<String, FieldObservation> = IndexMap::new();
    for document in documents {
        for (name, value) in document {
            if is_system_field(name) || !is_graphql_name(name) {
                continue;
            }
            observations
                .entry(name.clone())
                .or_default()
                .observe(value, 1, max_depth);
        }
    }
    observations
}
