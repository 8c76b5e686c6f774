//! Type inference — derives a GraphQL type lattice from a set of raw
//! documents.
//!
//! Two passes: `observe` walks every document and accumulates per-path
//! statistics; `resolve` turns the observations into inferred types,
//! applying nullability, number widening, conflict resolution and
//! nested-type extraction. Inference is pure: the same documents and
//! config always produce the same schema.

mod observe;
mod resolve;

pub use observe::{observe_documents, FieldObservation, ValueKind};

use serde::Serialize;
use store::Document;
use tracing::debug;

use crate::config::TypeSystemConfig;
use crate::error::{EngineError, EngineResult};

/// One field of an inferred type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferredField {
    pub name: String,
    /// Base GraphQL type name (`String`, `Int`, `UserProfile`, `JSON`).
    pub graphql_type: String,
    pub required: bool,
    pub is_array: bool,
    /// Set when `graphql_type` names a nested type of this schema.
    pub nested_type: Option<String>,
}

impl InferredField {
    /// Render the full SDL type reference, e.g. `[String]!` or `ID!`.
    pub fn render_type(&self) -> String {
        let base = if self.is_array {
            format!("[{}]", self.graphql_type)
        } else {
            self.graphql_type.clone()
        };
        if self.required {
            format!("{base}!")
        } else {
            base
        }
    }
}

/// An inferred object type; nested types carry their parent's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferredType {
    pub name: String,
    pub fields: Vec<InferredField>,
    pub is_nested: bool,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InferenceStats {
    pub total_documents: usize,
    pub fields_analyzed: usize,
    pub types_generated: usize,
    pub conflicts_resolved: usize,
    pub nested_types_created: usize,
}

/// The immutable output of inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferredSchema {
    pub root: InferredType,
    pub nested: Vec<InferredType>,
    pub stats: InferenceStats,
}

impl InferredSchema {
    /// Root first, then nested types in creation order.
    pub fn all_types(&self) -> impl Iterator<Item = &InferredType> {
        std::iter::once(&self.root).chain(self.nested.iter())
    }

    pub fn find_type(&self, name: &str) -> Option<&InferredType> {
        self.all_types().find(|t| t.name == name)
    }

    /// Whether any field anywhere resolved to the `JSON` scalar.
    pub fn uses_json_scalar(&self) -> bool {
        self.all_types()
            .flat_map(|t| t.fields.iter())
            .any(|f| f.graphql_type == "JSON")
    }
}

/// Infer the schema for `root_type_name` from a non-empty document set.
pub fn infer_schema(
    documents: &[Document],
    root_type_name: &str,
    config: &TypeSystemConfig,
) -> EngineResult<InferredSchema> {
    if documents.is_empty() {
        return Err(EngineError::Validation(
            "cannot infer a schema from an empty document set".into(),
        ));
    }
    let observations = observe_documents(documents, config.max_nesting_depth);
    let schema = resolve::resolve_schema(root_type_name, &observations, documents.len(), config)?;
    debug!(
        root = root_type_name,
        documents = schema.stats.total_documents,
        fields = schema.stats.fields_analyzed,
        types = schema.stats.types_generated,
        conflicts = schema.stats.conflicts_resolved,
        "Inference complete"
    );
    Ok(schema)
}
