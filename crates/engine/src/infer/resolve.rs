//! Resolution pass: observations → inferred types.

use indexmap::IndexMap;

use crate::config::{ConflictResolution, NestedTypeFallback, NumberInference, TypeSystemConfig};
use crate::error::{EngineError, EngineResult};
use crate::sdl::naming::capitalize;

use super::observe::{FieldObservation, NumberStats, ValueKind};
use super::{InferenceStats, InferredField, InferredSchema, InferredType};

/// Identifier-shaped field names eligible for the `ID` scalar.
fn is_identifier_name(name: &str) -> bool {
    matches!(name, "id" | "_id" | "uuid") || name.ends_with("Id") || name.ends_with("ID")
}

struct Resolution<'a> {
    config: &'a TypeSystemConfig,
    nested: Vec<InferredType>,
    stats: InferenceStats,
}

pub fn resolve_schema(
    root_name: &str,
    observations: &IndexMap<String, FieldObservation>,
    total_documents: usize,
    config: &TypeSystemConfig,
) -> EngineResult<InferredSchema> {
    let mut resolution = Resolution {
        config,
        nested: Vec::new(),
        stats: InferenceStats { total_documents, ..InferenceStats::default() },
    };
    let fields = resolution.resolve_fields(root_name, "", observations, total_documents)?;
    let root = InferredType {
        name: root_name.to_string(),
        fields,
        is_nested: false,
        parent: None,
    };
    resolution.stats.types_generated = 1 + resolution.nested.len();
    resolution.stats.nested_types_created = resolution.nested.len();
    Ok(InferredSchema { root, nested: resolution.nested, stats: resolution.stats })
}

impl Resolution<'_> {
    fn resolve_fields(
        &mut self,
        type_name: &str,
        path_prefix: &str,
        observations: &IndexMap<String, FieldObservation>,
        parent_count: usize,
    ) -> EngineResult<Vec<InferredField>> {
        let mut fields = Vec::with_capacity(observations.len());
        for (name, observation) in observations {
            let path = if path_prefix.is_empty() {
                name.clone()
            } else {
                format!("{path_prefix}.{name}")
            };
            fields.push(self.resolve_field(type_name, name, &path, observation, parent_count)?);
        }
        Ok(fields)
    }

    fn resolve_field(
        &mut self,
        type_name: &str,
        name: &str,
        path: &str,
        observation: &FieldObservation,
        parent_count: usize,
    ) -> EngineResult<InferredField> {
        self.stats.fields_analyzed += 1;
        let required = parent_count > 0
            && observation.count as f64 / parent_count as f64 >= self.config.required_threshold
            && !observation.saw_null();
        let non_null = observation.non_null_kinds();

        // Observed only as null (or never): unconstrained, optional.
        if non_null.is_empty() {
            return Ok(optional_scalar(name, "String"));
        }

        // Every non-null observation was an array.
        if non_null == [ValueKind::Array] {
            return self.resolve_array(type_name, name, path, observation, required);
        }

        if non_null.len() > 1 {
            let graphql_type = self.resolve_conflict(path, &non_null)?;
            return Ok(InferredField {
                name: name.to_string(),
                graphql_type,
                required,
                is_array: false,
                nested_type: None,
            });
        }

        let field = match non_null[0] {
            ValueKind::Bool => scalar(name, "Boolean", required),
            ValueKind::Number => {
                scalar(name, self.widen_number(&observation.numbers), required)
            }
            ValueKind::String => {
                let graphql_type = if required && is_identifier_name(name) { "ID" } else { "String" };
                scalar(name, graphql_type, required)
            }
            ValueKind::Object => {
                self.resolve_object(type_name, name, path, observation, required, false)?
            }
            ValueKind::Array | ValueKind::Null => unreachable!("handled above"),
        };
        Ok(field)
    }

    fn resolve_array(
        &mut self,
        type_name: &str,
        name: &str,
        path: &str,
        observation: &FieldObservation,
        required: bool,
    ) -> EngineResult<InferredField> {
        let elements: Vec<ValueKind> = observation
            .element_kinds
            .iter()
            .copied()
            .filter(|k| *k != ValueKind::Null)
            .collect();

        if elements.is_empty() {
            // No constraining elements observed.
            return Ok(InferredField {
                name: name.to_string(),
                graphql_type: "String".to_string(),
                required,
                is_array: true,
                nested_type: None,
            });
        }
        if elements.len() > 1 {
            let graphql_type = self.resolve_conflict(&format!("{path}[]"), &elements)?;
            return Ok(InferredField {
                name: name.to_string(),
                graphql_type,
                required,
                is_array: true,
                nested_type: None,
            });
        }
        let field = match elements[0] {
            ValueKind::Bool => array_of(name, "Boolean", required),
            ValueKind::Number => {
                array_of(name, self.widen_number(&observation.element_numbers), required)
            }
            ValueKind::String => array_of(name, "String", required),
            ValueKind::Object => {
                self.resolve_object(type_name, name, path, observation, required, true)?
            }
            // Arrays of arrays have no SDL shape here; keep them opaque.
            ValueKind::Array => array_of(name, "JSON", required),
            ValueKind::Null => unreachable!("nulls filtered"),
        };
        Ok(field)
    }

    fn resolve_object(
        &mut self,
        type_name: &str,
        name: &str,
        path: &str,
        observation: &FieldObservation,
        required: bool,
        is_array: bool,
    ) -> EngineResult<InferredField> {
        if observation.truncated || observation.children.is_empty() {
            return Ok(InferredField {
                name: name.to_string(),
                graphql_type: "JSON".to_string(),
                required,
                is_array,
                nested_type: None,
            });
        }
        let nested_name = format!("{type_name}{}", capitalize(name));
        // Reserve the slot so parents precede their own nested types.
        let index = self.nested.len();
        let fields = self.resolve_fields(
            &nested_name,
            path,
            &observation.children,
            observation.object_count.max(1),
        )?;
        self.nested.insert(
            index,
            InferredType {
                name: nested_name.clone(),
                fields,
                is_nested: true,
                parent: Some(type_name.to_string()),
            },
        );
        Ok(InferredField {
            name: name.to_string(),
            graphql_type: nested_name.clone(),
            required,
            is_array,
            nested_type: Some(nested_name),
        })
    }

    /// Collapse a multi-kind observation set, or raise when configured
    /// to fail on conflicts.
    fn resolve_conflict(&mut self, path: &str, kinds: &[ValueKind]) -> EngineResult<String> {
        if self.config.conflict_resolution == ConflictResolution::Error {
            let kinds = kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ");
            return Err(EngineError::TypeConflict { path: path.to_string(), kinds });
        }
        self.stats.conflicts_resolved += 1;
        let fallback = if kinds.contains(&ValueKind::Object) {
            match self.config.nested_type_fallback {
                NestedTypeFallback::Json => "JSON",
                NestedTypeFallback::String => "String",
            }
        } else {
            // Everything is string-representable.
            "String"
        };
        Ok(fallback.to_string())
    }

    fn widen_number(&self, stats: &NumberStats) -> &'static str {
        if self.config.number_inference == NumberInference::Strict
            && stats.seen
            && stats.all_integers
            && stats.within_i32
        {
            "Int"
        } else {
            "Float"
        }
    }
}

fn scalar(name: &str, graphql_type: &str, required: bool) -> InferredField {
    InferredField {
        name: name.to_string(),
        graphql_type: graphql_type.to_string(),
        required,
        is_array: false,
        nested_type: None,
    }
}

fn optional_scalar(name: &str, graphql_type: &str) -> InferredField {
    scalar(name, graphql_type, false)
}

fn array_of(name: &str, graphql_type: &str, required: bool) -> InferredField {
    InferredField {
        name: name.to_string(),
        graphql_type: graphql_type.to_string(),
        required,
        is_array: true,
        nested_type: None,
    }
}
