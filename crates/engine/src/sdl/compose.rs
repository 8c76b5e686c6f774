//! Deterministic SDL emission.
//!
//! Field order inside every type is the inferred insertion order;
//! bindings are emitted in configuration order. Two builds over the same
//! inferred schemas produce byte-identical SDL.

use std::sync::Arc;

use crate::binding::ContainerBinding;
use crate::config::OperationKind;
use crate::infer::{InferredField, InferredType};

/// SDL type reference for a field inside a CRUD input: nested object
/// types have no generated input-object counterpart and collapse to the
/// `JSON` scalar.
pub fn input_type_for(field: &InferredField) -> String {
    let base = if field.nested_type.is_some() || field.graphql_type == "JSON" {
        "JSON".to_string()
    } else {
        field.graphql_type.clone()
    };
    let wrapped = if field.is_array { format!("[{base}]") } else { base };
    if field.required {
        format!("{wrapped}!")
    } else {
        wrapped
    }
}

/// Whether a field participates in WHERE filtering (scalar, non-array).
pub fn is_filterable(field: &InferredField) -> bool {
    !field.is_array
        && field.nested_type.is_none()
        && matches!(field.graphql_type.as_str(), "ID" | "String" | "Int" | "Float" | "Boolean")
}

fn binding_uses_json(binding: &ContainerBinding) -> bool {
    if binding.schema.uses_json_scalar() {
        return true;
    }
    let ops = &binding.operations;
    // Patch-style mutations take JSON input.
    if [
        OperationKind::Update,
        OperationKind::Replace,
        OperationKind::UpdateMany,
    ]
    .iter()
    .any(|op| ops.enabled(*op))
    {
        return true;
    }
    // Create-style inputs collapse nested types to JSON.
    let has_nested_input = binding
        .schema
        .root
        .fields
        .iter()
        .any(|f| f.nested_type.is_some());
    has_nested_input
        && [OperationKind::Create, OperationKind::CreateMany, OperationKind::Upsert]
            .iter()
            .any(|op| ops.enabled(*op))
}

fn emit_object_type(out: &mut String, ty: &InferredType) {
    out.push_str(&format!("type {} {{\n", ty.name));
    for field in &ty.fields {
        out.push_str(&format!("  {}: {}\n", field.name, field.render_type()));
    }
    out.push_str("}\n\n");
}

fn emit_result_type(out: &mut String, binding: &ContainerBinding) {
    out.push_str(&format!(
        "type {} {{\n  data: {}\n  etag: String!\n}}\n\n",
        binding.result_type(),
        binding.type_name
    ));
}

fn emit_where_inputs(out: &mut String, binding: &ContainerBinding) {
    out.push_str(&format!("input {}WhereOperators {{\n", binding.type_name));
    for op in ["eq", "ne", "gt", "lt", "contains"] {
        out.push_str(&format!("  {op}: String\n"));
    }
    out.push_str("}\n\n");

    out.push_str(&format!("input {}WhereInput {{\n", binding.type_name));
    for field in binding.schema.root.fields.iter().filter(|f| is_filterable(f)) {
        out.push_str(&format!("  {}: {}WhereOperators\n", field.name, binding.type_name));
    }
    out.push_str("}\n\n");
}

fn emit_connection_type(out: &mut String, binding: &ContainerBinding) {
    out.push_str(&format!(
        "type {} {{\n  items: [{}!]!\n  continuationToken: String\n  hasMore: Boolean!\n}}\n\n",
        binding.connection_type(),
        binding.type_name
    ));
}

fn emit_crud_input(out: &mut String, binding: &ContainerBinding) {
    out.push_str(&format!("input {}Input {{\n", binding.type_name));
    for field in &binding.schema.root.fields {
        // The identifier is server-assigned or caller-supplied out of
        // band; system fields never appear in inferred types.
        if field.graphql_type == "ID" && field.name == "id" {
            continue;
        }
        out.push_str(&format!("  {}: {}\n", field.name, input_type_for(field)));
    }
    out.push_str("}\n\n");
}

fn emit_write_payload(out: &mut String, name: &str, type_name: &str, was_created: bool) {
    out.push_str(&format!("type {name} {{\n  data: {type_name}!\n  etag: String!\n  requestCharge: Float!\n"));
    if was_created {
        out.push_str("  wasCreated: Boolean!\n");
    }
    out.push_str("}\n\n");
}

fn emit_mutation_support_types(out: &mut String, binding: &ContainerBinding) {
    let t = &binding.type_name;
    let ops = &binding.operations;
    let enabled = |op| ops.enabled(op);

    if enabled(OperationKind::Create) {
        emit_write_payload(out, &format!("Create{t}Payload"), t, false);
    }
    if enabled(OperationKind::Update)
        || enabled(OperationKind::Increment)
        || enabled(OperationKind::Decrement)
    {
        emit_write_payload(out, &format!("Update{t}Payload"), t, false);
    }
    if enabled(OperationKind::Replace) {
        emit_write_payload(out, &format!("Replace{t}Payload"), t, false);
    }
    if enabled(OperationKind::Upsert) {
        emit_write_payload(out, &format!("Upsert{t}Payload"), t, true);
    }
    if enabled(OperationKind::Delete) {
        out.push_str(&format!(
            "type Delete{t}Payload {{\n  id: ID!\n  requestCharge: Float!\n}}\n\n"
        ));
    }
    if enabled(OperationKind::SoftDelete) {
        emit_write_payload(out, &format!("SoftDelete{t}Payload"), t, false);
    }
    if enabled(OperationKind::Restore) {
        emit_write_payload(out, &format!("Restore{t}Payload"), t, false);
    }

    let any_bulk = enabled(OperationKind::CreateMany)
        || enabled(OperationKind::UpdateMany)
        || enabled(OperationKind::DeleteMany);
    if any_bulk {
        out.push_str(&format!(
            "type {t}BulkItemResult {{\n  id: ID\n  success: Boolean!\n  error: String\n  etag: String\n}}\n\n"
        ));
        out.push_str(&format!(
            "type {t}BulkPayload {{\n  successCount: Int!\n  failureCount: Int!\n  results: [{t}BulkItemResult!]!\n}}\n\n"
        ));
    }
    if enabled(OperationKind::UpdateMany) {
        out.push_str(&format!(
            "input Update{t}ManyInput {{\n  id: ID!\n  partitionKey: String\n  input: JSON!\n  etag: String\n}}\n\n"
        ));
    }
    if enabled(OperationKind::DeleteMany) {
        out.push_str(&format!(
            "input Delete{t}ManyInput {{\n  id: ID!\n  partitionKey: String\n  etag: String\n}}\n\n"
        ));
    }

    if enabled(OperationKind::Create)
        || enabled(OperationKind::CreateMany)
        || enabled(OperationKind::Upsert)
    {
        emit_crud_input(out, binding);
    }
}

fn emit_query_root(out: &mut String, bindings: &[Arc<ContainerBinding>]) {
    out.push_str("type Query {\n");
    for binding in bindings {
        out.push_str(&format!(
            "  {}(id: ID!, partitionKey: String, ifNoneMatch: String): {}\n",
            binding.point_field(),
            binding.result_type()
        ));
        out.push_str(&format!(
            "  {}(limit: Int = 100, partitionKey: String, continuationToken: String, orderBy: String, orderDirection: OrderDirection = ASC, where: {}WhereInput): {}!\n",
            binding.list_field(),
            binding.type_name,
            binding.connection_type()
        ));
    }
    out.push_str("}\n");
}

fn mutation_signature(binding: &ContainerBinding, op: OperationKind) -> String {
    let t = &binding.type_name;
    let field = binding.mutation_field(op);
    match op {
        OperationKind::Create => format!("{field}(input: {t}Input!): Create{t}Payload!"),
        OperationKind::Update => format!(
            "{field}(id: ID!, partitionKey: String, input: JSON!, etag: String): Update{t}Payload!"
        ),
        OperationKind::Replace => format!(
            "{field}(id: ID!, partitionKey: String, input: JSON!, etag: String): Replace{t}Payload!"
        ),
        OperationKind::Upsert => {
            format!("{field}(id: ID!, partitionKey: String, input: {t}Input!): Upsert{t}Payload!")
        }
        OperationKind::Delete => {
            format!("{field}(id: ID!, partitionKey: String, etag: String): Delete{t}Payload!")
        }
        OperationKind::SoftDelete => format!(
            "{field}(id: ID!, partitionKey: String, etag: String, deleteReason: String, deletedBy: String): SoftDelete{t}Payload!"
        ),
        OperationKind::Restore => {
            format!("{field}(id: ID!, partitionKey: String, etag: String): Restore{t}Payload!")
        }
        OperationKind::CreateMany => {
            format!("{field}(inputs: [{t}Input!]!): {t}BulkPayload!")
        }
        OperationKind::UpdateMany => {
            format!("{field}(inputs: [Update{t}ManyInput!]!): {t}BulkPayload!")
        }
        OperationKind::DeleteMany => {
            format!("{field}(inputs: [Delete{t}ManyInput!]!): {t}BulkPayload!")
        }
        OperationKind::Increment | OperationKind::Decrement => format!(
            "{field}(id: ID!, partitionKey: String, field: String!, by: Float = 1, etag: String): Update{t}Payload!"
        ),
    }
}

fn emit_mutation_root(out: &mut String, bindings: &[Arc<ContainerBinding>]) {
    let mut lines = Vec::new();
    for binding in bindings {
        for op in binding.enabled_operations() {
            lines.push(format!("  {}\n", mutation_signature(binding, op)));
        }
    }
    if lines.is_empty() {
        return;
    }
    out.push_str("\ntype Mutation {\n");
    for line in lines {
        out.push_str(&line);
    }
    out.push_str("}\n");
}

/// Compose the SDL document for all bindings.
pub fn compose_sdl(bindings: &[Arc<ContainerBinding>]) -> String {
    let mut out = String::new();

    if bindings.iter().any(|binding| binding_uses_json(binding)) {
        out.push_str("scalar JSON\n\n");
    }
    out.push_str("enum OrderDirection {\n  ASC\n  DESC\n}\n\n");

    for binding in bindings {
        for ty in binding.schema.all_types() {
            emit_object_type(&mut out, ty);
        }
        emit_result_type(&mut out, binding);
        emit_where_inputs(&mut out, binding);
        emit_connection_type(&mut out, binding);
        emit_mutation_support_types(&mut out, binding);
    }

    emit_query_root(&mut out, bindings);
    emit_mutation_root(&mut out, bindings);
    out
}
