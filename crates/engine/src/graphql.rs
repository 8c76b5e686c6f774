//! Executable-schema wiring.
//!
//! Mirrors the composed SDL as an `async_graphql::dynamic::Schema`:
//! object types resolve their fields by projection from the parent JSON
//! value, and the `Query`/`Mutation` roots delegate to the typed
//! [`ResolverMap`]. The host runtime executes the schema; this module
//! only binds it.

use std::sync::Arc;

use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Object,
    ResolverContext, Scalar, Schema, TypeRef,
};
use async_graphql::{Name, Value as GqlValue};

use crate::binding::ContainerBinding;
use crate::config::OperationKind;
use crate::error::{EngineError, EngineResult};
use crate::infer::{InferredField, InferredType};
use crate::resolver::{Resolve, ResolverArgs, ResolverMap};
use crate::sdl::{input_type_for, is_filterable};

fn type_ref(base: &str, is_array: bool, required: bool) -> TypeRef {
    match (is_array, required) {
        (false, false) => TypeRef::named(base),
        (false, true) => TypeRef::named_nn(base),
        (true, false) => TypeRef::named_list(base),
        (true, true) => TypeRef::named_list_nn(base),
    }
}

fn field_type_ref(field: &InferredField) -> TypeRef {
    type_ref(&field.graphql_type, field.is_array, field.required)
}

/// Parse an SDL-style reference produced by [`input_type_for`]
/// (`JSON`, `Float`, `[String]`, `[JSON]!`) into a `TypeRef`.
fn type_ref_from_rendered(rendered: &str) -> TypeRef {
    let (body, outer_required) = match rendered.strip_suffix('!') {
        Some(body) => (body, true),
        None => (rendered, false),
    };
    match body.strip_prefix('[').and_then(|b| b.strip_suffix(']')) {
        Some(inner) => {
            let (name, inner_required) = match inner.strip_suffix('!') {
                Some(name) => (name, true),
                None => (inner, false),
            };
            match (inner_required, outer_required) {
                (false, false) => TypeRef::named_list(name),
                (false, true) => TypeRef::named_list_nn(name),
                (true, false) => TypeRef::named_nn_list(name),
                (true, true) => TypeRef::named_nn_list_nn(name),
            }
        }
        None => type_ref(body, false, outer_required),
    }
}

/// Resolve a field by name from the parent JSON object; absent members
/// resolve to null.
fn projection_field(name: &str, ty: TypeRef) -> Field {
    let key = name.to_string();
    Field::new(name, ty, move |ctx| {
        let key = key.clone();
        FieldFuture::new(async move {
            match ctx.parent_value.as_value() {
                Some(GqlValue::Object(map)) => Ok(map.get(key.as_str()).cloned()),
                _ => Ok(None),
            }
        })
    })
}

/// Convert the GraphQL arguments of one call into the JSON map the
/// resolver surface expects.
fn arguments_to_json(ctx: &ResolverContext<'_>) -> async_graphql::Result<ResolverArgs> {
    let mut args = ResolverArgs::new();
    for (name, accessor) in ctx.args.iter() {
        let value: serde_json::Value = accessor.deserialize()?;
        args.insert(name.to_string(), value);
    }
    Ok(args)
}

/// A root field delegating to one resolver.
fn root_field(name: &str, ty: TypeRef, resolver: Arc<dyn Resolve>) -> Field {
    Field::new(name, ty, move |ctx| {
        let resolver = resolver.clone();
        FieldFuture::new(async move {
            let args = arguments_to_json(&ctx)?;
            let result = resolver.resolve(args).await.map_err(|err| err.extend())?;
            let value = GqlValue::from_json(result)
                .map_err(|err| async_graphql::Error::new(format!("result encoding failed: {err}")))?;
            Ok(Some(FieldValue::value(value)))
        })
    })
}

fn object_from_inferred(ty: &InferredType) -> Object {
    let mut object = Object::new(&ty.name);
    for field in &ty.fields {
        object = object.field(projection_field(&field.name, field_type_ref(field)));
    }
    object
}

/// `{data, etag, requestCharge[, wasCreated]}` payload object.
fn write_payload_object(name: String, type_name: &str, was_created: bool) -> Object {
    let mut object = Object::new(name)
        .field(projection_field("data", TypeRef::named_nn(type_name)))
        .field(projection_field("etag", TypeRef::named_nn(TypeRef::STRING)))
        .field(projection_field("requestCharge", TypeRef::named_nn(TypeRef::FLOAT)));
    if was_created {
        object = object.field(projection_field("wasCreated", TypeRef::named_nn(TypeRef::BOOLEAN)));
    }
    object
}

struct SchemaParts {
    objects: Vec<Object>,
    inputs: Vec<InputObject>,
    query_fields: Vec<Field>,
    mutation_fields: Vec<Field>,
    uses_json: bool,
}

fn binding_parts(
    binding: &Arc<ContainerBinding>,
    resolvers: &ResolverMap,
) -> EngineResult<SchemaParts> {
    let t = binding.type_name.clone();
    let mut parts = SchemaParts {
        objects: Vec::new(),
        inputs: Vec::new(),
        query_fields: Vec::new(),
        mutation_fields: Vec::new(),
        uses_json: binding.schema.uses_json_scalar(),
    };

    // Inferred object types.
    for ty in binding.schema.all_types() {
        parts.objects.push(object_from_inferred(ty));
    }

    // Read result and connection.
    parts.objects.push(
        Object::new(binding.result_type())
            .field(projection_field("data", TypeRef::named(t.as_str())))
            .field(projection_field("etag", TypeRef::named_nn(TypeRef::STRING))),
    );
    parts.objects.push(
        Object::new(binding.connection_type())
            .field(projection_field("items", TypeRef::named_nn_list_nn(t.as_str())))
            .field(projection_field("continuationToken", TypeRef::named(TypeRef::STRING)))
            .field(projection_field("hasMore", TypeRef::named_nn(TypeRef::BOOLEAN))),
    );

    // Filter inputs.
    let mut where_operators = InputObject::new(format!("{t}WhereOperators"));
    for op in ["eq", "ne", "gt", "lt", "contains"] {
        where_operators =
            where_operators.field(InputValue::new(op, TypeRef::named(TypeRef::STRING)));
    }
    parts.inputs.push(where_operators);
    let mut where_input = InputObject::new(format!("{t}WhereInput"));
    for field in binding.schema.root.fields.iter().filter(|f| is_filterable(f)) {
        where_input = where_input.field(InputValue::new(
            &field.name,
            TypeRef::named(format!("{t}WhereOperators")),
        ));
    }
    parts.inputs.push(where_input);

    // Query root fields.
    let missing = |root: &str, field: &str| {
        EngineError::Configuration(format!("resolver missing for {root}.{field}"))
    };
    let point = resolvers
        .get("Query", &binding.point_field())
        .ok_or_else(|| missing("Query", &binding.point_field()))?;
    parts.query_fields.push(
        root_field(&binding.point_field(), TypeRef::named(binding.result_type()), point)
            .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
            .argument(InputValue::new("partitionKey", TypeRef::named(TypeRef::STRING)))
            .argument(InputValue::new("ifNoneMatch", TypeRef::named(TypeRef::STRING))),
    );
    let list = resolvers
        .get("Query", &binding.list_field())
        .ok_or_else(|| missing("Query", &binding.list_field()))?;
    parts.query_fields.push(
        root_field(&binding.list_field(), TypeRef::named_nn(binding.connection_type()), list)
            .argument(
                InputValue::new("limit", TypeRef::named(TypeRef::INT))
                    .default_value(GqlValue::from(100)),
            )
            .argument(InputValue::new("partitionKey", TypeRef::named(TypeRef::STRING)))
            .argument(InputValue::new("continuationToken", TypeRef::named(TypeRef::STRING)))
            .argument(InputValue::new("orderBy", TypeRef::named(TypeRef::STRING)))
            .argument(
                InputValue::new("orderDirection", TypeRef::named("OrderDirection"))
                    .default_value(GqlValue::Enum(Name::new("ASC"))),
            )
            .argument(InputValue::new("where", TypeRef::named(format!("{t}WhereInput")))),
    );

    // Mutation payloads, inputs and root fields.
    let enabled = binding.enabled_operations();
    let has = |op: OperationKind| enabled.contains(&op);

    if has(OperationKind::Create) {
        parts.objects.push(write_payload_object(format!("Create{t}Payload"), &t, false));
    }
    if has(OperationKind::Update) || has(OperationKind::Increment) || has(OperationKind::Decrement)
    {
        parts.objects.push(write_payload_object(format!("Update{t}Payload"), &t, false));
    }
    if has(OperationKind::Replace) {
        parts.objects.push(write_payload_object(format!("Replace{t}Payload"), &t, false));
    }
    if has(OperationKind::Upsert) {
        parts.objects.push(write_payload_object(format!("Upsert{t}Payload"), &t, true));
    }
    if has(OperationKind::Delete) {
        parts.objects.push(
            Object::new(format!("Delete{t}Payload"))
                .field(projection_field("id", TypeRef::named_nn(TypeRef::ID)))
                .field(projection_field("requestCharge", TypeRef::named_nn(TypeRef::FLOAT))),
        );
    }
    if has(OperationKind::SoftDelete) {
        parts.objects.push(write_payload_object(format!("SoftDelete{t}Payload"), &t, false));
    }
    if has(OperationKind::Restore) {
        parts.objects.push(write_payload_object(format!("Restore{t}Payload"), &t, false));
    }
    let any_bulk = has(OperationKind::CreateMany)
        || has(OperationKind::UpdateMany)
        || has(OperationKind::DeleteMany);
    if any_bulk {
        parts.objects.push(
            Object::new(format!("{t}BulkItemResult"))
                .field(projection_field("id", TypeRef::named(TypeRef::ID)))
                .field(projection_field("success", TypeRef::named_nn(TypeRef::BOOLEAN)))
                .field(projection_field("error", TypeRef::named(TypeRef::STRING)))
                .field(projection_field("etag", TypeRef::named(TypeRef::STRING))),
        );
        parts.objects.push(
            Object::new(format!("{t}BulkPayload"))
                .field(projection_field("successCount", TypeRef::named_nn(TypeRef::INT)))
                .field(projection_field("failureCount", TypeRef::named_nn(TypeRef::INT)))
                .field(projection_field(
                    "results",
                    TypeRef::named_nn_list_nn(format!("{t}BulkItemResult")),
                )),
        );
    }
    if has(OperationKind::UpdateMany) {
        parts.inputs.push(
            InputObject::new(format!("Update{t}ManyInput"))
                .field(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
                .field(InputValue::new("partitionKey", TypeRef::named(TypeRef::STRING)))
                .field(InputValue::new("input", TypeRef::named_nn("JSON")))
                .field(InputValue::new("etag", TypeRef::named(TypeRef::STRING))),
        );
        parts.uses_json = true;
    }
    if has(OperationKind::DeleteMany) {
        parts.inputs.push(
            InputObject::new(format!("Delete{t}ManyInput"))
                .field(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
                .field(InputValue::new("partitionKey", TypeRef::named(TypeRef::STRING)))
                .field(InputValue::new("etag", TypeRef::named(TypeRef::STRING))),
        );
    }
    if has(OperationKind::Create) || has(OperationKind::CreateMany) || has(OperationKind::Upsert) {
        let mut input = InputObject::new(format!("{t}Input"));
        for field in &binding.schema.root.fields {
            if field.graphql_type == "ID" && field.name == "id" {
                continue;
            }
            let rendered = input_type_for(field);
            if rendered.contains("JSON") {
                parts.uses_json = true;
            }
            input = input.field(InputValue::new(&field.name, type_ref_from_rendered(&rendered)));
        }
        parts.inputs.push(input);
    }
    if has(OperationKind::Update) || has(OperationKind::Replace) {
        parts.uses_json = true;
    }

    for op in enabled {
        let field_name = binding.mutation_field(op);
        let resolver = resolvers
            .get("Mutation", &field_name)
            .ok_or_else(|| missing("Mutation", &field_name))?;
        let field = match op {
            OperationKind::Create => {
                root_field(&field_name, TypeRef::named_nn(format!("Create{t}Payload")), resolver)
                    .argument(InputValue::new("input", TypeRef::named_nn(format!("{t}Input"))))
            }
            OperationKind::Update | OperationKind::Replace => {
                let payload = match op {
                    OperationKind::Update => format!("Update{t}Payload"),
                    _ => format!("Replace{t}Payload"),
                };
                root_field(&field_name, TypeRef::named_nn(payload), resolver)
                    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
                    .argument(InputValue::new("partitionKey", TypeRef::named(TypeRef::STRING)))
                    .argument(InputValue::new("input", TypeRef::named_nn("JSON")))
                    .argument(InputValue::new("etag", TypeRef::named(TypeRef::STRING)))
            }
            OperationKind::Upsert => {
                root_field(&field_name, TypeRef::named_nn(format!("Upsert{t}Payload")), resolver)
                    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
                    .argument(InputValue::new("partitionKey", TypeRef::named(TypeRef::STRING)))
                    .argument(InputValue::new("input", TypeRef::named_nn(format!("{t}Input"))))
            }
            OperationKind::Delete => {
                root_field(&field_name, TypeRef::named_nn(format!("Delete{t}Payload")), resolver)
                    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
                    .argument(InputValue::new("partitionKey", TypeRef::named(TypeRef::STRING)))
                    .argument(InputValue::new("etag", TypeRef::named(TypeRef::STRING)))
            }
            OperationKind::SoftDelete => {
                root_field(&field_name, TypeRef::named_nn(format!("SoftDelete{t}Payload")), resolver)
                    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
                    .argument(InputValue::new("partitionKey", TypeRef::named(TypeRef::STRING)))
                    .argument(InputValue::new("etag", TypeRef::named(TypeRef::STRING)))
                    .argument(InputValue::new("deleteReason", TypeRef::named(TypeRef::STRING)))
                    .argument(InputValue::new("deletedBy", TypeRef::named(TypeRef::STRING)))
            }
            OperationKind::Restore => {
                root_field(&field_name, TypeRef::named_nn(format!("Restore{t}Payload")), resolver)
                    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
                    .argument(InputValue::new("partitionKey", TypeRef::named(TypeRef::STRING)))
                    .argument(InputValue::new("etag", TypeRef::named(TypeRef::STRING)))
            }
            OperationKind::CreateMany => {
                root_field(&field_name, TypeRef::named_nn(format!("{t}BulkPayload")), resolver)
                    .argument(InputValue::new(
                        "inputs",
                        TypeRef::named_nn_list_nn(format!("{t}Input")),
                    ))
            }
            OperationKind::UpdateMany => {
                root_field(&field_name, TypeRef::named_nn(format!("{t}BulkPayload")), resolver)
                    .argument(InputValue::new(
                        "inputs",
                        TypeRef::named_nn_list_nn(format!("Update{t}ManyInput")),
                    ))
            }
            OperationKind::DeleteMany => {
                root_field(&field_name, TypeRef::named_nn(format!("{t}BulkPayload")), resolver)
                    .argument(InputValue::new(
                        "inputs",
                        TypeRef::named_nn_list_nn(format!("Delete{t}ManyInput")),
                    ))
            }
            OperationKind::Increment | OperationKind::Decrement => {
                root_field(&field_name, TypeRef::named_nn(format!("Update{t}Payload")), resolver)
                    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
                    .argument(InputValue::new("partitionKey", TypeRef::named(TypeRef::STRING)))
                    .argument(InputValue::new("field", TypeRef::named_nn(TypeRef::STRING)))
                    .argument(
                        InputValue::new("by", TypeRef::named(TypeRef::FLOAT))
                            .default_value(GqlValue::from(1.0)),
                    )
                    .argument(InputValue::new("etag", TypeRef::named(TypeRef::STRING)))
            }
        };
        parts.mutation_fields.push(field);
    }

    Ok(parts)
}

/// Build the executable schema for all bindings.
pub fn build_dynamic_schema(
    bindings: &[Arc<ContainerBinding>],
    resolvers: &ResolverMap,
) -> EngineResult<Schema> {
    let mut objects: Vec<Object> = Vec::new();
    let mut inputs: Vec<InputObject> = Vec::new();
    let mut query = Object::new("Query");
    let mut mutation = Object::new("Mutation");
    let mut has_mutations = false;
    let mut uses_json = false;

    for binding in bindings {
        let parts = binding_parts(binding, resolvers)?;
        objects.extend(parts.objects);
        inputs.extend(parts.inputs);
        for field in parts.query_fields {
            query = query.field(field);
        }
        for field in parts.mutation_fields {
            mutation = mutation.field(field);
            has_mutations = true;
        }
        uses_json |= parts.uses_json;
    }

    let mutation_name = has_mutations.then_some("Mutation");
    let mut builder = Schema::build("Query", mutation_name, None::<&str>);
    if uses_json {
        builder = builder.register(Scalar::new("JSON"));
    }
    builder = builder.register(
        Enum::new("OrderDirection")
            .item(EnumItem::new("ASC"))
            .item(EnumItem::new("DESC")),
    );
    for object in objects {
        builder = builder.register(object);
    }
    for input in inputs {
        builder = builder.register(input);
    }
    builder = builder.register(query);
    if has_mutations {
        builder = builder.register(mutation);
    }
    builder
        .finish()
        .map_err(|err| EngineError::Configuration(format!("schema wiring failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{build_resolver_map, tests::test_binding};
    use serde_json::json;
    use store::RetryPolicy;

    async fn schema() -> Schema {
        let (binding, _) = test_binding(
            "/id",
            vec![
                json!({"id": "1", "name": "alpha", "rank": 3}),
                json!({"id": "2", "name": "beta", "rank": 1}),
            ],
        )
        .await;
        let bindings = vec![binding];
        let resolvers = build_resolver_map(&bindings, &RetryPolicy::default());
        build_dynamic_schema(&bindings, &resolvers).unwrap()
    }

    #[tokio::test]
    async fn test_point_query_executes() {
        let schema = schema().await;
        let response = schema
            .execute(r#"{ user(id: "1") { data { id name } etag } }"#)
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["user"]["data"]["name"], json!("alpha"));
        assert!(data["user"]["etag"].as_str().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_point_miss_returns_null_data() {
        let schema = schema().await;
        let response = schema
            .execute(r#"{ user(id: "404") { data { id } etag } }"#)
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["user"]["data"], json!(null));
        assert_eq!(data["user"]["etag"], json!(""));
    }

    #[tokio::test]
    async fn test_list_query_with_filter() {
        let schema = schema().await;
        let response = schema
            .execute(r#"{ users(where: {name: {eq: "beta"}}) { items { id } hasMore } }"#)
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["users"]["items"], json!([{"id": "2"}]));
        assert_eq!(data["users"]["hasMore"], json!(false));
    }

    #[tokio::test]
    async fn test_mutation_create_executes() {
        let schema = schema().await;
        let response = schema
            .execute(r#"mutation { createUser(input: {name: "new", rank: 9}) { data { name } requestCharge } }"#)
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["createUser"]["data"]["name"], json!("new"));
        assert!(data["createUser"]["requestCharge"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_bad_filter_surfaces_error() {
        let schema = schema().await;
        let response = schema
            .execute(r#"{ users(orderBy: "rank; DROP TABLE c") { items { id } } }"#)
            .await;
        assert_eq!(response.errors.len(), 1);
        let error = &response.errors[0];
        assert!(
            error.message.contains("orderBy") || error.message.contains("invalid"),
            "{}",
            error.message
        );
    }

    #[tokio::test]
    async fn test_update_takes_json_patch() {
        let schema = schema().await;
        let response = schema
            .execute(r#"mutation { updateUser(id: "1", input: {name: "patched"}) { data { name rank } } }"#)
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["updateUser"]["data"]["name"], json!("patched"));
        assert_eq!(data["updateUser"]["data"]["rank"].as_f64(), Some(3.0));
    }

    #[tokio::test]
    async fn test_schema_sdl_exposes_surface() {
        let schema = schema().await;
        let sdl = schema.sdl();
        assert!(sdl.contains("type User"));
        assert!(sdl.contains("type UsersConnection"));
        assert!(sdl.contains("createUser"));
    }
}
