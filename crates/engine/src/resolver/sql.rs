//! List-query synthesis.
//!
//! Identifiers reach the SQL string only after whitelist validation;
//! every value binds as a named parameter.

use serde_json::Value;
use store::{QueryOptions, QuerySpec};

use crate::binding::ContainerBinding;
use crate::error::EngineResult;
use crate::validate;

/// Validated arguments of a list call.
#[derive(Debug, Default)]
pub(crate) struct ListArguments {
    pub limit: i64,
    pub partition_key: Option<String>,
    pub continuation_token: Option<String>,
    pub order_by: Option<String>,
    pub order_direction: String,
    /// `(field, operator, value)` triples from the `where` input.
    pub filters: Vec<(String, String, Value)>,
}

/// Build the parameterized list query for one binding.
pub(crate) fn build_list_query(
    binding: &ContainerBinding,
    arguments: &ListArguments,
) -> EngineResult<(QuerySpec, QueryOptions)> {
    validate::validate_limit(arguments.limit)?;
    if let Some(token) = &arguments.continuation_token {
        validate::validate_continuation_token(token)?;
    }

    let mut clauses: Vec<String> = Vec::new();
    let mut spec = QuerySpec::new(String::new());

    if let Some(partition_key) = &arguments.partition_key {
        validate::validate_partition_key(partition_key)?;
        let field = binding
            .partition_key_path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(".");
        clauses.push(format!("c.{field} = @pk"));
        spec = spec.with_parameter("@pk", partition_key.clone());
    }

    for (field, operator, value) in &arguments.filters {
        validate::validate_identifier(field)?;
        let sql_op = validate::sql_operator(operator)?;
        let parameter = format!("@{field}_{operator}");
        if sql_op == "CONTAINS" {
            clauses.push(format!("CONTAINS(c.{field}, {parameter})"));
        } else {
            clauses.push(format!("c.{field} {sql_op} {parameter}"));
        }
        spec = spec.with_parameter(parameter, value.clone());
    }

    let mut sql = String::from("SELECT * FROM c");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if let Some(order_by) = &arguments.order_by {
        validate::validate_identifier(order_by)?;
        validate::validate_order_direction(&arguments.order_direction)?;
        sql.push_str(&format!(" ORDER BY c.{order_by} {}", arguments.order_direction));
    }

    spec.sql = sql;
    let options = QueryOptions {
        max_item_count: Some(arguments.limit as i32),
        continuation_token: arguments.continuation_token.clone(),
    };
    Ok((spec, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::test_binding;
    use serde_json::json;

    async fn binding() -> ContainerBinding {
        let (binding, _) = test_binding("/pk", vec![json!({"id": "1", "pk": "a", "name": "x"})]).await;
        (*binding).clone()
    }

    fn base_arguments() -> ListArguments {
        ListArguments {
            limit: 100,
            order_direction: "ASC".to_string(),
            ..ListArguments::default()
        }
    }

    #[tokio::test]
    async fn test_bare_list_query() {
        let (spec, options) = build_list_query(&binding().await, &base_arguments()).unwrap();
        assert_eq!(spec.sql, "SELECT * FROM c");
        assert!(spec.parameters.is_empty());
        assert_eq!(options.max_item_count, Some(100));
    }

    #[tokio::test]
    async fn test_partition_key_binds_as_parameter() {
        let mut arguments = base_arguments();
        arguments.partition_key = Some("tenant-1".into());
        let (spec, _) = build_list_query(&binding().await, &arguments).unwrap();
        assert_eq!(spec.sql, "SELECT * FROM c WHERE c.pk = @pk");
        assert_eq!(spec.parameters.len(), 1);
        assert_eq!(spec.parameters[0].value, json!("tenant-1"));
        assert!(!spec.sql.contains("tenant-1"));
    }

    #[tokio::test]
    async fn test_filters_and_order() {
        let mut arguments = base_arguments();
        arguments.filters = vec![
            ("name".into(), "eq".into(), json!("alpha")),
            ("name".into(), "contains".into(), json!("ph")),
        ];
        arguments.order_by = Some("name".into());
        arguments.order_direction = "DESC".into();
        let (spec, _) = build_list_query(&binding().await, &arguments).unwrap();
        assert_eq!(
            spec.sql,
            "SELECT * FROM c WHERE c.name = @name_eq AND CONTAINS(c.name, @name_contains) ORDER BY c.name DESC"
        );
        assert_eq!(spec.parameters.len(), 2);
    }

    #[tokio::test]
    async fn test_parameterization_law() {
        // No user-supplied value ever appears in the SQL text.
        let mut arguments = base_arguments();
        arguments.partition_key = Some("evil' OR 1=1 --".into());
        arguments.filters = vec![("name".into(), "eq".into(), json!("'; DROP TABLE c; --"))];
        let (spec, _) = build_list_query(&binding().await, &arguments).unwrap();
        assert!(!spec.sql.contains("evil"));
        assert!(!spec.sql.contains("DROP"));
        assert_eq!(spec.parameters.len(), 2);
    }

    #[tokio::test]
    async fn test_injection_in_field_name_rejected() {
        let mut arguments = base_arguments();
        arguments.filters = vec![("name; DROP TABLE".into(), "eq".into(), json!("x"))];
        let err = build_list_query(&binding().await, &arguments).unwrap_err();
        assert_eq!(err.kind(), "bad-filter");
    }

    #[tokio::test]
    async fn test_unknown_operator_rejected() {
        let mut arguments = base_arguments();
        arguments.filters = vec![("name".into(), "regex".into(), json!("x"))];
        let err = build_list_query(&binding().await, &arguments).unwrap_err();
        assert_eq!(err.kind(), "bad-filter");
    }

    #[tokio::test]
    async fn test_bad_order_by_rejected() {
        let mut arguments = base_arguments();
        arguments.order_by = Some("name DESC; --".into());
        let err = build_list_query(&binding().await, &arguments).unwrap_err();
        assert_eq!(err.kind(), "bad-filter");
    }

    #[tokio::test]
    async fn test_limit_bounds_enforced() {
        let mut arguments = base_arguments();
        arguments.limit = 0;
        assert!(build_list_query(&binding().await, &arguments).is_err());
        arguments.limit = 20_000;
        assert!(build_list_query(&binding().await, &arguments).is_err());
    }
}
