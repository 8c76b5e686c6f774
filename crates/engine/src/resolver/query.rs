//! Query resolvers: point read and paginated list.

use std::future::Future;
use std::pin::Pin;

use serde_json::{json, Value};
use store::{with_retry, StoreError};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

use super::sql::{build_list_query, ListArguments};
use super::{
    optional_i64, optional_str, require_str, Resolve, ResolverArgs, ResolverBase,
};

const DEFAULT_LIMIT: i64 = 100;

/// `user(id, partitionKey, ifNoneMatch)` — ETag-aware point read.
pub struct PointResolver {
    base: ResolverBase,
}

impl PointResolver {
    pub(crate) fn new(base: ResolverBase) -> Self {
        Self { base }
    }

    async fn run(&self, args: ResolverArgs) -> EngineResult<Value> {
        let id = require_str(&args, "id")?;
        let partition_key = self.base.effective_partition_key(optional_str(&args, "partitionKey"), id)?;
        let if_none_match = optional_str(&args, "ifNoneMatch");

        let container = &self.base.binding.container;
        let outcome = with_retry(&self.base.retry, "query.point", || {
            container.point_read(id, &partition_key)
        })
        .await?;

        match outcome.document {
            None => Ok(json!({ "data": Value::Null, "etag": "" })),
            Some(document) => {
                if if_none_match == Some(outcome.etag.as_str()) {
                    // The caller already holds this version.
                    return Err(EngineError::Store(StoreError::PreconditionFailed));
                }
                Ok(json!({ "data": Value::Object(document), "etag": outcome.etag }))
            }
        }
    }
}

impl Resolve for PointResolver {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>> {
        Box::pin(self.run(args))
    }
}

/// `users(limit, partitionKey, continuationToken, orderBy,
/// orderDirection, where)` — one page per call.
pub struct ListResolver {
    base: ResolverBase,
}

impl ListResolver {
    pub(crate) fn new(base: ResolverBase) -> Self {
        Self { base }
    }

    fn parse_arguments(&self, args: &ResolverArgs) -> EngineResult<ListArguments> {
        let mut filters = Vec::new();
        if let Some(where_value) = args.get("where").filter(|v| !v.is_null()) {
            let Value::Object(fields) = where_value else {
                return Err(EngineError::BadFilter("'where' must be an object".into()));
            };
            for (field, operators) in fields {
                let Value::Object(operators) = operators else {
                    return Err(EngineError::BadFilter(format!(
                        "filter for '{field}' must be an object of operators"
                    )));
                };
                for (operator, value) in operators {
                    filters.push((field.clone(), operator.clone(), value.clone()));
                }
            }
        }
        Ok(ListArguments {
            limit: optional_i64(args, "limit").unwrap_or(DEFAULT_LIMIT),
            partition_key: optional_str(args, "partitionKey").map(str::to_string),
            continuation_token: optional_str(args, "continuationToken").map(str::to_string),
            order_by: optional_str(args, "orderBy").map(str::to_string),
            order_direction: optional_str(args, "orderDirection").unwrap_or("ASC").to_string(),
            filters,
        })
    }

    async fn run(&self, args: ResolverArgs) -> EngineResult<Value> {
        let arguments = self.parse_arguments(&args)?;
        if self.base.binding.require_partition_key_on_queries && arguments.partition_key.is_none() {
            return Err(EngineError::Validation(format!(
                "container '{}' requires a partitionKey on list queries",
                self.base.binding.name
            )));
        }
        let (spec, options) = build_list_query(&self.base.binding, &arguments)?;
        debug!(container = %self.base.binding.name, sql = %spec.sql, "List query");

        let container = &self.base.binding.container;
        let page = with_retry(&self.base.retry, "query.list", || {
            container.query(&spec, &options)
        })
        .await?;

        let has_more = page.continuation_token.is_some();
        Ok(json!({
            "items": page.items,
            "continuationToken": page.continuation_token,
            "hasMore": has_more,
        }))
    }
}

impl Resolve for ListResolver {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>> {
        Box::pin(self.run(args))
    }
}
