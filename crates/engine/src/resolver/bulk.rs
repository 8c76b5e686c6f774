//! Bulk mutations: `createMany` / `updateMany` / `deleteMany`.
//!
//! Items execute sequentially; a failing item is recorded and never
//! aborts the batch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::{EngineError, EngineResult};

use super::{Resolve, ResolverArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkMode {
    Create,
    Update,
    Delete,
}

/// Wraps a single-item resolver and applies it to an `inputs` array.
pub struct BulkResolver {
    mode: BulkMode,
    inner: Arc<dyn Resolve>,
}

impl BulkResolver {
    pub(crate) fn new(mode: BulkMode, inner: Arc<dyn Resolve>) -> Self {
        Self { mode, inner }
    }

    /// Per-item arguments for the wrapped resolver.
    fn item_args(&self, item: &Map<String, Value>) -> ResolverArgs {
        match self.mode {
            // createMany items are the inputs themselves.
            BulkMode::Create => {
                let mut args = ResolverArgs::new();
                args.insert("input".to_string(), Value::Object(item.clone()));
                args
            }
            // updateMany / deleteMany items carry the call shape
            // (id, partitionKey, input, etag) directly.
            BulkMode::Update | BulkMode::Delete => item.clone(),
        }
    }

    fn item_id(item: &Map<String, Value>, result: Option<&Value>) -> Value {
        if let Some(id) = item.get("id").and_then(Value::as_str) {
            return json!(id);
        }
        result
            .and_then(|r| r.get("data"))
            .and_then(|d| d.get("id"))
            .cloned()
            .unwrap_or(Value::Null)
    }

    async fn run(&self, args: ResolverArgs) -> EngineResult<Value> {
        let inputs = match args.get("inputs") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(EngineError::Validation(
                    "argument 'inputs' must be an array".into(),
                ))
            }
        };

        let mut results = Vec::with_capacity(inputs.len());
        let mut success_count: i64 = 0;
        let mut failure_count: i64 = 0;

        for (index, item) in inputs.iter().enumerate() {
            let Value::Object(item) = item else {
                failure_count += 1;
                results.push(json!({
                    "id": Value::Null,
                    "success": false,
                    "error": format!("item {index} must be an object"),
                    "etag": Value::Null,
                }));
                continue;
            };

            match self.inner.resolve(self.item_args(item)).await {
                Ok(result) => {
                    success_count += 1;
                    results.push(json!({
                        "id": Self::item_id(item, Some(&result)),
                        "success": true,
                        "error": Value::Null,
                        "etag": result.get("etag").cloned().unwrap_or(Value::Null),
                    }));
                }
                Err(err) => {
                    failure_count += 1;
                    warn!(mode = ?self.mode, index, error = %err, "Bulk item failed");
                    results.push(json!({
                        "id": Self::item_id(item, None),
                        "success": false,
                        "error": err.to_string(),
                        "etag": Value::Null,
                    }));
                }
            }
        }

        Ok(json!({
            "successCount": success_count,
            "failureCount": failure_count,
            "results": results,
        }))
    }
}

impl Resolve for BulkResolver {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>> {
        Box::pin(self.run(args))
    }
}
