//! Atomic numeric adjustment (`increment{T}` / `decrement{T}`).
//!
//! Read-modify-write under an ETag precondition. Without a caller etag
//! the resolver retries lost races up to the retry budget; with one, a
//! mismatch surfaces immediately (the caller pinned a version).

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use store::{with_retry, StoreError};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::validate;

use super::{optional_f64, optional_str, require_str, Resolve, ResolverArgs, ResolverBase};

pub struct AdjustResolver {
    base: ResolverBase,
    sign: f64,
}

impl AdjustResolver {
    pub(crate) fn increment(base: ResolverBase) -> Self {
        Self { base, sign: 1.0 }
    }

    pub(crate) fn decrement(base: ResolverBase) -> Self {
        Self { base, sign: -1.0 }
    }

    async fn run(&self, args: ResolverArgs) -> EngineResult<Value> {
        let id = require_str(&args, "id")?;
        let partition_key =
            self.base.effective_partition_key(optional_str(&args, "partitionKey"), id)?;
        let field = require_str(&args, "field")?;
        validate::validate_identifier(field)
            .map_err(|_| EngineError::Validation(format!("invalid field name '{field}'")))?;
        let by = optional_f64(&args, "by").unwrap_or(1.0);
        let caller_etag = optional_str(&args, "etag");

        let container = &self.base.binding.container;
        let mut attempt: u32 = 0;
        loop {
            let outcome = with_retry(&self.base.retry, "mutation.adjust.read", || {
                container.point_read(id, &partition_key)
            })
            .await?;
            let Some(mut document) = outcome.document else {
                return Err(EngineError::Store(StoreError::NotFound(id.to_string())));
            };

            let current = match document.get(field) {
                None | Some(Value::Null) => 0.0,
                Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                Some(other) => {
                    return Err(EngineError::Validation(format!(
                        "field '{field}' is not numeric (found {other})"
                    )));
                }
            };
            let adjusted = current + self.sign * by;
            document.insert(field.to_string(), number_value(adjusted));

            let etag = caller_etag.unwrap_or(outcome.etag.as_str());
            let write = with_retry(&self.base.retry, "mutation.adjust.write", || {
                container.replace_item(id, &partition_key, document.clone(), Some(etag))
            })
            .await;

            match write {
                Ok(outcome) => {
                    return Ok(serde_json::json!({
                        "data": Value::Object(outcome.document),
                        "etag": outcome.etag,
                        "requestCharge": outcome.request_charge,
                    }));
                }
                // A concurrent writer moved the document; re-read and
                // retry unless the caller pinned a version.
                Err(StoreError::PreconditionFailed)
                    if caller_etag.is_none() && attempt < self.base.retry.max_retries =>
                {
                    attempt += 1;
                    debug!(
                        container = %self.base.binding.name,
                        id,
                        attempt,
                        "Numeric adjust lost a write race, retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Keep integral results integral so inferred `Int`/`Float` fields stay
/// stable across adjustments.
fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

impl Resolve for AdjustResolver {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>> {
        Box::pin(self.run(args))
    }
}
