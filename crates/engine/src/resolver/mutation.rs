//! Single-item mutation resolvers.

use std::future::Future;
use std::pin::Pin;

use serde_json::{json, Map, Value};
use store::{with_retry, Document, StoreError};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

use super::{optional_str, require_object, require_str, Resolve, ResolverArgs, ResolverBase};

/// Soft-delete marker fields, the agreed contract.
pub const DELETED_FLAG: &str = "_deleted";
pub const DELETED_AT: &str = "_deletedAt";
pub const DELETE_REASON: &str = "_deleteReason";
pub const DELETED_BY: &str = "_deletedBy";

/// Build a document from an input object, forcing the identifier.
fn document_with_id(input: &Map<String, Value>, id: &str) -> Document {
    let mut document = input.clone();
    document.insert("id".to_string(), Value::String(id.to_string()));
    document
}

/// Shallow merge-patch: null removes a field, anything else overwrites.
/// The identifier is immutable.
fn apply_patch(current: &mut Document, patch: &Map<String, Value>) {
    for (name, value) in patch {
        if name == "id" {
            continue;
        }
        if value.is_null() {
            current.remove(name);
        } else {
            current.insert(name.clone(), value.clone());
        }
    }
}

/// Read the current version of a document, failing with `not-found`.
async fn read_required(base: &ResolverBase, id: &str, partition_key: &str) -> EngineResult<(Document, String, f64)> {
    let container = &base.binding.container;
    let outcome = with_retry(&base.retry, "mutation.read", || {
        container.point_read(id, partition_key)
    })
    .await?;
    match outcome.document {
        Some(document) => Ok((document, outcome.etag, outcome.request_charge)),
        None => Err(EngineError::Store(StoreError::NotFound(id.to_string()))),
    }
}

fn write_payload(document: Document, etag: String, request_charge: f64) -> Value {
    json!({
        "data": Value::Object(document),
        "etag": etag,
        "requestCharge": request_charge,
    })
}

// ── create ──────────────────────────────────────────────────────

/// `create{T}(input)` — insert a new document. The identifier is taken
/// from the input when present (direct callers), generated otherwise.
pub struct CreateResolver {
    base: ResolverBase,
}

impl CreateResolver {
    pub(crate) fn new(base: ResolverBase) -> Self {
        Self { base }
    }

    async fn run(&self, args: ResolverArgs) -> EngineResult<Value> {
        let input = require_object(&args, "input")?;
        let id = match input.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        let document = document_with_id(input, &id);

        let container = &self.base.binding.container;
        let outcome = with_retry(&self.base.retry, "mutation.create", || {
            container.create_item(document.clone())
        })
        .await?;
        Ok(write_payload(outcome.document, outcome.etag, outcome.request_charge))
    }
}

impl Resolve for CreateResolver {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>> {
        Box::pin(self.run(args))
    }
}

// ── update / replace ────────────────────────────────────────────

/// `update{T}(id, partitionKey, input, etag)` — read-merge-write.
pub struct UpdateResolver {
    base: ResolverBase,
}

impl UpdateResolver {
    pub(crate) fn new(base: ResolverBase) -> Self {
        Self { base }
    }

    async fn run(&self, args: ResolverArgs) -> EngineResult<Value> {
        let id = require_str(&args, "id")?;
        let partition_key =
            self.base.effective_partition_key(optional_str(&args, "partitionKey"), id)?;
        let patch = require_object(&args, "input")?;
        let etag = optional_str(&args, "etag");

        let (mut document, _, read_charge) = read_required(&self.base, id, &partition_key).await?;
        apply_patch(&mut document, patch);

        let container = &self.base.binding.container;
        let outcome = with_retry(&self.base.retry, "mutation.update", || {
            container.replace_item(id, &partition_key, document.clone(), etag)
        })
        .await?;
        Ok(write_payload(outcome.document, outcome.etag, read_charge + outcome.request_charge))
    }
}

impl Resolve for UpdateResolver {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>> {
        Box::pin(self.run(args))
    }
}

/// `replace{T}(id, partitionKey, input, etag)` — full replacement.
pub struct ReplaceResolver {
    base: ResolverBase,
}

impl ReplaceResolver {
    pub(crate) fn new(base: ResolverBase) -> Self {
        Self { base }
    }

    async fn run(&self, args: ResolverArgs) -> EngineResult<Value> {
        let id = require_str(&args, "id")?;
        let partition_key =
            self.base.effective_partition_key(optional_str(&args, "partitionKey"), id)?;
        let input = require_object(&args, "input")?;
        let etag = optional_str(&args, "etag");
        let document = document_with_id(input, id);

        let container = &self.base.binding.container;
        let outcome = with_retry(&self.base.retry, "mutation.replace", || {
            container.replace_item(id, &partition_key, document.clone(), etag)
        })
        .await?;
        Ok(write_payload(outcome.document, outcome.etag, outcome.request_charge))
    }
}

impl Resolve for ReplaceResolver {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>> {
        Box::pin(self.run(args))
    }
}

// ── upsert ──────────────────────────────────────────────────────

/// `upsert{T}(id, partitionKey, input)` — create or update, reporting
/// which one happened.
pub struct UpsertResolver {
    base: ResolverBase,
}

impl UpsertResolver {
    pub(crate) fn new(base: ResolverBase) -> Self {
        Self { base }
    }

    async fn run(&self, args: ResolverArgs) -> EngineResult<Value> {
        let id = require_str(&args, "id")?;
        let partition_key =
            self.base.effective_partition_key(optional_str(&args, "partitionKey"), id)?;
        let input = require_object(&args, "input")?;
        let document = document_with_id(input, id);

        let container = &self.base.binding.container;
        let outcome = with_retry(&self.base.retry, "mutation.upsert", || {
            container.upsert_item(&partition_key, document.clone())
        })
        .await?;
        Ok(json!({
            "data": Value::Object(outcome.write.document),
            "etag": outcome.write.etag,
            "requestCharge": outcome.write.request_charge,
            "wasCreated": outcome.was_created,
        }))
    }
}

impl Resolve for UpsertResolver {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>> {
        Box::pin(self.run(args))
    }
}

// ── delete / soft delete / restore ──────────────────────────────

/// `delete{T}(id, partitionKey, etag)` — hard delete.
pub struct DeleteResolver {
    base: ResolverBase,
}

impl DeleteResolver {
    pub(crate) fn new(base: ResolverBase) -> Self {
        Self { base }
    }

    async fn run(&self, args: ResolverArgs) -> EngineResult<Value> {
        let id = require_str(&args, "id")?;
        let partition_key =
            self.base.effective_partition_key(optional_str(&args, "partitionKey"), id)?;
        let etag = optional_str(&args, "etag");

        let container = &self.base.binding.container;
        let request_charge = with_retry(&self.base.retry, "mutation.delete", || {
            container.delete_item(id, &partition_key, etag)
        })
        .await?;
        Ok(json!({ "id": id, "requestCharge": request_charge }))
    }
}

impl Resolve for DeleteResolver {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>> {
        Box::pin(self.run(args))
    }
}

/// `softDelete{T}(id, partitionKey, etag, deleteReason, deletedBy)` —
/// flags the document instead of removing it.
pub struct SoftDeleteResolver {
    base: ResolverBase,
}

impl SoftDeleteResolver {
    pub(crate) fn new(base: ResolverBase) -> Self {
        Self { base }
    }

    async fn run(&self, args: ResolverArgs) -> EngineResult<Value> {
        let id = require_str(&args, "id")?;
        let partition_key =
            self.base.effective_partition_key(optional_str(&args, "partitionKey"), id)?;
        let etag = optional_str(&args, "etag");

        let (mut document, _, read_charge) = read_required(&self.base, id, &partition_key).await?;
        document.insert(DELETED_FLAG.to_string(), Value::Bool(true));
        document.insert(
            DELETED_AT.to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        if let Some(reason) = optional_str(&args, "deleteReason") {
            document.insert(DELETE_REASON.to_string(), Value::String(reason.to_string()));
        }
        if let Some(by) = optional_str(&args, "deletedBy") {
            document.insert(DELETED_BY.to_string(), Value::String(by.to_string()));
        }

        let container = &self.base.binding.container;
        let outcome = with_retry(&self.base.retry, "mutation.soft_delete", || {
            container.replace_item(id, &partition_key, document.clone(), etag)
        })
        .await?;
        Ok(write_payload(outcome.document, outcome.etag, read_charge + outcome.request_charge))
    }
}

impl Resolve for SoftDeleteResolver {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>> {
        Box::pin(self.run(args))
    }
}

/// `restore{T}(id, partitionKey, etag)` — clears the soft-delete flags.
pub struct RestoreResolver {
    base: ResolverBase,
}

impl RestoreResolver {
    pub(crate) fn new(base: ResolverBase) -> Self {
        Self { base }
    }

    async fn run(&self, args: ResolverArgs) -> EngineResult<Value> {
        let id = require_str(&args, "id")?;
        let partition_key =
            self.base.effective_partition_key(optional_str(&args, "partitionKey"), id)?;
        let etag = optional_str(&args, "etag");

        let (mut document, _, read_charge) = read_required(&self.base, id, &partition_key).await?;
        for field in [DELETED_FLAG, DELETED_AT, DELETE_REASON, DELETED_BY] {
            document.remove(field);
        }

        let container = &self.base.binding.container;
        let outcome = with_retry(&self.base.retry, "mutation.restore", || {
            container.replace_item(id, &partition_key, document.clone(), etag)
        })
        .await?;
        Ok(write_payload(outcome.document, outcome.etag, read_charge + outcome.request_charge))
    }
}

impl Resolve for RestoreResolver {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>> {
        Box::pin(self.run(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::{args, fast_retry, test_binding};
    use serde_json::json;
    use store::ContainerOps;

    async fn base() -> (ResolverBase, std::sync::Arc<store::MemoryContainer>) {
        let (binding, container) = test_binding(
            "/id",
            vec![
                json!({"id": "1", "name": "alpha", "score": 10}),
                json!({"id": "2", "name": "beta", "score": 20}),
            ],
        )
        .await;
        (ResolverBase::new(binding, fast_retry()), container)
    }

    #[tokio::test]
    async fn test_create_returns_payload() {
        let (base, container) = base().await;
        let resolver = CreateResolver::new(base);
        let result = resolver
            .resolve(args(json!({"input": {"id": "9", "name": "new"}})))
            .await
            .unwrap();
        assert_eq!(result["data"]["name"], json!("new"));
        assert!(result["etag"].as_str().unwrap().len() > 0);
        assert!(result["requestCharge"].as_f64().unwrap() > 0.0);
        assert_eq!(container.len().await, 3);
    }

    #[tokio::test]
    async fn test_create_generates_id_when_absent() {
        let (base, _) = base().await;
        let resolver = CreateResolver::new(base);
        let result = resolver
            .resolve(args(json!({"input": {"name": "anon"}})))
            .await
            .unwrap();
        assert!(result["data"]["id"].as_str().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_create_duplicate_id_is_conflict() {
        let (base, _) = base().await;
        let resolver = CreateResolver::new(base);
        let err = resolver
            .resolve(args(json!({"input": {"id": "1", "name": "dup"}})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn test_update_merges_patch() {
        let (base, _) = base().await;
        let resolver = UpdateResolver::new(base);
        let result = resolver
            .resolve(args(json!({
                "id": "1",
                "input": {"name": "renamed", "score": null, "extra": true},
            })))
            .await
            .unwrap();
        let data = &result["data"];
        assert_eq!(data["name"], json!("renamed"));
        assert_eq!(data["extra"], json!(true));
        assert!(data.get("score").is_none(), "null in patch removes the field");
        assert_eq!(data["id"], json!("1"));
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let (base, _) = base().await;
        let resolver = UpdateResolver::new(base);
        let err = resolver
            .resolve(args(json!({"id": "404", "input": {"name": "x"}})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test]
    async fn test_update_stale_etag_is_precondition_failed() {
        let (base, _) = base().await;
        let resolver = UpdateResolver::new(base);
        let err = resolver
            .resolve(args(json!({
                "id": "1",
                "input": {"name": "x"},
                "etag": "stale",
            })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "precondition-failed");
    }

    #[tokio::test]
    async fn test_replace_discards_unmentioned_fields() {
        let (base, container) = base().await;
        let resolver = ReplaceResolver::new(base);
        let result = resolver
            .resolve(args(json!({"id": "1", "input": {"name": "only"}})))
            .await
            .unwrap();
        assert_eq!(result["data"]["name"], json!("only"));
        assert!(result["data"].get("score").is_none());
        let read = container.point_read("1", "1").await.unwrap();
        assert!(read.document.unwrap().get("score").is_none());
    }

    #[tokio::test]
    async fn test_upsert_reports_was_created() {
        let (base, _) = base().await;
        let resolver = UpsertResolver::new(base);
        let updated = resolver
            .resolve(args(json!({"id": "1", "input": {"name": "v2"}})))
            .await
            .unwrap();
        assert_eq!(updated["wasCreated"], json!(false));

        let created = resolver
            .resolve(args(json!({"id": "7", "input": {"name": "fresh"}})))
            .await
            .unwrap();
        assert_eq!(created["wasCreated"], json!(true));
    }

    #[tokio::test]
    async fn test_delete_and_etag_precondition() {
        let (base, container) = base().await;
        let resolver = DeleteResolver::new(base);

        let err = resolver
            .resolve(args(json!({"id": "1", "etag": "stale"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "precondition-failed");

        let result = resolver.resolve(args(json!({"id": "1"}))).await.unwrap();
        assert_eq!(result["id"], json!("1"));
        assert_eq!(container.len().await, 1);

        let err = resolver.resolve(args(json!({"id": "1"}))).await.unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test]
    async fn test_soft_delete_sets_contract_fields() {
        let (base, container) = base().await;
        let resolver = SoftDeleteResolver::new(base);
        let result = resolver
            .resolve(args(json!({
                "id": "1",
                "deleteReason": "cleanup",
                "deletedBy": "ops",
            })))
            .await
            .unwrap();
        let data = &result["data"];
        assert_eq!(data[DELETED_FLAG], json!(true));
        assert!(data[DELETED_AT].as_str().unwrap().len() > 0);
        assert_eq!(data[DELETE_REASON], json!("cleanup"));
        assert_eq!(data[DELETED_BY], json!("ops"));
        // Document still present in the store.
        assert_eq!(container.len().await, 2);
    }

    #[tokio::test]
    async fn test_restore_clears_contract_fields() {
        let (base, _) = base().await;
        let soft = SoftDeleteResolver::new(base.clone());
        soft.resolve(args(json!({"id": "1", "deleteReason": "oops"})))
            .await
            .unwrap();

        let restore = RestoreResolver::new(base);
        let result = restore.resolve(args(json!({"id": "1"}))).await.unwrap();
        let data = result["data"].as_object().unwrap();
        for field in [DELETED_FLAG, DELETED_AT, DELETE_REASON, DELETED_BY] {
            assert!(!data.contains_key(field), "{field} should be cleared");
        }
        assert_eq!(data["name"], json!("alpha"));
    }
}
