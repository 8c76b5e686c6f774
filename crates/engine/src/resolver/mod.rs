//! Resolver engine — typed resolver structs behind one object-safe
//! trait, collected into a map keyed by `Root.field`.
//!
//! Arguments and results are plain JSON values, so the map is equally
//! callable from the dynamic GraphQL schema and from tests. Every
//! resolver validates its inputs first, then runs store calls inside the
//! retry wrapper.

mod bulk;
mod mutation;
mod numeric;
mod query;
pub(crate) mod sql;

pub use bulk::{BulkMode, BulkResolver};
pub use mutation::{
    CreateResolver, DeleteResolver, ReplaceResolver, RestoreResolver, SoftDeleteResolver,
    UpdateResolver, UpsertResolver,
};
pub use numeric::AdjustResolver;
pub use query::{ListResolver, PointResolver};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use store::RetryPolicy;

use crate::binding::ContainerBinding;
use crate::config::OperationKind;
use crate::error::{EngineError, EngineResult};
use crate::validate;

/// Named arguments to one resolver call.
pub type ResolverArgs = Map<String, Value>;

/// One executable resolver.
///
/// Object-safe thanks to the `Pin<Box<…>>` return; implementations are
/// `Send + Sync` so the host runtime may invoke them concurrently.
pub trait Resolve: Send + Sync {
    fn resolve<'a>(
        &'a self,
        args: ResolverArgs,
    ) -> Pin<Box<dyn Future<Output = EngineResult<Value>> + Send + 'a>>;
}

/// The full resolver surface, keyed `Query.user` / `Mutation.createUser`.
#[derive(Default)]
pub struct ResolverMap {
    entries: IndexMap<String, Arc<dyn Resolve>>,
}

impl ResolverMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, root: &str, field: &str, resolver: Arc<dyn Resolve>) {
        self.entries.insert(format!("{root}.{field}"), resolver);
    }

    pub fn get(&self, root: &str, field: &str) -> Option<Arc<dyn Resolve>> {
        self.entries.get(&format!("{root}.{field}")).cloned()
    }

    /// Invoke a resolver by root and field name.
    pub async fn call(&self, root: &str, field: &str, args: ResolverArgs) -> EngineResult<Value> {
        let resolver = self.get(root, field).ok_or_else(|| {
            EngineError::Validation(format!("no resolver registered for {root}.{field}"))
        })?;
        resolver.resolve(args).await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// State every resolver shares: its binding and the retry policy.
#[derive(Clone)]
pub(crate) struct ResolverBase {
    pub binding: Arc<ContainerBinding>,
    pub retry: RetryPolicy,
}

impl ResolverBase {
    pub fn new(binding: Arc<ContainerBinding>, retry: RetryPolicy) -> Self {
        Self { binding, retry }
    }

    /// The effective partition key: the supplied value, else the `id`
    /// fallback, which is only sound when the container is partitioned
    /// by `/id`.
    pub fn effective_partition_key(
        &self,
        supplied: Option<&str>,
        id: &str,
    ) -> EngineResult<String> {
        match supplied {
            Some(value) => {
                validate::validate_partition_key(value)?;
                Ok(value.to_string())
            }
            None if self.binding.partition_key_is_id() => Ok(id.to_string()),
            None => Err(EngineError::Validation(format!(
                "partitionKey is required: container '{}' is partitioned by '{}', not '/id'",
                self.binding.name, self.binding.partition_key_path
            ))),
        }
    }
}

// ── Argument extraction ─────────────────────────────────────────

pub(crate) fn require_str<'a>(args: &'a ResolverArgs, name: &str) -> EngineResult<&'a str> {
    match args.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) => {
            Err(EngineError::Validation(format!("argument '{name}' must not be empty")))
        }
        Some(_) => Err(EngineError::Validation(format!("argument '{name}' must be a string"))),
        None => Err(EngineError::Validation(format!("argument '{name}' is required"))),
    }
}

pub(crate) fn optional_str<'a>(args: &'a ResolverArgs, name: &str) -> Option<&'a str> {
    match args.get(name) {
        Some(Value::String(s)) => Some(s.as_str()),
        _ => None,
    }
}

pub(crate) fn optional_i64(args: &ResolverArgs, name: &str) -> Option<i64> {
    args.get(name).and_then(Value::as_i64)
}

pub(crate) fn optional_f64(args: &ResolverArgs, name: &str) -> Option<f64> {
    args.get(name).and_then(Value::as_f64)
}

pub(crate) fn require_object<'a>(
    args: &'a ResolverArgs,
    name: &str,
) -> EngineResult<&'a Map<String, Value>> {
    match args.get(name) {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(EngineError::Validation(format!("argument '{name}' must be an object"))),
        None => Err(EngineError::Validation(format!("argument '{name}' is required"))),
    }
}

// ── Map construction ────────────────────────────────────────────

/// Build the resolver surface for all bindings.
pub fn build_resolver_map(
    bindings: &[Arc<ContainerBinding>],
    retry: &RetryPolicy,
) -> ResolverMap {
    let mut map = ResolverMap::new();
    for binding in bindings {
        let base = ResolverBase::new(binding.clone(), retry.clone());
        map.insert("Query", &binding.point_field(), Arc::new(PointResolver::new(base.clone())));
        map.insert("Query", &binding.list_field(), Arc::new(ListResolver::new(base.clone())));

        for op in binding.enabled_operations() {
            let resolver: Arc<dyn Resolve> = match op {
                OperationKind::Create => Arc::new(CreateResolver::new(base.clone())),
                OperationKind::Update => Arc::new(UpdateResolver::new(base.clone())),
                OperationKind::Replace => Arc::new(ReplaceResolver::new(base.clone())),
                OperationKind::Upsert => Arc::new(UpsertResolver::new(base.clone())),
                OperationKind::Delete => Arc::new(DeleteResolver::new(base.clone())),
                OperationKind::SoftDelete => Arc::new(SoftDeleteResolver::new(base.clone())),
                OperationKind::Restore => Arc::new(RestoreResolver::new(base.clone())),
                OperationKind::CreateMany => Arc::new(BulkResolver::new(
                    BulkMode::Create,
                    Arc::new(CreateResolver::new(base.clone())),
                )),
                OperationKind::UpdateMany => Arc::new(BulkResolver::new(
                    BulkMode::Update,
                    Arc::new(UpdateResolver::new(base.clone())),
                )),
                OperationKind::DeleteMany => Arc::new(BulkResolver::new(
                    BulkMode::Delete,
                    Arc::new(DeleteResolver::new(base.clone())),
                )),
                OperationKind::Increment => Arc::new(AdjustResolver::increment(base.clone())),
                OperationKind::Decrement => Arc::new(AdjustResolver::decrement(base.clone())),
            };
            map.insert("Mutation", &binding.mutation_field(op), resolver);
        }
    }
    map
}
