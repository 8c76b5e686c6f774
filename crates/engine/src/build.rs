//! Build orchestrator: config → sampled → inferred → composed →
//! executable artifacts.
//!
//! Containers are processed in parallel; the data-source client is
//! constructed once and shared by every binding, released only through
//! the returned dispose handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use store::{
    with_retry, ContainerOps, DocumentStore, RetryClassifier, RetryPolicy, StoreConnector,
};

use crate::binding::ContainerBinding;
use crate::config::{ContainerSource, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::graphql::build_dynamic_schema;
use crate::infer::infer_schema;
use crate::progress::{emit, BuildStage, ProgressCallback, ProgressEvent};
use crate::resolver::{build_resolver_map, ResolverMap};
use crate::sample::{DocumentSampler, SampleOptions};
use crate::sdl::naming::derive_type_name;
use crate::sdl::compose_sdl;

/// Fallback partition-key path when container metadata is unavailable.
const DEFAULT_PARTITION_KEY_PATH: &str = "/partition";

/// Idempotent release of the shared client. Cloneable; the first
/// `dispose` wins across all clones.
#[derive(Clone)]
pub struct DisposeHandle {
    client: Arc<dyn DocumentStore>,
    released: Arc<AtomicBool>,
}

impl DisposeHandle {
    fn new(client: Arc<dyn DocumentStore>) -> Self {
        Self { client, released: Arc::new(AtomicBool::new(false)) }
    }

    /// Release the client; safe to call any number of times.
    pub fn dispose(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            info!("Releasing data-source client");
            self.client.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Everything a caller needs to serve the derived API.
pub struct Artifacts {
    /// The composed SDL document.
    pub sdl: String,
    /// The executable schema, resolvers bound to the live containers.
    pub schema: async_graphql::dynamic::Schema,
    /// The typed resolver surface, callable directly.
    pub resolvers: ResolverMap,
    /// Per-container bindings in configuration order.
    pub bindings: Vec<Arc<ContainerBinding>>,
    /// Container handles by name.
    pub containers: HashMap<String, Arc<dyn ContainerOps>>,
    /// The shared data-source client.
    pub client: Arc<dyn DocumentStore>,
    dispose: DisposeHandle,
}

impl std::fmt::Debug for Artifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifacts")
            .field("sdl", &self.sdl)
            .field("bindings", &self.bindings.len())
            .field("containers", &self.containers.len())
            .finish()
    }
}

impl Artifacts {
    /// Release the shared client. Idempotent, and the only release path.
    pub fn dispose(&self) {
        self.dispose.dispose();
    }

    /// A handle that can outlive the artifacts.
    pub fn dispose_handle(&self) -> DisposeHandle {
        self.dispose.clone()
    }
}

/// Configurable build entry point.
pub struct SchemaBuild {
    config: EngineConfig,
    connector: Arc<dyn StoreConnector>,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
    classifier: Option<RetryClassifier>,
}

impl SchemaBuild {
    pub fn new(config: EngineConfig, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            config,
            connector,
            progress: None,
            cancel: CancellationToken::new(),
            classifier: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Cancelling this token cancels outstanding sampling fan-out.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_retry_classifier(mut self, classifier: RetryClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub async fn build(self) -> EngineResult<Artifacts> {
        self.config.validate()?;
        let retry = self.config.retry.to_policy(self.classifier.clone());

        let settings = self.config.connect_settings();
        let client = self.connector.connect(&settings).await?;
        info!(database = %settings.database, containers = self.config.containers.len(), "Connected data-source client");

        // Assign type names up front: caller-supplied names win, derived
        // names get collision-prefixed in configuration order.
        let mut taken: Vec<String> = Vec::new();
        let mut planned: Vec<(ContainerSource, String)> = Vec::new();
        for source in &self.config.containers {
            let type_name = match &source.type_name {
                Some(name) => name.clone(),
                None => derive_type_name(&source.name, &taken),
            };
            if taken.contains(&type_name) {
                return Err(EngineError::Configuration(format!(
                    "duplicate GraphQL type name '{type_name}'"
                )));
            }
            taken.push(type_name.clone());
            planned.push((source.clone(), type_name));
        }

        let pk_cache: Arc<DashMap<String, String>> = Arc::new(DashMap::new());
        let fan_cancel = self.cancel.child_token();
        let mut tasks: JoinSet<EngineResult<(usize, ContainerBinding)>> = JoinSet::new();

        for (index, (source, type_name)) in planned.into_iter().enumerate() {
            let client = client.clone();
            let retry = retry.clone();
            let progress = self.progress.clone();
            let cancel = fan_cancel.clone();
            let pk_cache = pk_cache.clone();
            let type_system = self.config.type_system_for(&source);
            let sample_size = self.config.sample_size_for(&source);

            tasks.spawn(async move {
                let container = client.container(&source.name).ok_or_else(|| {
                    EngineError::Configuration(format!(
                        "container '{}' not found in the database",
                        source.name
                    ))
                })?;

                let pk_path =
                    partition_key_path(&pk_cache, &source.name, &container, &retry).await;
                debug!(container = %source.name, partition_key = %pk_path, "Resolved partition key path");

                emit(
                    &progress,
                    ProgressEvent::for_container(BuildStage::SamplingStarted, &source.name)
                        .with_message(format!("sampling up to {sample_size} documents")),
                );
                let sampler = DocumentSampler::new(
                    source.name.as_str(),
                    container.clone(),
                    pk_path.as_str(),
                    retry.clone(),
                )
                .with_progress(progress.clone());
                let options = SampleOptions::from_config(sample_size, &source.sampling);
                let outcome = sampler.sample(&options, &cancel).await?;
                emit(
                    &progress,
                    ProgressEvent::for_container(BuildStage::SamplingComplete, &source.name)
                        .with_metadata(json!({
                            "documents": outcome.documents.len(),
                            "ruConsumed": outcome.request_charge,
                            "partitionsCovered": outcome.partitions_covered,
                            "schemaVariants": outcome.schema_variants,
                        })),
                );

                emit(
                    &progress,
                    ProgressEvent::for_container(BuildStage::InferenceStarted, &source.name),
                );
                let schema = infer_schema(&outcome.documents, &type_name, &type_system)?;
                emit(
                    &progress,
                    ProgressEvent::for_container(BuildStage::InferenceComplete, &source.name)
                        .with_metadata(json!({
                            "fieldsAnalyzed": schema.stats.fields_analyzed,
                            "typesGenerated": schema.stats.types_generated,
                            "conflictsResolved": schema.stats.conflicts_resolved,
                            "nestedTypesCreated": schema.stats.nested_types_created,
                        })),
                );

                Ok((
                    index,
                    ContainerBinding {
                        name: source.name.clone(),
                        type_name,
                        container,
                        schema,
                        partition_key_path: pk_path,
                        operations: source.operations.clone(),
                        require_partition_key_on_queries: source.require_partition_key_on_queries,
                    },
                ))
            });
        }

        let mut indexed: Vec<(usize, ContainerBinding)> = Vec::new();
        let mut first_error: Option<EngineError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(binding)) => indexed.push(binding),
                Ok(Err(err)) => {
                    // Cancel the remaining fan-out; keep the first error.
                    fan_cancel.cancel();
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(join_error) => {
                    fan_cancel.cancel();
                    if first_error.is_none() {
                        first_error = Some(EngineError::Configuration(format!(
                            "container pipeline task failed: {join_error}"
                        )));
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        indexed.sort_by_key(|(index, _)| *index);
        let bindings: Vec<Arc<ContainerBinding>> =
            indexed.into_iter().map(|(_, binding)| Arc::new(binding)).collect();

        emit(&self.progress, ProgressEvent::stage(BuildStage::SdlGenerationStarted));
        let sdl = compose_sdl(&bindings);
        let resolvers = build_resolver_map(&bindings, &retry);
        let schema = build_dynamic_schema(&bindings, &resolvers)?;
        emit(
            &self.progress,
            ProgressEvent::stage(BuildStage::SdlGenerationComplete)
                .with_metadata(json!({ "sdlBytes": sdl.len(), "resolvers": resolvers.len() })),
        );
        info!(
            bindings = bindings.len(),
            resolvers = resolvers.len(),
            "Schema build complete"
        );

        let containers: HashMap<String, Arc<dyn ContainerOps>> = bindings
            .iter()
            .map(|b| (b.name.clone(), b.container.clone()))
            .collect();
        let dispose = DisposeHandle::new(client.clone());
        Ok(Artifacts { sdl, schema, resolvers, bindings, containers, client, dispose })
    }
}

/// Resolve and cache the partition-key path for a container. Metadata
/// failures fall back to `/partition` and are cached too, so one broken
/// metadata endpoint is not hammered per build.
async fn partition_key_path(
    cache: &DashMap<String, String>,
    name: &str,
    container: &Arc<dyn ContainerOps>,
    retry: &RetryPolicy,
) -> String {
    if let Some(path) = cache.get(name) {
        return path.value().clone();
    }
    let path = match with_retry(retry, "metadata.read", || container.read_metadata()).await {
        Ok(metadata) => metadata
            .partition_key_paths
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_PARTITION_KEY_PATH.to_string()),
        Err(err) => {
            warn!(container = %name, error = %err, "Metadata read failed, assuming {DEFAULT_PARTITION_KEY_PATH}");
            DEFAULT_PARTITION_KEY_PATH.to_string()
        }
    };
    cache.insert(name.to_string(), path.clone());
    path
}

/// One-call convenience over [`SchemaBuild`].
pub async fn build_schema(
    config: EngineConfig,
    connector: Arc<dyn StoreConnector>,
) -> EngineResult<Artifacts> {
    SchemaBuild::new(config, connector).build().await
}
