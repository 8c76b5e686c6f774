use serde::{Deserialize, Serialize};
use std::time::Duration;

use store::{ConnectSettings, RetryClassifier, RetryPolicy};

use crate::error::{EngineError, EngineResult};

/// Top-level build configuration.
///
/// Deserializable so callers can keep it in a config file; the progress
/// callback and the store connector are programmatic and passed to the
/// builder separately.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Full connection string; mutually exclusive with
    /// `endpoint`/`credential`.
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
    pub database: String,
    pub containers: Vec<ContainerSource>,
    /// Workspace-wide type-system defaults; containers may override.
    #[serde(default)]
    pub type_system: TypeSystemConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// One container to sample, infer and expose.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContainerSource {
    pub name: String,
    /// Caller-supplied GraphQL type name; derived from the container
    /// name when absent.
    #[serde(default)]
    pub type_name: Option<String>,
    /// Documents to sample; falls back to the type-system default, then
    /// to 500.
    #[serde(default)]
    pub sample_size: Option<i64>,
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Per-container type-system override.
    #[serde(default)]
    pub type_system: Option<TypeSystemConfig>,
    #[serde(default)]
    pub operations: OperationsConfig,
    /// When set, list queries without a partition key are rejected.
    #[serde(default)]
    pub require_partition_key_on_queries: bool,
}

impl ContainerSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            sample_size: None,
            sampling: SamplingConfig::default(),
            type_system: None,
            operations: OperationsConfig::default(),
            require_partition_key_on_queries: false,
        }
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_sample_size(mut self, sample_size: i64) -> Self {
        self.sample_size = Some(sample_size);
        self
    }
}

pub const DEFAULT_SAMPLE_SIZE: i64 = 500;

/// Sampling strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleStrategyKind {
    Top,
    Random,
    Partition,
    Schema,
}

impl Default for SampleStrategyKind {
    fn default() -> Self {
        SampleStrategyKind::Partition
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub strategy: SampleStrategyKind,
    /// RU budget; unlimited when absent.
    pub max_ru: Option<f64>,
    /// Documents retained per schema signature under the `schema`
    /// strategy.
    pub min_schema_variants: usize,
    /// Seed for the `random` strategy's shuffle; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            strategy: SampleStrategyKind::default(),
            max_ru: None,
            min_schema_variants: 3,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    Widen,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NestedTypeFallback {
    Json,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberInference {
    Strict,
    Float,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TypeSystemConfig {
    /// A field is required when it appears in at least this share of
    /// documents and was never null.
    pub required_threshold: f64,
    pub conflict_resolution: ConflictResolution,
    pub max_nesting_depth: usize,
    pub nested_type_fallback: NestedTypeFallback,
    pub number_inference: NumberInference,
    /// Default sample size for containers that do not set their own.
    pub sample_size: Option<i64>,
}

impl Default for TypeSystemConfig {
    fn default() -> Self {
        Self {
            required_threshold: 0.9,
            conflict_resolution: ConflictResolution::Widen,
            max_nesting_depth: 8,
            nested_type_fallback: NestedTypeFallback::Json,
            number_inference: NumberInference::Float,
            sample_size: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: f64,
    pub respect_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: 0.2,
            respect_retry_after: true,
        }
    }
}

impl RetryConfig {
    /// Build the store-level policy, optionally with a custom classifier.
    pub fn to_policy(&self, classifier: Option<RetryClassifier>) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
            respect_retry_after: self.respect_retry_after,
            classifier,
        }
    }
}

/// The full resolver surface, one entry per mutation plus the two query
/// shapes. Used for per-container include/exclude toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Create,
    Update,
    Replace,
    Upsert,
    Delete,
    SoftDelete,
    Restore,
    CreateMany,
    UpdateMany,
    DeleteMany,
    Increment,
    Decrement,
}

impl OperationKind {
    pub const ALL: [OperationKind; 12] = [
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Replace,
        OperationKind::Upsert,
        OperationKind::Delete,
        OperationKind::SoftDelete,
        OperationKind::Restore,
        OperationKind::CreateMany,
        OperationKind::UpdateMany,
        OperationKind::DeleteMany,
        OperationKind::Increment,
        OperationKind::Decrement,
    ];
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OperationsConfig {
    /// When present, only these operations are exposed.
    pub include: Option<Vec<OperationKind>>,
    /// Always removed from the surface, even if included.
    pub exclude: Vec<OperationKind>,
}

impl OperationsConfig {
    pub fn enabled(&self, op: OperationKind) -> bool {
        let included = match &self.include {
            Some(list) => list.contains(&op),
            None => true,
        };
        included && !self.exclude.contains(&op)
    }

    /// Shorthand for a read-only surface.
    pub fn none() -> Self {
        Self { include: Some(Vec::new()), exclude: Vec::new() }
    }
}

impl EngineConfig {
    /// Validate the configuration before any connection is made.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database.trim().is_empty() {
            return Err(EngineError::Configuration("database must not be empty".into()));
        }
        if self.containers.is_empty() {
            return Err(EngineError::Configuration(
                "at least one container must be configured".into(),
            ));
        }
        for (index, container) in self.containers.iter().enumerate() {
            if container.name.trim().is_empty() {
                return Err(EngineError::Configuration(format!(
                    "container at index {index} has an empty name"
                )));
            }
            if self.containers[..index].iter().any(|c| c.name == container.name) {
                return Err(EngineError::Configuration(format!(
                    "duplicate container name '{}'",
                    container.name
                )));
            }
        }
        match (&self.connection_string, &self.endpoint, &self.credential) {
            (Some(_), None, None) => Ok(()),
            (None, Some(_), Some(_)) => Ok(()),
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(EngineError::Configuration(
                "connection_string and endpoint/credential are mutually exclusive".into(),
            )),
            (None, Some(_), None) => Err(EngineError::Configuration(
                "endpoint requires a credential".into(),
            )),
            (None, None, Some(_)) => Err(EngineError::Configuration(
                "credential requires an endpoint".into(),
            )),
            (None, None, None) => Err(EngineError::Configuration(
                "either connection_string or endpoint + credential is required".into(),
            )),
        }
    }

    /// Settings handed to the injected connector. Loopback endpoints
    /// (emulators) disable certificate validation, whether targeted via
    /// `endpoint` or through the connection string.
    pub fn connect_settings(&self) -> ConnectSettings {
        let mut settings = ConnectSettings {
            database: self.database.clone(),
            connection_string: self.connection_string.clone(),
            endpoint: self.endpoint.clone(),
            credential: self.credential.clone(),
            accept_invalid_certs: false,
        };
        settings.accept_invalid_certs = settings.is_loopback();
        settings
    }

    /// Effective type-system config for one container.
    pub fn type_system_for(&self, container: &ContainerSource) -> TypeSystemConfig {
        container.type_system.clone().unwrap_or_else(|| self.type_system.clone())
    }

    /// Effective sample size: container override, then the type-system
    /// default, then [`DEFAULT_SAMPLE_SIZE`].
    pub fn sample_size_for(&self, container: &ContainerSource) -> i64 {
        container
            .sample_size
            .or(self.type_system_for(container).sample_size)
            .unwrap_or(DEFAULT_SAMPLE_SIZE)
    }
}
