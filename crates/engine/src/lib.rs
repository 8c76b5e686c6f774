//! GraphQL derivation engine for partitioned document stores.
//!
//! From a sample of documents per container the engine infers a typed
//! GraphQL schema, composes its SDL, and binds executable resolvers that
//! perform validated, retry-wrapped CRUD against the store. See
//! [`build::build_schema`] for the entry point.

pub mod binding;
pub mod build;
pub mod config;
pub mod error;
pub mod graphql;
pub mod infer;
pub mod progress;
pub mod resolver;
pub mod sample;
pub mod sdl;
pub mod validate;

pub use binding::ContainerBinding;
pub use build::{build_schema, Artifacts, DisposeHandle, SchemaBuild};
pub use config::{
    ConflictResolution, ContainerSource, EngineConfig, NestedTypeFallback, NumberInference,
    OperationKind, OperationsConfig, RetryConfig, SampleStrategyKind, SamplingConfig,
    TypeSystemConfig, DEFAULT_SAMPLE_SIZE,
};
pub use error::{EngineError, EngineResult};
pub use infer::{infer_schema, InferenceStats, InferredField, InferredSchema, InferredType};
pub use progress::{BuildStage, ProgressCallback, ProgressEvent};
pub use resolver::{build_resolver_map, Resolve, ResolverArgs, ResolverMap};
pub use sample::{DocumentSampler, SampleOptions, SampleOutcome, SampleStatus};
pub use sdl::compose_sdl;
