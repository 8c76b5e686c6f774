//! Document-store side of the workspace.
//!
//! `container` defines the capability traits the engine consumes,
//! `error` the classified failure kinds, `retry` the backoff combinator,
//! and `memory` a deterministic in-memory implementation used as the
//! test double and reference connector.

pub mod container;
pub mod document;
pub mod error;
pub mod memory;
pub mod retry;

pub use container::{
    ConnectSettings, ContainerMetadata, ContainerOps, DocumentStore, QueryOptions, QueryPage,
    QueryPager, QueryParameter, QuerySpec, ReadOutcome, StoreConnector, UpsertOutcome,
    WriteOutcome,
};
pub use document::{resolve_path, schema_signature, Document};
pub use error::{ErrorKind, StoreError};
pub use memory::{MemoryConnector, MemoryContainer, MemoryStore};
pub use retry::{with_retry, RetryClassifier, RetryPolicy};
