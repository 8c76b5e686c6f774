//! Container trait — abstract interface for all document-store operations.
//!
//! The engine accesses the store exclusively through these traits.
//! `memory.rs` provides the deterministic in-memory implementation; a
//! production driver wraps the vendor SDK behind the same surface.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::error::StoreError;

/// A named SQL parameter. Values are always bound, never interpolated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: Value,
}

impl QueryParameter {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// A parameterized query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpec {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
}

impl QuerySpec {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), parameters: Vec::new() }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(QueryParameter::new(name, value));
        self
    }
}

/// Per-request query options.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Page size cap; the store may return fewer items.
    pub max_item_count: Option<i32>,
    /// Opaque cursor from a previous page.
    pub continuation_token: Option<String>,
}

/// One page of query results.
///
/// Items are raw JSON values: `SELECT DISTINCT VALUE` projections yield
/// scalars, everything else yields objects.
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub items: Vec<Value>,
    pub request_charge: f64,
    pub continuation_token: Option<String>,
}

/// Result of a point read. `etag` is empty on a miss.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub document: Option<Document>,
    pub etag: String,
    pub request_charge: f64,
}

/// Result of a write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub document: Document,
    pub etag: String,
    pub request_charge: f64,
}

/// Result of an upsert; `was_created` distinguishes insert from update.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub write: WriteOutcome,
    pub was_created: bool,
}

/// Container metadata exposed by the store.
#[derive(Debug, Clone)]
pub struct ContainerMetadata {
    pub partition_key_paths: Vec<String>,
}

/// Unified async interface over one container.
///
/// Object-safe thanks to `Pin<Box<…>>` returns. Implementations must be
/// `Send + Sync` so handles can be shared across resolvers.
pub trait ContainerOps: Send + Sync {
    /// Point read by id + partition key. A miss is a normal outcome with
    /// `document: None` and an empty etag; only transport-level failures
    /// surface as errors.
    fn point_read<'a>(
        &'a self,
        id: &'a str,
        partition_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ReadOutcome, StoreError>> + Send + 'a>>;

    /// Execute one page of a parameterized query.
    fn query<'a>(
        &'a self,
        spec: &'a QuerySpec,
        options: &'a QueryOptions,
    ) -> Pin<Box<dyn Future<Output = Result<QueryPage, StoreError>> + Send + 'a>>;

    /// Insert a new item; duplicate id yields [`StoreError::Conflict`].
    fn create_item<'a>(
        &'a self,
        document: Document,
    ) -> Pin<Box<dyn Future<Output = Result<WriteOutcome, StoreError>> + Send + 'a>>;

    /// Replace an existing item, honoring the ETag precondition when
    /// supplied.
    fn replace_item<'a>(
        &'a self,
        id: &'a str,
        partition_key: &'a str,
        document: Document,
        etag: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<WriteOutcome, StoreError>> + Send + 'a>>;

    /// Create-or-replace an item.
    fn upsert_item<'a>(
        &'a self,
        partition_key: &'a str,
        document: Document,
    ) -> Pin<Box<dyn Future<Output = Result<UpsertOutcome, StoreError>> + Send + 'a>>;

    /// Hard delete, honoring the ETag precondition when supplied.
    /// Returns the request charge.
    fn delete_item<'a>(
        &'a self,
        id: &'a str,
        partition_key: &'a str,
        etag: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<f64, StoreError>> + Send + 'a>>;

    /// Read container metadata (partition-key paths).
    fn read_metadata(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ContainerMetadata, StoreError>> + Send + '_>>;
}

/// A connected data-source client owning its container handles.
///
/// `dispose` is idempotent and the only way the engine releases the
/// client; resolvers must not be invoked afterwards.
pub trait DocumentStore: Send + Sync {
    fn container(&self, name: &str) -> Option<Arc<dyn ContainerOps>>;

    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// Connection settings the orchestrator hands to a connector.
///
/// Exactly one of `connection_string` or `endpoint`+`credential` is set;
/// the orchestrator validates this before connecting.
#[derive(Debug, Clone, Default)]
pub struct ConnectSettings {
    pub database: String,
    pub connection_string: Option<String>,
    pub endpoint: Option<String>,
    pub credential: Option<String>,
    /// Set for loopback endpoints (emulators) where certificate
    /// validation must be disabled.
    pub accept_invalid_certs: bool,
}

impl ConnectSettings {
    /// The endpoint this connection targets: the explicit `endpoint`,
    /// or the `AccountEndpoint` key of the connection string.
    pub fn effective_endpoint(&self) -> Option<String> {
        if let Some(endpoint) = &self.endpoint {
            return Some(endpoint.clone());
        }
        let connection_string = self.connection_string.as_deref()?;
        connection_string.split(';').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("AccountEndpoint")
                .then(|| value.trim().to_string())
        })
    }

    /// Whether the target is a loopback endpoint (local emulator).
    pub fn is_loopback(&self) -> bool {
        match self.effective_endpoint() {
            Some(endpoint) => {
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://");
                host.starts_with("localhost")
                    || host.starts_with("127.0.0.1")
                    || host.starts_with("[::1]")
            }
            None => false,
        }
    }
}

/// Factory for [`DocumentStore`] clients. The concrete driver is injected
/// through this seam; the engine never references driver types.
pub trait StoreConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        settings: &'a ConnectSettings,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn DocumentStore>, StoreError>> + Send + 'a>>;
}

/// Drains a query page by page, tracking the continuation token and the
/// cumulative request charge. With a retry policy attached, every page
/// fetch runs inside the retry wrapper.
pub struct QueryPager {
    container: Arc<dyn ContainerOps>,
    spec: QuerySpec,
    max_item_count: Option<i32>,
    retry: Option<crate::retry::RetryPolicy>,
    continuation: Option<String>,
    exhausted: bool,
    request_charge: f64,
}

impl QueryPager {
    pub fn new(container: Arc<dyn ContainerOps>, spec: QuerySpec, max_item_count: Option<i32>) -> Self {
        Self {
            container,
            spec,
            max_item_count,
            retry: None,
            continuation: None,
            exhausted: false,
            request_charge: 0.0,
        }
    }

    pub fn with_retry_policy(mut self, policy: crate::retry::RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Fetch the next page, or `None` once the store reports no further
    /// continuation.
    pub async fn next_page(&mut self) -> Result<Option<QueryPage>, StoreError> {
        if self.exhausted {
            return Ok(None);
        }
        let options = QueryOptions {
            max_item_count: self.max_item_count,
            continuation_token: self.continuation.clone(),
        };
        let page = match &self.retry {
            Some(policy) => {
                crate::retry::with_retry(policy, "query.page", || {
                    self.container.query(&self.spec, &options)
                })
                .await?
            }
            None => self.container.query(&self.spec, &options).await?,
        };
        self.request_charge += page.request_charge;
        self.continuation = page.continuation_token.clone();
        if self.continuation.is_none() {
            self.exhausted = true;
        }
        Ok(Some(page))
    }

    /// Total RUs consumed across fetched pages.
    pub fn request_charge(&self) -> f64 {
        self.request_charge
    }
}
