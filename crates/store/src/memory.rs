//! In-memory store — deterministic test double.
//!
//! Implements [`DocumentStore`]/[`ContainerOps`] over in-memory state, so
//! engine code and tests run without a live database. Supports exactly
//! the SQL subset the engine synthesizes (`SELECT [TOP n]`, `DISTINCT
//! VALUE`, parameterized `WHERE` conjunctions, `ORDER BY`), offset-based
//! continuation tokens, etag preconditions, and failure injection for
//! retry tests.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::container::{
    ConnectSettings, ContainerMetadata, ContainerOps, DocumentStore, QueryOptions, QueryPage,
    QuerySpec, ReadOutcome, StoreConnector, UpsertOutcome, WriteOutcome,
};
use crate::document::{document_id, partition_key_of, Document, ID_FIELD};
use crate::error::StoreError;

const POINT_READ_CHARGE: f64 = 1.0;
const WRITE_CHARGE: f64 = 5.0;
const QUERY_PAGE_CHARGE: f64 = 2.5;

// ── In-memory state ─────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    /// Insertion-ordered; pagination and unordered queries walk this.
    documents: Vec<Document>,
    /// Errors to raise on upcoming operations, front first. An entry
    /// may be scoped to one operation name.
    failures: VecDeque<(Option<String>, StoreError)>,
    /// Monotonic `_ts` source; fixed base keeps tests deterministic.
    ts_counter: i64,
}

/// One in-memory container.
pub struct MemoryContainer {
    name: String,
    partition_key_path: String,
    inner: Mutex<Inner>,
}

impl MemoryContainer {
    pub fn new(name: impl Into<String>, partition_key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key_path: partition_key_path.into(),
            inner: Mutex::new(Inner { ts_counter: 1_700_000_000, ..Inner::default() }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_key_path(&self) -> &str {
        &self.partition_key_path
    }

    /// Seed a document, assigning `_etag`/`_ts` like a real write but
    /// without charge accounting. Panics on a missing `id`: seeding
    /// malformed fixtures is a test bug.
    pub async fn seed(&self, mut document: Document) {
        assert!(document_id(&document).is_some(), "seeded document must carry an id");
        let mut state = self.inner.lock().await;
        stamp(&mut document, &mut state.ts_counter);
        state.documents.push(document);
    }

    /// Seed many documents in order.
    pub async fn seed_all<I: IntoIterator<Item = Document>>(&self, documents: I) {
        for document in documents {
            self.seed(document).await;
        }
    }

    /// Queue an error to be raised by the next operation of any kind.
    pub async fn fail_next(&self, error: StoreError) {
        self.inner.lock().await.failures.push_back((None, error));
    }

    /// Queue an error scoped to one operation (`point_read`, `query`,
    /// `create`, `replace`, `upsert`, `delete`, `metadata`). Other
    /// operations pass through until that operation runs.
    pub async fn fail_next_on(&self, operation: &str, error: StoreError) {
        self.inner
            .lock()
            .await
            .failures
            .push_back((Some(operation.to_string()), error));
    }

    /// Current document count.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn find_index(&self, state: &Inner, id: &str, partition_key: &str) -> Option<usize> {
        state.documents.iter().position(|doc| {
            document_id(doc) == Some(id)
                && partition_key_of(doc, &self.partition_key_path).as_deref()
                    == Some(partition_key)
        })
    }
}

fn stamp(document: &mut Document, ts_counter: &mut i64) {
    *ts_counter += 1;
    document.insert("_etag".to_string(), Value::String(Uuid::new_v4().to_string()));
    document.insert("_ts".to_string(), Value::from(*ts_counter));
}

fn etag_of(document: &Document) -> String {
    document
        .get("_etag")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn take_failure(state: &mut Inner, operation: &str) -> Option<StoreError> {
    match state.failures.front() {
        Some((Some(scoped), _)) if scoped != operation => None,
        Some(_) => state.failures.pop_front().map(|(_, err)| err),
        None => None,
    }
}

// ── SQL subset interpreter ──────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Projection {
    Star,
    DistinctValue(String),
}

#[derive(Debug, PartialEq)]
enum Comparison {
    Eq,
    Ne,
    Gt,
    Lt,
    Contains,
}

#[derive(Debug)]
struct Condition {
    path: String,
    comparison: Comparison,
    parameter: String,
}

#[derive(Debug)]
struct ParsedQuery {
    projection: Projection,
    top: Option<usize>,
    conditions: Vec<Condition>,
    order_by: Option<(String, bool)>,
}

fn parse_field_ref(token: &str) -> Result<String, StoreError> {
    token
        .strip_prefix("c.")
        .map(str::to_string)
        .ok_or_else(|| StoreError::QueryFailed(format!("expected document path, got '{token}'")))
}

fn parse_condition(clause: &str) -> Result<Condition, StoreError> {
    let clause = clause.trim();
    if let Some(rest) = clause.strip_prefix("CONTAINS(") {
        let body = rest
            .strip_suffix(')')
            .ok_or_else(|| StoreError::QueryFailed("unterminated CONTAINS".into()))?;
        let (field, param) = body
            .split_once(',')
            .ok_or_else(|| StoreError::QueryFailed("malformed CONTAINS".into()))?;
        return Ok(Condition {
            path: parse_field_ref(field.trim())?,
            comparison: Comparison::Contains,
            parameter: parse_parameter_ref(param.trim())?,
        });
    }
    let mut parts = clause.split_whitespace();
    let field = parts
        .next()
        .ok_or_else(|| StoreError::QueryFailed("empty condition".into()))?;
    let op = parts
        .next()
        .ok_or_else(|| StoreError::QueryFailed("condition missing operator".into()))?;
    let param = parts
        .next()
        .ok_or_else(|| StoreError::QueryFailed("condition missing parameter".into()))?;
    if parts.next().is_some() {
        return Err(StoreError::QueryFailed(format!("trailing tokens in condition '{clause}'")));
    }
    let comparison = match op {
        "=" => Comparison::Eq,
        "!=" => Comparison::Ne,
        ">" => Comparison::Gt,
        "<" => Comparison::Lt,
        other => return Err(StoreError::QueryFailed(format!("unsupported operator '{other}'"))),
    };
    Ok(Condition {
        path: parse_field_ref(field)?,
        comparison,
        parameter: parse_parameter_ref(param)?,
    })
}

fn parse_parameter_ref(token: &str) -> Result<String, StoreError> {
    token
        .strip_prefix('@')
        .map(str::to_string)
        .ok_or_else(|| StoreError::QueryFailed(format!("expected @parameter, got '{token}'")))
}

fn parse_query(sql: &str) -> Result<ParsedQuery, StoreError> {
    let mut rest = sql
        .trim()
        .strip_prefix("SELECT ")
        .ok_or_else(|| StoreError::QueryFailed(format!("unsupported query: {sql}")))?
        .trim_start();

    let mut top = None;
    if let Some(after) = rest.strip_prefix("TOP ") {
        let (count, tail) = after
            .split_once(' ')
            .ok_or_else(|| StoreError::QueryFailed("TOP missing projection".into()))?;
        top = Some(
            count
                .parse::<usize>()
                .map_err(|_| StoreError::QueryFailed(format!("bad TOP count '{count}'")))?,
        );
        rest = tail.trim_start();
    }

    let projection;
    if let Some(after) = rest.strip_prefix("DISTINCT VALUE ") {
        let (field, tail) = after
            .split_once(' ')
            .ok_or_else(|| StoreError::QueryFailed("DISTINCT VALUE missing FROM".into()))?;
        projection = Projection::DistinctValue(parse_field_ref(field)?);
        rest = tail.trim_start();
    } else if let Some(after) = rest.strip_prefix("* ") {
        projection = Projection::Star;
        rest = after.trim_start();
    } else {
        return Err(StoreError::QueryFailed(format!("unsupported projection in: {sql}")));
    }

    rest = rest
        .strip_prefix("FROM c")
        .ok_or_else(|| StoreError::QueryFailed(format!("unsupported source in: {sql}")))?
        .trim_start();

    let mut conditions = Vec::new();
    if let Some(after) = rest.strip_prefix("WHERE ") {
        let (where_part, tail) = match after.split_once(" ORDER BY ") {
            Some((w, t)) => (w, Some(t)),
            None => (after, None),
        };
        for clause in where_part.split(" AND ") {
            conditions.push(parse_condition(clause)?);
        }
        rest = tail.unwrap_or("");
    } else if let Some(after) = rest.strip_prefix("ORDER BY ") {
        rest = after;
        return finish_order_by(rest, ParsedQuery { projection, top, conditions, order_by: None });
    }

    if rest.is_empty() {
        return Ok(ParsedQuery { projection, top, conditions, order_by: None });
    }
    finish_order_by(rest, ParsedQuery { projection, top, conditions, order_by: None })
}

fn finish_order_by(rest: &str, mut query: ParsedQuery) -> Result<ParsedQuery, StoreError> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(query);
    }
    let mut parts = rest.split_whitespace();
    let field = parts
        .next()
        .ok_or_else(|| StoreError::QueryFailed("ORDER BY missing field".into()))?;
    let direction = parts.next().unwrap_or("ASC");
    if parts.next().is_some() {
        return Err(StoreError::QueryFailed(format!("trailing tokens after ORDER BY: {rest}")));
    }
    let descending = match direction {
        "ASC" => false,
        "DESC" => true,
        other => return Err(StoreError::QueryFailed(format!("bad order direction '{other}'"))),
    };
    query.order_by = Some((parse_field_ref(field)?, descending));
    Ok(query)
}

fn lookup<'a>(doc: &'a Document, dotted: &str) -> Option<&'a Value> {
    let mut current: Option<&Value> = None;
    for segment in dotted.split('.') {
        current = match current {
            None => doc.get(segment),
            Some(Value::Object(map)) => map.get(segment),
            _ => return None,
        };
        current?;
    }
    current
}

fn compare_values(a: &Value, b: &Value) -> Option<CmpOrdering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn condition_matches(doc: &Document, condition: &Condition, parameters: &HashMap<&str, &Value>) -> bool {
    let Some(expected) = parameters.get(condition.parameter.as_str()) else {
        return false;
    };
    let Some(actual) = lookup(doc, &condition.path) else {
        return false;
    };
    match condition.comparison {
        Comparison::Eq => actual == *expected,
        Comparison::Ne => actual != *expected,
        Comparison::Gt => matches!(compare_values(actual, expected), Some(CmpOrdering::Greater)),
        Comparison::Lt => matches!(compare_values(actual, expected), Some(CmpOrdering::Less)),
        Comparison::Contains => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            _ => false,
        },
    }
}

fn execute_query(
    documents: &[Document],
    spec: &QuerySpec,
    options: &QueryOptions,
) -> Result<QueryPage, StoreError> {
    let parsed = parse_query(&spec.sql)?;
    let parameters: HashMap<&str, &Value> = spec
        .parameters
        .iter()
        .map(|p| (p.name.trim_start_matches('@'), &p.value))
        .collect();

    let mut matched: Vec<&Document> = documents
        .iter()
        .filter(|doc| parsed.conditions.iter().all(|c| condition_matches(doc, c, &parameters)))
        .collect();

    if let Some((field, descending)) = &parsed.order_by {
        matched.sort_by(|a, b| {
            let ordering = match (lookup(a, field), lookup(b, field)) {
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(CmpOrdering::Equal),
                (Some(_), None) => CmpOrdering::Greater,
                (None, Some(_)) => CmpOrdering::Less,
                (None, None) => CmpOrdering::Equal,
            };
            if *descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    let mut items: Vec<Value> = match &parsed.projection {
        Projection::Star => matched.iter().map(|doc| Value::Object((*doc).clone())).collect(),
        Projection::DistinctValue(path) => {
            let mut seen = Vec::new();
            for doc in &matched {
                if let Some(value) = lookup(doc, path) {
                    if !seen.contains(value) {
                        seen.push(value.clone());
                    }
                }
            }
            seen
        }
    };

    if let Some(limit) = parsed.top {
        items.truncate(limit);
    }

    let offset: usize = match &options.continuation_token {
        Some(token) => token
            .parse()
            .map_err(|_| StoreError::BadRequest(format!("bad continuation token '{token}'")))?,
        None => 0,
    };
    let page_size = options.max_item_count.map(|n| n.max(0) as usize).unwrap_or(usize::MAX);
    let end = offset.saturating_add(page_size).min(items.len());
    let page: Vec<Value> = items
        .get(offset..end)
        .map(|slice| slice.to_vec())
        .unwrap_or_default();
    let continuation_token = if end < items.len() { Some(end.to_string()) } else { None };

    Ok(QueryPage { items: page, request_charge: QUERY_PAGE_CHARGE, continuation_token })
}

// ── ContainerOps implementation ─────────────────────────────────

impl ContainerOps for MemoryContainer {
    fn point_read<'a>(
        &'a self,
        id: &'a str,
        partition_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ReadOutcome, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            if let Some(err) = take_failure(&mut state, "point_read") {
                return Err(err);
            }
            match self.find_index(&state, id, partition_key) {
                Some(index) => {
                    let document = state.documents[index].clone();
                    let etag = etag_of(&document);
                    Ok(ReadOutcome {
                        document: Some(document),
                        etag,
                        request_charge: POINT_READ_CHARGE,
                    })
                }
                None => Ok(ReadOutcome {
                    document: None,
                    etag: String::new(),
                    request_charge: POINT_READ_CHARGE,
                }),
            }
        })
    }

    fn query<'a>(
        &'a self,
        spec: &'a QuerySpec,
        options: &'a QueryOptions,
    ) -> Pin<Box<dyn Future<Output = Result<QueryPage, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            if let Some(err) = take_failure(&mut state, "query") {
                return Err(err);
            }
            debug!(container = %self.name, sql = %spec.sql, "Executing query");
            execute_query(&state.documents, spec, options)
        })
    }

    fn create_item<'a>(
        &'a self,
        mut document: Document,
    ) -> Pin<Box<dyn Future<Output = Result<WriteOutcome, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            if let Some(err) = take_failure(&mut state, "create") {
                return Err(err);
            }
            let id = document_id(&document)
                .ok_or_else(|| StoreError::BadRequest("document is missing 'id'".into()))?
                .to_string();
            let partition_key = partition_key_of(&document, &self.partition_key_path)
                .unwrap_or_else(|| id.clone());
            if self.find_index(&state, &id, &partition_key).is_some() {
                return Err(StoreError::Conflict(id));
            }
            stamp(&mut document, &mut state.ts_counter);
            let etag = etag_of(&document);
            state.documents.push(document.clone());
            Ok(WriteOutcome { document, etag, request_charge: WRITE_CHARGE })
        })
    }

    fn replace_item<'a>(
        &'a self,
        id: &'a str,
        partition_key: &'a str,
        mut document: Document,
        etag: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<WriteOutcome, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            if let Some(err) = take_failure(&mut state, "replace") {
                return Err(err);
            }
            let index = self
                .find_index(&state, id, partition_key)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if let Some(expected) = etag {
                if etag_of(&state.documents[index]) != expected {
                    return Err(StoreError::PreconditionFailed);
                }
            }
            document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
            stamp(&mut document, &mut state.ts_counter);
            let etag = etag_of(&document);
            state.documents[index] = document.clone();
            Ok(WriteOutcome { document, etag, request_charge: WRITE_CHARGE })
        })
    }

    fn upsert_item<'a>(
        &'a self,
        partition_key: &'a str,
        mut document: Document,
    ) -> Pin<Box<dyn Future<Output = Result<UpsertOutcome, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            if let Some(err) = take_failure(&mut state, "upsert") {
                return Err(err);
            }
            let id = document_id(&document)
                .ok_or_else(|| StoreError::BadRequest("document is missing 'id'".into()))?
                .to_string();
            stamp(&mut document, &mut state.ts_counter);
            let etag = etag_of(&document);
            match self.find_index(&state, &id, partition_key) {
                Some(index) => {
                    state.documents[index] = document.clone();
                    Ok(UpsertOutcome {
                        write: WriteOutcome { document, etag, request_charge: WRITE_CHARGE },
                        was_created: false,
                    })
                }
                None => {
                    state.documents.push(document.clone());
                    Ok(UpsertOutcome {
                        write: WriteOutcome { document, etag, request_charge: WRITE_CHARGE },
                        was_created: true,
                    })
                }
            }
        })
    }

    fn delete_item<'a>(
        &'a self,
        id: &'a str,
        partition_key: &'a str,
        etag: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<f64, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            if let Some(err) = take_failure(&mut state, "delete") {
                return Err(err);
            }
            let index = self
                .find_index(&state, id, partition_key)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if let Some(expected) = etag {
                if etag_of(&state.documents[index]) != expected {
                    return Err(StoreError::PreconditionFailed);
                }
            }
            state.documents.remove(index);
            Ok(WRITE_CHARGE)
        })
    }

    fn read_metadata(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ContainerMetadata, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            if let Some(err) = take_failure(&mut state, "metadata") {
                return Err(err);
            }
            Ok(ContainerMetadata {
                partition_key_paths: vec![self.partition_key_path.clone()],
            })
        })
    }
}

// ── Store and connector ─────────────────────────────────────────

/// An in-memory [`DocumentStore`] holding named containers.
pub struct MemoryStore {
    containers: StdMutex<HashMap<String, Arc<MemoryContainer>>>,
    disposed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { containers: StdMutex::new(HashMap::new()), disposed: AtomicBool::new(false) }
    }

    /// Create (or return) a container with the given partition-key path.
    pub fn add_container(
        &self,
        name: impl Into<String>,
        partition_key_path: impl Into<String>,
    ) -> Arc<MemoryContainer> {
        let name = name.into();
        let mut containers = self.containers.lock().expect("container map poisoned");
        containers
            .entry(name.clone())
            .or_insert_with(|| Arc::new(MemoryContainer::new(name, partition_key_path)))
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn container(&self, name: &str) -> Option<Arc<dyn ContainerOps>> {
        let containers = self.containers.lock().expect("container map poisoned");
        containers.get(name).map(|c| c.clone() as Arc<dyn ContainerOps>)
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!("Memory store disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// Connector wrapping a pre-built [`MemoryStore`]; records the settings
/// it was connected with so tests can assert on them.
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    last_settings: StdMutex<Option<ConnectSettings>>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store, last_settings: StdMutex::new(None) }
    }

    /// Settings from the most recent `connect` call.
    pub fn last_settings(&self) -> Option<ConnectSettings> {
        self.last_settings.lock().expect("settings poisoned").clone()
    }
}

impl StoreConnector for MemoryConnector {
    fn connect<'a>(
        &'a self,
        settings: &'a ConnectSettings,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn DocumentStore>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            *self.last_settings.lock().expect("settings poisoned") = Some(settings.clone());
            Ok(self.store.clone() as Arc<dyn DocumentStore>)
        })
    }
}
