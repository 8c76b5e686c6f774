//! Document sampler — strategy-driven, RU-budgeted collection of
//! representative documents from one container.
//!
//! Strategies live in sibling modules (`top`, `random`, `partition`,
//! `schema`); this module owns the shared plumbing: options, budget
//! accounting, page draining, progress and cancellation.

mod partition;
mod random;
mod schema;
mod top;

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use store::{ContainerOps, Document, QueryPager, QuerySpec, RetryPolicy};

use crate::config::{SampleStrategyKind, SamplingConfig};
use crate::error::{EngineError, EngineResult};
use crate::progress::{emit, BuildStage, ProgressCallback, ProgressEvent};

/// Server page size used while draining sample queries.
const PAGE_SIZE: i32 = 100;

/// Hard warning threshold; sampling more than this is almost never
/// worth the RUs.
const SAMPLE_SIZE_WARN: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    /// The requested count (or everything available) was collected.
    Completed,
    /// The RU budget ran out first; documents are whatever was gathered.
    BudgetExceeded,
    /// Collection stopped early (cancellation).
    Partial,
}

#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub documents: Vec<Document>,
    pub request_charge: f64,
    pub status: SampleStatus,
    /// Distinct partition-key values covered (partition strategy).
    pub partitions_covered: Option<usize>,
    /// Distinct schema signatures seen (schema strategy).
    pub schema_variants: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SampleOptions {
    pub size: i64,
    pub strategy: SampleStrategyKind,
    pub max_ru: Option<f64>,
    pub min_schema_variants: usize,
    pub seed: Option<u64>,
}

impl SampleOptions {
    pub fn from_config(size: i64, sampling: &SamplingConfig) -> Self {
        Self {
            size,
            strategy: sampling.strategy,
            max_ru: sampling.max_ru,
            min_schema_variants: sampling.min_schema_variants,
            seed: sampling.seed,
        }
    }
}

/// Shared RU accounting. Tasks charge as pages arrive; once the limit is
/// reached no further pages are issued.
pub(crate) struct RuBudget {
    limit: Option<f64>,
    consumed: Mutex<f64>,
}

impl RuBudget {
    fn new(limit: Option<f64>) -> Self {
        Self { limit, consumed: Mutex::new(0.0) }
    }

    pub(crate) fn charge(&self, ru: f64) {
        *self.consumed.lock().expect("budget poisoned") += ru;
    }

    pub(crate) fn exceeded(&self) -> bool {
        match self.limit {
            Some(limit) => *self.consumed.lock().expect("budget poisoned") >= limit,
            None => false,
        }
    }

    pub(crate) fn consumed(&self) -> f64 {
        *self.consumed.lock().expect("budget poisoned")
    }
}

/// Samples one container.
pub struct DocumentSampler {
    container_name: String,
    container: Arc<dyn ContainerOps>,
    partition_key_path: String,
    retry: RetryPolicy,
    progress: Option<ProgressCallback>,
}

impl DocumentSampler {
    pub fn new(
        container_name: impl Into<String>,
        container: Arc<dyn ContainerOps>,
        partition_key_path: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            container_name: container_name.into(),
            container,
            partition_key_path: partition_key_path.into(),
            retry,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Partition-key path as a SQL field reference (`/a/b` → `a.b`).
    fn partition_key_field(&self) -> String {
        self.partition_key_path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Run the configured strategy.
    pub async fn sample(
        &self,
        options: &SampleOptions,
        cancel: &CancellationToken,
    ) -> EngineResult<SampleOutcome> {
        if options.size <= 0 {
            return Err(EngineError::Validation(format!(
                "sample size must be positive, got {}",
                options.size
            )));
        }
        if options.size > SAMPLE_SIZE_WARN {
            warn!(
                container = %self.container_name,
                sample_size = options.size,
                "Sample size exceeds {SAMPLE_SIZE_WARN}; proceeding anyway"
            );
        }
        let budget = RuBudget::new(options.max_ru);
        let outcome = match options.strategy {
            SampleStrategyKind::Top => top::run(self, options, &budget, cancel).await?,
            SampleStrategyKind::Random => random::run(self, options, &budget, cancel).await?,
            SampleStrategyKind::Partition => {
                partition::run(self, options, &budget, cancel).await?
            }
            SampleStrategyKind::Schema => schema::run(self, options, &budget, cancel).await?,
        };
        debug!(
            container = %self.container_name,
            strategy = ?options.strategy,
            collected = outcome.documents.len(),
            request_charge = outcome.request_charge,
            status = ?outcome.status,
            "Sampling finished"
        );
        Ok(outcome)
    }

    fn report_progress(&self, sampled: usize, target: i64, ru_consumed: f64) {
        let share = if target > 0 { sampled as f64 / target as f64 } else { 0.0 };
        emit(
            &self.progress,
            ProgressEvent::for_container(BuildStage::SamplingProgress, &self.container_name)
                .with_progress(share)
                .with_metadata(json!({
                    "sampled": sampled,
                    "target": target,
                    "ruConsumed": ru_consumed,
                })),
        );
    }

    /// A retry-wrapped pager over one query.
    pub(crate) fn pager(&self, spec: &QuerySpec) -> QueryPager {
        QueryPager::new(self.container.clone(), spec.clone(), Some(PAGE_SIZE))
            .with_retry_policy(self.retry.clone())
    }
}

/// Convert page items to documents, dropping non-object values.
pub(crate) fn into_documents(items: Vec<Value>) -> Vec<Document> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

/// Drain a query until `target` documents, the end of the result set,
/// budget exhaustion or cancellation. Shared by the strategies that do a
/// single linear collection.
pub(crate) struct DrainResult {
    pub documents: Vec<Document>,
    pub status: SampleStatus,
}

pub(crate) async fn drain(
    sampler: &DocumentSampler,
    spec: &QuerySpec,
    target: usize,
    budget: &RuBudget,
    cancel: &CancellationToken,
    mut keep: impl FnMut(&Document) -> bool,
) -> EngineResult<DrainResult> {
    let mut pager = sampler.pager(spec);
    let mut documents: Vec<Document> = Vec::new();
    loop {
        if cancel.is_cancelled() {
            return Ok(DrainResult { documents, status: SampleStatus::Partial });
        }
        if budget.exceeded() {
            return Ok(DrainResult { documents, status: SampleStatus::BudgetExceeded });
        }
        let Some(page) = pager.next_page().await? else {
            return Ok(DrainResult { documents, status: SampleStatus::Completed });
        };
        budget.charge(page.request_charge);
        for document in into_documents(page.items) {
            if documents.len() >= target {
                break;
            }
            if keep(&document) {
                documents.push(document);
            }
        }
        sampler.report_progress(documents.len(), target as i64, budget.consumed());
        if documents.len() >= target {
            return Ok(DrainResult { documents, status: SampleStatus::Completed });
        }
    }
}
