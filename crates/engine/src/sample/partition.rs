//! `partition` strategy: spread the sample evenly across partitions.
//!
//! Discovers the distinct partition-key values, divides the target count
//! into per-partition quotas (`⌊N/P⌋` plus the remainder over the first
//! `N mod P`), and queries each partition in parallel.

use futures::future::join_all;
use serde_json::Value;
use store::{Document, QuerySpec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::EngineResult;

use super::{drain, DocumentSampler, RuBudget, SampleOptions, SampleOutcome, SampleStatus};

pub(super) async fn run(
    sampler: &DocumentSampler,
    options: &SampleOptions,
    budget: &RuBudget,
    cancel: &CancellationToken,
) -> EngineResult<SampleOutcome> {
    let partitions = discover_partitions(sampler, budget, cancel).await?;
    let partition_count = partitions.len();
    if partition_count == 0 {
        // Empty container or opaque metadata: degrade to `top`.
        debug!(container = %sampler.container_name, "No partitions discovered, falling back to top strategy");
        let mut outcome = super::top::run(sampler, options, budget, cancel).await?;
        outcome.partitions_covered = Some(0);
        return Ok(outcome);
    }

    let target = options.size as usize;
    let base = target / partition_count;
    let remainder = target % partition_count;
    let field = sampler.partition_key_field();

    let tasks = partitions.iter().enumerate().map(|(index, value)| {
        let quota = base + usize::from(index < remainder);
        let field = field.clone();
        async move {
            if quota == 0 {
                return Some((Vec::new(), SampleStatus::Completed));
            }
            let spec = QuerySpec::new(format!(
                "SELECT TOP {quota} * FROM c WHERE c.{field} = @pk"
            ))
            .with_parameter("@pk", value.clone());
            match drain(sampler, &spec, quota, budget, cancel, |_| true).await {
                Ok(result) => Some((result.documents, result.status)),
                Err(err) => {
                    warn!(
                        container = %sampler.container_name,
                        partition = %value,
                        error = %err,
                        "Partition sample failed, skipping partition"
                    );
                    None
                }
            }
        }
    });

    let results = join_all(tasks).await;
    let mut documents: Vec<Document> = Vec::with_capacity(target);
    let mut status = SampleStatus::Completed;
    for (partition_documents, partition_status) in results.into_iter().flatten() {
        documents.extend(partition_documents);
        if partition_status != SampleStatus::Completed && status == SampleStatus::Completed {
            status = partition_status;
        }
    }
    documents.truncate(target);

    Ok(SampleOutcome {
        documents,
        request_charge: budget.consumed(),
        status,
        partitions_covered: Some(partition_count),
        schema_variants: None,
    })
}

/// `SELECT DISTINCT VALUE c.{pk}` across all pages, within the budget.
async fn discover_partitions(
    sampler: &DocumentSampler,
    budget: &RuBudget,
    cancel: &CancellationToken,
) -> EngineResult<Vec<String>> {
    let spec = QuerySpec::new(format!(
        "SELECT DISTINCT VALUE c.{} FROM c",
        sampler.partition_key_field()
    ));
    let mut pager = sampler.pager(&spec);
    let mut values = Vec::new();
    loop {
        if cancel.is_cancelled() || budget.exceeded() {
            return Ok(values);
        }
        let Some(page) = pager.next_page().await? else {
            return Ok(values);
        };
        budget.charge(page.request_charge);
        for item in page.items {
            let rendered = match item {
                Value::String(s) => s,
                other => other.to_string(),
            };
            if !values.contains(&rendered) {
                values.push(rendered);
            }
        }
    }
}
