//! `top` strategy: take the first N documents the store returns.

use store::QuerySpec;
use tokio_util::sync::CancellationToken;

use crate::error::EngineResult;

use super::{drain, DocumentSampler, RuBudget, SampleOptions, SampleOutcome};

pub(super) async fn run(
    sampler: &DocumentSampler,
    options: &SampleOptions,
    budget: &RuBudget,
    cancel: &CancellationToken,
) -> EngineResult<SampleOutcome> {
    let spec = QuerySpec::new(format!("SELECT TOP {} * FROM c", options.size));
    let result = drain(sampler, &spec, options.size as usize, budget, cancel, |_| true).await?;
    Ok(SampleOutcome {
        documents: result.documents,
        request_charge: budget.consumed(),
        status: result.status,
        partitions_covered: None,
        schema_variants: None,
    })
}
