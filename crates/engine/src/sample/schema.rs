//! `schema` strategy: shape-aware sampling.
//!
//! Streams the container and keeps at most `min_schema_variants`
//! documents per schema signature, so rare document shapes survive into
//! the sample instead of being drowned out by the dominant one.

use std::collections::HashMap;

use store::{schema_signature, QuerySpec};
use tokio_util::sync::CancellationToken;

use crate::error::EngineResult;

use super::{drain, DocumentSampler, RuBudget, SampleOptions, SampleOutcome};

pub(super) async fn run(
    sampler: &DocumentSampler,
    options: &SampleOptions,
    budget: &RuBudget,
    cancel: &CancellationToken,
) -> EngineResult<SampleOutcome> {
    let spec = QuerySpec::new("SELECT * FROM c");
    let mut per_signature: HashMap<String, usize> = HashMap::new();
    let per_variant = options.min_schema_variants.max(1);

    let result = drain(sampler, &spec, options.size as usize, budget, cancel, |document| {
        let signature = schema_signature(document);
        let count = per_signature.entry(signature).or_insert(0);
        if *count < per_variant {
            *count += 1;
            true
        } else {
            false
        }
    })
    .await?;

    Ok(SampleOutcome {
        documents: result.documents,
        request_charge: budget.consumed(),
        status: result.status,
        partitions_covered: None,
        schema_variants: Some(per_signature.len()),
    })
}
