//! `random` strategy: over-fetch recent documents, shuffle, truncate.
//!
//! Fetches 3N ordered by `_ts` descending, then runs an unbiased
//! Fisher–Yates shuffle. The shuffle source is seedable so tests stay
//! deterministic; production callers omit the seed.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
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
    let over_fetch = (options.size as usize).saturating_mul(3);
    let spec = QuerySpec::new(format!(
        "SELECT TOP {over_fetch} * FROM c ORDER BY c._ts DESC"
    ));
    let result = drain(sampler, &spec, over_fetch, budget, cancel, |_| true).await?;

    let mut documents = result.documents;
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    documents.shuffle(&mut rng);
    documents.truncate(options.size as usize);

    Ok(SampleOutcome {
        documents,
        request_charge: budget.consumed(),
        status: result.status,
        partitions_covered: None,
        schema_variants: None,
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::seeded;
    use super::super::{DocumentSampler, SampleOptions};
    use crate::config::SampleStrategyKind;
    use store::RetryPolicy;
    use tokio_util::sync::CancellationToken;

    fn options(seed: Option<u64>) -> SampleOptions {
        SampleOptions {
            size: 5,
            strategy: SampleStrategyKind::Random,
            max_ru: None,
            min_schema_variants: 3,
            seed,
        }
    }

    #[tokio::test]
    async fn test_seeded_shuffle_is_deterministic() {
        let container = seeded(20).await;
        let sampler =
            DocumentSampler::new("things", container, "/pk", RetryPolicy::default());
        let first = sampler
            .sample(&options(Some(42)), &CancellationToken::new())
            .await
            .unwrap();
        let second = sampler
            .sample(&options(Some(42)), &CancellationToken::new())
            .await
            .unwrap();
        let ids = |outcome: &super::super::SampleOutcome| {
            outcome
                .documents
                .iter()
                .map(|d| d["id"].as_str().unwrap().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.documents.len(), 5);
    }

    #[tokio::test]
    async fn test_no_duplicates_in_sample() {
        let container = seeded(20).await;
        let sampler =
            DocumentSampler::new("things", container, "/pk", RetryPolicy::default());
        let outcome = sampler
            .sample(&options(Some(1)), &CancellationToken::new())
            .await
            .unwrap();
        let mut ids: Vec<&str> =
            outcome.documents.iter().map(|d| d["id"].as_str().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }
}
