pub mod db;
pub mod error;
pub mod normalization;
pub mod photos;
pub mod providers;
pub mod reconcile;
pub mod tracing;

pub mod util {
    pub mod env;
}

// Collection pipeline (library function, not a bin): fetch both providers,
// reconcile on normalized name, enrich with photos, persist.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use ::tracing::{info, warn};

use db::{flatten_unified, Db};
use error::PipelineError;
use normalization::Provider;
use photos::PhotoFetcher;
use providers::{google::GooglePlaces, yelp::Yelp, FetchOutcome, GeoPoint};
use reconcile::{merge, UnifiedRecord};

/// Everything the pipeline needs, passed in explicitly. The core never reads
/// keys or environment itself; the binary assembles this from env.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub google_api_key: String,
    pub yelp_api_key: String,
    pub center: GeoPoint,
    pub radius_m: u32,
    pub yelp_limit: u32,
    pub photos_root: PathBuf,
    pub request_timeout: Duration,
    pub photo_concurrency: usize,
}

/// Per-run counters, logged at the end so a human can decide whether a
/// degraded run needs a rerun.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PipelineSummary {
    pub generated_at: String,
    pub google_fetched: usize,
    pub yelp_fetched: usize,
    pub malformed_dropped: usize,
    pub matched: usize,
    pub google_only: usize,
    pub yelp_only: usize,
    pub duplicate_keys_dropped: usize,
    pub photos_stored: usize,
    pub photo_failures: usize,
    pub insights_fetched: usize,
    pub insight_failures: usize,
    pub rows_inserted: u64,
}

pub async fn collect_and_reconcile(cfg: &PipelineConfig, db: &Db) -> Result<PipelineSummary> {
    let google = GooglePlaces::new(&cfg.google_api_key, cfg.request_timeout)?;
    let yelp = Yelp::new(&cfg.yelp_api_key, cfg.request_timeout, cfg.yelp_limit)?;

    // The two fetches are independent; run them concurrently. A provider
    // failing hard degrades to an empty contribution instead of aborting
    // the run (no further calls are made to that provider).
    let (google_result, yelp_result) = tokio::join!(
        google.fetch_nearby(cfg.center, cfg.radius_m),
        yelp.fetch_nearby(cfg.center, cfg.radius_m),
    );
    let google_outcome = degrade_on_upstream("google", google_result);
    let yelp_outcome = degrade_on_upstream("yelp", yelp_result);

    let mut summary = PipelineSummary {
        generated_at: chrono::Utc::now().to_rfc3339(),
        google_fetched: google_outcome.records.len(),
        yelp_fetched: yelp_outcome.records.len(),
        malformed_dropped: google_outcome.malformed_dropped + yelp_outcome.malformed_dropped,
        ..Default::default()
    };

    let outcome = merge(google_outcome.records, yelp_outcome.records);
    summary.matched = outcome.matched.len();
    summary.google_only = outcome.google_only.len();
    summary.yelp_only = outcome.yelp_only.len();
    summary.duplicate_keys_dropped = outcome.duplicate_keys_dropped;
    info!(
        matched = summary.matched,
        google_only = summary.google_only,
        yelp_only = summary.yelp_only,
        duplicates_dropped = summary.duplicate_keys_dropped,
        "reconciliation complete"
    );

    // Photo enrichment for every unified record with Google refs (matched
    // and google-only). Failures are per-reference and never fatal.
    let fetcher = PhotoFetcher::new(google.photo_source(), &cfg.photos_root)
        .with_max_concurrency(cfg.photo_concurrency);
    let unified: Vec<&UnifiedRecord> = outcome
        .matched
        .iter()
        .chain(outcome.google_only.iter())
        .collect();
    for record in &unified {
        let refs = record.google_photo_refs();
        if refs.is_empty() {
            continue;
        }
        match fetcher
            .fetch_and_store(record.display_name(), Provider::Google.label(), refs)
            .await
        {
            Ok(stored) => {
                summary.photos_stored += stored.paths.len();
                summary.photo_failures += stored.failures.len();
                for failure in &stored.failures {
                    warn!(
                        restaurant = %record.display_name(),
                        reference = %failure.reference,
                        index = failure.index,
                        "photo not stored"
                    );
                }
            }
            Err(err) => {
                warn!(restaurant = %record.display_name(), error = %err, "photo batch failed");
                summary.photo_failures += refs.len();
            }
        }
    }

    // Yelp food-and-drink insights for the unmatched yelp-side records,
    // one call per business; a failing call degrades that business only.
    for record in insight_targets(&outcome) {
        match yelp.fetch_food_and_drink_insights(&record.business_id).await {
            Ok(insights) => {
                info!(
                    business_id = %record.business_id,
                    name = %record.name,
                    insights = %insights,
                    "yelp food and drink insights"
                );
                summary.insights_fetched += 1;
            }
            Err(err) => {
                warn!(business_id = %record.business_id, error = %err, "insights fetch failed; continuing");
                summary.insight_failures += 1;
            }
        }
    }

    // Persist every partition; matched pairs flatten into one row per
    // contributing provider so both natural keys survive.
    let mut rows = flatten_unified(&outcome.matched);
    rows.extend(flatten_unified(&outcome.google_only));
    rows.extend(flatten_unified(&outcome.yelp_only));

    db.ensure_schema()
        .await
        .context("ensuring restaurant_info schema")?;
    summary.rows_inserted = db
        .bulk_insert_ignoring_duplicates(&rows)
        .await
        .context("bulk inserting restaurant batch")?;

    info!(summary = %serde_json::to_string(&summary).unwrap_or_default(), "pipeline run complete");
    Ok(summary)
}

fn degrade_on_upstream(
    provider: &'static str,
    result: Result<FetchOutcome, PipelineError>,
) -> FetchOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(provider, error = %err, "provider fetch failed; continuing with empty set");
            FetchOutcome::default()
        }
    }
}

/// Records eligible for the insights lookup: the yelp side of the unmatched
/// partition (matched restaurants are already covered by both providers).
fn insight_targets(outcome: &reconcile::MergeOutcome) -> Vec<&normalization::NormalizedRecord> {
    outcome
        .yelp_only
        .iter()
        .filter_map(|unified| unified.yelp.as_ref())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::NormalizedRecord;

    #[test]
    fn insight_targets_are_the_unmatched_yelp_records() {
        let g = vec![
            NormalizedRecord::new(Provider::Google, "Shared Cafe", "g1"),
            NormalizedRecord::new(Provider::Google, "Google Solo", "g2"),
        ];
        let y = vec![
            NormalizedRecord::new(Provider::Yelp, "shared cafe", "y1"),
            NormalizedRecord::new(Provider::Yelp, "Yelp Solo", "y2"),
        ];
        let outcome = merge(g, y);

        let targets = insight_targets(&outcome);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].business_id, "y2");
    }

    #[test]
    fn no_targets_when_everything_matches() {
        let g = vec![NormalizedRecord::new(Provider::Google, "Cafe X", "g1")];
        let y = vec![NormalizedRecord::new(Provider::Yelp, "cafe x", "y1")];
        let outcome = merge(g, y);
        assert!(insight_targets(&outcome).is_empty());
    }
}
