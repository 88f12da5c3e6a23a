use anyhow::{Context, Result};
use plate_compare::db::Db;
use plate_compare::tracing::init_tracing;
use plate_compare::util::env as env_util;
use plate_compare::{collect_and_reconcile, PipelineConfig};
use plate_compare::providers::GeoPoint;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing("info,sqlx=warn")?;

    let cfg = PipelineConfig {
        google_api_key: env_util::env_req("GOOGLE_MAPS_API_KEY")?,
        yelp_api_key: env_util::env_req("YELP_API_KEY")?,
        center: GeoPoint {
            // Default center: New Orleans.
            lat: env_util::env_parse("SEARCH_LAT", 29.9511),
            lon: env_util::env_parse("SEARCH_LON", -90.0715),
        },
        radius_m: env_util::env_parse("SEARCH_RADIUS_M", 1000u32),
        yelp_limit: env_util::env_parse("YELP_LIMIT", 20u32),
        photos_root: PathBuf::from(
            env_util::env_opt("PHOTOS_DIR").unwrap_or_else(|| "photos".to_string()),
        ),
        request_timeout: Duration::from_secs(env_util::env_parse("REQUEST_TIMEOUT_SECS", 15u64)),
        photo_concurrency: env_util::env_parse("PHOTO_CONCURRENCY", 4usize),
    };

    let database_url = env_util::env_req("DATABASE_URL")?;
    let db = Db::connect(&database_url)
        .await
        .context("connecting to database")?;

    // Run the pipeline, then release the connection on every exit path.
    let result = collect_and_reconcile(&cfg, &db).await;
    db.close().await;

    match result {
        Ok(summary) => {
            info!(
                google = summary.google_fetched,
                yelp = summary.yelp_fetched,
                matched = summary.matched,
                unmatched = summary.google_only + summary.yelp_only,
                malformed_dropped = summary.malformed_dropped,
                photos_stored = summary.photos_stored,
                photo_failures = summary.photo_failures,
                rows_inserted = summary.rows_inserted,
                "done"
            );
            Ok(())
        }
        Err(err) => {
            error!(error = ?err, "pipeline failed");
            Err(err)
        }
    }
}
