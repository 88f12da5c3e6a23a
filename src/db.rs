//! Relational persistence for reconciled restaurants.
//!
//! One exclusively-owned connection per pipeline run, READ COMMITTED session
//! isolation, and a single atomic ignore-on-conflict bulk insert per batch.

use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool, QueryBuilder, Row,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::PipelineError;
use crate::reconcile::UnifiedRecord;

/// Row shape of the `restaurant_info` table. Natural key = `business_id`;
/// inserting an id that already exists is a no-op, not an overwrite.
#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantRow {
    pub name: String,
    pub business_id: String,
    pub address: Option<String>,
    pub rating: Option<f32>,
    pub total_ratings: Option<i64>,
    pub price: Option<String>,
    pub cuisine: Option<String>,
}

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    /// Open the run-scoped connection. Single connection, bounded acquire,
    /// and session isolation pinned to READ COMMITTED on connect.
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, PipelineError> {
        let connect_options = PgConnectOptions::from_str(database_url)?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query(
                        "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL READ COMMITTED",
                    )
                    .execute(&mut *conn)
                    .await?;
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Release the connection. Called on every exit path of a run,
    /// success or error.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("db connection released");
    }

    /// Create `restaurant_info` if it is not there yet.
    pub async fn ensure_schema(&self) -> Result<(), PipelineError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS restaurant_info (
                name TEXT NOT NULL,
                business_id TEXT NOT NULL UNIQUE,
                address TEXT,
                rating REAL,
                total_ratings BIGINT,
                price TEXT,
                cuisine TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert the batch as one atomic statement, silently skipping rows
    /// whose `business_id` already exists (in storage or earlier in the same
    /// batch). Returns the number of rows actually inserted. Any other
    /// failure is fatal for the whole batch; no partial-row recovery here.
    #[instrument(skip(self, rows))]
    pub async fn bulk_insert_ignoring_duplicates(
        &self,
        rows: &[RestaurantRow],
    ) -> Result<u64, PipelineError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO restaurant_info (name, business_id, address, rating, total_ratings, price, cuisine) ",
        );
        qb.push_values(rows, |mut b, r| {
            b.push_bind(&r.name)
                .push_bind(&r.business_id)
                .push_bind(r.address.as_ref())
                .push_bind(r.rating)
                .push_bind(r.total_ratings)
                .push_bind(r.price.as_ref())
                .push_bind(r.cuisine.as_ref());
        });
        qb.push(" ON CONFLICT (business_id) DO NOTHING");

        let result = qb.build().persistent(false).execute(&self.pool).await?;
        let inserted = result.rows_affected();
        info!(
            batch = rows.len(),
            inserted,
            skipped = rows.len() as u64 - inserted,
            "bulk insert complete"
        );
        Ok(inserted)
    }

    /// Read back the stored set.
    pub async fn load_all_restaurants(&self) -> Result<Vec<RestaurantRow>, PipelineError> {
        let rows = sqlx::query(
            "SELECT name, business_id, address, rating, total_ratings, price, cuisine
             FROM restaurant_info",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(RestaurantRow {
                    name: row.try_get("name")?,
                    business_id: row.try_get("business_id")?,
                    address: row.try_get("address")?,
                    rating: row.try_get("rating")?,
                    total_ratings: row.try_get("total_ratings")?,
                    price: row.try_get("price")?,
                    cuisine: row.try_get("cuisine")?,
                })
            })
            .collect()
    }
}

/// Flatten unified records into persistable rows: one row per contributing
/// provider record, so a matched pair keeps both natural keys.
pub fn flatten_unified(records: &[UnifiedRecord]) -> Vec<RestaurantRow> {
    let mut rows = Vec::new();
    for unified in records {
        for side in [unified.google.as_ref(), unified.yelp.as_ref()] {
            if let Some(record) = side {
                rows.push(RestaurantRow {
                    name: record.name.clone(),
                    business_id: record.business_id.clone(),
                    address: record.address.clone(),
                    rating: record.rating,
                    total_ratings: record.total_ratings,
                    price: record.price.clone(),
                    cuisine: record.cuisine.as_ref().map(|tags| tags.join(", ")),
                });
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::{NormalizedRecord, Provider};
    use crate::reconcile::merge;

    #[test]
    fn matched_record_flattens_to_one_row_per_provider() {
        let mut g = NormalizedRecord::new(Provider::Google, "Cafe X", "a1");
        g.rating = Some(4.5);
        let mut y = NormalizedRecord::new(Provider::Yelp, "cafe x", "b1");
        y.cuisine = Some(vec!["Cajun/Creole".into(), "Seafood".into()]);

        let out = merge(vec![g], vec![y]);
        let rows = flatten_unified(&out.matched);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].business_id, "a1");
        assert_eq!(rows[0].rating, Some(4.5));
        assert_eq!(rows[1].business_id, "b1");
        assert_eq!(rows[1].cuisine.as_deref(), Some("Cajun/Creole, Seafood"));
    }

    #[test]
    fn singleton_records_flatten_to_one_row() {
        let g = NormalizedRecord::new(Provider::Google, "Solo", "g9");
        let out = merge(vec![g], vec![]);
        let rows = flatten_unified(&out.google_only);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].business_id, "g9");
        assert_eq!(rows[0].cuisine, None);
    }

    #[test]
    fn absent_numerics_survive_flattening_as_null() {
        let g = NormalizedRecord::new(Provider::Google, "Bare", "g1");
        let out = merge(vec![g], vec![]);
        let rows = flatten_unified(&out.google_only);
        assert_eq!(rows[0].rating, None);
        assert_eq!(rows[0].total_ratings, None);
        assert_eq!(rows[0].price, None);
    }

    fn row(name: &str, business_id: &str) -> RestaurantRow {
        RestaurantRow {
            name: name.to_string(),
            business_id: business_id.to_string(),
            address: None,
            rating: None,
            total_ratings: None,
            price: None,
            cuisine: None,
        }
    }

    // Needs a live Postgres; run with
    //   TEST_DATABASE_URL=postgres://... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn duplicate_business_id_in_batch_inserts_once() {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL not set");
        let db = Db::connect(&url).await.unwrap();
        db.ensure_schema().await.unwrap();
        sqlx::query("DELETE FROM restaurant_info WHERE business_id LIKE 'test-dup-%'")
            .execute(&db.pool)
            .await
            .unwrap();

        let batch = vec![
            row("Twin Cafe", "test-dup-1"),
            row("Twin Cafe again", "test-dup-1"),
            row("Solo Diner", "test-dup-2"),
        ];
        let inserted = db.bulk_insert_ignoring_duplicates(&batch).await.unwrap();
        assert_eq!(inserted, 2);

        // Rerunning the whole batch is a no-op, not an overwrite.
        let inserted = db.bulk_insert_ignoring_duplicates(&batch).await.unwrap();
        assert_eq!(inserted, 0);

        let all = db.load_all_restaurants().await.unwrap();
        let dup_rows: Vec<_> = all
            .iter()
            .filter(|r| r.business_id == "test-dup-1")
            .collect();
        assert_eq!(dup_rows.len(), 1);
        assert_eq!(dup_rows[0].name, "Twin Cafe");

        db.close().await;
    }
}
