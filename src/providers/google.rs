//! Google Places adapter: Nearby Search (paged) + per-place Details for the
//! extended photo-reference list + the Place Photo byte endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::normalization::{NormalizedRecord, Provider};
use crate::photos::PhotoSource;
use crate::providers::{FetchOutcome, GeoPoint};

const PROVIDER: &str = "google-places";
// Nearby Search returns at most 3 pages of 20; don't chase tokens past that.
const MAX_PAGES: usize = 3;
// The API needs a short delay before a next_page_token becomes valid.
const PAGE_TOKEN_DELAY_MS: u64 = 2000;

#[derive(Debug, Deserialize)]
struct NearbyResponse {
    #[serde(default)]
    results: Vec<PlaceEntry>,
    next_page_token: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceEntry {
    name: Option<String>,
    place_id: Option<String>,
    vicinity: Option<String>,
    rating: Option<f32>,
    user_ratings_total: Option<i64>,
    price_level: Option<i64>,
    #[serde(default)]
    photos: Vec<PhotoEntry>,
}

#[derive(Debug, Deserialize)]
struct PhotoEntry {
    photo_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    result: Option<DetailsResult>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResult {
    #[serde(default)]
    photos: Vec<PhotoEntry>,
}

/// Nearby-search + details client for the Places Web Service. The API key is
/// injected at construction; nothing here reads the process environment.
#[derive(Clone)]
pub struct GooglePlaces {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GooglePlaces {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .user_agent("plate-compare/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::upstream(PROVIDER, e))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: "https://maps.googleapis.com/maps/api/place".to_string(),
        })
    }

    /// Override the endpoint root (tests point this at a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch restaurants around `center`, normalized and deduplicated by
    /// place_id, each enriched with the details-call photo references.
    ///
    /// A failing details call degrades that one record to the nearby-search
    /// photo refs; a failing nearby call fails the whole fetch (and no
    /// details calls are attempted).
    pub async fn fetch_nearby(
        &self,
        center: GeoPoint,
        radius_m: u32,
    ) -> Result<FetchOutcome, PipelineError> {
        let mut entries: Vec<PlaceEntry> = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let url = format!("{}/nearbysearch/json", self.base_url);
            let mut query: Vec<(&str, String)> = vec![
                ("location", center.to_string()),
                ("radius", radius_m.to_string()),
                ("type", "restaurant".to_string()),
                ("key", self.api_key.clone()),
            ];
            if let Some(token) = &page_token {
                query.push(("pagetoken", token.clone()));
            }

            let resp = self
                .client
                .get(&url)
                .query(&query)
                .send()
                .await
                .map_err(|e| PipelineError::upstream(PROVIDER, e))?;
            if !resp.status().is_success() {
                return Err(PipelineError::upstream(
                    PROVIDER,
                    format!("nearby search returned status {}", resp.status()),
                ));
            }
            let body: NearbyResponse = resp
                .json()
                .await
                .map_err(|e| PipelineError::upstream(PROVIDER, e))?;
            if let Some(status) = body.status.as_deref() {
                if status != "OK" && status != "ZERO_RESULTS" {
                    return Err(PipelineError::upstream(
                        PROVIDER,
                        format!("nearby search status {status}"),
                    ));
                }
            }

            info!(page = page + 1, results = body.results.len(), "google nearby page");
            entries.extend(body.results);

            match body.next_page_token {
                Some(token) if will_fetch_page(page + 1) => {
                    page_token = Some(token);
                    tokio::time::sleep(Duration::from_millis(PAGE_TOKEN_DELAY_MS)).await;
                }
                _ => break,
            }
        }

        let mut outcome = FetchOutcome::default();
        let mut seen_ids: HashSet<String> = HashSet::new();
        for entry in entries {
            match self.normalize(entry, &mut seen_ids).await {
                Ok(Some(record)) => outcome.records.push(record),
                Ok(None) => {} // duplicate place_id
                Err(err) => {
                    warn!(error = %err, "dropping malformed google record");
                    outcome.malformed_dropped += 1;
                }
            }
        }
        info!(
            records = outcome.records.len(),
            dropped = outcome.malformed_dropped,
            "google fetch complete"
        );
        Ok(outcome)
    }

    async fn normalize(
        &self,
        entry: PlaceEntry,
        seen_ids: &mut HashSet<String>,
    ) -> Result<Option<NormalizedRecord>, PipelineError> {
        let name = entry
            .name
            .filter(|n| !n.is_empty())
            .ok_or(PipelineError::MalformedRecord {
                provider: PROVIDER,
                field: "name",
            })?;
        let place_id = entry
            .place_id
            .filter(|id| !id.is_empty())
            .ok_or(PipelineError::MalformedRecord {
                provider: PROVIDER,
                field: "place_id",
            })?;
        if !seen_ids.insert(place_id.clone()) {
            return Ok(None);
        }

        let mut record = NormalizedRecord::new(Provider::Google, name, place_id.clone());
        record.address = entry.vicinity;
        record.rating = entry.rating;
        record.total_ratings = entry.user_ratings_total;
        record.price = entry.price_level.map(|p| p.to_string());

        // Prefer the details call's photo set; the nearby payload usually
        // carries a single reference.
        record.photo_refs = match self.fetch_details(&place_id).await {
            Ok(refs) if !refs.is_empty() => refs,
            Ok(_) => photo_refs_of(entry.photos),
            Err(err) => {
                warn!(place_id = %record.business_id, error = %err, "details fetch failed; using nearby photo refs");
                photo_refs_of(entry.photos)
            }
        };
        Ok(Some(record))
    }

    /// Details call returning the extended photo-reference list for a place.
    pub async fn fetch_details(&self, place_id: &str) -> Result<Vec<String>, PipelineError> {
        let url = format!("{}/details/json", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("place_id", place_id),
                ("fields", "name,photo"),
                ("key", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::upstream(PROVIDER, e))?;
        if !resp.status().is_success() {
            return Err(PipelineError::upstream(
                PROVIDER,
                format!("details returned status {}", resp.status()),
            ));
        }
        let body: DetailsResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::upstream(PROVIDER, e))?;
        if let Some(status) = body.status.as_deref() {
            if status != "OK" {
                return Err(PipelineError::upstream(
                    PROVIDER,
                    format!("details status {status}"),
                ));
            }
        }
        Ok(photo_refs_of(body.result.map(|r| r.photos).unwrap_or_default()))
    }

    /// Photo byte source backed by the Place Photo endpoint, shareable with
    /// the photo fetcher.
    pub fn photo_source(&self) -> Arc<dyn PhotoSource> {
        Arc::new(GooglePhotoSource {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
        })
    }
}

/// Whether a 0-based page index is within the pagination bound. The token
/// activation delay is only worth paying when this holds for the next page.
fn will_fetch_page(page: usize) -> bool {
    page < MAX_PAGES
}

fn photo_refs_of(photos: Vec<PhotoEntry>) -> Vec<String> {
    photos
        .into_iter()
        .filter_map(|p| p.photo_reference)
        .collect()
}

struct GooglePhotoSource {
    client: Client,
    api_key: String,
    base_url: String,
}

#[async_trait]
impl PhotoSource for GooglePhotoSource {
    async fn fetch_photo(&self, reference: &str) -> Result<Bytes, PipelineError> {
        let url = format!("{}/photo", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("maxwidth", "1000"),
                ("photoreference", reference),
                ("key", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::upstream(PROVIDER, e))?;
        if !resp.status().is_success() {
            return Err(PipelineError::upstream(
                PROVIDER,
                format!("photo endpoint returned status {}", resp.status()),
            ));
        }
        resp.bytes()
            .await
            .map_err(|e| PipelineError::upstream(PROVIDER, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(json: serde_json::Value) -> PlaceEntry {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn nearby_payload_deserializes_with_absent_numerics() {
        let e = entry(serde_json::json!({
            "name": "Cafe X",
            "place_id": "a1",
            "vicinity": "123 Main St"
        }));
        // Absent rating/price stay None, never zero.
        assert_eq!(e.rating, None);
        assert_eq!(e.price_level, None);
        assert_eq!(e.user_ratings_total, None);
        assert!(e.photos.is_empty());
    }

    #[test]
    fn zero_rating_is_distinct_from_absent() {
        let e = entry(serde_json::json!({
            "name": "Cafe X",
            "place_id": "a1",
            "rating": 0.0,
            "price_level": 0
        }));
        assert_eq!(e.rating, Some(0.0));
        assert_eq!(e.price_level, Some(0));
    }

    #[test]
    fn nearby_response_parses_page_token() {
        let body: NearbyResponse = serde_json::from_str(
            r#"{"results":[{"name":"A","place_id":"p1"}],"next_page_token":"tok","status":"OK"}"#,
        )
        .unwrap();
        assert_eq!(body.results.len(), 1);
        assert_eq!(body.next_page_token.as_deref(), Some("tok"));
    }

    #[test]
    fn no_token_delay_after_the_last_allowed_page() {
        // 0-based: pages 0..MAX_PAGES are fetched; a token returned by the
        // final one must not trigger the activation sleep.
        assert!(will_fetch_page(1));
        assert!(will_fetch_page(MAX_PAGES - 1));
        assert!(!will_fetch_page(MAX_PAGES));
    }

    #[test]
    fn photo_refs_filter_null_references() {
        let refs = photo_refs_of(vec![
            PhotoEntry {
                photo_reference: Some("r1".into()),
            },
            PhotoEntry {
                photo_reference: None,
            },
        ]);
        assert_eq!(refs, ["r1"]);
    }
}
