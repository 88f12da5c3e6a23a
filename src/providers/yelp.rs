//! Yelp Fusion adapter: bearer-auth business search around a coordinate.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::normalization::{NormalizedRecord, Provider};
use crate::providers::{FetchOutcome, GeoPoint};

const PROVIDER: &str = "yelp-fusion";
// Fusion caps limit at 50 per request.
const MAX_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    businesses: Vec<BusinessEntry>,
}

#[derive(Debug, Deserialize)]
struct BusinessEntry {
    id: Option<String>,
    name: Option<String>,
    rating: Option<f32>,
    review_count: Option<i64>,
    price: Option<String>,
    location: Option<LocationEntry>,
    #[serde(default)]
    categories: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize)]
struct LocationEntry {
    #[serde(default)]
    display_address: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryEntry {
    title: Option<String>,
}

/// Business-search client for the Fusion API. Key injected at construction.
#[derive(Clone)]
pub struct Yelp {
    client: Client,
    api_key: String,
    base_url: String,
    limit: u32,
}

impl Yelp {
    pub fn new(
        api_key: impl Into<String>,
        timeout: Duration,
        limit: u32,
    ) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .user_agent("plate-compare/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::upstream(PROVIDER, e))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: "https://api.yelp.com/v3".to_string(),
            limit: limit.clamp(1, MAX_LIMIT),
        })
    }

    /// Override the endpoint root (tests point this at a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch restaurants around `center`, normalized and deduplicated by
    /// business id.
    pub async fn fetch_nearby(
        &self,
        center: GeoPoint,
        radius_m: u32,
    ) -> Result<FetchOutcome, PipelineError> {
        let url = format!("{}/businesses/search", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[
                ("term", "restaurant".to_string()),
                ("latitude", center.lat.to_string()),
                ("longitude", center.lon.to_string()),
                ("radius", radius_m.to_string()),
                ("limit", self.limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::upstream(PROVIDER, e))?;
        if !resp.status().is_success() {
            return Err(PipelineError::upstream(
                PROVIDER,
                format!("business search returned status {}", resp.status()),
            ));
        }
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::upstream(PROVIDER, e))?;

        let mut outcome = FetchOutcome::default();
        let mut seen_ids: HashSet<String> = HashSet::new();
        for entry in body.businesses {
            match normalize(entry, &mut seen_ids) {
                Ok(Some(record)) => outcome.records.push(record),
                Ok(None) => {} // duplicate business id
                Err(err) => {
                    warn!(error = %err, "dropping malformed yelp record");
                    outcome.malformed_dropped += 1;
                }
            }
        }
        info!(
            records = outcome.records.len(),
            dropped = outcome.malformed_dropped,
            "yelp fetch complete"
        );
        Ok(outcome)
    }

    /// Food-and-drink insights for one business, passed through as the API
    /// returns them. Callers treat a failure as degrading that one
    /// business, not the run.
    pub async fn fetch_food_and_drink_insights(
        &self,
        business_id: &str,
    ) -> Result<serde_json::Value, PipelineError> {
        let url = format!(
            "{}/businesses/{}/insights/food_and_drinks",
            self.base_url, business_id
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| PipelineError::upstream(PROVIDER, e))?;
        if !resp.status().is_success() {
            return Err(PipelineError::upstream(
                PROVIDER,
                format!(
                    "insights for {business_id} returned status {}",
                    resp.status()
                ),
            ));
        }
        resp.json()
            .await
            .map_err(|e| PipelineError::upstream(PROVIDER, e))
    }
}

fn normalize(
    entry: BusinessEntry,
    seen_ids: &mut HashSet<String>,
) -> Result<Option<NormalizedRecord>, PipelineError> {
    let name = entry
        .name
        .filter(|n| !n.is_empty())
        .ok_or(PipelineError::MalformedRecord {
            provider: PROVIDER,
            field: "name",
        })?;
    let id = entry
        .id
        .filter(|id| !id.is_empty())
        .ok_or(PipelineError::MalformedRecord {
            provider: PROVIDER,
            field: "id",
        })?;
    if !seen_ids.insert(id.clone()) {
        return Ok(None);
    }

    let mut record = NormalizedRecord::new(Provider::Yelp, name, id);
    record.address = entry
        .location
        .map(|l| l.display_address.join(", "))
        .filter(|a| !a.is_empty());
    record.rating = entry.rating;
    record.total_ratings = entry.review_count;
    record.price = entry.price;
    let cuisine: Vec<String> = entry
        .categories
        .into_iter()
        .filter_map(|c| c.title)
        .collect();
    record.cuisine = if cuisine.is_empty() { None } else { Some(cuisine) };
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> SearchResponse {
        serde_json::from_str(
            r#"{
                "businesses": [
                    {
                        "id": "b1",
                        "name": "Cafe X",
                        "rating": 4.2,
                        "review_count": 120,
                        "price": "$$",
                        "location": {"display_address": ["123 Main St", "New Orleans, LA 70112"]},
                        "categories": [{"title": "Cajun/Creole"}, {"title": "Seafood"}]
                    },
                    {
                        "id": "b1",
                        "name": "Cafe X duplicate",
                        "categories": []
                    },
                    {
                        "name": "No Id Diner",
                        "categories": []
                    },
                    {
                        "id": "b2",
                        "name": "Bare Bones",
                        "categories": []
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn normalizes_and_dedupes_by_business_id() {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut dropped = 0;
        for entry in fixture().businesses {
            match normalize(entry, &mut seen) {
                Ok(Some(r)) => records.push(r),
                Ok(None) => {}
                Err(_) => dropped += 1,
            }
        }
        assert_eq!(records.len(), 2);
        assert_eq!(dropped, 1); // missing id

        let full = &records[0];
        assert_eq!(full.business_id, "b1");
        assert_eq!(full.match_key, "cafe x");
        assert_eq!(
            full.address.as_deref(),
            Some("123 Main St, New Orleans, LA 70112")
        );
        assert_eq!(full.rating, Some(4.2));
        assert_eq!(full.total_ratings, Some(120));
        assert_eq!(full.price.as_deref(), Some("$$"));
        assert_eq!(
            full.cuisine.as_deref(),
            Some(&["Cajun/Creole".to_string(), "Seafood".to_string()][..])
        );
    }

    #[test]
    fn absent_fields_stay_none() {
        let mut seen = HashSet::new();
        let bare = fixture().businesses.pop().unwrap();
        let record = normalize(bare, &mut seen).unwrap().unwrap();
        assert_eq!(record.rating, None);
        assert_eq!(record.total_ratings, None);
        assert_eq!(record.price, None);
        assert_eq!(record.cuisine, None);
        assert_eq!(record.address, None);
    }
}
