//! Adapters over the two remote place APIs. Each adapter owns its wire
//! shapes and hands downstream code nothing but [`NormalizedRecord`]s.

pub mod google;
pub mod yelp;

use serde::{Deserialize, Serialize};

use crate::normalization::NormalizedRecord;

/// Per-provider fetch result: normalized records plus the count of raw
/// entries dropped as malformed.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<NormalizedRecord>,
    pub malformed_dropped: usize,
}

/// Search center passed into both adapters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}
