//! Provider-agnostic projection of raw place payloads.
//!
//! Each adapter maps its own wire shape into [`NormalizedRecord`] before
//! anything downstream sees it. Missing numeric fields stay `None`; zero is
//! a valid rating/price tier and must remain distinguishable from absent.

pub mod name;

use serde::{Deserialize, Serialize};

/// Which remote API a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    Google,
    Yelp,
}

impl Provider {
    /// Label used in photo filenames and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::Yelp => "Yelp",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One restaurant as reported by a single provider, projected into the
/// shared shape the reconciler joins on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub provider: Provider,
    /// Display name exactly as the provider returned it.
    pub name: String,
    /// Join key: trimmed, lowercased name. See [`name::match_key`].
    pub match_key: String,
    /// Provider-native business id (Google place_id / Yelp business id).
    pub business_id: String,
    pub address: Option<String>,
    pub rating: Option<f32>,
    pub total_ratings: Option<i64>,
    /// Price tier on the provider's own scale (Google "0".."4", Yelp "$".."$$$$").
    pub price: Option<String>,
    pub cuisine: Option<Vec<String>>,
    /// Opaque photo references, fetchable through the owning provider.
    pub photo_refs: Vec<String>,
}

impl NormalizedRecord {
    pub fn new(provider: Provider, name: impl Into<String>, business_id: impl Into<String>) -> Self {
        let name = name.into();
        let match_key = name::match_key(&name);
        Self {
            provider,
            name,
            match_key,
            business_id: business_id.into(),
            address: None,
            rating: None,
            total_ratings: None,
            price: None,
            cuisine: None,
            photo_refs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_labels_match_photo_filename_sources() {
        assert_eq!(Provider::Google.label(), "Google");
        assert_eq!(Provider::Yelp.label(), "Yelp");
        assert_eq!(Provider::Google.to_string(), "Google");
    }

    #[test]
    fn new_record_derives_its_match_key() {
        let r = NormalizedRecord::new(Provider::Yelp, "  Cafe X ", "b1");
        assert_eq!(r.name, "  Cafe X ");
        assert_eq!(r.match_key, "cafe x");
        assert_eq!(r.provider, Provider::Yelp);
    }
}
