//! Enrichment provider contract and SERP-derived field rules.
//!
//! # Responsibility
//! - Define the stateless request/response provider the dispatcher calls
//!   once per record.
//! - Turn a SERP snapshot into keyword fields (intent, ad/map/site flags).
//!
//! # Invariants
//! - Providers never retry on their own; retry and backoff belong to the
//!   dispatcher.

use crate::dispatch::action::EnrichParams;
use crate::model::record::{FieldValue, Record};
use crate::model::schema::INTENT_TYPES;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const COMMERCIAL_WORDS: &[&str] = &[
    "купить", "цена", "стоимость", "заказать", "магазин", "shop", "buy", "price",
];
const TRANSACTIONAL_WORDS: &[&str] = &["скачать", "download", "регистрация", "вход", "login"];
const NAVIGATIONAL_WORDS: &[&str] = &["сайт", "официальный", "website", "official", ".com", ".ua"];
const INFORMATIONAL_WORDS: &[&str] = &[
    "как", "что", "почему", "зачем", "когда", "какой", "how", "what", "why", "when",
];
const COMMERCIAL_SERP_TYPES: &[&str] = &["shopping", "paid", "local_pack", "maps"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Worth retrying (timeouts, rate limits, 5xx).
    Transient(String),
    /// Final for this item.
    Rejected(String),
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(message) => write!(f, "transient provider error: {message}"),
            Self::Rejected(message) => write!(f, "provider rejected request: {message}"),
        }
    }
}

impl Error for ProviderError {}

/// Fields derived for one record, plus the billed cost if the provider knows it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnrichmentResult {
    pub fields: BTreeMap<String, FieldValue>,
    pub cost_micros: Option<u64>,
    /// Result-page composition, kept in the enrichment history only.
    pub serp_counts: Option<SerpCounts>,
}

/// Item counts of one result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerpCounts {
    pub total_items: u32,
    pub organic_count: u32,
    pub paid_count: u32,
    pub maps_count: u32,
    pub shopping_count: u32,
}

impl SerpCounts {
    pub fn from_item_types(item_types: &[String]) -> Self {
        let count = |names: &[&str]| {
            let hits = item_types
                .iter()
                .filter(|item| names.contains(&item.as_str()))
                .count();
            u32::try_from(hits).unwrap_or(u32::MAX)
        };
        Self {
            total_items: u32::try_from(item_types.len()).unwrap_or(u32::MAX),
            organic_count: count(&["organic"]),
            paid_count: count(&["paid"]),
            maps_count: count(&["maps", "local_pack"]),
            shopping_count: count(&["shopping"]),
        }
    }
}

/// Search result page summary returned by a SERP provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SerpSnapshot {
    pub item_types: Vec<String>,
    pub organic_domains: Vec<String>,
    pub paid_domains: Vec<String>,
}

/// Domains the operator cares about when reading a SERP.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SerpProfile {
    pub our_domains: Vec<String>,
    pub competitor_domains: Vec<String>,
}

impl EnrichmentResult {
    /// Derives SERP fields for `keyword`.
    pub fn from_serp(keyword: &str, serp: &SerpSnapshot, profile: &SerpProfile) -> Self {
        let has_type = |name: &str| serp.item_types.iter().any(|item| item == name);
        let listed = |domains: &[String], wanted: &[String]| {
            domains
                .iter()
                .any(|domain| wanted.iter().any(|item| domain_matches(domain, item)))
        };

        let mut fields = BTreeMap::new();
        fields.insert(
            "intent_type".to_string(),
            FieldValue::text(classify_intent(keyword, &serp.item_types)),
        );
        fields.insert(
            "has_ads".to_string(),
            FieldValue::Flag(has_type("paid") || !serp.paid_domains.is_empty()),
        );
        fields.insert(
            "has_google_maps".to_string(),
            FieldValue::Flag(has_type("local_pack") || has_type("maps")),
        );
        fields.insert(
            "has_our_site".to_string(),
            FieldValue::Flag(listed(&serp.organic_domains, &profile.our_domains)),
        );
        fields.insert(
            "has_school_sites".to_string(),
            FieldValue::Flag(listed(&serp.organic_domains, &profile.competitor_domains)),
        );
        Self {
            fields,
            cost_micros: None,
            serp_counts: Some(SerpCounts::from_item_types(&serp.item_types)),
        }
    }
}

/// Classifies search intent from keyword text and SERP item types.
///
/// SERP features win over keyword text; the fallback is informational.
pub fn classify_intent(keyword: &str, serp_item_types: &[String]) -> &'static str {
    let [commercial, informational, navigational, transactional] = [
        INTENT_TYPES[0],
        INTENT_TYPES[1],
        INTENT_TYPES[2],
        INTENT_TYPES[3],
    ];

    if serp_item_types
        .iter()
        .any(|item| COMMERCIAL_SERP_TYPES.contains(&item.as_str()))
    {
        return commercial;
    }

    let keyword = keyword.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|word| keyword.contains(word));
    if mentions(COMMERCIAL_WORDS) {
        commercial
    } else if mentions(TRANSACTIONAL_WORDS) {
        transactional
    } else if mentions(NAVIGATIONAL_WORDS) {
        navigational
    } else {
        informational
    }
}

fn domain_matches(domain: &str, wanted: &str) -> bool {
    let domain = domain.trim().trim_start_matches("www.").to_ascii_lowercase();
    let wanted = wanted.trim().trim_start_matches("www.").to_ascii_lowercase();
    !wanted.is_empty() && (domain == wanted || domain.ends_with(&format!(".{wanted}")))
}

/// External per-record enrichment service.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn analyze(
        &self,
        record: &Record,
        params: &EnrichParams,
    ) -> Result<EnrichmentResult, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::{classify_intent, EnrichmentResult, SerpCounts, SerpProfile, SerpSnapshot};
    use crate::model::record::FieldValue;

    fn types(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn serp_features_override_keyword_text() {
        assert_eq!(classify_intent("how to tie shoes", &types(&["maps"])), "Commercial");
    }

    #[test]
    fn keyword_words_pick_intent_in_priority_order() {
        assert_eq!(classify_intent("buy shoes", &[]), "Commercial");
        assert_eq!(classify_intent("Download app", &[]), "Transactional");
        assert_eq!(classify_intent("nike official", &[]), "Navigational");
        assert_eq!(classify_intent("what is seo", &[]), "Informational");
        assert_eq!(classify_intent("shoes", &[]), "Informational");
    }

    #[test]
    fn from_serp_sets_site_flags() {
        let serp = SerpSnapshot {
            item_types: types(&["organic", "paid"]),
            organic_domains: types(&["www.example.com", "blog.rival.org"]),
            paid_domains: types(&["ads.net"]),
        };
        let profile = SerpProfile {
            our_domains: types(&["example.com"]),
            competitor_domains: types(&["rival.org"]),
        };

        let result = EnrichmentResult::from_serp("red shoes", &serp, &profile);

        assert_eq!(result.fields["has_ads"], FieldValue::Flag(true));
        assert_eq!(result.fields["has_our_site"], FieldValue::Flag(true));
        assert_eq!(result.fields["has_school_sites"], FieldValue::Flag(true));
        assert_eq!(result.fields["has_google_maps"], FieldValue::Flag(false));
        assert_eq!(result.fields["intent_type"], FieldValue::text("Commercial"));
        assert_eq!(
            result.serp_counts,
            Some(SerpCounts {
                total_items: 2,
                organic_count: 1,
                paid_count: 1,
                maps_count: 0,
                shopping_count: 0,
            })
        );
    }

    #[test]
    fn local_pack_counts_as_maps() {
        let counts = SerpCounts::from_item_types(&types(&["local_pack", "maps", "organic"]));
        assert_eq!(counts.maps_count, 2);
        assert_eq!(counts.total_items, 3);
    }
}
