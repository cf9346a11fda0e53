//! Data carried through the prediction pipeline and the billing reconciler.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::PredictorError;

/// Longest domain we accept, matching the DNS limit.
pub const MAX_DOMAIN_LENGTH: usize = 253;

// One label: alnum/hyphen, 1-63 chars, no leading or trailing hyphen.
static LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("valid label regex"));

static TLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]{2,63}$").expect("valid tld regex"));

/// A user's search submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub niche: String,
    #[serde(default = "default_timeframe", alias = "timeframe")]
    pub timeframe_months: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
}

fn default_timeframe() -> u32 {
    3
}

impl SearchRequest {
    pub fn new(niche: impl Into<String>) -> Self {
        Self {
            niche: niche.into(),
            timeframe_months: default_timeframe(),
            budget: None,
            keywords: None,
        }
    }

    pub fn with_timeframe(mut self, months: u32) -> Self {
        self.timeframe_months = months;
        self
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    /// Trims free-text fields and rejects requests the pipeline cannot use.
    pub fn validate(mut self) -> Result<Self, PredictorError> {
        self.niche = self.niche.trim().to_string();
        if self.niche.is_empty() {
            return Err(PredictorError::InvalidRequest("Please specify a niche.".to_string()));
        }

        if let Some(budget) = self.budget {
            if !budget.is_finite() || budget < 0.0 {
                return Err(PredictorError::InvalidRequest(
                    "Budget must be a non-negative amount.".to_string(),
                ));
            }
        }

        self.keywords = self
            .keywords
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(self)
    }
}

/// A syntactically valid, lowercase domain name produced by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainCandidate(String);

impl DomainCandidate {
    /// Validates `raw` against the relaxed label grammar: `label(.label)+` with an
    /// alphabetic final segment of at least two characters.
    pub fn parse(raw: &str) -> Option<Self> {
        let domain = raw.trim().to_lowercase();
        if domain.is_empty() || domain.len() > MAX_DOMAIN_LENGTH {
            return None;
        }

        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 2 {
            return None;
        }

        let (tld, names) = labels.split_last()?;
        if !TLD.is_match(tld) || !names.iter().all(|label| LABEL.is_match(label)) {
            return None;
        }

        Some(Self(domain))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first label, used for length and keyword heuristics.
    pub fn name(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    pub fn tld(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// The label directly left of the TLD, e.g. `shop` for `www.shop.io`.
    pub fn stem(&self) -> &str {
        let mut labels = self.0.rsplit('.');
        labels.next();
        labels.next().unwrap_or(&self.0)
    }
}

impl fmt::Display for DomainCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DomainCandidate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid domain: {}", value))
    }
}

impl From<DomainCandidate> for String {
    fn from(value: DomainCandidate) -> Self {
        value.0
    }
}

/// One enriched suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResult {
    pub domain: DomainCandidate,
    pub available: bool,
    pub price: f64,
    pub potential_value: f64,
    pub registrar_link: String,
}

/// The persisted outcome of one successful pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub user_id: i64,
    pub search_params: SearchRequest,
    pub domains: Vec<DomainResult>,
    pub created_at: DateTime<Utc>,
}

/// A record before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub user_id: i64,
    pub search_params: SearchRequest,
    pub domains: Vec<DomainResult>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Inactive,
    Active,
    PastDue,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    /// Maps a billing provider status onto the local state machine.
    ///
    /// Only `active` grants access; trialing and incomplete states stay inactive.
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "active" => SubscriptionStatus::Active,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            "canceled" | "cancelled" => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Inactive,
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(SubscriptionStatus::Inactive),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(format!("unknown subscription status: {}", other)),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user billing state, written only by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub user_id: i64,
    pub status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub price_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub last_payment_amount: Option<f64>,
}

impl SubscriptionState {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            status: SubscriptionStatus::Inactive,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            price_id: None,
            created_at: Utc::now(),
            current_period_end: None,
            last_payment_date: None,
            last_payment_amount: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_grammar() {
        assert!(DomainCandidate::parse("techcloud.ai").is_some());
        assert!(DomainCandidate::parse("My-Shop.co.uk").is_some());
        assert_eq!(DomainCandidate::parse(" AICorp.COM ").unwrap().as_str(), "aicorp.com");

        assert!(DomainCandidate::parse("localhost").is_none());
        assert!(DomainCandidate::parse("-bad.com").is_none());
        assert!(DomainCandidate::parse("bad-.com").is_none());
        assert!(DomainCandidate::parse("foo_bar.com").is_none());
        assert!(DomainCandidate::parse("example.c").is_none());
        assert!(DomainCandidate::parse("example.c0m").is_none());
        assert!(DomainCandidate::parse("a..com").is_none());
        assert!(DomainCandidate::parse(&format!("{}.com", "a".repeat(64))).is_none());
    }

    #[test]
    fn test_candidate_parts() {
        let domain = DomainCandidate::parse("www.shop.io").unwrap();
        assert_eq!(domain.name(), "www");
        assert_eq!(domain.stem(), "shop");
        assert_eq!(domain.tld(), "io");
    }

    #[test]
    fn test_candidate_serde_rejects_invalid() {
        let ok: Result<DomainCandidate, _> = serde_json::from_str("\"aicorp.com\"");
        assert!(ok.is_ok());
        let bad: Result<DomainCandidate, _> = serde_json::from_str("\"not a domain\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_search_request_validation() {
        let err = SearchRequest::new("   ").validate().unwrap_err();
        assert!(matches!(err, PredictorError::InvalidRequest(_)));

        let err = SearchRequest::new("pets").with_budget(-5.0).validate().unwrap_err();
        assert!(matches!(err, PredictorError::InvalidRequest(_)));

        let request = SearchRequest::new("  pets ").with_keywords("  ").validate().unwrap();
        assert_eq!(request.niche, "pets");
        assert_eq!(request.keywords, None);
        assert_eq!(request.timeframe_months, 3);
    }

    #[test]
    fn test_search_request_defaults_from_json() {
        let request: SearchRequest = serde_json::from_str(r#"{"niche":"travel"}"#).unwrap();
        assert_eq!(request.timeframe_months, 3);
        assert_eq!(request.budget, None);
    }

    #[test]
    fn test_provider_status_mapping() {
        assert_eq!(SubscriptionStatus::from_provider("active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_provider("past_due"), SubscriptionStatus::PastDue);
        assert_eq!(SubscriptionStatus::from_provider("canceled"), SubscriptionStatus::Cancelled);
        assert_eq!(SubscriptionStatus::from_provider("trialing"), SubscriptionStatus::Inactive);
    }
}
