//! The prediction pipeline: gate, prompt, extract, enrich, persist.

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::{sync::Arc, time::Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    availability::AvailabilityChecker,
    config::Config,
    errors::PredictorError,
    extractor::extract_with_limit,
    llm::{build_user_prompt, CompletionClient, SYSTEM_PROMPT},
    metrics,
    models::{DomainCandidate, DomainResult, NewPrediction, PredictionRecord, SearchRequest},
    store::{PredictionStore, SubscriptionStore},
    valuation::estimate_potential_value,
};

pub const REGISTRAR_SEARCH_URL: &str = "https://www.namecheap.com/domains/registration/results/";

const MAX_HISTORY: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authorizing,
    Validating,
    Generating,
    Extracting,
    Enriching,
    Persisting,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Authorizing => "authorizing",
            Stage::Validating => "validating",
            Stage::Generating => "generating",
            Stage::Extracting => "extracting",
            Stage::Enriching => "enriching",
            Stage::Persisting => "persisting",
            Stage::Done => "done",
        }
    }
}

/// Result of a successful run. `record_id` is `None` when persisting failed.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub record_id: Option<i64>,
    pub domains: Vec<DomainResult>,
}

pub struct PredictionPipeline {
    llm: Arc<dyn CompletionClient>,
    checker: Arc<AvailabilityChecker>,
    predictions: Arc<dyn PredictionStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    results_per_search: usize,
}

impl PredictionPipeline {
    pub fn new(
        config: &Config,
        llm: Arc<dyn CompletionClient>,
        checker: Arc<AvailabilityChecker>,
        predictions: Arc<dyn PredictionStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
    ) -> Self {
        Self {
            llm,
            checker,
            predictions,
            subscriptions,
            results_per_search: config.results_per_search,
        }
    }

    pub async fn predict(&self, user_id: i64, request: SearchRequest) -> Result<Prediction, PredictorError> {
        let start = Instant::now();
        let result = self.run(user_id, request).await;

        metrics::record_prediction_time(start.elapsed().as_millis() as u64);
        match &result {
            Ok(prediction) => {
                metrics::increment_predictions("success");
                info!(
                    user_id,
                    stage = Stage::Done.as_str(),
                    "Prediction finished with {} domains in {:?}",
                    prediction.domains.len(),
                    start.elapsed()
                );
            }
            Err(e) => {
                metrics::increment_predictions(e.kind());
                match e {
                    PredictorError::Upstream(_) | PredictorError::Timeout | PredictorError::HttpError(_) => {
                        tracing::error!(user_id, kind = e.kind(), "Prediction failed: {}", e)
                    }
                    _ => info!(user_id, kind = e.kind(), "Prediction ended without results: {}", e),
                }
            }
        }

        result
    }

    async fn run(&self, user_id: i64, request: SearchRequest) -> Result<Prediction, PredictorError> {
        debug!(user_id, stage = Stage::Authorizing.as_str());
        self.authorize(user_id).await?;

        debug!(user_id, stage = Stage::Validating.as_str());
        let request = request.validate()?;

        info!(user_id, stage = Stage::Generating.as_str(), niche = %request.niche, "Requesting suggestions");
        let completion = self.llm.complete(SYSTEM_PROMPT, &build_user_prompt(&request)).await?;

        debug!(user_id, stage = Stage::Extracting.as_str(), "Completion is {} bytes", completion.len());
        let candidates = extract_with_limit(&completion, self.results_per_search);
        if candidates.is_empty() {
            return Err(PredictorError::NoSuggestions);
        }

        info!(user_id, stage = Stage::Enriching.as_str(), "Enriching {} candidates", candidates.len());
        let domains = join_all(candidates.into_iter().map(|candidate| self.enrich(candidate))).await;

        debug!(user_id, stage = Stage::Persisting.as_str());
        let record_id = self.persist(user_id, request, &domains).await;

        Ok(Prediction { record_id, domains })
    }

    async fn authorize(&self, user_id: i64) -> Result<(), PredictorError> {
        let active = self
            .subscriptions
            .subscription(user_id)
            .await?
            .map(|state| state.is_active())
            .unwrap_or(false);

        if active {
            Ok(())
        } else {
            Err(PredictorError::Unauthorized)
        }
    }

    async fn enrich(&self, domain: DomainCandidate) -> DomainResult {
        let availability = self.checker.check(&domain).await;
        debug!("{} resolved by {} tier", domain, availability.tier);

        DomainResult {
            available: availability.available,
            price: availability.price,
            potential_value: estimate_potential_value(&domain),
            registrar_link: registrar_link(&domain, availability.available),
            domain,
        }
    }

    async fn persist(&self, user_id: i64, request: SearchRequest, domains: &[DomainResult]) -> Option<i64> {
        let prediction = NewPrediction {
            user_id,
            search_params: request,
            domains: domains.to_vec(),
            created_at: Utc::now(),
        };

        match self.predictions.append(prediction).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(user_id, "Failed to save prediction, returning results anyway: {}", e);
                metrics::increment_errors("storage_error");
                None
            }
        }
    }

    /// The user's past predictions, newest first.
    pub async fn history(&self, user_id: i64, limit: u32) -> Result<Vec<PredictionRecord>, PredictorError> {
        self.predictions
            .predictions_for_user(user_id, limit.clamp(1, MAX_HISTORY))
            .await
    }
}

/// Registrar search URL for the full domain, or for its name stem when it is taken.
pub fn registrar_link(domain: &DomainCandidate, available: bool) -> String {
    let query = if available { domain.as_str() } else { domain.stem() };

    match Url::parse_with_params(REGISTRAR_SEARCH_URL, &[("domain", query)]) {
        Ok(url) => url.into(),
        Err(_) => format!("{}?domain={}", REGISTRAR_SEARCH_URL, query),
    }
}
