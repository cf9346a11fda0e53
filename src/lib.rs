//! # Domain Value Predictor
//!
//! Subscription-gated domain name suggestions: an LLM proposes names for a niche, each
//! name is checked for availability, priced and given a speculative resale estimate, and
//! the run is saved to the user's history.
//!
//! ## Features
//!
//! - Tolerant extraction of domain names from free-form completion text
//! - Tiered availability checks (HTTP API, port-43 WHOIS, stable digest fallback)
//! - Heuristic pricing and potential-value estimates
//! - SQLite history and subscription state via `sqlx`
//! - Stripe checkout, webhook verification and subscription reconciliation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use domain_value_predictor::{Config, DomainPredictor, SearchRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let predictor = DomainPredictor::new(Config::load()?).await?;
//!     let request = SearchRequest::new("technology").with_keywords("ai,cloud");
//!
//!     let prediction = predictor.pipeline().predict(42, request).await?;
//!     for result in prediction.domains {
//!         println!("{} available={} value=${}", result.domain, result.available, result.potential_value);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod api_client;
pub mod availability;
pub mod billing;
pub mod cache;
pub mod config;
pub mod errors;
pub mod extractor;
pub mod llm;
pub mod market;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod tld_mappings;
pub mod valuation;

// Re-export main types for easy access
pub use api_client::ApiClient;
pub use availability::{Availability, AvailabilityChecker};
pub use billing::{
    verify_webhook, BillingEvent, BillingReconciler, CheckoutRequest, CheckoutService, CheckoutStart,
    WebhookVerification,
};
pub use cache::CacheService;
pub use config::Config;
pub use errors::PredictorError;
pub use market::MarketData;
pub use models::{DomainCandidate, DomainResult, PredictionRecord, SearchRequest, SubscriptionStatus};
pub use pipeline::{Prediction, PredictionPipeline};
pub use store::SqliteStore;

use std::sync::Arc;

use billing::{CheckoutProvider, LogNotifier, StripeCheckout};
use llm::OpenAiClient;

/// Every component wired from one [`Config`], sharing a single cache and store.
#[derive(Clone)]
pub struct DomainPredictor {
    config: Arc<Config>,
    store: Arc<SqliteStore>,
    pipeline: Arc<PredictionPipeline>,
    reconciler: Arc<BillingReconciler>,
    checkout: Arc<CheckoutService>,
    market: Arc<MarketData>,
}

impl DomainPredictor {
    /// Connects to the configured database, runs migrations and builds the pipeline.
    pub async fn new(config: Config) -> Result<Self, PredictorError> {
        let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
        store.migrate().await?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Arc<SqliteStore>) -> Result<Self, PredictorError> {
        let cache = Arc::new(CacheService::new(&config));
        let api = ApiClient::new(&config, cache.clone())?;

        let pipeline = PredictionPipeline::new(
            &config,
            Arc::new(OpenAiClient::new(&config)?),
            Arc::new(AvailabilityChecker::new(&config, &api)),
            store.clone(),
            store.clone(),
        );
        let reconciler = BillingReconciler::new(store.clone(), Arc::new(LogNotifier));
        let checkout = CheckoutService::new(store.clone(), Arc::new(StripeCheckout::new(&config.stripe.secret_key)));
        let market = MarketData::new(&config, cache);

        Ok(Self {
            config: Arc::new(config),
            store,
            pipeline: Arc::new(pipeline),
            reconciler: Arc::new(reconciler),
            checkout: Arc::new(checkout),
            market: Arc::new(market),
        })
    }

    /// Replaces the Stripe checkout client, e.g. with a test double.
    pub fn with_checkout_provider(mut self, provider: Arc<dyn CheckoutProvider>) -> Self {
        self.checkout = Arc::new(CheckoutService::new(self.store.clone(), provider));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &PredictionPipeline {
        &self.pipeline
    }

    pub fn reconciler(&self) -> &BillingReconciler {
        &self.reconciler
    }

    pub fn checkout(&self) -> &CheckoutService {
        &self.checkout
    }

    pub fn market(&self) -> &MarketData {
        &self.market
    }

    /// Verifies a raw webhook delivery and applies it when the signature checks out.
    pub async fn handle_webhook(
        &self,
        payload: &str,
        signature: &str,
    ) -> Result<billing::ReconcileOutcome, PredictorError> {
        match verify_webhook(payload, signature, &self.config.stripe.webhook_secret) {
            WebhookVerification::Verified(event) => self.reconciler.reconcile(event).await,
            WebhookVerification::Invalid(reason) => Err(PredictorError::Webhook(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::billing::{
        fixtures::{invoice_event, sign},
        ReconcileOutcome,
    };
    use crate::config::StripeKeys;
    use store::SubscriptionStore;

    const WEBHOOK_SECRET: &str = "whsec_wiring";

    struct FixedCheckout;

    #[async_trait]
    impl CheckoutProvider for FixedCheckout {
        async fn create_customer(&self, user_id: i64, _email: Option<&str>) -> Result<String, PredictorError> {
            Ok(format!("cus_{}", user_id))
        }

        async fn create_checkout_session(
            &self,
            _customer_id: &str,
            _price_id: &str,
            _success_url: &str,
            _cancel_url: &str,
        ) -> Result<String, PredictorError> {
            Ok("https://checkout.stripe.com/c/pay/cs_test".to_string())
        }
    }

    async fn predictor() -> DomainPredictor {
        let config = Config {
            whois_enabled: false,
            stripe: StripeKeys { webhook_secret: WEBHOOK_SECRET.to_string(), ..StripeKeys::default() },
            ..Config::default()
        };
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        DomainPredictor::with_store(config, store).unwrap()
    }

    #[tokio::test]
    async fn test_predictor_wiring() {
        let predictor = predictor().await;
        assert_eq!(predictor.market().trending_keywords().await.len(), 20);
        assert!(predictor.store().subscription(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_user_is_rejected() {
        let predictor = predictor().await;
        let result = predictor.pipeline().predict(1, SearchRequest::new("travel")).await;
        assert!(matches!(result, Err(PredictorError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_webhook_with_bad_signature_is_rejected() {
        let predictor = predictor().await;
        let result = predictor.handle_webhook("{}", "t=1,v1=00").await;
        assert!(matches!(result, Err(PredictorError::Webhook(_))));
    }

    #[tokio::test]
    async fn test_checkout_then_paid_invoice_activates_user() {
        let predictor = predictor().await.with_checkout_provider(Arc::new(FixedCheckout));

        let start = predictor
            .checkout()
            .start_checkout(
                7,
                CheckoutRequest {
                    plan_id: "price_monthly".to_string(),
                    success_url: "https://example.com/ok".to_string(),
                    cancel_url: "https://example.com/cancel".to_string(),
                    email: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(start.customer_id, "cus_7");

        let payload = invoice_event("invoice.payment_succeeded", Some("cus_7"), 999);
        let outcome = tokio_test::assert_ok!(predictor.handle_webhook(&payload, &sign(&payload, WEBHOOK_SECRET)).await);
        assert_eq!(outcome, ReconcileOutcome::Applied { user_id: 7, status: SubscriptionStatus::Active });

        let state = predictor.store().subscription(7).await.unwrap().unwrap();
        assert!(state.is_active());
        assert_eq!(state.price_id.as_deref(), Some("price_monthly"));
        assert_eq!(state.last_payment_amount, Some(9.99));
    }
}
