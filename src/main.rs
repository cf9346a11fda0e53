use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, HeaderMap},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use domain_value_predictor::{
    billing::{subscription_plans, CheckoutRequest, CheckoutStart, SubscriptionPlan},
    market::{MarketTrend, TldPerformance},
    metrics, Config, DomainPredictor, DomainResult, PredictionRecord, PredictorError, SearchRequest,
};

const USER_HEADER: &str = "x-user-id";
const SIGNATURE_HEADER: &str = "stripe-signature";
const DEFAULT_HISTORY_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct AppState {
    predictor: DomainPredictor,
    config: Arc<Config>,
}

/// Caller identity supplied by the session layer in front of this service.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub i64);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = PredictorError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(AuthenticatedUser)
            .ok_or_else(|| {
                metrics::increment_errors("unauthenticated");
                PredictorError::Unauthorized
            })
    }
}

#[derive(Deserialize)]
struct PredictBody {
    niche: String,
    #[serde(default, alias = "timeframe")]
    timeframe_months: Option<u32>,
    #[serde(default)]
    budget: Option<f64>,
    #[serde(default)]
    keywords: Option<String>,
}

impl PredictBody {
    fn into_request(self, config: &Config) -> SearchRequest {
        SearchRequest {
            niche: self.niche,
            timeframe_months: self.timeframe_months.unwrap_or(config.default_timeframe_months),
            budget: self.budget,
            keywords: self.keywords,
        }
    }
}

#[derive(Deserialize)]
struct CheckoutBody {
    plan_id: String,
    success_url: String,
    cancel_url: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Serialize)]
struct PredictResponse {
    success: bool,
    record_id: Option<i64>,
    domains: Vec<DomainResult>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "domain_value_predictor=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::load().context("failed to load configuration")?;
    info!("Configuration loaded successfully");

    let predictor = DomainPredictor::new(config.clone())
        .await
        .context("failed to initialize services")?;

    metrics::init_metrics();

    let app_state = AppState {
        predictor,
        config: Arc::new(config.clone()),
    };

    let app = Router::new()
        .route("/predict", post(predict))
        .route("/predictions", get(prediction_history))
        .route("/webhooks/stripe", post(stripe_webhook))
        .route("/plans", get(plans))
        .route("/billing/checkout", post(start_checkout))
        .route("/market/keywords", get(trending_keywords))
        .route("/market/trends", get(market_trends))
        .route("/market/tlds", get(tld_performance))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Domain value predictor listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Metrics: http://{}/metrics", addr);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal, gracefully shutting down...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

async fn predict(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(state): State<AppState>,
    Json(body): Json<PredictBody>,
) -> Result<Json<PredictResponse>, PredictorError> {
    let request = body.into_request(&state.config);
    let prediction = state.predictor.pipeline().predict(user_id, request).await?;

    Ok(Json(PredictResponse {
        success: true,
        record_id: prediction.record_id,
        domains: prediction.domains,
    }))
}

async fn prediction_history(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<PredictionRecord>>, PredictorError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let history = state.predictor.pipeline().history(user_id, limit).await?;
    Ok(Json(history))
}

async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, PredictorError> {
    let payload = std::str::from_utf8(&body)
        .map_err(|_| PredictorError::Webhook("Webhook Error: payload is not UTF-8".to_string()))?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let outcome = state.predictor.handle_webhook(payload, signature).await?;
    info!("Stripe webhook handled: {:?}", outcome);

    Ok(Json(json!({ "received": true })))
}

async fn start_checkout(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(state): State<AppState>,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<CheckoutStart>, PredictorError> {
    let request = CheckoutRequest {
        plan_id: body.plan_id,
        success_url: body.success_url,
        cancel_url: body.cancel_url,
        email: body.email,
    };
    let start = state.predictor.checkout().start_checkout(user_id, request).await?;
    info!(user_id, "Checkout started for {}", start.price_id);
    Ok(Json(start))
}

async fn plans() -> Json<Vec<SubscriptionPlan>> {
    Json(subscription_plans())
}

async fn trending_keywords(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.predictor.market().trending_keywords().await)
}

async fn market_trends(State(state): State<AppState>) -> Json<Vec<MarketTrend>> {
    Json(state.predictor.market().market_trends().await)
}

async fn tld_performance(State(state): State<AppState>) -> Json<Vec<TldPerformance>> {
    Json(state.predictor.market().tld_performance().await)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.config.start_time.elapsed().as_secs(),
    })
}
