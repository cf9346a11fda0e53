//! Subscription billing: checkout, webhook verification and state reconciliation.
//!
//! Stripe events are verified and flattened into [`BillingEvent`] at the edge, so the
//! reconciler never sees SDK types. Only provider events change a user's status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCustomer, Customer, CustomerId, Event, EventObject, EventType, Subscription, Webhook,
};
use tracing::{debug, error, info, warn};

use crate::{
    errors::PredictorError,
    metrics,
    models::{SubscriptionState, SubscriptionStatus},
    store::SubscriptionStore,
};

/// A provider event reduced to what the reconciler acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    SubscriptionChanged {
        /// `true` for `customer.subscription.created`.
        created: bool,
        customer_id: String,
        subscription_id: String,
        /// Provider status string, e.g. `active` or `past_due`.
        status: String,
        price_id: Option<String>,
        current_period_end: Option<DateTime<Utc>>,
    },
    SubscriptionDeleted {
        customer_id: String,
    },
    PaymentSucceeded {
        customer_id: String,
        subscription_id: Option<String>,
        /// Major currency units.
        amount: f64,
    },
    PaymentFailed {
        customer_id: String,
        subscription_id: Option<String>,
    },
    Other(String),
}

impl BillingEvent {
    pub fn from_stripe(event: Event) -> Self {
        match (event.type_, event.data.object) {
            (
                event_type @ (EventType::CustomerSubscriptionCreated
                | EventType::CustomerSubscriptionUpdated),
                EventObject::Subscription(subscription),
            ) => BillingEvent::SubscriptionChanged {
                created: event_type == EventType::CustomerSubscriptionCreated,
                customer_id: subscription.customer.id().to_string(),
                subscription_id: subscription.id.to_string(),
                status: subscription.status.as_str().to_string(),
                price_id: first_price_id(&subscription),
                current_period_end: DateTime::from_timestamp(subscription.current_period_end, 0),
            },
            (EventType::CustomerSubscriptionDeleted, EventObject::Subscription(subscription)) => {
                BillingEvent::SubscriptionDeleted {
                    customer_id: subscription.customer.id().to_string(),
                }
            }
            (EventType::InvoicePaymentSucceeded, EventObject::Invoice(invoice)) => {
                match invoice.customer.as_ref() {
                    Some(customer) => BillingEvent::PaymentSucceeded {
                        customer_id: customer.id().to_string(),
                        subscription_id: invoice.subscription.as_ref().map(|s| s.id().to_string()),
                        amount: invoice.amount_paid.unwrap_or(0) as f64 / 100.0,
                    },
                    None => BillingEvent::Other("invoice.payment_succeeded".to_string()),
                }
            }
            (EventType::InvoicePaymentFailed, EventObject::Invoice(invoice)) => {
                match invoice.customer.as_ref() {
                    Some(customer) => BillingEvent::PaymentFailed {
                        customer_id: customer.id().to_string(),
                        subscription_id: invoice.subscription.as_ref().map(|s| s.id().to_string()),
                    },
                    None => BillingEvent::Other("invoice.payment_failed".to_string()),
                }
            }
            (event_type, _) => BillingEvent::Other(event_type.to_string()),
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            BillingEvent::SubscriptionChanged { created: true, .. } => "customer.subscription.created",
            BillingEvent::SubscriptionChanged { .. } => "customer.subscription.updated",
            BillingEvent::SubscriptionDeleted { .. } => "customer.subscription.deleted",
            BillingEvent::PaymentSucceeded { .. } => "invoice.payment_succeeded",
            BillingEvent::PaymentFailed { .. } => "invoice.payment_failed",
            BillingEvent::Other(event_type) => event_type,
        }
    }

    fn customer_id(&self) -> Option<&str> {
        match self {
            BillingEvent::SubscriptionChanged { customer_id, .. }
            | BillingEvent::SubscriptionDeleted { customer_id }
            | BillingEvent::PaymentSucceeded { customer_id, .. }
            | BillingEvent::PaymentFailed { customer_id, .. } => Some(customer_id),
            BillingEvent::Other(_) => None,
        }
    }
}

fn first_price_id(subscription: &Subscription) -> Option<String> {
    subscription
        .items
        .data
        .first()
        .and_then(|item| item.price.as_ref())
        .map(|price| price.id.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookVerification {
    Verified(BillingEvent),
    Invalid(String),
}

/// Checks the `Stripe-Signature` header against the endpoint secret and parses the payload.
pub fn verify_webhook(payload: &str, signature: &str, webhook_secret: &str) -> WebhookVerification {
    if webhook_secret.trim().is_empty() {
        return WebhookVerification::Invalid("webhook secret is not configured".to_string());
    }
    if signature.trim().is_empty() {
        return WebhookVerification::Invalid("missing signature".to_string());
    }

    match Webhook::construct_event(payload, signature, webhook_secret) {
        Ok(event) => WebhookVerification::Verified(BillingEvent::from_stripe(event)),
        Err(e) => {
            warn!("Webhook signature verification failed: {}", e);
            WebhookVerification::Invalid(format!("Webhook Error: {}", e))
        }
    }
}

/// Told about failed payments so the user can be contacted.
#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn payment_failed(&self, user_id: i64, state: &SubscriptionState);
}

/// Writes the notification to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl PaymentNotifier for LogNotifier {
    async fn payment_failed(&self, user_id: i64, state: &SubscriptionState) {
        warn!(
            user_id,
            subscription = state.stripe_subscription_id.as_deref().unwrap_or("unknown"),
            "Payment failed for Domain Value Predictor subscription; user should update payment details"
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Applied { user_id: i64, status: SubscriptionStatus },
    Ignored(&'static str),
}

pub struct BillingReconciler {
    store: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn PaymentNotifier>,
}

impl BillingReconciler {
    pub fn new(store: Arc<dyn SubscriptionStore>, notifier: Arc<dyn PaymentNotifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn reconcile(&self, event: BillingEvent) -> Result<ReconcileOutcome, PredictorError> {
        metrics::increment_webhook_events(event.event_type());

        let Some(customer_id) = event.customer_id() else {
            debug!("Ignoring billing event {}", event.event_type());
            return Ok(ReconcileOutcome::Ignored("unhandled event type"));
        };

        // Invoices outside a subscription belong to someone else's integration.
        if let BillingEvent::PaymentSucceeded { subscription_id: None, .. }
        | BillingEvent::PaymentFailed { subscription_id: None, .. } = &event
        {
            return Ok(ReconcileOutcome::Ignored("invoice without subscription"));
        }

        let Some(user_id) = self.store.user_for_customer(customer_id).await? else {
            debug!("No user for customer {}, ignoring {}", customer_id, event.event_type());
            return Ok(ReconcileOutcome::Ignored("unknown customer"));
        };

        let mut state = self.store.subscription(user_id).await?.unwrap_or_else(|| {
            let mut state = SubscriptionState::new(user_id);
            state.stripe_customer_id = Some(customer_id.to_string());
            state
        });

        match &event {
            BillingEvent::SubscriptionChanged {
                subscription_id,
                status,
                price_id,
                current_period_end,
                ..
            } => {
                state.status = SubscriptionStatus::from_provider(status);
                state.stripe_subscription_id = Some(subscription_id.clone());
                state.current_period_end = *current_period_end;
                if price_id.is_some() {
                    state.price_id = price_id.clone();
                }
            }
            BillingEvent::SubscriptionDeleted { .. } => {
                state.status = SubscriptionStatus::Cancelled;
            }
            BillingEvent::PaymentSucceeded { amount, .. } => {
                state.status = SubscriptionStatus::Active;
                state.last_payment_date = Some(Utc::now());
                state.last_payment_amount = Some(*amount);
            }
            BillingEvent::PaymentFailed { .. } => {
                state.status = SubscriptionStatus::PastDue;
            }
            BillingEvent::Other(_) => return Ok(ReconcileOutcome::Ignored("unhandled event type")),
        }

        self.store.save_subscription(&state).await?;
        info!(user_id, status = %state.status, "Applied billing event {}", event.event_type());

        if matches!(event, BillingEvent::PaymentFailed { .. }) {
            self.notifier.payment_failed(user_id, &state).await;
        }

        Ok(ReconcileOutcome::Applied { user_id, status: state.status })
    }
}

/// Provider side of checkout: customers and hosted payment pages.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_customer(&self, user_id: i64, email: Option<&str>) -> Result<String, PredictorError>;

    /// Returns the URL the user is redirected to.
    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, PredictorError>;
}

pub struct StripeCheckout {
    client: Client,
}

impl StripeCheckout {
    pub fn new(secret_key: &str) -> Self {
        Self { client: Client::new(secret_key) }
    }
}

#[async_trait]
impl CheckoutProvider for StripeCheckout {
    async fn create_customer(&self, user_id: i64, email: Option<&str>) -> Result<String, PredictorError> {
        let params = CreateCustomer {
            email,
            metadata: Some([("user_id".to_string(), user_id.to_string())].into_iter().collect()),
            ..Default::default()
        };

        let customer = Customer::create(&self.client, params).await.map_err(|e| {
            error!("Stripe customer creation failed for user {}: {}", user_id, e);
            PredictorError::Upstream(format!("customer creation failed: {}", e))
        })?;

        Ok(customer.id.to_string())
    }

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, PredictorError> {
        let customer = customer_id
            .parse::<CustomerId>()
            .map_err(|e| PredictorError::Internal(format!("bad customer id {}: {}", customer_id, e)))?;

        let params = CreateCheckoutSession {
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id.to_string()),
                quantity: Some(1),
                ..Default::default()
            }]),
            mode: Some(CheckoutSessionMode::Subscription),
            success_url: Some(success_url),
            cancel_url: Some(cancel_url),
            customer: Some(customer),
            ..Default::default()
        };

        let session = CheckoutSession::create(&self.client, params).await.map_err(|e| {
            error!("Stripe checkout session failed for {}: {}", customer_id, e);
            PredictorError::Upstream(format!("checkout session failed: {}", e))
        })?;

        session
            .url
            .ok_or_else(|| PredictorError::Upstream("checkout session has no url".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub plan_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutStart {
    pub customer_id: String,
    pub price_id: String,
    pub url: String,
}

/// Starts a subscription checkout. The first checkout creates the provider customer and the
/// customer-to-user link that webhooks are resolved through.
pub struct CheckoutService {
    store: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn CheckoutProvider>,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn SubscriptionStore>, provider: Arc<dyn CheckoutProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn start_checkout(
        &self,
        user_id: i64,
        request: CheckoutRequest,
    ) -> Result<CheckoutStart, PredictorError> {
        let plan = subscription_plans()
            .into_iter()
            .find(|plan| plan.id == request.plan_id)
            .ok_or_else(|| PredictorError::InvalidRequest(format!("Unknown plan: {}", request.plan_id)))?;

        let existing = self.store.subscription(user_id).await?;
        let mut state = match existing {
            Some(state) if state.stripe_customer_id.is_some() => state,
            _ => {
                let customer_id = self.provider.create_customer(user_id, request.email.as_deref()).await?;
                info!(user_id, "Created billing customer {}", customer_id);
                self.store.link_customer(user_id, &customer_id).await?
            }
        };

        // Status stays as is until the provider confirms payment.
        state.price_id = Some(plan.id.to_string());
        self.store.save_subscription(&state).await?;

        let customer_id = state
            .stripe_customer_id
            .clone()
            .ok_or_else(|| PredictorError::Internal(format!("user {} has no billing customer", user_id)))?;
        let url = self
            .provider
            .create_checkout_session(&customer_id, plan.id, &request.success_url, &request.cancel_url)
            .await?;

        Ok(CheckoutStart { customer_id, price_id: plan.id.to_string(), url })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionPlan {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub price: f64,
    pub interval: &'static str,
    pub features: &'static [&'static str],
}

pub fn subscription_plans() -> Vec<SubscriptionPlan> {
    vec![
        SubscriptionPlan {
            id: "price_monthly",
            name: "Monthly Subscription",
            description: "Access to Domain Value Predictor for one month",
            price: 9.99,
            interval: "month",
            features: &[
                "Unlimited domain searches",
                "Value prediction analytics",
                "Domain availability checking",
                "Registration recommendations",
            ],
        },
        SubscriptionPlan {
            id: "price_yearly",
            name: "Yearly Subscription",
            description: "Access to Domain Value Predictor for one year",
            price: 99.99,
            interval: "year",
            features: &[
                "Unlimited domain searches",
                "Value prediction analytics",
                "Domain availability checking",
                "Registration recommendations",
                "Priority support",
                "Advanced market trend analysis",
            ],
        },
    ]
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    /// Builds a `Stripe-Signature` header the way the provider does: HMAC-SHA256 over
    /// `timestamp.payload` keyed with the endpoint secret.
    pub(crate) fn sign(payload: &str, secret: &str) -> String {
        let timestamp = Utc::now().timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!("t={},v1={:x}", timestamp, mac.finalize().into_bytes())
    }

    pub(crate) fn invoice_event(event_type: &str, customer: Option<&str>, amount_paid: i64) -> String {
        let customer = customer.map(|c| format!(r#""customer":"{}","#, c)).unwrap_or_default();
        format!(
            r#"{{"id":"evt_invoice","object":"event","created":1700000000,"livemode":false,
    "pending_webhooks":1,"type":"{event_type}","data":{{"object":{{"id":"in_1","object":"invoice",
    {customer}"subscription":"sub_1","amount_paid":{amount_paid},"amount_due":999}}}}}}"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::fixtures::{invoice_event, sign};
    use crate::store::SqliteStore;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    const SECRET: &str = "whsec_test_secret";

    fn subscription_event(event_type: &str, status: &str) -> String {
        format!(
            r#"{{"id":"evt_sub","object":"event","created":1700000000,"livemode":false,
"pending_webhooks":1,"type":"{event_type}","data":{{"object":{{"id":"sub_1","object":"subscription",
"automatic_tax":{{"enabled":false}},"billing_cycle_anchor":1700000000,"cancel_at_period_end":false,
"created":1700000000,"currency":"usd","current_period_start":1700000000,
"current_period_end":1702592000,"customer":"cus_alice","items":{{"object":"list",
"data":[{{"id":"si_1","object":"subscription_item","price":{{"id":"price_yearly","object":"price"}}}}],
"has_more":false,"url":"/v1/subscription_items?subscription=sub_1"}},"livemode":false,
"metadata":{{}},"start_date":1700000000,"status":"{status}"}}}}}}"#
        )
    }

    fn verified(payload: &str) -> BillingEvent {
        match verify_webhook(payload, &sign(payload, SECRET), SECRET) {
            WebhookVerification::Verified(event) => event,
            WebhookVerification::Invalid(reason) => panic!("expected a verified event: {}", reason),
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notified: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl PaymentNotifier for RecordingNotifier {
        async fn payment_failed(&self, user_id: i64, _state: &SubscriptionState) {
            self.notified.lock().unwrap().push(user_id);
        }
    }

    async fn setup() -> (Arc<SqliteStore>, Arc<RecordingNotifier>, BillingReconciler) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        for (user_id, customer) in [(1, "cus_alice"), (2, "cus_bob")] {
            let mut state = store.link_customer(user_id, customer).await.unwrap();
            state.status = SubscriptionStatus::Active;
            store.save_subscription(&state).await.unwrap();
        }

        let notifier = Arc::new(RecordingNotifier::default());
        let reconciler = BillingReconciler::new(store.clone(), notifier.clone());
        (store, notifier, reconciler)
    }

    async fn status_of(store: &SqliteStore, user_id: i64) -> SubscriptionStatus {
        store.subscription(user_id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_payment_failed_marks_only_that_user_past_due() {
        let (store, notifier, reconciler) = setup().await;

        let outcome = reconciler
            .reconcile(BillingEvent::PaymentFailed {
                customer_id: "cus_alice".to_string(),
                subscription_id: Some("sub_1".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Applied { user_id: 1, status: SubscriptionStatus::PastDue });
        assert_eq!(status_of(&store, 1).await, SubscriptionStatus::PastDue);
        assert_eq!(status_of(&store, 2).await, SubscriptionStatus::Active);
        assert_eq!(*notifier.notified.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_unknown_customer_is_noop() {
        let (store, notifier, reconciler) = setup().await;

        let outcome = reconciler
            .reconcile(BillingEvent::PaymentFailed {
                customer_id: "cus_stranger".to_string(),
                subscription_id: Some("sub_9".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Ignored("unknown customer"));
        assert_eq!(status_of(&store, 1).await, SubscriptionStatus::Active);
        assert_eq!(status_of(&store, 2).await, SubscriptionStatus::Active);
        assert!(notifier.notified.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_noop() {
        let (_store, _notifier, reconciler) = setup().await;
        let outcome = reconciler
            .reconcile(BillingEvent::Other("charge.refunded".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Ignored("unhandled event type"));
    }

    #[tokio::test]
    async fn test_subscription_lifecycle_events() {
        let (store, _notifier, reconciler) = setup().await;
        let period_end = DateTime::from_timestamp(1_900_000_000, 0);

        reconciler
            .reconcile(BillingEvent::SubscriptionChanged {
                created: false,
                customer_id: "cus_bob".to_string(),
                subscription_id: "sub_2".to_string(),
                status: "past_due".to_string(),
                price_id: Some("price_yearly".to_string()),
                current_period_end: period_end,
            })
            .await
            .unwrap();

        let state = store.subscription(2).await.unwrap().unwrap();
        assert_eq!(state.status, SubscriptionStatus::PastDue);
        assert_eq!(state.current_period_end, period_end);
        assert_eq!(state.stripe_subscription_id.as_deref(), Some("sub_2"));
        assert_eq!(state.price_id.as_deref(), Some("price_yearly"));

        reconciler
            .reconcile(BillingEvent::PaymentSucceeded {
                customer_id: "cus_bob".to_string(),
                subscription_id: Some("sub_2".to_string()),
                amount: 9.99,
            })
            .await
            .unwrap();

        let state = store.subscription(2).await.unwrap().unwrap();
        assert!(state.is_active());
        assert_eq!(state.last_payment_amount, Some(9.99));
        assert!(state.last_payment_date.is_some());

        reconciler
            .reconcile(BillingEvent::SubscriptionDeleted { customer_id: "cus_bob".to_string() })
            .await
            .unwrap();
        assert_eq!(status_of(&store, 2).await, SubscriptionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_invoice_without_subscription_is_ignored() {
        let (store, _notifier, reconciler) = setup().await;
        let outcome = reconciler
            .reconcile(BillingEvent::PaymentFailed { customer_id: "cus_alice".to_string(), subscription_id: None })
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Ignored("invoice without subscription"));
        assert_eq!(status_of(&store, 1).await, SubscriptionStatus::Active);
    }

    #[test]
    fn test_bad_signature_is_invalid() {
        let payload = r#"{"id":"evt_1","type":"invoice.payment_failed"}"#;
        let verification = verify_webhook(payload, "t=1700000000,v1=deadbeef", "whsec_test");
        assert!(matches!(verification, WebhookVerification::Invalid(_)));

        let verification = verify_webhook(payload, "", "whsec_test");
        assert_eq!(verification, WebhookVerification::Invalid("missing signature".to_string()));

        let verification = verify_webhook(payload, "t=1,v1=ab", "");
        assert!(matches!(verification, WebhookVerification::Invalid(_)));
    }

    #[test]
    fn test_signed_invoice_events() {
        let event = verified(&invoice_event("invoice.payment_failed", Some("cus_alice"), 0));
        assert_eq!(
            event,
            BillingEvent::PaymentFailed {
                customer_id: "cus_alice".to_string(),
                subscription_id: Some("sub_1".to_string()),
            }
        );

        let event = verified(&invoice_event("invoice.payment_succeeded", Some("cus_alice"), 999));
        assert_eq!(
            event,
            BillingEvent::PaymentSucceeded {
                customer_id: "cus_alice".to_string(),
                subscription_id: Some("sub_1".to_string()),
                amount: 9.99,
            }
        );

        let event = verified(&invoice_event("invoice.payment_succeeded", None, 999));
        assert_eq!(event, BillingEvent::Other("invoice.payment_succeeded".to_string()));
    }

    #[test]
    fn test_signed_subscription_events() {
        let event = verified(&subscription_event("customer.subscription.updated", "past_due"));
        assert_eq!(
            event,
            BillingEvent::SubscriptionChanged {
                created: false,
                customer_id: "cus_alice".to_string(),
                subscription_id: "sub_1".to_string(),
                status: "past_due".to_string(),
                price_id: Some("price_yearly".to_string()),
                current_period_end: DateTime::from_timestamp(1_702_592_000, 0),
            }
        );
        assert_eq!(event.event_type(), "customer.subscription.updated");

        let event = verified(&subscription_event("customer.subscription.created", "active"));
        assert!(matches!(event, BillingEvent::SubscriptionChanged { created: true, .. }));
        assert_eq!(event.event_type(), "customer.subscription.created");

        let event = verified(&subscription_event("customer.subscription.deleted", "canceled"));
        assert_eq!(event, BillingEvent::SubscriptionDeleted { customer_id: "cus_alice".to_string() });
    }

    #[test]
    fn test_signature_from_other_secret_is_invalid() {
        let payload = invoice_event("invoice.payment_failed", Some("cus_alice"), 0);
        let verification = verify_webhook(&payload, &sign(&payload, "whsec_other"), SECRET);
        assert!(matches!(verification, WebhookVerification::Invalid(_)));
    }

    #[derive(Default)]
    struct StubCheckout {
        customers_created: AtomicUsize,
    }

    #[async_trait]
    impl CheckoutProvider for StubCheckout {
        async fn create_customer(&self, user_id: i64, _email: Option<&str>) -> Result<String, PredictorError> {
            self.customers_created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("cus_user{}", user_id))
        }

        async fn create_checkout_session(
            &self,
            customer_id: &str,
            price_id: &str,
            _success_url: &str,
            _cancel_url: &str,
        ) -> Result<String, PredictorError> {
            Ok(format!("https://checkout.stripe.com/c/pay/{}/{}", customer_id, price_id))
        }
    }

    fn checkout_request(plan_id: &str) -> CheckoutRequest {
        CheckoutRequest {
            plan_id: plan_id.to_string(),
            success_url: "https://example.com/success".to_string(),
            cancel_url: "https://example.com/cancel".to_string(),
            email: Some("user@example.com".to_string()),
        }
    }

    #[tokio::test]
    async fn test_first_checkout_links_customer() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let provider = Arc::new(StubCheckout::default());
        let checkout = CheckoutService::new(store.clone(), provider.clone());

        let start = tokio_test::assert_ok!(checkout.start_checkout(3, checkout_request("price_monthly")).await);
        assert_eq!(start.customer_id, "cus_user3");
        assert_eq!(start.url, "https://checkout.stripe.com/c/pay/cus_user3/price_monthly");
        assert_eq!(store.user_for_customer("cus_user3").await.unwrap(), Some(3));

        let state = store.subscription(3).await.unwrap().unwrap();
        assert_eq!(state.status, SubscriptionStatus::Inactive);
        assert_eq!(state.price_id.as_deref(), Some("price_monthly"));

        // A second checkout reuses the customer and switches the plan.
        let again = checkout.start_checkout(3, checkout_request("price_yearly")).await.unwrap();
        assert_eq!(again.customer_id, "cus_user3");
        assert_eq!(provider.customers_created.load(Ordering::SeqCst), 1);
        assert_eq!(status_price(&store, 3).await, Some("price_yearly".to_string()));
    }

    async fn status_price(store: &SqliteStore, user_id: i64) -> Option<String> {
        store.subscription(user_id).await.unwrap().unwrap().price_id
    }

    #[tokio::test]
    async fn test_checkout_rejects_unknown_plan() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let provider = Arc::new(StubCheckout::default());
        let checkout = CheckoutService::new(store.clone(), provider.clone());

        let err = tokio_test::assert_err!(checkout.start_checkout(3, checkout_request("price_lifetime")).await);
        assert!(matches!(err, PredictorError::InvalidRequest(_)));
        assert_eq!(provider.customers_created.load(Ordering::SeqCst), 0);
        assert!(store.subscription(3).await.unwrap().is_none());
    }

    #[test]
    fn test_plans_serialize() {
        let json = tokio_test::assert_ok!(serde_json::to_value(subscription_plans()));
        assert_eq!(json[0]["id"], "price_monthly");
        assert_eq!(json[1]["features"].as_array().map(Vec::len), Some(6));
    }

    #[test]
    fn test_plans() {
        let plans = subscription_plans();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].price, 9.99);
        assert_eq!(plans[1].interval, "year");
    }
}
