//! Domain availability with graceful degradation.
//!
//! Tiers are tried in order: the configured availability API, a direct WHOIS query,
//! and finally a digest of the domain name. Each tier either resolves or hands off
//! to the next one; the digest tier always resolves, so [`AvailabilityChecker::check`]
//! never fails.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{collections::HashMap, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, warn};

use crate::{
    api_client::ApiClient,
    config::Config,
    errors::PredictorError,
    metrics,
    models::DomainCandidate,
    tld_mappings::{response_indicates_available, whois_server_for},
    valuation::estimate_price,
};

const WHOIS_READ_CHUNK: usize = 4096;

/// What a tier learned about a domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub available: bool,
    /// Price reported by the tier itself, if any.
    pub quoted_price: Option<f64>,
}

impl Verdict {
    pub fn available(available: bool) -> Self {
        Self { available, quoted_price: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    Resolved(Verdict),
    /// The tier could not decide; the reason is only logged.
    Next(String),
}

#[async_trait]
pub trait AvailabilityTier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, domain: &DomainCandidate) -> TierOutcome;
}

/// Final answer for one domain. `price` is zero exactly when `available` is false.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Availability {
    pub available: bool,
    pub price: f64,
    pub tier: &'static str,
}

pub struct AvailabilityChecker {
    tiers: Vec<Box<dyn AvailabilityTier>>,
    fallback: DigestTier,
}

impl AvailabilityChecker {
    pub fn new(config: &Config, api: &ApiClient) -> Self {
        let mut tiers: Vec<Box<dyn AvailabilityTier>> = Vec::new();

        if config.domain_api_enabled() {
            tiers.push(Box::new(DomainApiTier::new(config, api.clone())));
        }
        if config.whois_enabled {
            tiers.push(Box::new(WhoisTier::new(config)));
        }

        debug!(
            "Availability tiers: {:?}",
            tiers.iter().map(|t| t.name()).chain(std::iter::once(DigestTier.name())).collect::<Vec<_>>()
        );

        Self::with_tiers(tiers)
    }

    /// Uses `tiers` in order, ending with the digest tier.
    pub fn with_tiers(tiers: Vec<Box<dyn AvailabilityTier>>) -> Self {
        Self { tiers, fallback: DigestTier }
    }

    pub async fn check(&self, domain: &DomainCandidate) -> Availability {
        let mut resolved = None;

        for tier in &self.tiers {
            match tier.check(domain).await {
                TierOutcome::Resolved(verdict) => {
                    resolved = Some((tier.name(), verdict));
                    break;
                }
                TierOutcome::Next(reason) => {
                    debug!("{} tier skipped for {}: {}", tier.name(), domain, reason);
                }
            }
        }

        let (tier, verdict) = resolved.unwrap_or_else(|| {
            warn!("All lookup tiers failed for {}, using digest fallback", domain);
            (self.fallback.name(), self.fallback.verdict(domain))
        });

        metrics::increment_tier_resolutions(tier);

        let price = if verdict.available {
            verdict.quoted_price.unwrap_or_else(|| estimate_price(domain))
        } else {
            0.0
        };

        Availability { available: verdict.available, price, tier }
    }
}

#[derive(Debug, Deserialize)]
struct ApiAvailability {
    available: bool,
    price: f64,
}

/// Tier 1: bearer-authenticated availability API.
pub struct DomainApiTier {
    api: ApiClient,
    api_url: String,
    api_key: String,
    timeout: Duration,
}

impl DomainApiTier {
    pub fn new(config: &Config, api: ApiClient) -> Self {
        Self {
            api,
            api_url: config.domain_api_url.clone(),
            api_key: config.domain_api_key.clone(),
            timeout: config.availability_api_timeout(),
        }
    }
}

#[async_trait]
impl AvailabilityTier for DomainApiTier {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn check(&self, domain: &DomainCandidate) -> TierOutcome {
        let body = serde_json::json!({ "domain": domain.as_str() });

        match self.api.post_json(&self.api_url, &self.api_key, &body, self.timeout).await {
            Ok((status, body)) => match interpret_api_response(status, &body) {
                Some(verdict) => TierOutcome::Resolved(verdict),
                None => {
                    warn!("Domain API gave an unusable answer for {} (status {})", domain, status);
                    TierOutcome::Next(format!("unusable response, status {}", status))
                }
            },
            Err(e) => {
                warn!("Domain API error for {}: {}", domain, e);
                TierOutcome::Next(e.to_string())
            }
        }
    }
}

/// Accepts only a 2xx JSON body with a boolean `available` and a numeric `price`.
///
/// An available domain quoted at zero or less is treated as a miss.
pub fn interpret_api_response(status: StatusCode, body: &str) -> Option<Verdict> {
    if !status.is_success() {
        return None;
    }

    let parsed: ApiAvailability = serde_json::from_str(body).ok()?;
    if !parsed.price.is_finite() || parsed.price < 0.0 {
        return None;
    }

    if parsed.available {
        (parsed.price > 0.0).then_some(Verdict { available: true, quoted_price: Some(parsed.price) })
    } else {
        Some(Verdict::available(false))
    }
}

/// Tier 2: raw port-43 WHOIS query against a static per-TLD server table.
pub struct WhoisTier {
    servers: HashMap<String, String>,
    port: u16,
    timeout: Duration,
    max_response_size: usize,
}

impl WhoisTier {
    pub fn new(config: &Config) -> Self {
        Self {
            servers: HashMap::new(),
            port: config.whois_port,
            timeout: config.whois_timeout(),
            max_response_size: config.max_whois_response_size,
        }
    }

    /// Replaces the built-in server table, e.g. to target a local test server.
    pub fn with_servers(mut self, servers: HashMap<String, String>) -> Self {
        self.servers = servers;
        self
    }

    fn server_for(&self, tld: &str) -> Option<String> {
        if self.servers.is_empty() {
            whois_server_for(tld).map(str::to_string)
        } else {
            self.servers.get(tld).cloned()
        }
    }

    async fn execute_whois_query(&self, server: &str, query: &str) -> Result<String, PredictorError> {
        let mut stream = timeout(self.timeout, TcpStream::connect((server, self.port))).await??;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        stream.write_all(format!("{}\r\n", query).as_bytes()).await?;

        let mut buffer = vec![0u8; WHOIS_READ_CHUNK];
        let mut response = Vec::new();

        // Registries close the connection once the reply is complete
        loop {
            match timeout(self.timeout, stream.read(&mut buffer)).await? {
                Ok(0) => break,
                Ok(n) => {
                    response.extend_from_slice(&buffer[..n]);
                    if response.len() > self.max_response_size {
                        return Err(PredictorError::Internal("WHOIS response too large".to_string()));
                    }
                }
                Err(e) => return Err(PredictorError::IoError(e)),
            }
        }

        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}

#[async_trait]
impl AvailabilityTier for WhoisTier {
    fn name(&self) -> &'static str {
        "whois"
    }

    async fn check(&self, domain: &DomainCandidate) -> TierOutcome {
        let tld = domain.tld();

        let Some(server) = self.server_for(tld) else {
            return TierOutcome::Next(format!("no WHOIS server for .{}", tld));
        };

        match self.execute_whois_query(&server, domain.as_str()).await {
            Ok(response) => {
                let available = response_indicates_available(tld, &response);
                debug!("WHOIS {} says {} is {}", server, domain, if available { "free" } else { "taken" });
                TierOutcome::Resolved(Verdict::available(available))
            }
            Err(e) => {
                warn!("WHOIS query to {} failed for {}: {}", server, domain, e);
                TierOutcome::Next(e.to_string())
            }
        }
    }
}

/// Tier 3: stable pseudo-random answer derived from the domain name, ~60% available.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestTier;

impl DigestTier {
    pub fn verdict(&self, domain: &DomainCandidate) -> Verdict {
        let digest = Sha256::digest(domain.as_str().as_bytes());
        let slice = u16::from_be_bytes([digest[0], digest[1]]);
        Verdict::available(slice % 10 < 6)
    }
}

#[async_trait]
impl AvailabilityTier for DigestTier {
    fn name(&self) -> &'static str {
        "digest"
    }

    async fn check(&self, domain: &DomainCandidate) -> TierOutcome {
        TierOutcome::Resolved(self.verdict(domain))
    }
}
