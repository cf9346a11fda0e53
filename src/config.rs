use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Hard cap on suggestions per search.
pub const MAX_RESULTS_PER_SEARCH: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub openai_api_key: String,
    pub openai_api_url: String,
    pub openai_model: String,
    pub llm_timeout_seconds: u64,
    pub domain_api_key: String,
    pub domain_api_url: String,
    pub availability_api_timeout_seconds: u64,
    pub whois_enabled: bool,
    pub whois_port: u16,
    pub whois_timeout_seconds: u64,
    pub max_whois_response_size: usize,
    pub stripe: StripeKeys,
    pub results_per_search: usize,
    pub default_timeframe_months: u32,
    pub api_cache_ttl_seconds: u64,
    pub trending_cache_ttl_seconds: u64,
    pub cache_max_entries: u64,
    pub start_time: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct StripeKeys {
    pub publishable_key: String,
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigData {
    pub port: u16,
    pub database_url: String,
    pub openai_api_key: String,
    pub openai_api_url: String,
    pub openai_model: String,
    pub llm_timeout_seconds: u64,
    pub domain_api_key: String,
    pub domain_api_url: String,
    pub availability_api_timeout_seconds: u64,
    pub whois_enabled: bool,
    pub whois_port: u16,
    pub whois_timeout_seconds: u64,
    pub max_whois_response_size: usize,
    pub stripe_publishable_key: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub results_per_search: usize,
    pub default_timeframe_months: u32,
    pub api_cache_ttl_seconds: u64,
    pub trending_cache_ttl_seconds: u64,
    pub cache_max_entries: u64,
}

impl Default for ConfigData {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "sqlite://domain_predictor.db?mode=rwc".to_string(),
            openai_api_key: String::new(),
            openai_api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            openai_model: "gpt-3.5-turbo".to_string(),
            llm_timeout_seconds: 30,
            domain_api_key: String::new(),
            domain_api_url: "https://domain-availability-api.example.com/v1/check".to_string(),
            availability_api_timeout_seconds: 15,
            whois_enabled: true,
            whois_port: 43,
            whois_timeout_seconds: 10,
            max_whois_response_size: 1024 * 1024,
            stripe_publishable_key: String::new(),
            stripe_secret_key: String::new(),
            stripe_webhook_secret: String::new(),
            results_per_search: MAX_RESULTS_PER_SEARCH,
            default_timeframe_months: 3,
            api_cache_ttl_seconds: 3600,
            trending_cache_ttl_seconds: 86400,
            cache_max_entries: 10_000,
        }
    }
}

impl Default for Config {
    /// Built-in defaults, without reading the environment.
    fn default() -> Self {
        Self::from_data(ConfigData::default())
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = ConfigData::default();

        let mut settings = config::Config::builder()
            .set_default("port", defaults.port)?
            .set_default("database_url", defaults.database_url)?
            .set_default("openai_api_key", defaults.openai_api_key)?
            .set_default("openai_api_url", defaults.openai_api_url)?
            .set_default("openai_model", defaults.openai_model)?
            .set_default("llm_timeout_seconds", defaults.llm_timeout_seconds)?
            .set_default("domain_api_key", defaults.domain_api_key)?
            .set_default("domain_api_url", defaults.domain_api_url)?
            .set_default("availability_api_timeout_seconds", defaults.availability_api_timeout_seconds)?
            .set_default("whois_enabled", defaults.whois_enabled)?
            .set_default("whois_port", defaults.whois_port)?
            .set_default("whois_timeout_seconds", defaults.whois_timeout_seconds)?
            .set_default("max_whois_response_size", defaults.max_whois_response_size as i64)?
            .set_default("stripe_publishable_key", defaults.stripe_publishable_key)?
            .set_default("stripe_secret_key", defaults.stripe_secret_key)?
            .set_default("stripe_webhook_secret", defaults.stripe_webhook_secret)?
            .set_default("results_per_search", defaults.results_per_search as i64)?
            .set_default("default_timeframe_months", defaults.default_timeframe_months)?
            .set_default("api_cache_ttl_seconds", defaults.api_cache_ttl_seconds)?
            .set_default("trending_cache_ttl_seconds", defaults.trending_cache_ttl_seconds)?
            .set_default("cache_max_entries", defaults.cache_max_entries)?;

        // Override with environment variables if present
        settings = Self::apply_env_overrides(settings)?;

        let config_data: ConfigData = settings.build()?.try_deserialize()?;

        Ok(Self::from_data(config_data))
    }

    fn from_data(data: ConfigData) -> Self {
        Config {
            port: data.port,
            database_url: data.database_url,
            openai_api_key: data.openai_api_key,
            openai_api_url: data.openai_api_url,
            openai_model: data.openai_model,
            llm_timeout_seconds: data.llm_timeout_seconds,
            domain_api_key: data.domain_api_key,
            domain_api_url: data.domain_api_url,
            availability_api_timeout_seconds: data.availability_api_timeout_seconds,
            whois_enabled: data.whois_enabled,
            whois_port: data.whois_port,
            whois_timeout_seconds: data.whois_timeout_seconds,
            max_whois_response_size: data.max_whois_response_size,
            stripe: StripeKeys {
                publishable_key: data.stripe_publishable_key,
                secret_key: data.stripe_secret_key,
                webhook_secret: data.stripe_webhook_secret,
            },
            results_per_search: data.results_per_search.clamp(1, MAX_RESULTS_PER_SEARCH),
            default_timeframe_months: data.default_timeframe_months.max(1),
            api_cache_ttl_seconds: data.api_cache_ttl_seconds,
            trending_cache_ttl_seconds: data.trending_cache_ttl_seconds,
            cache_max_entries: data.cache_max_entries,
            start_time: Instant::now(),
        }
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_seconds)
    }

    pub fn availability_api_timeout(&self) -> Duration {
        Duration::from_secs(self.availability_api_timeout_seconds)
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_secs(self.whois_timeout_seconds)
    }

    /// Tier 1 of the availability checker only runs with a key.
    pub fn domain_api_enabled(&self) -> bool {
        !self.domain_api_key.trim().is_empty()
    }

    fn apply_env_overrides(mut settings: config::ConfigBuilder<config::builder::DefaultState>) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let env_mappings = [
            ("PORT", "port"),
            ("HTTP_PORT", "port"),
            ("DATABASE_URL", "database_url"),
            ("OPENAI_API_KEY", "openai_api_key"),
            ("OPENAI_API_URL", "openai_api_url"),
            ("OPENAI_MODEL", "openai_model"),
            ("LLM_TIMEOUT_SECONDS", "llm_timeout_seconds"),
            ("DOMAIN_API_KEY", "domain_api_key"),
            ("DOMAIN_API_URL", "domain_api_url"),
            ("AVAILABILITY_API_TIMEOUT_SECONDS", "availability_api_timeout_seconds"),
            ("WHOIS_ENABLED", "whois_enabled"),
            ("WHOIS_PORT", "whois_port"),
            ("WHOIS_TIMEOUT_SECONDS", "whois_timeout_seconds"),
            ("WHOIS_TIMEOUT", "whois_timeout_seconds"),
            ("MAX_WHOIS_RESPONSE_SIZE", "max_whois_response_size"),
            ("STRIPE_PUBLISHABLE_KEY", "stripe_publishable_key"),
            ("STRIPE_SECRET_KEY", "stripe_secret_key"),
            ("STRIPE_WEBHOOK_SECRET", "stripe_webhook_secret"),
            ("RESULTS_PER_SEARCH", "results_per_search"),
            ("DEFAULT_TIMEFRAME_MONTHS", "default_timeframe_months"),
            ("API_CACHE_TTL_SECONDS", "api_cache_ttl_seconds"),
            ("TRENDING_CACHE_TTL_SECONDS", "trending_cache_ttl_seconds"),
            ("CACHE_MAX_ENTRIES", "cache_max_entries"),
            ("CACHE_SIZE", "cache_max_entries"),
        ];

        for (env_var, config_key) in env_mappings {
            if let Ok(value) = std::env::var(env_var) {
                settings = settings.set_override(config_key, value)?;
            }
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm_timeout(), Duration::from_secs(30));
        assert_eq!(config.availability_api_timeout(), Duration::from_secs(15));
        assert_eq!(config.whois_timeout(), Duration::from_secs(10));
        assert_eq!(config.whois_port, 43);
        assert_eq!(config.results_per_search, MAX_RESULTS_PER_SEARCH);
        assert!(!config.domain_api_enabled());
    }

    #[test]
    fn test_results_per_search_is_clamped() {
        let config = Config::from_data(ConfigData {
            results_per_search: 50,
            ..ConfigData::default()
        });
        assert_eq!(config.results_per_search, MAX_RESULTS_PER_SEARCH);

        let config = Config::from_data(ConfigData {
            results_per_search: 0,
            ..ConfigData::default()
        });
        assert_eq!(config.results_per_search, 1);
    }

    #[test]
    fn test_load_succeeds() {
        tokio_test::assert_ok!(Config::load());
    }
}
