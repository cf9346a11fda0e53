//! Curated market signals shown next to predictions.

use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::warn;

use crate::{cache::CacheService, config::Config};

const TRENDING_KEYWORDS_KEY: &str = "trending_keywords";
const MARKET_TRENDS_KEY: &str = "domain_market_trends";
const TLD_PERFORMANCE_KEY: &str = "tld_performance";

const TRENDING_KEYWORDS: [&str; 20] = [
    "crypto", "ai", "nft", "metaverse", "defi", "blockchain", "saas", "fintech", "ecommerce",
    "healthtech", "edtech", "sustainability", "remote", "virtual", "digital", "cloud", "security",
    "analytics", "automation", "streaming",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTrend {
    pub category: String,
    pub growth_rate: f64,
    pub popularity: String,
    pub trending_tlds: Vec<String>,
    pub trending_keywords: Vec<String>,
    pub avg_sale_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TldPerformance {
    pub tld: String,
    pub market_share: f64,
    pub avg_price: f64,
    pub growth_rate: f64,
    pub value_rating: f64,
}

pub struct MarketData {
    cache: Arc<CacheService>,
    ttl: Duration,
}

impl MarketData {
    pub fn new(config: &Config, cache: Arc<CacheService>) -> Self {
        Self {
            cache,
            ttl: Duration::from_secs(config.trending_cache_ttl_seconds),
        }
    }

    pub async fn trending_keywords(&self) -> Vec<String> {
        if let Some(keywords) = self.cache.get_json(TRENDING_KEYWORDS_KEY).await {
            return keywords;
        }

        let keywords: Vec<String> = TRENDING_KEYWORDS.iter().map(|k| k.to_string()).collect();
        self.store(TRENDING_KEYWORDS_KEY, &keywords).await;
        keywords
    }

    pub async fn market_trends(&self) -> Vec<MarketTrend> {
        if let Some(trends) = self.cache.get_json(MARKET_TRENDS_KEY).await {
            return trends;
        }

        let trends = curated_trends();
        self.store(MARKET_TRENDS_KEY, &trends).await;
        trends
    }

    pub async fn tld_performance(&self) -> Vec<TldPerformance> {
        if let Some(rows) = self.cache.get_json(TLD_PERFORMANCE_KEY).await {
            return rows;
        }

        let rows = curated_tld_performance();
        self.store(TLD_PERFORMANCE_KEY, &rows).await;
        rows
    }

    pub async fn clear(&self) {
        for key in [TRENDING_KEYWORDS_KEY, MARKET_TRENDS_KEY, TLD_PERFORMANCE_KEY] {
            self.cache.invalidate(key).await;
        }
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.cache.set_json(key, value, self.ttl).await {
            warn!("Could not cache {}: {}", key, e);
        }
    }
}

fn trend(
    category: &str,
    growth_rate: f64,
    popularity: &str,
    tlds: [&str; 3],
    keywords: [&str; 5],
    avg_sale_price: f64,
) -> MarketTrend {
    MarketTrend {
        category: category.to_string(),
        growth_rate,
        popularity: popularity.to_string(),
        trending_tlds: tlds.iter().map(|t| t.to_string()).collect(),
        trending_keywords: keywords.iter().map(|k| k.to_string()).collect(),
        avg_sale_price,
    }
}

fn curated_trends() -> Vec<MarketTrend> {
    vec![
        trend("Technology", 15.2, "High", [".ai", ".tech", ".io"], ["ai", "tech", "data", "cloud", "cyber"], 4250.0),
        trend("Finance", 12.8, "High", [".finance", ".bank", ".money"], ["crypto", "defi", "fintech", "pay", "wallet"], 5680.0),
        trend("Health", 10.5, "Medium", [".health", ".care", ".med"], ["health", "wellness", "medical", "care", "bio"], 3870.0),
        trend("E-commerce", 14.3, "High", [".shop", ".store", ".market"], ["shop", "buy", "store", "cart", "market"], 4120.0),
        trend(
            "Entertainment",
            9.7,
            "Medium",
            [".media", ".tv", ".stream"],
            ["stream", "play", "watch", "game", "entertainment"],
            3540.0,
        ),
    ]
}

fn curated_tld_performance() -> Vec<TldPerformance> {
    [
        (".com", 37.6, 12.99, 5.2, 4.8),
        (".net", 8.3, 12.99, 3.1, 4.2),
        (".org", 7.4, 12.99, 2.9, 4.0),
        (".io", 3.2, 39.99, 12.5, 4.7),
        (".ai", 2.1, 59.99, 24.7, 4.9),
        (".co", 4.5, 29.99, 8.3, 4.4),
        (".me", 2.7, 19.99, 6.8, 4.1),
        (".tech", 1.9, 49.99, 15.2, 4.5),
        (".app", 2.4, 14.99, 16.7, 4.6),
        (".dev", 1.8, 14.99, 17.3, 4.6),
    ]
    .into_iter()
    .map(|(tld, market_share, avg_price, growth_rate, value_rating)| TldPerformance {
        tld: tld.to_string(),
        market_share,
        avg_price,
        growth_rate,
        value_rating,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn market() -> (Arc<CacheService>, MarketData) {
        let config = Config::default();
        let cache = Arc::new(CacheService::new(&config));
        (cache.clone(), MarketData::new(&config, cache))
    }

    #[tokio::test]
    async fn test_curated_data() {
        let (_cache, market) = market();

        let keywords = market.trending_keywords().await;
        assert_eq!(keywords.len(), 20);
        assert_eq!(keywords[0], "crypto");

        let trends = market.market_trends().await;
        assert_eq!(trends.len(), 5);
        assert_eq!(trends[1].category, "Finance");

        let tlds = market.tld_performance().await;
        assert_eq!(tlds.len(), 10);
        assert_eq!(tlds[4].tld, ".ai");
    }

    #[tokio::test]
    async fn test_cached_value_is_served() {
        let (cache, market) = market();
        market.trending_keywords().await;

        cache
            .set(TRENDING_KEYWORDS_KEY, json!(["quantum"]), Duration::from_secs(60))
            .await;
        assert_eq!(market.trending_keywords().await, vec!["quantum".to_string()]);

        market.clear().await;
        assert_eq!(market.trending_keywords().await.len(), 20);
    }
}
