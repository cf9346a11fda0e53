//! Rough resale and registration price heuristics.
//!
//! Both estimates mix fixed factors with a bounded random term.
//! The `_with` variants take the RNG so callers can seed them.

use rand::Rng;

use crate::models::DomainCandidate;
use crate::tld_mappings::base_price_for;

pub const MIN_BASE_VALUE: f64 = 20.0;
pub const MAX_BASE_VALUE: f64 = 200.0;

pub const PREMIUM_KEYWORDS: [&str; 15] = [
    "crypto", "nft", "bitcoin", "ai", "data", "tech", "cloud", "finance", "invest", "health",
    "medical", "travel", "luxury", "premium", "cyber",
];

pub fn estimate_potential_value(domain: &DomainCandidate) -> f64 {
    estimate_potential_value_with(domain, &mut rand::rng())
}

/// `base × length factor × keyword factor`, always within `[20, 750]`.
pub fn estimate_potential_value_with<R: Rng>(domain: &DomainCandidate, rng: &mut R) -> f64 {
    let name = domain.name();

    let length_factor = match name.len() {
        0..=5 => 2.5,
        6..=8 => 1.8,
        9..=12 => 1.2,
        _ => 1.0,
    };

    let keyword_factor = if PREMIUM_KEYWORDS.iter().any(|keyword| name.contains(keyword)) {
        1.5
    } else {
        1.0
    };

    let base_value = rng.random_range(MIN_BASE_VALUE..=MAX_BASE_VALUE);

    round_cents(base_value * length_factor * keyword_factor)
}

pub fn estimate_price(domain: &DomainCandidate) -> f64 {
    estimate_price_with(domain, &mut rand::rng())
}

/// Registration price guess for an available domain. Always positive.
pub fn estimate_price_with<R: Rng>(domain: &DomainCandidate, rng: &mut R) -> f64 {
    let name = domain.name();
    let base_price = base_price_for(domain.tld());

    let length_factor = match name.len() {
        0..=3 => 2.5,
        4..=5 => 1.5,
        6..=8 => 1.2,
        _ => 1.0,
    };

    let composition_factor = if name.chars().all(|c| c.is_ascii_alphabetic()) {
        1.2
    } else if name.chars().all(|c| c.is_ascii_alphanumeric()) {
        1.1
    } else {
        1.0
    };

    // Whole-percent jitter in [-10%, +10%]
    let jitter = 1.0 + f64::from(rng.random_range(-10i32..=10)) / 100.0;

    round_cents(base_price * length_factor * composition_factor * jitter)
}

pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
