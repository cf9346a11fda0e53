use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Fallback price for TLDs missing from the price table.
pub const DEFAULT_TLD_PRICE: f64 = 14.99;

// Used for TLDs without a dedicated pattern.
pub static GENERIC_AVAILABLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)No match|not found|No Data Found|is available|is free|No Object Found")
        .expect("valid generic availability pattern")
});

// Port-43 servers for the TLDs we query directly
pub static WHOIS_SERVERS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();

    map.insert("com", "whois.verisign-grs.com");
    map.insert("net", "whois.verisign-grs.com");
    map.insert("org", "whois.pir.org");
    map.insert("info", "whois.afilias.net");
    map.insert("biz", "whois.neulevel.biz");
    map.insert("io", "whois.nic.io");
    map.insert("co", "whois.nic.co");
    map.insert("me", "whois.nic.me");
    map.insert("us", "whois.nic.us");
    map.insert("uk", "whois.nic.uk");
    map.insert("ca", "whois.cira.ca");
    map.insert("au", "whois.auda.org.au");
    map.insert("de", "whois.denic.de");
    map.insert("fr", "whois.nic.fr");
    map.insert("nl", "whois.domain-registry.nl");
    map.insert("ai", "whois.nic.ai");

    map
});

// What each registry prints when nobody holds the name
pub static AVAILABLE_PATTERNS: Lazy<HashMap<&'static str, Regex>> = Lazy::new(|| {
    let patterns = [
        ("com", r"No match for"),
        ("net", r"No match for"),
        ("org", r"NOT FOUND"),
        ("info", r"NOT FOUND"),
        ("biz", r"Not found:"),
        ("io", r"is available for purchase"),
        ("co", r"No Data Found"),
        ("me", r"NOT FOUND"),
        ("us", r"Not found:"),
        ("uk", r"No match for"),
        ("ca", r"Domain status:\s+available"),
        ("au", r"No Data Found"),
        ("de", r"Status:\s+free"),
        ("fr", r"No entries found"),
        ("nl", r"is free"),
        ("ai", r"No Object Found"),
    ];

    patterns
        .into_iter()
        .map(|(tld, pattern)| (tld, Regex::new(pattern).expect("valid availability pattern")))
        .collect()
});

// Registration base prices in USD
pub static TLD_PRICES: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    let mut map = HashMap::new();

    map.insert("com", 12.99);
    map.insert("net", 12.99);
    map.insert("org", 12.99);
    map.insert("info", 9.99);
    map.insert("biz", 9.99);
    map.insert("io", 39.99);
    map.insert("co", 29.99);
    map.insert("me", 19.99);
    map.insert("us", 9.99);
    map.insert("uk", 10.99);
    map.insert("ca", 13.99);
    map.insert("au", 17.99);
    map.insert("de", 15.99);
    map.insert("fr", 14.99);
    map.insert("nl", 14.99);
    map.insert("ai", 59.99);

    map
});

pub fn whois_server_for(tld: &str) -> Option<&'static str> {
    WHOIS_SERVERS.get(tld.to_lowercase().as_str()).copied()
}

/// Tests a raw WHOIS reply for the registry's "not registered" marker.
pub fn response_indicates_available(tld: &str, response: &str) -> bool {
    match AVAILABLE_PATTERNS.get(tld.to_lowercase().as_str()) {
        Some(pattern) => pattern.is_match(response),
        None => GENERIC_AVAILABLE_PATTERN.is_match(response),
    }
}

pub fn base_price_for(tld: &str) -> f64 {
    TLD_PRICES
        .get(tld.to_lowercase().as_str())
        .copied()
        .unwrap_or(DEFAULT_TLD_PRICE)
}
