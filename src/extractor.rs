//! Pulls domain candidates out of free-form completion text.
//!
//! The primary pass scans for full domain names that start a word, so trailing text such
//! as a URL path, a possessive or a dash does not hide them. Only when that finds nothing
//! does the fallback pass turn plain words into `.com` candidates.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

use crate::config::MAX_RESULTS_PER_SEARCH;
use crate::models::DomainCandidate;

const FALLBACK_TLD: &str = "com";
const MIN_WORD_LENGTH: usize = 3;
const MAX_WORD_LENGTH: usize = 20;

// A domain must follow whitespace, line start or an opening quote, bracket or emphasis
// mark. Anything else glued to the front (`_`, `$`, `/`, `.`) disqualifies it.
static DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)(?:^|[\s("'*\[,])([a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*\.[a-zA-Z]{2,63})\b"#,
    )
    .expect("valid domain regex")
});

static WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-zA-Z0-9][a-zA-Z0-9-]{1,61}[a-zA-Z0-9]\b").expect("valid word regex")
});

/// Extracts at most ten unique candidates, in first-seen order.
pub fn extract(text: &str) -> Vec<DomainCandidate> {
    extract_with_limit(text, MAX_RESULTS_PER_SEARCH)
}

pub fn extract_with_limit(text: &str, limit: usize) -> Vec<DomainCandidate> {
    let limit = limit.min(MAX_RESULTS_PER_SEARCH);

    let domains = collect_unique(domain_matches(text).filter_map(DomainCandidate::parse), limit);
    if !domains.is_empty() {
        debug!("Extracted {} domains from completion", domains.len());
        return domains;
    }

    let fallback = collect_unique(WORD.find_iter(text).filter_map(|m| word_candidate(m.as_str())), limit);
    debug!("No full domains in completion, fallback produced {}", fallback.len());
    fallback
}

fn domain_matches(text: &str) -> impl Iterator<Item = &str> {
    DOMAIN
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str())
}

fn word_candidate(token: &str) -> Option<DomainCandidate> {
    let word = token.to_lowercase();

    if word.len() < MIN_WORD_LENGTH || word.len() > MAX_WORD_LENGTH {
        return None;
    }
    if word.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    DomainCandidate::parse(&format!("{}.{}", word, FALLBACK_TLD))
}

fn collect_unique(candidates: impl Iterator<Item = DomainCandidate>, limit: usize) -> Vec<DomainCandidate> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for candidate in candidates {
        if unique.len() >= limit {
            break;
        }
        if seen.insert(candidate.as_str().to_string()) {
            unique.push(candidate);
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(domains: &[DomainCandidate]) -> Vec<&str> {
        domains.iter().map(DomainCandidate::as_str).collect()
    }

    #[test]
    fn test_extracts_in_order() {
        let domains = extract("techcloud.ai is great. aicorp.com also strong.");
        assert_eq!(names(&domains), vec!["techcloud.ai", "aicorp.com"]);
    }

    #[test]
    fn test_markdown_list_and_case_insensitive_dedup() {
        let text = "1. **TechCloud.ai** - short and brandable\n\
                    2. \"AICorp.com\": enterprise feel\n\
                    3. (techcloud.AI) again, plus datavault.io.";
        let domains = extract(text);
        assert_eq!(names(&domains), vec!["techcloud.ai", "aicorp.com", "datavault.io"]);
    }

    #[test]
    fn test_rejects_embedded_punctuation() {
        let domains = extract("foo_bar.com and shop$now.io and https://site.com/path but good-name.net");
        assert_eq!(names(&domains), vec!["good-name.net"]);
    }

    #[test]
    fn test_domain_followed_by_path_or_possessive() {
        let domains = extract("See aicorp.com/pricing for details. TechCloud.ai's name is strong.");
        assert_eq!(names(&domains), vec!["aicorp.com", "techcloud.ai"]);
    }

    #[test]
    fn test_domain_followed_by_dash() {
        let domains = extract("Top pick: techcloud.ai\u{2014}short and brandable");
        assert_eq!(names(&domains), vec!["techcloud.ai"]);

        let domains = extract("datavault.io-based storage, comma-led,aicorp.com");
        assert_eq!(names(&domains), vec!["datavault.io", "aicorp.com"]);
    }

    #[test]
    fn test_caps_at_ten() {
        let text = (0..25).map(|i| format!("brand{}.com", i)).collect::<Vec<_>>().join(" ");
        let domains = extract(&text);
        assert_eq!(domains.len(), 10);
        assert_eq!(domains[0].as_str(), "brand0.com");
        assert_eq!(domains[9].as_str(), "brand9.com");
    }

    #[test]
    fn test_fallback_appends_com() {
        let domains = extract("Consider PetPal's charm or the word 12345, maybe go with pawsome!");
        let names = names(&domains);
        assert_eq!(names[0], "consider.com");
        assert!(names.contains(&"petpal.com"));
        assert!(names.contains(&"pawsome.com"));
        assert!(!names.contains(&"12345.com"));
        assert!(!names.contains(&"or.com"));
        assert!(!names.contains(&"s.com"));
        assert!(names.iter().all(|n| n.ends_with(".com")));
    }

    #[test]
    fn test_fallback_is_skipped_when_primary_matches() {
        let domains = extract("Try petpal.io today");
        assert_eq!(names(&domains), vec!["petpal.io"]);
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let text = "brandable words like zenith nimbus quantum";
        assert_eq!(extract(text), extract(text));
    }

    #[test]
    fn test_nothing_usable_yields_empty() {
        assert!(extract("").is_empty());
        assert!(extract("a an to 42 7 ?? !! -- 1234567").is_empty());
        assert!(extract(&"x".repeat(40)).is_empty());
    }

    #[test]
    fn test_every_candidate_matches_grammar() {
        let text = "Ideas: cloud-nine.io, -bad-.com, ok.c, x.yz, 9lives.pet, über.com, a..b.com";
        for domain in extract(text) {
            assert!(DomainCandidate::parse(domain.as_str()).is_some());
        }
    }

    #[test]
    fn test_limit_is_respected() {
        let domains = extract_with_limit("a1.com b2.com c3.com d4.com", 2);
        assert_eq!(names(&domains), vec!["a1.com", "b2.com"]);
    }
}
