//! Disposable/free/role classification and typo suggestions.
//!
//! Disposable detection runs through a Bloom filter built from an embedded
//! list so that a per-address check is O(1) with a bounded false-positive
//! rate. Free-provider domains and role-account local parts are exact set
//! lookups. Typo suggestions compare the second-level domain against major
//! providers by Levenshtein distance.

use std::collections::HashSet;

use fastbloom::BloomFilter;
use textdistance::str::levenshtein;
use tracing::debug;

use crate::{Classification, Syntax};

const DISPOSABLE_LIST: &str = include_str!("../assets/disposable_domains.txt");
const FREE_LIST: &str = include_str!("../assets/free_domains.txt");
const ROLE_LIST: &str = include_str!("../assets/role_accounts.txt");

/// False-positive rate for the disposable-domain Bloom filter.
const BLOOM_FP_RATE: f64 = 0.0001;

/// Classifies domains and local parts against embedded provider lists.
pub struct DomainClassifier {
    disposable: BloomFilter,
    disposable_count: usize,
    free: HashSet<String>,
    roles: HashSet<String>,
    providers: HashSet<String>,
}

impl DomainClassifier {
    pub fn new() -> Self {
        let disposable_domains: Vec<String> = parse_list(DISPOSABLE_LIST);
        let disposable_count = disposable_domains.len();
        let disposable = BloomFilter::with_false_pos(BLOOM_FP_RATE).items(disposable_domains);

        let free: HashSet<String> = parse_list(FREE_LIST).into_iter().collect();
        let roles: HashSet<String> = parse_list(ROLE_LIST).into_iter().collect();
        let providers = default_providers();

        debug!(
            disposable = disposable_count,
            free = free.len(),
            roles = roles.len(),
            "domain classifier initialized"
        );

        Self {
            disposable,
            disposable_count,
            free,
            roles,
            providers,
        }
    }

    /// Whether the domain is likely a disposable provider.
    ///
    /// May report false positives at the configured Bloom rate; never
    /// reports a listed domain as clean.
    pub fn is_disposable(&self, domain: &str) -> bool {
        self.disposable.contains(&domain.to_lowercase())
    }

    /// Whether the domain belongs to a free email provider.
    pub fn is_free(&self, domain: &str) -> bool {
        self.free.contains(&domain.to_lowercase())
    }

    /// Whether the local part is a role account (info, sales, postmaster, ...).
    pub fn is_role(&self, username: &str) -> bool {
        self.roles.contains(&username.to_lowercase())
    }

    /// Suggest a corrected domain when it looks like a typo of a major
    /// provider. Exact provider matches return `None`.
    pub fn suggest(&self, domain: &str) -> Option<String> {
        let domain = domain.to_lowercase();
        let (sld, tld) = domain.split_once('.')?;

        if self.providers.contains(sld) {
            return None;
        }

        for provider in &self.providers {
            let distance = levenshtein(sld, provider);
            let is_typo = if provider.len() <= 6 {
                distance == 1
            } else {
                (1..=2).contains(&distance)
            };
            if is_typo {
                let suggestion = format!("{provider}.{tld}");
                debug!(domain = %domain, suggestion = %suggestion, "typo suggestion");
                return Some(suggestion);
            }
        }

        None
    }

    /// Full classification of a parsed address.
    pub fn classify(&self, syntax: &Syntax) -> Classification {
        Classification {
            disposable: self.is_disposable(&syntax.domain),
            free: self.is_free(&syntax.domain),
            role_account: self.is_role(&syntax.username),
            suggestion: self.suggest(&syntax.domain),
        }
    }

    /// Number of disposable domains loaded into the filter.
    pub fn disposable_count(&self) -> usize {
        self.disposable_count
    }
}

impl Default for DomainClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect()
}

/// Second-level domains of major providers used for typo suggestions.
fn default_providers() -> HashSet<String> {
    [
        "gmail",
        "googlemail",
        "outlook",
        "hotmail",
        "live",
        "msn",
        "yahoo",
        "ymail",
        "icloud",
        "aol",
        "protonmail",
        "proton",
        "fastmail",
        "zoho",
        "yandex",
        "gmx",
        "mail",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
