// src/dedup.rs - stable-hash merge of Company records across sources
use std::collections::HashMap;
use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::models::Company;

/// Stable 16-hex-char content hash, independent of process or run.
pub fn stable_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut out = String::with_capacity(16);
    for byte in &digest[..8] {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Dedup key for a company: the normalized website domain when known,
/// otherwise normalized name plus location.
pub fn company_key(company: &Company) -> String {
    if let Some(domain) = company.website.as_deref().and_then(normalized_domain) {
        return stable_hash(&domain);
    }
    let content = format!(
        "{}:{}",
        normalize_name(&company.name),
        company.location.trim().to_lowercase()
    );
    stable_hash(&content)
}

pub fn email_key(address: &str) -> String {
    stable_hash(&address.trim().to_lowercase())
}

pub fn normalized_domain(website: &str) -> Option<String> {
    let parsed = Url::parse(website).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// True when `domain` is `base` itself or one of its subdomains. A bare
/// suffix check would also match lookalikes ("notacme.com" vs "acme.com").
pub fn domain_matches(domain: &str, base: &str) -> bool {
    domain == base
        || domain
            .strip_suffix(base)
            .is_some_and(|rest| rest.ends_with('.'))
}

const CORP_SUFFIXES: &[&str] = &[
    "gmbh", "inc", "ltd", "llc", "ag", "se", "ug", "co", "corp", "corporation",
    "pvt", "limited", "technologies", "labs",
];

/// Lowercase, strip corporate suffixes and punctuation, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|word| !CORP_SUFFIXES.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// New distinct company accepted under this key.
    Admitted(String),
    /// Collapsed into an already-admitted record.
    Merged(String),
    /// The distinct-company cap is reached; output discarded.
    CapReached,
}

#[derive(Default)]
struct DedupState {
    companies: HashMap<String, Company>,
    insertion_order: Vec<String>,
}

/// Merge map for Company records. All mutation is serialized through one
/// lock that also guards the admitted-company counter, so concurrent
/// enrichment tasks cannot lose updates or double-admit past the cap.
pub struct DedupEngine {
    state: Mutex<DedupState>,
    max_companies: usize,
}

impl DedupEngine {
    pub fn new(max_companies: usize) -> Self {
        Self {
            state: Mutex::new(DedupState::default()),
            max_companies,
        }
    }

    /// Admit a candidate from discovery. Duplicates collapse into the
    /// first-seen record; new candidates past the cap are discarded.
    pub async fn admit(&self, company: Company) -> Admission {
        let key = company_key(&company);
        let mut state = self.state.lock().await;

        if let Some(existing) = state.companies.get_mut(&key) {
            debug!(name = %company.name, %key, "merging duplicate candidate");
            existing.merge_with(company);
            return Admission::Merged(key);
        }

        if state.insertion_order.len() >= self.max_companies {
            return Admission::CapReached;
        }

        state.insertion_order.push(key.clone());
        state.companies.insert(key.clone(), company);
        Admission::Admitted(key)
    }

    /// Merge enrichment output back into an admitted record. Returns false
    /// if the key is unknown (the record was never admitted).
    pub async fn apply_enrichment(&self, key: &str, enriched: Company) -> bool {
        let mut state = self.state.lock().await;
        match state.companies.get_mut(key) {
            Some(existing) => {
                existing.merge_with(enriched);
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, key: &str) -> Option<Company> {
        self.state.lock().await.companies.get(key).cloned()
    }

    pub async fn count(&self) -> usize {
        self.state.lock().await.insertion_order.len()
    }

    /// Admitted companies in insertion order (first seen wins position).
    pub async fn snapshot(&self) -> Vec<Company> {
        let state = self.state.lock().await;
        state
            .insertion_order
            .iter()
            .filter_map(|key| state.companies.get(key).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, ExtractedEmail, ExtractionMethod};

    fn company(name: &str, location: &str, website: Option<&str>) -> Company {
        let mut c = Company::new(name, location, "https://src.example");
        c.website = website.map(String::from);
        c
    }

    #[test]
    fn stable_hash_is_stable() {
        assert_eq!(stable_hash("acme.com"), stable_hash("acme.com"));
        assert_ne!(stable_hash("acme.com"), stable_hash("acme.io"));
        assert_eq!(stable_hash("acme.com").len(), 16);
    }

    #[test]
    fn domain_key_ignores_www_and_path() {
        let a = company("Acme", "Berlin", Some("https://www.acme.com/jobs"));
        let b = company("Acme Inc", "Munich", Some("https://acme.com"));
        assert_eq!(company_key(&a), company_key(&b));
    }

    #[test]
    fn domain_matching_requires_label_boundary() {
        assert!(domain_matches("linkedin.com", "linkedin.com"));
        assert!(domain_matches("de.linkedin.com", "linkedin.com"));
        assert!(!domain_matches("notlinkedin.com", "linkedin.com"));
        assert!(!domain_matches("linkedin.com.evil.com", "linkedin.com"));
    }

    #[test]
    fn name_normalization_strips_suffixes() {
        assert_eq!(normalize_name("Acme GmbH"), "acme");
        assert_eq!(normalize_name("Acme, Inc."), "acme");
        assert_eq!(normalize_name("  Wide   Spaces Ltd "), "wide spaces");
    }

    #[test]
    fn fallback_key_uses_name_and_location() {
        let a = company("Acme Corp", "Berlin", None);
        let b = company("acme", "berlin", None);
        let c = company("acme", "munich", None);
        assert_eq!(company_key(&a), company_key(&b));
        assert_ne!(company_key(&a), company_key(&c));
    }

    #[tokio::test]
    async fn admit_merges_same_domain() {
        let engine = DedupEngine::new(10);

        let mut a = company("Acme", "Berlin", Some("https://acme.com"));
        a.hiring_roles.push("backend developer".into());
        let mut b = company("Acme GmbH", "Berlin", Some("https://www.acme.com"));
        b.hiring_roles.push("frontend developer".into());
        b.emails.push(ExtractedEmail {
            email: "jobs@acme.com".into(),
            confidence: Confidence::High,
            extraction_method: ExtractionMethod::MailtoLink,
            is_hr_contact: true,
            source_url: "https://acme.com".into(),
        });

        assert!(matches!(engine.admit(a).await, Admission::Admitted(_)));
        assert!(matches!(engine.admit(b).await, Admission::Merged(_)));

        let companies = engine.snapshot().await;
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].hiring_roles.len(), 2);
        assert_eq!(companies[0].emails.len(), 1);
        assert_eq!(companies[0].name, "Acme");
    }

    #[tokio::test]
    async fn cap_blocks_new_but_not_existing() {
        let engine = DedupEngine::new(2);
        assert!(matches!(
            engine.admit(company("A", "X", Some("https://a.com"))).await,
            Admission::Admitted(_)
        ));
        assert!(matches!(
            engine.admit(company("B", "X", Some("https://b.com"))).await,
            Admission::Admitted(_)
        ));
        assert_eq!(
            engine.admit(company("C", "X", Some("https://c.com"))).await,
            Admission::CapReached
        );
        assert_eq!(engine.count().await, 2);
    }

    #[tokio::test]
    async fn enrichment_merges_into_admitted_record() {
        let engine = DedupEngine::new(5);
        let key = match engine.admit(company("Acme", "Berlin", Some("https://acme.com"))).await {
            Admission::Admitted(key) => key,
            other => panic!("unexpected admission: {other:?}"),
        };

        let mut enriched = company("Acme", "Berlin", Some("https://acme.com"));
        enriched.careers_url = Some("https://acme.com/careers".into());
        assert!(engine.apply_enrichment(&key, enriched).await);
        assert!(!engine.apply_enrichment("ffffffffffffffff", company("X", "Y", None)).await);

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot[0].careers_url.as_deref(), Some("https://acme.com/careers"));
    }
}
