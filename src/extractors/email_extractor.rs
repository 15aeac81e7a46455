// src/extractors/email_extractor.rs
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::models::{Confidence, ExtractedEmail, ExtractionMethod};
use crate::parsers::ParsedPage;

/// Domains that only ever appear in documentation and form placeholders.
/// Matches are kept but downgraded to low confidence.
const PLACEHOLDER_DOMAINS: &[&str] = &[
    "example.com", "example.org", "example.net", "test.com", "testing.com",
    "email.com", "domain.com", "company.com", "yourcompany.com",
    "yourdomain.com", "mailinator.com", "sentry.io",
];

/// File-extension lookalikes (image scaling names such as logo@2x.png) and
/// asset "domains" that the plain regex happily matches.
const REJECTED_SUFFIXES: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico", ".js", ".css",
];

pub struct EmailExtractor {
    email_regex: Regex,
    json_email_regex: Regex,
    obfuscated_regexes: Vec<Regex>,
    hr_keywords: Vec<String>,
}

impl EmailExtractor {
    pub fn new(hr_keywords: &[String]) -> Self {
        Self {
            email_regex: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
                .unwrap(),
            json_email_regex: Regex::new(
                r#"(?i)"(?:email|mail|contact)"\s*:\s*"([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})""#,
            )
            .unwrap(),
            obfuscated_regexes: vec![
                // name [at] domain [dot] com, name (at) domain (dot) com
                Regex::new(
                    r"(?i)\b([A-Za-z0-9._%+-]+)\s*[\[(]\s*at\s*[\])]\s*([A-Za-z0-9.-]+)\s*[\[(]\s*dot\s*[\])]\s*([A-Za-z]{2,})\b",
                )
                .unwrap(),
                // name at domain dot com
                Regex::new(
                    r"(?i)\b([A-Za-z0-9._%+-]+)\s+at\s+([A-Za-z0-9.-]+)\s+dot\s+([A-Za-z]{2,})\b",
                )
                .unwrap(),
            ],
            hr_keywords: hr_keywords.to_vec(),
        }
    }

    /// Run all extraction stages over one parsed page, in fixed priority
    /// order, returning normalized, per-page-deduplicated candidates.
    /// Deterministic for a fixed page.
    pub fn extract(&self, page: &ParsedPage, source_url: &str) -> Vec<ExtractedEmail> {
        let mut found: Vec<ExtractedEmail> = Vec::new();

        // Stage 1: mailto links.
        for address in &page.mailto_hrefs {
            self.push_candidate(
                &mut found,
                address,
                Confidence::High,
                ExtractionMethod::MailtoLink,
                source_url,
            );
        }

        // Stage 2: structured payloads (JSON-LD blocks, embedded JSON).
        for payload in &page.json_ld {
            if let Ok(value) = serde_json::from_str::<Value>(payload) {
                let mut addresses = Vec::new();
                collect_json_emails(&value, &mut addresses);
                for address in addresses {
                    self.push_candidate(
                        &mut found,
                        &address,
                        Confidence::High,
                        ExtractionMethod::JsonPayload,
                        source_url,
                    );
                }
            }
        }
        for caps in self.json_email_regex.captures_iter(&page.raw_html) {
            if let Some(address) = caps.get(1) {
                self.push_candidate(
                    &mut found,
                    address.as_str(),
                    Confidence::High,
                    ExtractionMethod::JsonPayload,
                    source_url,
                );
            }
        }

        // Stage 3: plain pattern matches. Visible text scores medium,
        // script/style text scores low, placeholder domains score low.
        // The DOM parser decodes character entities, so an address whose "@"
        // was entity-encoded in the markup surfaces here too; those belong
        // to the obfuscated stage and score low.
        let raw_lower = page.raw_html.to_lowercase();
        for m in self.email_regex.find_iter(&page.text) {
            let address = m.as_str();
            if was_entity_encoded(&raw_lower, &address.to_lowercase()) {
                self.push_candidate(
                    &mut found,
                    address,
                    Confidence::Low,
                    ExtractionMethod::RegexObfuscated,
                    source_url,
                );
                continue;
            }
            let confidence = if is_placeholder_domain(address) {
                Confidence::Low
            } else {
                Confidence::Medium
            };
            self.push_candidate(
                &mut found,
                address,
                confidence,
                ExtractionMethod::RegexPlain,
                source_url,
            );
        }
        for m in self.email_regex.find_iter(&page.hidden_text) {
            self.push_candidate(
                &mut found,
                m.as_str(),
                Confidence::Low,
                ExtractionMethod::RegexPlain,
                source_url,
            );
        }

        // Stage 4: obfuscated forms, decoded then tagged low.
        for regex in &self.obfuscated_regexes {
            for caps in regex.captures_iter(&page.text) {
                let (Some(local), Some(domain), Some(tld)) =
                    (caps.get(1), caps.get(2), caps.get(3))
                else {
                    continue;
                };
                let address = format!("{}@{}.{}", local.as_str(), domain.as_str(), tld.as_str());
                self.push_candidate(
                    &mut found,
                    &address,
                    Confidence::Low,
                    ExtractionMethod::RegexObfuscated,
                    source_url,
                );
            }
        }
        let decoded = decode_entity_at(&page.raw_html);
        if decoded != page.raw_html {
            for m in self.email_regex.find_iter(&decoded) {
                self.push_candidate(
                    &mut found,
                    m.as_str(),
                    Confidence::Low,
                    ExtractionMethod::RegexObfuscated,
                    source_url,
                );
            }
        }

        debug!(count = found.len(), url = %source_url, "extracted email candidates");
        found
    }

    /// Normalize, validate, flag HR contacts, and merge into the per-page
    /// set. On a duplicate address the higher confidence wins; the earlier
    /// stage wins ties.
    fn push_candidate(
        &self,
        found: &mut Vec<ExtractedEmail>,
        address: &str,
        confidence: Confidence,
        method: ExtractionMethod,
        source_url: &str,
    ) {
        let address = address.trim().to_lowercase();
        if !is_valid_address(&address) {
            return;
        }
        if let Some(existing) = found.iter_mut().find(|e| e.email == address) {
            if confidence > existing.confidence {
                existing.confidence = confidence;
                existing.extraction_method = method;
            }
            return;
        }
        let is_hr_contact = self.is_hr_address(&address);
        found.push(ExtractedEmail {
            email: address,
            confidence,
            extraction_method: method,
            is_hr_contact,
            source_url: source_url.to_string(),
        });
    }

    fn is_hr_address(&self, address: &str) -> bool {
        let local = address.split('@').next().unwrap_or("");
        self.hr_keywords.iter().any(|kw| local.contains(kw.as_str()))
    }
}

/// The accepted grammar: one `@`, non-empty local part, dotted domain, and
/// none of the asset-file suffixes that email-shaped tokens pick up.
fn is_valid_address(address: &str) -> bool {
    if address.len() < 5 {
        return false;
    }
    let mut parts = address.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return false;
    }
    if REJECTED_SUFFIXES.iter().any(|suffix| domain.ends_with(suffix)) {
        return false;
    }
    if domain.ends_with(".local") {
        return false;
    }
    true
}

fn is_placeholder_domain(address: &str) -> bool {
    let domain = address
        .rsplit('@')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    PLACEHOLDER_DOMAINS
        .iter()
        .any(|p| domain == *p || domain.ends_with(&format!(".{p}")))
}

/// True when the markup spelled this address with an entity-encoded "@".
fn was_entity_encoded(raw_lower: &str, address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    ["&#64;", "&#064;", "&commat;"]
        .iter()
        .any(|entity| raw_lower.contains(&format!("{local}{entity}{domain}")))
}

/// Character-entity-encoded "@" used as a scraping countermeasure.
fn decode_entity_at(html: &str) -> String {
    if html.contains("&#64;") || html.contains("&#064;") || html.contains("&commat;") {
        html.replace("&#64;", "@")
            .replace("&#064;", "@")
            .replace("&commat;", "@")
    } else {
        html.to_string()
    }
}

fn collect_json_emails(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                if key.eq_ignore_ascii_case("email") {
                    if let Value::String(s) = val {
                        out.push(s.clone());
                    }
                }
                collect_json_emails(val, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_json_emails(item, out);
            }
        }
        _ => {}
    }
}
