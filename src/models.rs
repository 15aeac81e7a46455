// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an email was extracted. Stages run in this priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    MailtoLink,
    JsonPayload,
    RegexPlain,
    RegexObfuscated,
}

/// Confidence attached to an extracted email. Variant order gives the total
/// order low < medium < high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEmail {
    /// Normalized address: lowercased and trimmed.
    pub email: String,
    pub confidence: Confidence,
    pub extraction_method: ExtractionMethod,
    pub is_hr_contact: bool,
    pub source_url: String,
}

impl ExtractedEmail {
    pub fn local_part(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
    pub location: String,
    pub website: Option<String>,
    pub careers_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub hiring_roles: Vec<String>,
    pub emails: Vec<ExtractedEmail>,
    pub job_description: String,
    pub source_url: String,
    /// Names of the discovery sources that yielded this company.
    pub sources: Vec<String>,
    pub discovered_at: DateTime<Utc>,
}

impl Company {
    pub fn new(name: impl Into<String>, location: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            website: None,
            careers_url: None,
            linkedin_url: None,
            hiring_roles: Vec::new(),
            emails: Vec::new(),
            job_description: String::new(),
            source_url: source_url.into(),
            sources: Vec::new(),
            discovered_at: Utc::now(),
        }
    }

    /// A candidate with neither a name nor a website cannot be deduplicated
    /// or enriched and is dropped before it reaches the dedup map.
    pub fn has_identity(&self) -> bool {
        !self.name.trim().is_empty() || self.website.as_deref().is_some_and(|w| !w.trim().is_empty())
    }

    /// Add an email unless one with the same normalized address is already
    /// present. A higher-confidence duplicate replaces the existing entry.
    pub fn add_email(&mut self, email: ExtractedEmail) -> bool {
        if let Some(existing) = self.emails.iter_mut().find(|e| e.email == email.email) {
            if email.confidence > existing.confidence {
                *existing = email;
            }
            return false;
        }
        self.emails.push(email);
        true
    }

    /// Deterministic best-contact selection: highest confidence, then HR
    /// contacts, then shortest local-part (generic role addresses beat
    /// personal ones), then lexical order of the address.
    pub fn best_email(&self) -> Option<&ExtractedEmail> {
        self.emails.iter().min_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then(b.is_hr_contact.cmp(&a.is_hr_contact))
                .then(a.local_part().len().cmp(&b.local_part().len()))
                .then(a.email.cmp(&b.email))
        })
    }

    /// Merge another record for the same company into this one: role, source
    /// and email unions; earliest discovery time; non-empty scalar beats
    /// empty, first-seen wins otherwise.
    pub fn merge_with(&mut self, other: Company) {
        for role in other.hiring_roles {
            if !self.hiring_roles.contains(&role) {
                self.hiring_roles.push(role);
            }
        }
        for source in other.sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
        for email in other.emails {
            self.add_email(email);
        }
        if self.website.is_none() {
            self.website = other.website;
        }
        if self.careers_url.is_none() {
            self.careers_url = other.careers_url;
        }
        if self.linkedin_url.is_none() {
            self.linkedin_url = other.linkedin_url;
        }
        if self.name.trim().is_empty() {
            self.name = other.name;
        }
        if self.location.trim().is_empty() {
            self.location = other.location;
        }
        if self.job_description.is_empty() {
            self.job_description = other.job_description;
        }
        if other.discovered_at < self.discovered_at {
            self.discovered_at = other.discovered_at;
        }
    }
}

/// One unit of discovery work: a (location, role, source) combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTask {
    pub location: String,
    pub role: String,
    pub source: String,
}

impl std::fmt::Display for SearchTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} via {}", self.location, self.role, self.source)
    }
}
