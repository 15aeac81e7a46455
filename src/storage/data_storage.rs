// src/storage/data_storage.rs
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Company;

const CSV_HEADER: &[&str] = &[
    "company_name",
    "location",
    "website",
    "careers_url",
    "linkedin_url",
    "hiring_roles",
    "best_email",
    "best_email_confidence",
    "all_emails",
    "job_description",
    "source_url",
    "discovered_at",
];

const JOB_DESCRIPTION_CSV_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct OutputFiles {
    pub csv: PathBuf,
    pub json: PathBuf,
}

#[derive(Debug, Serialize)]
struct RunMetadata {
    created_at: String,
    location: String,
    total_companies: usize,
    total_emails: usize,
}

#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    metadata: RunMetadata,
    companies: &'a [Company],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    filename: String,
    format: String,
    record_count: usize,
    location: String,
    created_at: String,
    checksum: String,
    run_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    entries: Vec<ManifestEntry>,
}

/// Writes each run's contact list as a timestamped CSV and JSON pair and
/// appends both files to a manifest in the output directory.
pub struct DataStorage {
    output_dir: PathBuf,
    pretty_json: bool,
}

impl DataStorage {
    pub fn new(output_dir: impl Into<PathBuf>, pretty_json: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            pretty_json,
        }
    }

    pub async fn persist(&self, companies: &[Company], location: &str) -> Result<OutputFiles> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let slug = slugify(location);
        let base = format!("contacts_{slug}_{timestamp}");
        let csv_path = self.output_dir.join(format!("{base}.csv"));
        let json_path = self.output_dir.join(format!("{base}.json"));

        let csv_body = render_csv(companies);
        tokio::fs::write(&csv_path, &csv_body).await?;

        let json_body = self.render_json(companies, location)?;
        tokio::fs::write(&json_path, &json_body).await?;

        let run_id = Uuid::new_v4().to_string();
        self.append_manifest(&[
            manifest_entry(&csv_path, "csv", companies.len(), location, &csv_body, &run_id),
            manifest_entry(&json_path, "json", companies.len(), location, &json_body, &run_id),
        ])
        .await?;

        info!(
            csv = %csv_path.display(),
            json = %json_path.display(),
            companies = companies.len(),
            "results written"
        );
        Ok(OutputFiles {
            csv: csv_path,
            json: json_path,
        })
    }

    fn render_json(&self, companies: &[Company], location: &str) -> Result<String> {
        let output = JsonOutput {
            metadata: RunMetadata {
                created_at: Utc::now().to_rfc3339(),
                location: location.to_string(),
                total_companies: companies.len(),
                total_emails: companies.iter().map(|c| c.emails.len()).sum(),
            },
            companies,
        };
        let body = if self.pretty_json {
            serde_json::to_string_pretty(&output)?
        } else {
            serde_json::to_string(&output)?
        };
        Ok(body)
    }

    /// Load-append-rewrite of manifest.json. A corrupt manifest is replaced
    /// rather than failing the run.
    async fn append_manifest(&self, new_entries: &[ManifestEntry]) -> Result<()> {
        let path = self.output_dir.join("manifest.json");
        let mut manifest = match tokio::fs::read_to_string(&path).await {
            Ok(body) => serde_json::from_str::<Manifest>(&body).unwrap_or_else(|err| {
                warn!(error = %err, "manifest.json is corrupt, starting a fresh one");
                Manifest::default()
            }),
            Err(_) => Manifest::default(),
        };
        manifest.entries.extend(new_entries.iter().cloned());
        tokio::fs::write(&path, serde_json::to_string_pretty(&manifest)?).await?;
        Ok(())
    }
}

fn manifest_entry(
    path: &Path,
    format: &str,
    record_count: usize,
    location: &str,
    body: &str,
    run_id: &str,
) -> ManifestEntry {
    ManifestEntry {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        format: format.to_string(),
        record_count,
        location: location.to_string(),
        created_at: Utc::now().to_rfc3339(),
        checksum: sha256_hex(body),
        run_id: run_id.to_string(),
    }
}

fn render_csv(companies: &[Company]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", CSV_HEADER.join(","));
    for company in companies {
        let best = company.best_email();
        let row = [
            company.name.clone(),
            company.location.clone(),
            company.website.clone().unwrap_or_default(),
            company.careers_url.clone().unwrap_or_default(),
            company.linkedin_url.clone().unwrap_or_default(),
            company.hiring_roles.join("; "),
            best.map(|e| e.email.clone()).unwrap_or_default(),
            best.map(|e| e.confidence.as_str().to_string()).unwrap_or_default(),
            company
                .emails
                .iter()
                .map(|e| e.email.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            company
                .job_description
                .chars()
                .take(JOB_DESCRIPTION_CSV_LIMIT)
                .collect(),
            company.source_url.clone(),
            company.discovered_at.to_rfc3339(),
        ];
        let _ = writeln!(
            out,
            "{}",
            row.iter().map(|field| csv_escape(field)).collect::<Vec<_>>().join(",")
        );
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn slugify(value: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in value.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn sha256_hex(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, ExtractedEmail, ExtractionMethod};

    fn sample_companies() -> Vec<Company> {
        let mut a = Company::new("Acme, Inc", "Berlin", "https://search.example/a");
        a.website = Some("https://acme.com".into());
        a.hiring_roles.push("backend developer".into());
        a.add_email(ExtractedEmail {
            email: "jobs@acme.com".into(),
            confidence: Confidence::High,
            extraction_method: ExtractionMethod::MailtoLink,
            is_hr_contact: true,
            source_url: "https://acme.com/careers".into(),
        });
        a.add_email(ExtractedEmail {
            email: "info@acme.com".into(),
            confidence: Confidence::Medium,
            extraction_method: ExtractionMethod::RegexPlain,
            is_hr_contact: false,
            source_url: "https://acme.com".into(),
        });

        let b = Company::new("Beta", "Berlin", "https://search.example/b");
        vec![a, b]
    }

    fn temp_output_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hirecrawl-storage-{tag}-{}", Uuid::new_v4()))
    }

    #[test]
    fn csv_escaping_quotes_commas_and_quotes() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn slugify_collapses_non_alphanumerics() {
        assert_eq!(slugify("Berlin"), "berlin");
        assert_eq!(slugify("San Francisco, CA"), "san-francisco-ca");
    }

    #[test]
    fn csv_has_fixed_column_order_and_best_email() {
        let body = render_csv(&sample_companies());
        let mut lines = body.lines();
        assert_eq!(
            lines.next().unwrap(),
            "company_name,location,website,careers_url,linkedin_url,hiring_roles,best_email,best_email_confidence,all_emails,job_description,source_url,discovered_at"
        );
        let first = lines.next().unwrap();
        assert!(first.starts_with("\"Acme, Inc\",Berlin,https://acme.com"));
        assert!(first.contains("jobs@acme.com,high"));
        assert!(first.contains("jobs@acme.com; info@acme.com"));
        // Second company has no emails: empty best-email columns.
        let second = lines.next().unwrap();
        assert!(second.starts_with("Beta,Berlin,,,,"));
    }

    #[tokio::test]
    async fn persist_writes_csv_json_and_manifest() {
        let dir = temp_output_dir("persist");
        let storage = DataStorage::new(&dir, true);
        let files = storage.persist(&sample_companies(), "Berlin").await.unwrap();

        let csv = tokio::fs::read_to_string(&files.csv).await.unwrap();
        assert_eq!(csv.lines().count(), 3);

        let json: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&files.json).await.unwrap()).unwrap();
        assert_eq!(json["metadata"]["total_companies"], 2);
        assert_eq!(json["metadata"]["total_emails"], 2);
        assert_eq!(json["metadata"]["location"], "Berlin");
        assert_eq!(json["companies"].as_array().unwrap().len(), 2);
        assert_eq!(json["companies"][0]["emails"][0]["confidence"], "high");

        let manifest: Manifest = serde_json::from_str(
            &tokio::fs::read_to_string(dir.join("manifest.json")).await.unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[0].format, "csv");
        assert_eq!(manifest.entries[0].record_count, 2);
        assert_eq!(manifest.entries[0].checksum.len(), 64);
        assert_eq!(manifest.entries[0].run_id, manifest.entries[1].run_id);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn manifest_accumulates_across_runs() {
        let dir = temp_output_dir("manifest");
        let storage = DataStorage::new(&dir, false);
        storage.persist(&sample_companies(), "Berlin").await.unwrap();
        storage.persist(&sample_companies(), "Munich").await.unwrap();

        let manifest: Manifest = serde_json::from_str(
            &tokio::fs::read_to_string(dir.join("manifest.json")).await.unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.entries.len(), 4);
        assert_ne!(manifest.entries[0].run_id, manifest.entries[2].run_id);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn corrupt_manifest_is_replaced() {
        let dir = temp_output_dir("corrupt");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("manifest.json"), "not json").await.unwrap();

        let storage = DataStorage::new(&dir, false);
        storage.persist(&sample_companies(), "Berlin").await.unwrap();

        let manifest: Manifest = serde_json::from_str(
            &tokio::fs::read_to_string(dir.join("manifest.json")).await.unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.entries.len(), 2);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
