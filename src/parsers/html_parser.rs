// src/parsers/html_parser.rs
use std::collections::HashSet;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Structured data extracted from one HTML page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: String,
    /// Whitespace-normalized visible text (script/style/noscript removed).
    pub text: String,
    /// Text that was inside script/style/noscript regions. Email matches
    /// found only here are non-visible and score lower.
    pub hidden_text: String,
    /// Absolute http(s) links, deduplicated, in document order.
    pub links: Vec<String>,
    /// Addresses taken from `mailto:` hrefs, query part stripped.
    pub mailto_hrefs: Vec<String>,
    /// Links whose path looks like a careers/jobs page.
    pub careers_links: Vec<String>,
    /// Raw contents of `application/ld+json` script blocks.
    pub json_ld: Vec<String>,
    pub raw_html: String,
}

/// Paths that mark a careers page; used both for classification here and for
/// crawl frontier filtering.
pub const CAREERS_PATHS: &[&str] = &[
    "/careers", "/career", "/jobs", "/job", "/openings", "/positions",
    "/open-positions", "/join", "/join-us", "/work-with-us", "/hiring",
    "/vacancies", "/vacancy", "/recruitment", "/apply", "/opportunities",
];

pub const CONTACT_PATHS: &[&str] = &[
    "/contact", "/contact-us", "/kontakt", "/get-in-touch", "/reach-us",
    "/reach-out", "/impressum", "/imprint", "/legal",
];

pub const ABOUT_PATHS: &[&str] = &[
    "/about", "/about-us", "/team", "/our-team", "/company", "/who-we-are",
    "/leadership", "/people",
];

pub fn is_careers_path(url: &str) -> bool {
    path_matches(url, CAREERS_PATHS)
}

pub fn is_contact_or_about_path(url: &str) -> bool {
    path_matches(url, CONTACT_PATHS) || path_matches(url, ABOUT_PATHS)
}

fn path_matches(url: &str, patterns: &[&str]) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    patterns.iter().any(|p| path.contains(p))
}

pub struct PageParser {
    script_regex: Regex,
    style_regex: Regex,
    noscript_regex: Regex,
}

impl Default for PageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PageParser {
    pub fn new() -> Self {
        Self {
            script_regex: Regex::new(r"(?is)<script\b[^>]*>(.*?)</script>").unwrap(),
            style_regex: Regex::new(r"(?is)<style\b[^>]*>(.*?)</style>").unwrap(),
            noscript_regex: Regex::new(r"(?is)<noscript\b[^>]*>(.*?)</noscript>").unwrap(),
        }
    }

    pub fn parse(&self, base_url: &str, html: &str) -> ParsedPage {
        let document = Html::parse_document(html);

        let title = self.extract_title(&document);
        let (links, mailto_hrefs) = self.extract_links(&document, base_url);
        let json_ld = self.extract_json_ld(&document);
        let careers_links = links
            .iter()
            .filter(|link| is_careers_path(link))
            .cloned()
            .collect();

        // Visible text comes from a re-parse of the markup with script/style
        // regions cut out; the cut-out contents become hidden_text.
        let mut hidden_text = String::new();
        for caps in self.script_regex.captures_iter(html) {
            hidden_text.push_str(caps.get(1).map_or("", |m| m.as_str()));
            hidden_text.push(' ');
        }
        for caps in self.style_regex.captures_iter(html) {
            hidden_text.push_str(caps.get(1).map_or("", |m| m.as_str()));
            hidden_text.push(' ');
        }
        for caps in self.noscript_regex.captures_iter(html) {
            hidden_text.push_str(caps.get(1).map_or("", |m| m.as_str()));
            hidden_text.push(' ');
        }
        let stripped = self.strip_hidden(html);
        let visible = Html::parse_document(&stripped);
        let text = normalize_whitespace(
            &visible.root_element().text().collect::<Vec<_>>().join(" "),
        );

        ParsedPage {
            title,
            text,
            hidden_text: normalize_whitespace(&hidden_text),
            links,
            mailto_hrefs,
            careers_links,
            json_ld,
            raw_html: html.to_string(),
        }
    }

    /// Visible-text length after stripping markup; the fetcher's
    /// content-richness heuristic for deciding to render.
    pub fn visible_text_len(&self, html: &str) -> usize {
        let stripped = self.strip_hidden(html);
        let document = Html::parse_document(&stripped);
        normalize_whitespace(&document.root_element().text().collect::<Vec<_>>().join(" ")).len()
    }

    fn strip_hidden(&self, html: &str) -> String {
        let without_scripts = self.script_regex.replace_all(html, " ");
        let without_styles = self.style_regex.replace_all(&without_scripts, " ");
        self.noscript_regex.replace_all(&without_styles, " ").into_owned()
    }

    fn extract_title(&self, document: &Html) -> String {
        let selector = Selector::parse("title").unwrap();
        document
            .select(&selector)
            .next()
            .map(|t| normalize_whitespace(&t.text().collect::<String>()))
            .unwrap_or_default()
    }

    fn extract_links(&self, document: &Html, base_url: &str) -> (Vec<String>, Vec<String>) {
        let selector = Selector::parse("a[href]").unwrap();
        let base = Url::parse(base_url).ok();

        let mut links = Vec::new();
        let mut mailtos = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = href.trim();

            if let Some(address) = href.strip_prefix("mailto:") {
                // Drop ?subject=... and friends.
                let address = address.split('?').next().unwrap_or("").trim().to_lowercase();
                if !address.is_empty() && seen.insert(format!("mailto:{address}")) {
                    mailtos.push(address);
                }
                continue;
            }
            if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("tel:") {
                continue;
            }

            let resolved = match Url::parse(href) {
                Ok(url) => Some(url),
                Err(_) => base.as_ref().and_then(|b| b.join(href).ok()),
            };
            if let Some(url) = resolved {
                if url.scheme() == "http" || url.scheme() == "https" {
                    let s = url.to_string();
                    if seen.insert(s.clone()) {
                        links.push(s);
                    }
                }
            }
        }

        (links, mailtos)
    }

    fn extract_json_ld(&self, document: &Html) -> Vec<String> {
        let selector = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
        document
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .filter(|payload| !payload.trim().is_empty())
            .collect()
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html>
      <head>
        <title> Acme — Careers </title>
        <style>.hidden { color: red; }</style>
        <script type="application/ld+json">{"@type":"Organization","email":"hello@acme.com"}</script>
      </head>
      <body>
        <script>var tracker = "ops@tracker.acme.com";</script>
        <p>We are hiring! Contact <a href="mailto:jobs@acme.com?subject=Hi">jobs</a>.</p>
        <a href="/careers">Careers</a>
        <a href="https://linkedin.com/company/acme">LinkedIn</a>
        <a href="#top">Top</a>
        <a href="javascript:void(0)">Noop</a>
      </body>
    </html>"##;

    #[test]
    fn extracts_mailto_and_strips_query() {
        let page = PageParser::new().parse("https://acme.com", PAGE);
        assert_eq!(page.mailto_hrefs, vec!["jobs@acme.com"]);
    }

    #[test]
    fn resolves_relative_links_and_skips_pseudo_links() {
        let page = PageParser::new().parse("https://acme.com", PAGE);
        assert!(page.links.contains(&"https://acme.com/careers".to_string()));
        assert!(page.links.contains(&"https://linkedin.com/company/acme".to_string()));
        assert!(!page.links.iter().any(|l| l.contains("javascript")));
        assert_eq!(page.careers_links, vec!["https://acme.com/careers".to_string()]);
    }

    #[test]
    fn script_text_is_hidden_not_visible() {
        let page = PageParser::new().parse("https://acme.com", PAGE);
        assert!(page.text.contains("We are hiring!"));
        assert!(!page.text.contains("ops@tracker.acme.com"));
        assert!(page.hidden_text.contains("ops@tracker.acme.com"));
    }

    #[test]
    fn noscript_text_is_hidden_not_visible() {
        let page = PageParser::new().parse(
            "https://acme.com",
            "<html><body><p>Hello.</p><noscript>Enable JS or mail fallback@acme.com</noscript></body></html>",
        );
        assert!(!page.text.contains("fallback@acme.com"));
        assert!(page.hidden_text.contains("fallback@acme.com"));
    }

    #[test]
    fn collects_json_ld_payloads() {
        let page = PageParser::new().parse("https://acme.com", PAGE);
        assert_eq!(page.json_ld.len(), 1);
        assert!(page.json_ld[0].contains("hello@acme.com"));
    }

    #[test]
    fn title_is_trimmed() {
        let page = PageParser::new().parse("https://acme.com", PAGE);
        assert_eq!(page.title, "Acme — Careers");
    }

    #[test]
    fn careers_path_classification() {
        assert!(is_careers_path("https://acme.com/careers"));
        assert!(is_careers_path("https://acme.com/join-us"));
        assert!(!is_careers_path("https://acme.com/blog"));
        assert!(is_contact_or_about_path("https://acme.com/about-us"));
    }
}
