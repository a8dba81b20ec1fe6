//! Rusprofile adapter. Implements RegistryLookup by scraping the public search page.
//!
//! The search page redirects to the company card; KPP sits in `span#clip_kpp`,
//! name and address in an inline `company: { ... }` script object.

use crate::domain::{CompanyData, DomainError};
use crate::ports::RegistryLookup;
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://www.rusprofile.ru";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; tg-bot/1.0)";

/// Registry lookup over HTTP with a bounded timeout.
pub struct RusprofileAdapter {
    client: Client,
    base_url: String,
}

impl RusprofileAdapter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DomainError::Registry(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, tax_id: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(format!("{}/search", self.base_url))
            .query(&[("query", tax_id.trim())])
            .send()
            .await?
            .text()
            .await
    }
}

#[async_trait::async_trait]
impl RegistryLookup for RusprofileAdapter {
    async fn lookup(&self, tax_id: &str) -> Result<CompanyData, DomainError> {
        let html = self
            .fetch(tax_id)
            .await
            .map_err(|e| DomainError::Registry(format!("ошибка запроса rusprofile: {}", e)))?;
        debug!(tax_id, bytes = html.len(), "registry page fetched");
        parse_company(&html)
    }
}

fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

fn kpp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(
        &RE,
        r#"(?s)<span[^>]*\bid\s*=\s*["']clip_kpp["'][^>]*>(.*?)</span>"#,
    )
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"company\s*:\s*\{[\s\S]*?name\s*:\s*'([^']*)'")
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"company\s*:\s*\{[\s\S]*?address\s*:\s*'([^']*)'")
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"<[^>]*>")
}

/// Decode the named and numeric entities that show up in company names.
pub fn unescape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                "laquo" => Some('«'),
                "raquo" => Some('»'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Extract KPP, name and address. Fails only when all three are missing.
pub fn parse_company(html: &str) -> Result<CompanyData, DomainError> {
    let kpp = kpp_re()
        .captures(html)
        .map(|c| unescape_html(tag_re().replace_all(&c[1], "").trim()))
        .unwrap_or_default();
    let name = name_re()
        .captures(html)
        .map(|c| unescape_html(c[1].trim()))
        .unwrap_or_default();
    let address = address_re()
        .captures(html)
        .map(|c| unescape_html(c[1].trim()))
        .unwrap_or_default();

    if kpp.is_empty() && name.is_empty() && address.is_empty() {
        return Err(DomainError::Registry(
            "данные не найдены (возможно изменился HTML)".into(),
        ));
    }
    Ok(CompanyData { kpp, name, address })
}
