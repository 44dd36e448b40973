//! Bulk archive source
//!
//! The exempt-code source publishes one zip archive per calendar year on a
//! public listing page; each archive holds a single spreadsheet payload.
//! This module scrapes the listing into a year → URL map, downloads an
//! archive and digs the payload rows out of it.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use calamine::{Data, Reader, Xlsx};
use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum SourceError {
    /// The listing page has no matching download link for a required year.
    #[error("No '{pattern}' download link for year {year}; available links: {available:?}")]
    NotFound {
        year: String,
        pattern: String,
        available: Vec<String>,
    },

    /// The archive downloaded fine but holds no matching spreadsheet.
    #[error("Archive for year {year} has no spreadsheet payload matching '{pattern}'")]
    PayloadMissing { year: String, pattern: String },

    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to read payload '{name}': {source}")]
    Payload {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// HTTP client for the listing page and archive downloads.
pub struct ArchiveClient {
    http: reqwest::Client,
    year_pattern: Regex,
}

impl ArchiveClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("medcode-crawler/0.3")
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create archive HTTP client")?;
        Ok(Self {
            http,
            year_pattern: Regex::new(r"\b(20\d{2})\b")?,
        })
    }

    /// Scrape the listing page into a map of year → absolute download URLs.
    pub async fn year_links(&self, listing_url: &str) -> Result<HashMap<String, Vec<String>>, SourceError> {
        let body = self
            .fetch_text(listing_url)
            .await
            .map_err(|source| SourceError::Fetch {
                url: listing_url.to_string(),
                source,
            })?;
        parse_year_links(&body, listing_url, &self.year_pattern).map_err(|source| {
            SourceError::Fetch {
                url: listing_url.to_string(),
                source,
            }
        })
    }

    /// Download an archive as raw bytes.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        info!("Downloading archive {url}");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SourceError::Fetch {
                url: url.to_string(),
                source: e.into(),
            })?;
        let bytes = response.bytes().await.map_err(|e| SourceError::Fetch {
            url: url.to_string(),
            source: e.into(),
        })?;
        Ok(bytes.to_vec())
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Request to {url} failed"))?;
        response.text().await.context("Failed to read response body")
    }
}

/// Group every download link on the listing page by the year mentioned in
/// its label or URL.
fn parse_year_links(
    html: &str,
    base_url: &str,
    year_pattern: &Regex,
) -> Result<HashMap<String, Vec<String>>> {
    let anchor = Selector::parse("a[href]").map_err(|e| anyhow!("Invalid selector: {e}"))?;
    let base = Url::parse(base_url).with_context(|| format!("Invalid base URL {base_url}"))?;

    let doc = Html::parse_document(html);
    let mut links: HashMap<String, Vec<String>> = HashMap::new();

    for a in doc.select(&anchor) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let label = a.text().collect::<Vec<_>>().join(" ");
        let year = year_pattern
            .captures(&label)
            .or_else(|| year_pattern.captures(href))
            .map(|caps| caps[1].to_string());
        let Some(year) = year else {
            continue;
        };
        let Ok(absolute) = base.join(href) else {
            debug!("Skipping unresolvable href '{href}'");
            continue;
        };
        links.entry(year).or_default().push(absolute.to_string());
    }

    Ok(links)
}

/// Pick the spreadsheet payload out of an archive's file list: it must
/// match the pattern and end in `.xlsx`; when several match, the shortest
/// name wins, which tends to skip variants qualified by an extra month
/// token. A heuristic, not a guarantee.
pub fn select_payload_name(names: &[String], pattern: &str) -> Option<String> {
    let pattern = pattern.to_lowercase();
    names
        .iter()
        .filter(|name| {
            let lower = name.to_lowercase();
            lower.contains(&pattern) && lower.ends_with(".xlsx")
        })
        .min_by_key(|name| name.len())
        .cloned()
}

/// Open an archive and parse its spreadsheet payload into rows of the
/// first three columns (header row skipped).
pub fn extract_payload_rows(
    archive_bytes: &[u8],
    payload_pattern: &str,
    year: &str,
) -> Result<Vec<[String; 3]>, SourceError> {
    let mut archive =
        ZipArchive::new(Cursor::new(archive_bytes)).map_err(|e| SourceError::Payload {
            name: format!("archive for {year}"),
            source: e.into(),
        })?;

    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let payload_name =
        select_payload_name(&names, payload_pattern).ok_or_else(|| SourceError::PayloadMissing {
            year: year.to_string(),
            pattern: payload_pattern.to_string(),
        })?;
    debug!("Archive holds {names:?}; reading '{payload_name}'");

    let mut payload = Vec::new();
    archive
        .by_name(&payload_name)
        .and_then(|mut file| {
            file.read_to_end(&mut payload)?;
            Ok(())
        })
        .map_err(|e| SourceError::Payload {
            name: payload_name.clone(),
            source: e.into(),
        })?;

    parse_spreadsheet(&payload).map_err(|source| SourceError::Payload {
        name: payload_name,
        source,
    })
}

fn parse_spreadsheet(bytes: &[u8]) -> Result<Vec<[String; 3]>> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).context("Payload is not a readable spreadsheet")?;
    let range = workbook
        .worksheet_range_at(0)
        .context("Payload has no worksheets")?
        .context("Failed to read first worksheet")?;

    let mut rows = Vec::new();
    for row in range.rows().skip(1) {
        let get = |i: usize| row.get(i).map(cell_to_string).unwrap_or_default();
        let parsed = [get(0), get(1), get(2)];
        if parsed.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        rows.push(parsed);
    }
    Ok(rows)
}

/// Spreadsheet cells arrive typed; order numbers in particular come back
/// as floats and must print as plain integers.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}
