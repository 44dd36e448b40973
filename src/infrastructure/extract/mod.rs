//! Detail page extraction
//!
//! The record assembler drives one authenticated session through a code's
//! detail page: classify the page first (404 / deleted index / tombstone /
//! regular detail), read the static fields from the initial render, then
//! walk the lazily loaded tabs. Individual extractors answer `None` for
//! missing structure; only failing to reach the page at all aborts an item.

pub mod fields;
pub mod markers;
pub mod selectors;
pub mod tabs;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html};
use tracing::{info, warn};

use crate::domain::{CodeSystem, ExtractionResult, ModifierRow, ProcedureRecord, TombstoneRecord};
use crate::infrastructure::session::BrowserSession;
use selectors::{Patterns, Selectors};

/// Element text with collapsed whitespace.
pub(crate) fn normalized_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Source of extraction outcomes for worklist codes. The batch driver only
/// knows this seam, which keeps it testable without a live browser.
#[async_trait]
pub trait RecordSource {
    async fn extract(&self, code: &str) -> Result<ExtractionResult>;
}

/// What a freshly loaded detail page turned out to be.
enum PageClass {
    NotFound,
    DeletedIndex,
    Tombstone(TombstoneRecord),
    Detail(StaticFields),
}

/// Fields readable from the initial render, before any tab is touched.
struct StaticFields {
    main_interval: Option<String>,
    main_interval_name: Option<Vec<String>>,
    short_description: Option<String>,
    long_description: Option<String>,
    modifier_rows: Vec<ModifierRow>,
    modifier_codes: Vec<String>,
}

fn classify_page(html: &str, system: CodeSystem, sel: &Selectors, patterns: &Patterns) -> PageClass {
    let doc = Html::parse_document(html);

    if markers::is_error_404(&doc, sel) {
        return PageClass::NotFound;
    }
    if markers::is_deleted_index(&doc, sel) {
        return PageClass::DeletedIndex;
    }
    if let Some(tombstone) = markers::detect_tombstone(&doc, sel, patterns) {
        return PageClass::Tombstone(tombstone);
    }

    let (modifier_rows, modifier_codes) = fields::modifier_rows(&doc, sel);
    PageClass::Detail(StaticFields {
        main_interval: fields::main_interval(&doc, sel, patterns, system),
        main_interval_name: fields::main_interval_name(&doc, sel),
        short_description: fields::short_description(&doc, sel),
        long_description: fields::long_description(&doc, sel),
        modifier_rows,
        modifier_codes,
    })
}

/// Record assembler over one live catalog session.
pub struct CatalogScraper {
    session: BrowserSession,
    base_url: String,
    selectors: Selectors,
    patterns: Patterns,
}

impl CatalogScraper {
    pub fn new(session: BrowserSession, base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            session,
            base_url: base_url.into(),
            selectors: Selectors::new()?,
            patterns: Patterns::new()?,
        })
    }

    pub fn session(&self) -> &BrowserSession {
        &self.session
    }

    /// Tear down the underlying browser.
    pub async fn shutdown(self) {
        self.session.close().await;
    }
}

#[async_trait]
impl RecordSource for CatalogScraper {
    async fn extract(&self, code: &str) -> Result<ExtractionResult> {
        let code = code.trim();
        let url = format!("{}{}", self.base_url, code);
        info!("Extracting procedure code: {url}");

        self.session
            .navigate(&url)
            .await
            .with_context(|| format!("Access error for {url}"))?;

        let current_url = self.session.current_url().await?;
        // One detail layout serves two code systems; the URL tells them apart.
        let system = if current_url.to_lowercase().contains("cpt") {
            CodeSystem::Cpt
        } else {
            CodeSystem::Hcpcs
        };

        let html = self.session.page_html().await?;
        let statics = match classify_page(&html, system, &self.selectors, &self.patterns) {
            PageClass::NotFound => {
                warn!("Code {code} resolved to the 404 page; skipping");
                return Ok(ExtractionResult::NotFound);
            }
            PageClass::DeletedIndex => {
                info!("Code {code} resolved to the generic deleted-codes page; skipping");
                return Ok(ExtractionResult::NotFound);
            }
            PageClass::Tombstone(record) => {
                info!("Code {code} is deleted; keeping its tombstone record");
                return Ok(ExtractionResult::Tombstone { system, record });
            }
            PageClass::Detail(statics) => statics,
        };

        let (betos_code, betos_description) = tabs::betos(&self.session, &self.selectors).await;
        let guidelines = tabs::guidelines(&self.session, &self.selectors).await;
        let advice = tabs::advice(&self.session, &self.selectors).await;
        let (summary, lay_term) = tabs::lay_term(&self.session, &self.selectors).await;
        let report = tabs::report(&self.session, &self.selectors).await;
        let revenue_lookup = tabs::revenue_lookup(&self.session, &self.selectors).await;
        let icd10_cm = tabs::icd10_cm(&self.session, &self.selectors).await;
        let (ndc_alternate_id, ndc_entries) = tabs::ndc(&self.session, &self.selectors).await;
        let icd_10_pcs_x = tabs::icd_10_pcs(&self.session, &self.selectors).await;

        // Symbols and the official descriptor read the page as the tab walk
        // left it.
        let symbols_html = self.session.page_html().await?;
        let cpt_code_symbols = {
            let doc = Html::parse_document(&symbols_html);
            fields::code_symbols(&doc, &self.selectors, &current_url)
        };
        let description = tabs::official_descriptor(&self.session, &self.selectors).await;

        let record = ProcedureRecord {
            code: code.to_string(),
            code_type: system.as_str().to_string(),
            main_interval: statics.main_interval,
            main_interval_name: statics.main_interval_name,
            modifiers: (!statics.modifier_codes.is_empty()).then_some(statics.modifier_codes),
            short_description: statics.short_description,
            long_description: statics.long_description,
            description,
            summary,
            date_deleted: None,
            betos_code,
            betos_description,
            guidelines,
            advice,
            lay_term,
            report,
            revenue_lookup,
            icd10_cm,
            ndc_alternate_id,
            icd_10_pcs_x,
            cpt_code_symbols,
        };

        Ok(ExtractionResult::Full {
            record: Box::new(record),
            modifiers: statics.modifier_rows,
            ndc_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(html: &str, system: CodeSystem) -> PageClass {
        let sel = Selectors::new().unwrap();
        let patterns = Patterns::new().unwrap();
        classify_page(html, system, &sel, &patterns)
    }

    #[test]
    fn test_classify_404_before_anything_else() {
        let html = r#"<div class="container404"></div><span>Deleted</span>"#;
        assert!(matches!(
            classify(html, CodeSystem::Cpt),
            PageClass::NotFound
        ));
    }

    #[test]
    fn test_classify_deleted_index() {
        let html = "<h1>Deleted HCPCS Codes</h1>";
        assert!(matches!(
            classify(html, CodeSystem::Hcpcs),
            PageClass::DeletedIndex
        ));
    }

    #[test]
    fn test_classify_tombstone_over_detail() {
        let html = r#"
            <span>Deleted</span>
            <div class="alert alert-danger">Deleted effective 01/01/2024</div>
            <div class="modcross_list"><table><tbody>
                <tr><td>25</td><td>should not be read</td></tr>
            </tbody></table></div>
        "#;
        match classify(html, CodeSystem::Hcpcs) {
            PageClass::Tombstone(record) => {
                assert!(record.date_deleted.is_some());
            }
            _ => panic!("expected tombstone"),
        }
    }

    #[test]
    fn test_classify_detail_collects_static_fields() {
        let html = r#"
            <div class="layout2_code"><h1>99213, Established patient visit</h1></div>
            <div class="div newbread">
                <a href="/cpt-codes-range/99202-99499/">E/M</a>
            </div>
            <div class="modcross_list"><table><tbody>
                <tr><td>25</td><td>Separate E/M</td></tr>
            </tbody></table></div>
        "#;
        match classify(html, CodeSystem::Cpt) {
            PageClass::Detail(statics) => {
                assert_eq!(statics.main_interval.as_deref(), Some("99202-99499"));
                assert_eq!(
                    statics.short_description.as_deref(),
                    Some("Established patient visit")
                );
                assert_eq!(statics.modifier_codes, vec!["25"]);
                assert_eq!(statics.modifier_rows.len(), 1);
            }
            _ => panic!("expected detail"),
        }
    }
}
