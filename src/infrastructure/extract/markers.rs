//! Terminal page variant detection
//!
//! A detail URL can land on three dead ends before regular extraction even
//! starts: the site's structural 404 page, the generic deleted-codes index,
//! or a per-code tombstone page that still carries a reduced field set.

use scraper::Html;

use super::normalized_text;
use super::selectors::{Patterns, Selectors};
use crate::domain::TombstoneRecord;

/// Structural marker unique to the site's error page.
pub fn is_error_404(doc: &Html, sel: &Selectors) -> bool {
    doc.select(&sel.error_404).next().is_some()
}

/// The generic "Deleted HCPCS Codes" index page some retired codes redirect
/// to. Carries nothing extractable.
pub fn is_deleted_index(doc: &Html, sel: &Selectors) -> bool {
    doc.select(&sel.h1)
        .next()
        .map(|h1| normalized_text(h1).contains("Deleted HCPCS Codes"))
        .unwrap_or(false)
}

/// Per-code tombstone: an inline "Deleted" marker co-located with a dated
/// alert banner. Returns the reduced field set when detected. Deleted pages
/// structurally lack the tabbed sections, so only inline panels are read.
pub fn detect_tombstone(doc: &Html, sel: &Selectors, patterns: &Patterns) -> Option<TombstoneRecord> {
    doc.select(&sel.span)
        .find(|span| patterns.deleted.is_match(&normalized_text(*span)))?;

    let date_deleted = doc
        .select(&sel.alert_banner)
        .next()
        .map(normalized_text)
        .filter(|text| !text.is_empty());

    let advice = extract_advice(doc, sel);
    let lay_term = panel_body_by_heading(doc, sel, "Lay Term");
    let guidelines = extract_guidelines(doc, sel);
    let description = panel_body_by_heading(doc, sel, "Code Descriptor");

    Some(TombstoneRecord {
        date_deleted,
        advice,
        lay_term,
        guidelines,
        description,
    })
}

/// First div carrying an "Advice:" label; prefer its paragraph body over
/// the raw trailing text.
fn extract_advice(doc: &Html, sel: &Selectors) -> Option<String> {
    for div in doc.select(&sel.div) {
        let text = normalized_text(div);
        if !text.contains("Advice:") {
            continue;
        }
        if let Some(p) = div.select(&sel.paragraph).next() {
            return Some(normalized_text(p));
        }
        let after = text.split_once("Advice:").map(|(_, rest)| rest.trim());
        return after
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
            .or(Some(text));
    }
    None
}

/// Guideline panes announce themselves by content, including the explicit
/// "none found" variants.
fn extract_guidelines(doc: &Html, sel: &Selectors) -> Option<String> {
    doc.select(&sel.panel_pane)
        .map(|pane| normalized_text(pane))
        .find(|text| {
            text.contains("Guidelines found") || text.contains("No CPT") || text.contains("No HCPCS")
        })
}

/// Body text of the panel whose heading carries the given label.
fn panel_body_by_heading(doc: &Html, sel: &Selectors, heading_label: &str) -> Option<String> {
    for panel in doc.select(&sel.panel) {
        let heading_matches = panel
            .select(&sel.panel_heading)
            .next()
            .map(|heading| normalized_text(heading).contains(heading_label))
            .unwrap_or(false);
        if !heading_matches {
            continue;
        }
        if let Some(body) = panel.select(&sel.panel_pane).next() {
            let text = normalized_text(body);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Selectors, Patterns) {
        (Selectors::new().unwrap(), Patterns::new().unwrap())
    }

    #[test]
    fn test_404_marker() {
        let (sel, _) = setup();
        let doc = Html::parse_document(r#"<div class="container404"><h1>Oops</h1></div>"#);
        assert!(is_error_404(&doc, &sel));

        let doc = Html::parse_document(r#"<div class="container"><h1>99213</h1></div>"#);
        assert!(!is_error_404(&doc, &sel));
    }

    #[test]
    fn test_deleted_index_marker() {
        let (sel, _) = setup();
        let doc = Html::parse_document("<h1>Deleted HCPCS Codes</h1>");
        assert!(is_deleted_index(&doc, &sel));

        let doc = Html::parse_document("<h1>HCPCS Code J0130</h1>");
        assert!(!is_deleted_index(&doc, &sel));
    }

    #[test]
    fn test_tombstone_detection_and_fields() {
        let (sel, patterns) = setup();
        let doc = Html::parse_document(
            r#"
            <span>Deleted</span>
            <div class="alert alert-danger">Code   deleted effective
                01/01/2024</div>
            <div>Advice: <p>Use J0131 instead.</p></div>
            <div class="panel panel-default">
                <div class="panel-heading">Code Descriptor</div>
                <div class="panel-body tab-pane">Injection, acetaminophen, 10 mg</div>
            </div>
            <div class="panel-body tab-pane">No HCPCS Guidelines found for this code.</div>
            "#,
        );

        let tombstone = detect_tombstone(&doc, &sel, &patterns).unwrap();
        assert_eq!(
            tombstone.date_deleted.as_deref(),
            Some("Code deleted effective 01/01/2024")
        );
        assert_eq!(tombstone.advice.as_deref(), Some("Use J0131 instead."));
        assert_eq!(
            tombstone.description.as_deref(),
            Some("Injection, acetaminophen, 10 mg")
        );
        assert!(tombstone
            .guidelines
            .as_deref()
            .unwrap()
            .contains("Guidelines found"));
        assert!(tombstone.lay_term.is_none());
    }

    #[test]
    fn test_live_page_is_not_tombstone() {
        let (sel, patterns) = setup();
        let doc = Html::parse_document("<span>Active</span><h1>99213</h1>");
        assert!(detect_tombstone(&doc, &sel, &patterns).is_none());
    }
}
