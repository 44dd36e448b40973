//! Tab-dependent extractors
//!
//! Each extractor reveals its tab through the session, re-snapshots the
//! rendered page and hands the HTML to a synchronous parser. A tab that
//! never appears nulls the field and the remaining extractors keep going.

use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::normalized_text;
use super::selectors::Selectors;
use crate::domain::NdcRow;
use crate::infrastructure::session::BrowserSession;

const TAB_BETOS_CPT: &str = r##"a[href="#cpt_betos"]"##;
const TAB_BETOS_HCPCS: &str = r##"a[href="#hcpcs_betos"]"##;
const TAB_GUIDELINES: &str = r##"a[href="#cpt_guidelines"]"##;
const TAB_ADVICE: &str = r##"a[href="#cpt_advice"]"##;
const TAB_LAYTERM_CPT: &str = r##"a[href="#cpt_layterm"]"##;
const TAB_LAYTERM_HCPCS: &str = r##"a[href="#hcpcs_layterm"]"##;
const TAB_REPORT: &str = r##"a[href="#cpt_report"]"##;
const TAB_REVENUE: &str = r##"a[href="#cpt_revenue_lookup"]"##;
const TAB_NDC: &str = r##"a[href="#ndc"]"##;
const TAB_PCS: &str = r##"a[href="#PCS"]"##;

const ICD10_TAB_LABEL: &str = "ICD-10 CM X";
const LETTER_LINKS: &str = "a.ab_links";
const LETTER_TABLE_READY: &str = "table.points_table tbody tr td";

/// BETOS classification: the tab and pane ids differ between the two code
/// systems, so try both in order.
pub async fn betos(session: &BrowserSession, sel: &Selectors) -> (Option<String>, Option<String>) {
    let variants = [
        (TAB_BETOS_CPT, &sel.betos_pane_cpt),
        (TAB_BETOS_HCPCS, &sel.betos_pane_hcpcs),
    ];

    for (tab, pane) in variants {
        if !session.reveal_tab(tab).await {
            continue;
        }
        let Ok(html) = session.page_html().await else {
            continue;
        };
        if let Some(parsed) = parse_betos(&html, sel, pane) {
            return parsed;
        }
    }
    (None, None)
}

pub async fn guidelines(session: &BrowserSession, sel: &Selectors) -> Option<String> {
    simple_tab_text(session, TAB_GUIDELINES, &sel.guidelines_pane).await
}

pub async fn advice(session: &BrowserSession, sel: &Selectors) -> Option<String> {
    simple_tab_text(session, TAB_ADVICE, &sel.advice_pane).await
}

pub async fn report(session: &BrowserSession, sel: &Selectors) -> Option<String> {
    simple_tab_text(session, TAB_REPORT, &sel.report_pane).await
}

/// Lay term tab. The pane renders truncated with a "Read More" expander;
/// expand it when present, then read the full text. Returns
/// `(summary, lay_term)` where the summary is the first paragraph.
pub async fn lay_term(
    session: &BrowserSession,
    sel: &Selectors,
) -> (Option<String>, Option<String>) {
    let mut revealed = session.reveal_tab(TAB_LAYTERM_CPT).await;
    if !revealed {
        revealed = session.reveal_tab(TAB_LAYTERM_HCPCS).await;
    }
    if !revealed {
        info!("Lay term tab not available");
        return (None, None);
    }
    session.settle().await;

    if let Some(read_more) = session.find_tab_by_label("Read More").await {
        if session.click_from_script(&read_more).await.is_ok() {
            session.settle().await;
        }
    } else {
        debug!("No 'Read More' expander on lay term pane");
    }

    if !session.wait_for_tab_pane("#fullLayterm").await {
        return (None, None);
    }
    match session.page_html().await {
        Ok(html) => parse_lay_term(&html, sel),
        Err(e) => {
            warn!("Failed to read lay term pane: {e}");
            (None, None)
        }
    }
}

/// Revenue code crosswalk. The pane fills itself in after the click, so
/// wait out its loading placeholder before reading.
pub async fn revenue_lookup(session: &BrowserSession, sel: &Selectors) -> Option<Vec<String>> {
    if !session.reveal_tab(TAB_REVENUE).await {
        return None;
    }
    if !session.wait_until_loaded("#cpt_revenue_cross").await {
        return None;
    }
    let html = session.page_html().await.ok()?;
    parse_revenue(&html, sel)
}

/// ICD-10 CM crosswalk behind a letter pager: reveal the tab, then walk
/// every letter button and collect the first table column under each.
pub async fn icd10_cm(session: &BrowserSession, sel: &Selectors) -> Option<Vec<String>> {
    let tab = match session.find_tab_by_label(ICD10_TAB_LABEL).await {
        Some(tab) => tab,
        None => {
            warn!("'{ICD10_TAB_LABEL}' tab not found");
            return None;
        }
    };
    if session.click_from_script(&tab).await.is_err() {
        return None;
    }
    session.settle().await;

    if !session.wait_for_tab_pane(LETTER_LINKS).await {
        warn!("ICD-10 CM letter buttons never appeared");
        return None;
    }

    let mut letters = Vec::new();
    for button in session.find_all(LETTER_LINKS).await {
        if let Ok(Some(text)) = button.inner_text().await {
            let letter = text.trim().to_string();
            if !letter.is_empty() {
                letters.push(letter);
            }
        }
    }
    if letters.is_empty() {
        info!("No letters on the ICD-10 CM pane");
        return None;
    }
    info!("ICD-10 CM letters available: {letters:?}");

    let mut results = Vec::new();
    for letter in &letters {
        let expr = format!(
            "//a[contains(@class, \"ab_links\") and normalize-space(text())=\"{letter}\"]"
        );
        let Some(button) = session.find_by_xpath(&expr).await else {
            continue;
        };

        let already_selected = button
            .attribute("class")
            .await
            .ok()
            .flatten()
            .map(|class| class.contains("selected"))
            .unwrap_or(false);
        if !already_selected {
            if session.click_from_script(&button).await.is_err() {
                continue;
            }
            session.settle().await;
        }

        if !session.wait_for_tab_pane(LETTER_TABLE_READY).await {
            warn!("No table for ICD-10 CM letter {letter}; skipping");
            continue;
        }
        let Ok(html) = session.page_html().await else {
            continue;
        };
        results.extend(
            parse_first_column(&html, &sel.points_table, sel)
                .into_iter()
                .map(|code| code.replace('.', "")),
        );
    }

    (!results.is_empty()).then_some(results)
}

/// NDC crosswalk table. Returns the alternate-id list for the main record
/// plus the full rows for the sibling table.
pub async fn ndc(session: &BrowserSession, sel: &Selectors) -> (Option<Vec<String>>, Vec<NdcRow>) {
    if !session.reveal_tab(TAB_NDC).await {
        info!("NDC tab not available");
        return (None, Vec::new());
    }
    match session.page_html().await {
        Ok(html) => parse_ndc(&html, sel),
        Err(e) => {
            warn!("Failed to read NDC pane: {e}");
            (None, Vec::new())
        }
    }
}

/// ICD-10 PCS crosswalk; same delayed-fill pattern as the revenue pane.
pub async fn icd_10_pcs(session: &BrowserSession, sel: &Selectors) -> Option<Vec<String>> {
    if !session.reveal_tab(TAB_PCS).await {
        return None;
    }
    if !session.wait_until_loaded("#pcsdata").await {
        return None;
    }
    let html = session.page_html().await.ok()?;
    parse_pcs(&html, sel)
}

/// Official descriptor pane. Read last, from whatever tab state the page
/// ended up in, matching how the source renders it.
pub async fn official_descriptor(session: &BrowserSession, sel: &Selectors) -> Option<String> {
    if !session.wait_for_tab_pane("div.tab-pane").await {
        return None;
    }
    let html = session.page_html().await.ok()?;
    parse_pane_text(&html, &sel.tab_pane)
}

async fn simple_tab_text(
    session: &BrowserSession,
    tab_selector: &str,
    pane: &Selector,
) -> Option<String> {
    if !session.reveal_tab(tab_selector).await {
        return None;
    }
    let html = session.page_html().await.ok()?;
    parse_pane_text(&html, pane)
}

// ---- synchronous parsers ----

fn parse_pane_text(html: &str, pane: &Selector) -> Option<String> {
    let doc = Html::parse_document(html);
    let node = doc.select(pane).next()?;
    let text = normalized_text(node);
    (!text.is_empty()).then_some(text)
}

fn parse_betos(
    html: &str,
    sel: &Selectors,
    pane: &Selector,
) -> Option<(Option<String>, Option<String>)> {
    let doc = Html::parse_document(html);
    let container = doc.select(pane).next()?;

    let mut code = None;
    let mut description = None;
    for inner in container.select(&sel.div) {
        let Some(label) = inner.select(&sel.strong).next() else {
            continue;
        };
        let label_text = normalized_text(label);
        let full = normalized_text(inner);
        if label_text.contains("Code:") {
            code = Some(full.replace("Code:", "").trim().to_string());
        } else if label_text.contains("Description:") {
            description = Some(full.replace("Description:", "").trim().to_string());
        }
    }
    Some((code, description))
}

fn parse_lay_term(html: &str, sel: &Selectors) -> (Option<String>, Option<String>) {
    let doc = Html::parse_document(html);
    let Some(full) = doc.select(&sel.layterm_full).next() else {
        return (None, None);
    };

    let summary = full
        .select(&sel.paragraph)
        .next()
        .map(normalized_text)
        .filter(|text| !text.is_empty());

    let mut lay_term = normalized_text(full);
    if lay_term.to_lowercase().ends_with("read less") {
        lay_term.truncate(lay_term.len() - "read less".len());
        lay_term = lay_term.trim_end().to_string();
    }

    let lay_term = (!lay_term.is_empty()).then_some(lay_term);
    (summary, lay_term)
}

fn parse_revenue(html: &str, sel: &Selectors) -> Option<Vec<String>> {
    let doc = Html::parse_document(html);
    let pane = doc.select(&sel.revenue_pane).next()?;

    if normalized_text(pane).contains("Data Not Available") {
        info!("Revenue lookup reports no data");
        return None;
    }

    let table = pane.select(&sel.points_table).next()?;
    let codes: Vec<String> = table
        .select(&sel.row)
        .skip(1) // header row
        .filter_map(|row| {
            row.select(&sel.cell)
                .next()
                .map(normalized_text)
                .filter(|code| !code.is_empty())
        })
        .collect();

    if codes.is_empty() {
        debug!("Revenue lookup table present but empty");
    }
    Some(codes)
}

fn parse_ndc(html: &str, sel: &Selectors) -> (Option<Vec<String>>, Vec<NdcRow>) {
    let doc = Html::parse_document(html);
    let Some(pane) = doc.select(&sel.ndc_pane).next() else {
        info!("NDC pane not found");
        return (None, Vec::new());
    };
    let Some(table) = pane.select(&sel.table).next() else {
        info!("NDC table not found");
        return (None, Vec::new());
    };

    let mut ids = Vec::new();
    let mut rows = Vec::new();
    let body = table.select(&sel.table_body).next();
    let row_iter = body
        .map(|b| b.select(&sel.row).collect::<Vec<_>>())
        .unwrap_or_default();

    for row in row_iter {
        let values: Vec<String> = row.select(&sel.cell).map(normalized_text).collect();
        if values.is_empty() || values.iter().all(|v| v.is_empty()) {
            continue;
        }
        if values.len() >= 5 {
            ids.push(values[0].clone());
            rows.push(NdcRow {
                ndc_alternate_id: values[0].clone(),
                drug_name: values[1].clone(),
                labeler_name: values[2].clone(),
                hcpcs_dosage: values[3].clone(),
                bill_unit: values[4].clone(),
            });
        }
    }

    let ids = (!ids.is_empty()).then_some(ids);
    (ids, rows)
}

fn parse_pcs(html: &str, sel: &Selectors) -> Option<Vec<String>> {
    let doc = Html::parse_document(html);
    let pane = doc.select(&sel.pcs_pane).next()?;
    let table = pane.select(&sel.points_table).next()?;

    let codes: Vec<String> = table
        .select(&sel.table_body)
        .next()
        .map(|body| {
            body.select(&sel.row)
                .filter_map(|row| {
                    row.select(&sel.cell)
                        .next()
                        .map(normalized_text)
                        .filter(|code| !code.is_empty())
                })
                .collect()
        })
        .unwrap_or_default();

    (!codes.is_empty()).then_some(codes)
}

fn parse_first_column(html: &str, table: &Selector, sel: &Selectors) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Some(table) = doc.select(table).next() else {
        return Vec::new();
    };
    table
        .select(&sel.table_body)
        .next()
        .map(|body| {
            body.select(&sel.row)
                .filter_map(|row| {
                    row.select(&sel.cell)
                        .next()
                        .map(normalized_text)
                        .filter(|text| !text.is_empty())
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Selectors {
        Selectors::new().unwrap()
    }

    #[test]
    fn test_parse_betos_code_and_description() {
        let sel = setup();
        let html = r#"<div id="cpt_betos">
            <div><strong>Code:</strong> M1B</div>
            <div><strong>Description:</strong> Office visits - established</div>
        </div>"#;
        let (code, description) = parse_betos(html, &sel, &sel.betos_pane_cpt).unwrap();
        assert_eq!(code.as_deref(), Some("M1B"));
        assert_eq!(description.as_deref(), Some("Office visits - established"));
    }

    #[test]
    fn test_parse_pane_text_absent_pane() {
        let sel = setup();
        assert!(parse_pane_text("<div>nothing here</div>", &sel.guidelines_pane).is_none());
    }

    #[test]
    fn test_parse_lay_term_strips_read_less() {
        let sel = setup();
        let html = r##"<div id="fullLayterm">
            <p>The provider evaluates an established patient.</p>
            <p>Additional detail follows.</p>
            <a href="#">Read Less</a>
        </div>"##;
        let (summary, lay_term) = parse_lay_term(html, &sel);
        assert_eq!(
            summary.as_deref(),
            Some("The provider evaluates an established patient.")
        );
        let lay_term = lay_term.unwrap();
        assert!(lay_term.ends_with("Additional detail follows."));
        assert!(!lay_term.to_lowercase().contains("read less"));
    }

    #[test]
    fn test_parse_revenue_skips_header_and_detects_no_data() {
        let sel = setup();
        let html = r#"<div id="cpt_revenue_cross">
            <table class="points_table">
                <tr><td>Revenue Code</td><td>Description</td></tr>
                <tr><td>0510</td><td>Clinic</td></tr>
                <tr><td>0517</td><td>Family practice</td></tr>
            </table>
        </div>"#;
        assert_eq!(parse_revenue(html, &sel).unwrap(), vec!["0510", "0517"]);

        let empty = r#"<div id="cpt_revenue_cross">Data Not Available</div>"#;
        assert!(parse_revenue(empty, &sel).is_none());
    }

    #[test]
    fn test_parse_ndc_requires_five_cells() {
        let sel = setup();
        let html = r#"<div id="ndc"><table><tbody>
            <tr><td>00002-1433-80</td><td>Drug A</td><td>Labeler A</td><td>10 mg</td><td>UN</td></tr>
            <tr><td></td><td></td><td></td><td></td><td></td></tr>
            <tr><td>00002-7510-01</td><td>Drug B</td></tr>
        </tbody></table></div>"#;
        let (ids, rows) = parse_ndc(html, &sel);
        assert_eq!(ids.unwrap(), vec!["00002-1433-80"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].drug_name, "Drug A");
        assert_eq!(rows[0].bill_unit, "UN");
    }

    #[test]
    fn test_parse_pcs_first_column() {
        let sel = setup();
        let html = r#"<div id="pcsdata"><table class="points_table"><tbody>
            <tr><td>0016070</td><td>Bypass</td></tr>
            <tr><td>001607A</td><td>Bypass variant</td></tr>
        </tbody></table></div>"#;
        assert_eq!(parse_pcs(html, &sel).unwrap(), vec!["0016070", "001607A"]);
    }

    #[test]
    fn test_parse_first_column_missing_table() {
        let sel = setup();
        assert!(parse_first_column("<div></div>", &sel.points_table, &sel).is_empty());
    }
}
