//! Static field extractors
//!
//! Everything readable from the initially rendered detail page, before any
//! tab is revealed. Each extractor is independent and answers `None` when
//! its structure is missing; a partial page still yields a partial record.

use scraper::Html;

use super::normalized_text;
use super::selectors::{Patterns, Selectors};
use crate::domain::{CodeSystem, ModifierRow};

/// Breadcrumb anchor labels that root the interval-name walk.
const INTERVAL_ROOT_LABELS: [&str; 2] = ["CPT Codes", "HCPCS Codes"];

/// Headline text after the leading code, e.g. "99213, Office visit".
pub fn short_description(doc: &Html, sel: &Selectors) -> Option<String> {
    let h1 = doc.select(&sel.headline).next()?;
    let full = normalized_text(h1);
    if full.is_empty() {
        return None;
    }
    match full.split_once(',') {
        Some((_, rest)) => Some(rest.trim().to_string()),
        None => Some(full),
    }
}

/// Sub-headline; rendered as a div on some layouts and an h2 on others.
pub fn long_description(doc: &Html, sel: &Selectors) -> Option<String> {
    let node = doc
        .select(&sel.subhead_div)
        .next()
        .or_else(|| doc.select(&sel.subhead_h2).next())?;
    let text = normalized_text(node);
    (!text.is_empty()).then_some(text)
}

/// Code range the detail page sits in. The two code systems render their
/// breadcrumbs differently: CPT embeds the range in hrefs, HCPCS prints it
/// in span labels.
pub fn main_interval(
    doc: &Html,
    sel: &Selectors,
    patterns: &Patterns,
    system: CodeSystem,
) -> Option<String> {
    let breadcrumbs = doc.select(&sel.breadcrumbs).next()?;

    match system {
        CodeSystem::Cpt => breadcrumbs
            .select(&sel.linked_anchor)
            .filter_map(|link| link.value().attr("href"))
            .find_map(|href| {
                patterns
                    .cpt_range
                    .captures(href)
                    .map(|caps| caps[1].to_string())
            }),
        CodeSystem::Hcpcs => breadcrumbs.select(&sel.span).find_map(|span| {
            patterns
                .hcpcs_range
                .captures(&normalized_text(span))
                .map(|caps| caps[1].to_string())
        }),
    }
}

/// Hierarchical interval names from the breadcrumb trail.
///
/// Walk starts after the last node anchored "CPT Codes"/"HCPCS Codes" and
/// collects span labels of linked nodes; the first node without a link
/// terminates the walk.
pub fn main_interval_name(doc: &Html, sel: &Selectors) -> Option<Vec<String>> {
    let breadcrumbs = doc
        .select(&sel.breadcrumbs)
        .next()
        .or_else(|| doc.select(&sel.breadcrumbs_alt).next())?;

    let crumbs: Vec<_> = breadcrumbs.select(&sel.crumb).collect();

    let start = crumbs.iter().rposition(|crumb| {
        crumb
            .select(&sel.anchor)
            .next()
            .map(|a| INTERVAL_ROOT_LABELS.contains(&normalized_text(a).as_str()))
            .unwrap_or(false)
    })?;

    let mut names = Vec::new();
    for crumb in &crumbs[start + 1..] {
        if crumb.select(&sel.anchor).next().is_none() {
            break;
        }
        if let Some(span) = crumb.select(&sel.span).next() {
            names.push(normalized_text(span));
        }
    }

    (!names.is_empty()).then_some(names)
}

/// Modifier crosswalk table rendered inline on the detail page. Returns
/// the rows plus the bare modifier codes for the main record's list column.
pub fn modifier_rows(doc: &Html, sel: &Selectors) -> (Vec<ModifierRow>, Vec<String>) {
    let mut rows = Vec::new();
    let mut codes = Vec::new();

    let table = doc
        .select(&sel.modifier_list)
        .next()
        .and_then(|list| list.select(&sel.table_body).next());

    if let Some(body) = table {
        for row in body.select(&sel.row) {
            let cells: Vec<_> = row.select(&sel.cell).collect();
            if cells.len() >= 2 {
                let modifier = normalized_text(cells[0]);
                let description = normalized_text(cells[1]);
                codes.push(modifier.clone());
                rows.push(ModifierRow {
                    modifier,
                    description,
                });
            }
        }
    }

    (rows, codes)
}

/// Code symbol legend. Two structurally identical renderings exist; the
/// current URL decides which branch applies.
pub fn code_symbols(doc: &Html, sel: &Selectors, current_url: &str) -> Option<Vec<String>> {
    let url = current_url.to_lowercase();

    let entries: Vec<String> = if url.contains("cpt-codes") {
        let symbol_box = doc.select(&sel.cpt_symbol_box).next()?;
        collect_symbol_entries(symbol_box, sel)
    } else if url.contains("hcpcs-codes") {
        let head = doc
            .select(&sel.detail_head)
            .find(|p| normalized_text(*p) == "HCPCS Code Symbols")?;
        // The heading sits inside the blue detail box that owns the legend.
        let container = doc.select(&sel.detail_box_blue).find(|d| {
            d.select(&sel.detail_head)
                .any(|p| p.id() == head.id())
        })?;
        collect_symbol_entries(container, sel)
    } else {
        return None;
    };

    (!entries.is_empty()).then_some(entries)
}

fn collect_symbol_entries(container: scraper::ElementRef<'_>, sel: &Selectors) -> Vec<String> {
    container
        .select(&sel.symbol_entry)
        .filter_map(|entry| {
            normalized_text(entry)
                .split_once(':')
                .map(|(_, description)| description.trim().to_string())
                .filter(|description| !description.is_empty())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Selectors, Patterns) {
        (Selectors::new().unwrap(), Patterns::new().unwrap())
    }

    #[test]
    fn test_short_description_after_comma() {
        let (sel, _) = setup();
        let doc = Html::parse_document(
            r#"<div class="layout2_code"><h1>99213, Established patient office visit</h1></div>"#,
        );
        assert_eq!(
            short_description(&doc, &sel).as_deref(),
            Some("Established patient office visit")
        );
    }

    #[test]
    fn test_short_description_without_comma_keeps_full_text() {
        let (sel, _) = setup();
        let doc = Html::parse_document(r#"<div class="layout2_code"><h1>99213</h1></div>"#);
        assert_eq!(short_description(&doc, &sel).as_deref(), Some("99213"));
    }

    #[test]
    fn test_long_description_falls_back_to_h2() {
        let (sel, _) = setup();
        let doc =
            Html::parse_document(r#"<h2 class="sub_head_detail">Office outpatient visit</h2>"#);
        assert_eq!(
            long_description(&doc, &sel).as_deref(),
            Some("Office outpatient visit")
        );
    }

    #[test]
    fn test_main_interval_cpt_from_href() {
        let (sel, patterns) = setup();
        let doc = Html::parse_document(
            r#"<div class="div newbread">
                 <a href="/cpt-codes-range/99202-99499/">E/M Services</a>
               </div>"#,
        );
        assert_eq!(
            main_interval(&doc, &sel, &patterns, CodeSystem::Cpt).as_deref(),
            Some("99202-99499")
        );
        assert!(main_interval(&doc, &sel, &patterns, CodeSystem::Hcpcs).is_none());
    }

    #[test]
    fn test_main_interval_hcpcs_from_span() {
        let (sel, patterns) = setup();
        let doc = Html::parse_document(
            r#"<div class="div newbread"><span>Drugs J0120-J8999</span></div>"#,
        );
        assert_eq!(
            main_interval(&doc, &sel, &patterns, CodeSystem::Hcpcs).as_deref(),
            Some("J0120-J8999")
        );
    }

    #[test]
    fn test_interval_name_walk_stops_at_unlinked_node() {
        let (sel, _) = setup();
        let doc = Html::parse_document(
            r#"<div class="div newbread">
                 <div class="div"><a href="/">Home</a></div>
                 <div class="div"><a href="/cpt">CPT Codes</a></div>
                 <div class="div"><a href="/em"><span>Evaluation and Management</span></a></div>
                 <div class="div"><a href="/office"><span>Office Visits</span></a></div>
                 <div class="div"><span>99213</span></div>
                 <div class="div"><a href="/x"><span>Unreachable</span></a></div>
               </div>"#,
        );
        assert_eq!(
            main_interval_name(&doc, &sel).unwrap(),
            vec!["Evaluation and Management", "Office Visits"]
        );
    }

    #[test]
    fn test_interval_name_missing_anchor_label() {
        let (sel, _) = setup();
        let doc = Html::parse_document(
            r#"<div class="div newbread">
                 <div class="div"><a href="/">Home</a></div>
               </div>"#,
        );
        assert!(main_interval_name(&doc, &sel).is_none());
    }

    #[test]
    fn test_modifier_rows_need_two_cells() {
        let (sel, _) = setup();
        let doc = Html::parse_document(
            r#"<div class="modcross_list"><table><tbody>
                 <tr><td>25</td><td>Significant, separately identifiable E/M</td></tr>
                 <tr><td>59</td><td>Distinct procedural service</td></tr>
                 <tr><td>orphan</td></tr>
               </tbody></table></div>"#,
        );
        let (rows, codes) = modifier_rows(&doc, &sel);
        assert_eq!(rows.len(), 2);
        assert_eq!(codes, vec!["25", "59"]);
        assert_eq!(rows[1].description, "Distinct procedural service");
    }

    #[test]
    fn test_code_symbols_disambiguated_by_url() {
        let (sel, _) = setup();
        let cpt_doc = Html::parse_document(
            r#"<div id="cpt_symbol_div">
                 <div class="icon-dic-o">star: New code</div>
                 <div class="icon-dic-o">plus: Add-on code</div>
               </div>"#,
        );
        assert_eq!(
            code_symbols(&cpt_doc, &sel, "https://site/cpt-codes/99213").unwrap(),
            vec!["New code", "Add-on code"]
        );
        // Same document, wrong code system: the CPT branch must not fire.
        assert!(code_symbols(&cpt_doc, &sel, "https://site/hcpcs-codes/J0130").is_none());

        let hcpcs_doc = Html::parse_document(
            r#"<div class="box-detail box-blue">
                 <p class="box-detail-head">HCPCS Code Symbols</p>
                 <div class="icon-dic-o"><img src="i.png"> circle: Carrier discretion</div>
               </div>"#,
        );
        assert_eq!(
            code_symbols(&hcpcs_doc, &sel, "https://site/hcpcs-codes/J0130").unwrap(),
            vec!["Carrier discretion"]
        );
    }
}
