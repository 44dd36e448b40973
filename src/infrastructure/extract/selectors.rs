//! Compiled selector and pattern sets
//!
//! Every CSS selector and regex used by the extractors, compiled once when
//! the scraper is built so extraction itself never has to handle a compile
//! failure.

use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::Selector;

/// Compile a selector literal, surfacing the offending string on failure.
fn css(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| anyhow!("Invalid selector '{raw}': {e}"))
}

/// All document selectors used across marker detection, static fields and
/// tab panes.
#[derive(Debug, Clone)]
pub struct Selectors {
    // Terminal page markers
    pub error_404: Selector,
    pub h1: Selector,
    pub span: Selector,
    pub alert_banner: Selector,
    pub div: Selector,
    pub paragraph: Selector,
    pub panel_pane: Selector,
    pub panel: Selector,
    pub panel_heading: Selector,

    // Static detail fields
    pub headline: Selector,
    pub subhead_div: Selector,
    pub subhead_h2: Selector,
    pub breadcrumbs: Selector,
    pub breadcrumbs_alt: Selector,
    pub crumb: Selector,
    pub anchor: Selector,
    pub linked_anchor: Selector,
    pub modifier_list: Selector,
    pub table_body: Selector,
    pub row: Selector,
    pub cell: Selector,
    pub cpt_symbol_box: Selector,
    pub symbol_entry: Selector,
    pub detail_head: Selector,
    pub detail_box_blue: Selector,

    // Tab panes
    pub betos_pane_cpt: Selector,
    pub betos_pane_hcpcs: Selector,
    pub strong: Selector,
    pub guidelines_pane: Selector,
    pub advice_pane: Selector,
    pub layterm_full: Selector,
    pub report_pane: Selector,
    pub revenue_pane: Selector,
    pub points_table: Selector,
    pub ndc_pane: Selector,
    pub table: Selector,
    pub pcs_pane: Selector,
    pub tab_pane: Selector,
}

impl Selectors {
    pub fn new() -> Result<Self> {
        Ok(Self {
            error_404: css("div.container404")?,
            h1: css("h1")?,
            span: css("span")?,
            alert_banner: css("div.alert.alert-danger")?,
            div: css("div")?,
            paragraph: css("p")?,
            panel_pane: css("div.panel-body.tab-pane")?,
            panel: css("div.panel.panel-default")?,
            panel_heading: css("div.panel-heading")?,

            headline: css("div.layout2_code h1")?,
            subhead_div: css("div.sub_head_detail")?,
            subhead_h2: css("h2.sub_head_detail")?,
            breadcrumbs: css("div.newbread")?,
            breadcrumbs_alt: css("div.newbread.logout-header")?,
            crumb: css("div.div")?,
            anchor: css("a")?,
            linked_anchor: css("a[href]")?,
            modifier_list: css("div.modcross_list")?,
            table_body: css("tbody")?,
            row: css("tr")?,
            cell: css("td")?,
            cpt_symbol_box: css("div#cpt_symbol_div")?,
            symbol_entry: css("div.icon-dic-o")?,
            detail_head: css("p.box-detail-head")?,
            detail_box_blue: css("div.box-detail.box-blue")?,

            betos_pane_cpt: css("div#cpt_betos")?,
            betos_pane_hcpcs: css("div#hcpcs_betos")?,
            strong: css("strong")?,
            guidelines_pane: css("div#cpt_guidelines")?,
            advice_pane: css("div#cpt_advice")?,
            layterm_full: css("div#fullLayterm")?,
            report_pane: css("div#cpt_report")?,
            revenue_pane: css("div#cpt_revenue_cross")?,
            points_table: css("table.points_table")?,
            ndc_pane: css("div#ndc")?,
            table: css("table")?,
            pcs_pane: css("div#pcsdata")?,
            tab_pane: css("div.tab-pane")?,
        })
    }
}

/// Compiled regex patterns for marker detection and interval capture.
#[derive(Debug, Clone)]
pub struct Patterns {
    /// Inline "Deleted" marker on per-code tombstone pages.
    pub deleted: Regex,
    /// Code range embedded in CPT breadcrumb hrefs.
    pub cpt_range: Regex,
    /// Code range printed in HCPCS breadcrumb labels.
    pub hcpcs_range: Regex,
}

impl Patterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            deleted: Regex::new(r"(?i)\bdeleted\b")?,
            cpt_range: Regex::new(r"/cpt-codes-range/(\d{4,5}T?-\d{4,5}T?)/")?,
            hcpcs_range: Regex::new(r"\b([A-Z]\d{4}-[A-Z]\d{4})\b")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_selectors_compile() {
        assert!(Selectors::new().is_ok());
    }

    #[test]
    fn test_patterns_compile_and_match() {
        let patterns = Patterns::new().unwrap();
        assert!(patterns.deleted.is_match("This code was Deleted in 2024"));
        assert_eq!(
            patterns
                .cpt_range
                .captures("/cpt-codes-range/99202-99499/")
                .unwrap()[1]
                .to_string(),
            "99202-99499"
        );
        assert_eq!(
            patterns.hcpcs_range.captures("Codes J0120-J8999").unwrap()[1].to_string(),
            "J0120-J8999"
        );
    }
}
