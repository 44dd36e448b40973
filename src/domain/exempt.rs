//! Exempt code snapshot rows
//!
//! The calendar-partitioned table fed by the yearly archive pipeline. A
//! partition holds immutable versioned snapshots; `version` is assigned at
//! commit time by the reconciler.

use serde::{Deserialize, Serialize};

/// One spreadsheet row plus partition bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExemptRow {
    pub order: String,
    pub code: String,
    pub description: String,
    pub year: String,
    pub date_parse: String,
}

impl ExemptRow {
    /// Content identity used by the reconciler's set difference. The
    /// bookkeeping columns `date_parse` and `version` are excluded, so a
    /// reparse of unchanged source data compares equal.
    pub fn content_key(&self) -> (String, String, String, String) {
        (
            self.order.clone(),
            self.code.clone(),
            self.description.clone(),
            self.year.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_ignores_date_parse() {
        let a = ExemptRow {
            order: "1".to_string(),
            code: "A01".to_string(),
            description: "x".to_string(),
            year: "2024".to_string(),
            date_parse: "2024-05-01".to_string(),
        };
        let b = ExemptRow {
            date_parse: "2024-06-01".to_string(),
            ..a.clone()
        };
        assert_eq!(a.content_key(), b.content_key());
    }
}
