//! Worklist normalization
//!
//! The worklist comes back from the warehouse as raw strings. Blank entries
//! and the literal string "false" are sentinel values left behind by earlier
//! loads and are dropped before the run starts.

/// Filter a raw worklist down to the codes worth visiting.
pub fn normalize_worklist<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|code| {
            let trimmed = code.as_ref().trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("false") {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_blank_and_false_filtered() {
        let raw = vec!["123", "", "false", "456"];
        assert_eq!(normalize_worklist(raw), vec!["123", "456"]);
    }

    #[rstest]
    #[case("  99213 ", Some("99213"))]
    #[case("   ", None)]
    #[case("FALSE", None)]
    #[case("False", None)]
    #[case("J0130", Some("J0130"))]
    fn test_single_entry_normalization(#[case] raw: &str, #[case] expected: Option<&str>) {
        let normalized = normalize_worklist(vec![raw]);
        assert_eq!(normalized.first().map(String::as_str), expected);
    }

    #[test]
    fn test_empty_worklist() {
        let raw: Vec<&str> = Vec::new();
        assert!(normalize_worklist(raw).is_empty());
    }
}
