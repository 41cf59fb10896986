//! Filename filter engine.
//!
//! Decides whether a downloaded file should be printed. Filters are opt-in:
//! a rule with no active sub-filters matches every filename, and the verdict
//! is the logical AND of the active ones.

use crate::models::FilterRule;
use crate::models::normalize_extension;

/// Result of evaluating a filename against a [`FilterRule`].
///
/// `reasons` is diagnostic text for logs only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchVerdict {
    pub matches: bool,
    pub prefix_matched: bool,
    pub extension_matched: bool,
    pub reasons: Vec<String>,
}

/// Evaluate `filename` (a leaf name, not a path) against `rule`.
///
/// Inactive sub-filters report as matched.
pub fn evaluate(filename: &str, rule: &FilterRule) -> MatchVerdict {
    let mut reasons = Vec::new();
    let lowered = filename.to_lowercase();

    let prefix_matched = match rule.prefix.as_deref().filter(|p| !p.is_empty()) {
        Some(prefix) => {
            let matched = lowered.starts_with(&prefix.to_lowercase());
            if matched {
                reasons.push(format!("prefix \"{}\" matched", prefix));
            } else {
                reasons.push(format!(
                    "prefix mismatch: \"{}\" does not start with \"{}\"",
                    filename, prefix
                ));
            }
            matched
        }
        None => true,
    };

    let expected = rule
        .extension
        .as_deref()
        .map(normalize_extension)
        .filter(|e| !e.is_empty());

    let extension_matched = match expected {
        Some(expected) => {
            let actual = file_extension(filename).to_lowercase();
            let matched = actual == expected;
            if matched {
                reasons.push(format!("extension \"{}\" matched", expected));
            } else if actual.is_empty() {
                reasons.push(format!(
                    "extension mismatch: \"{}\" has no extension, expected \"{}\"",
                    filename, expected
                ));
            } else {
                reasons.push(format!(
                    "extension mismatch: \"{}\" is not \"{}\"",
                    actual, expected
                ));
            }
            matched
        }
        None => true,
    };

    if rule.prefix.as_deref().is_none_or(str::is_empty)
        && rule.extension.as_deref().is_none_or(str::is_empty)
    {
        reasons.push("no filters configured".to_string());
    }

    MatchVerdict {
        matches: prefix_matched && extension_matched,
        prefix_matched,
        extension_matched,
        reasons,
    }
}

/// Substring after the last `.`; empty when the name has no dot.
pub fn file_extension(filename: &str) -> &str {
    filename.rsplit_once('.').map_or("", |(_, ext)| ext)
}

/// Leaf filename of a raw download path.
///
/// Both `/` and `\` count as separators, since download paths are reported
/// in the host's native form.
pub fn leaf_filename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_rule_matches() {
        let verdict = evaluate("invoice_2024.pdf", &FilterRule::prefix("invoice_"));
        assert!(verdict.matches);
        assert!(verdict.prefix_matched);
        assert!(verdict.extension_matched);
    }

    #[test]
    fn test_extension_rule_is_case_insensitive() {
        let verdict = evaluate("REPORT.PDF", &FilterRule::extension("pdf"));
        assert!(verdict.matches);
    }

    #[test]
    fn test_combined_rule_reports_extension_mismatch() {
        let rule = FilterRule::new(Some("inv_"), Some("pdf"));
        let verdict = evaluate("inv_2024.docx", &rule);

        assert!(!verdict.matches);
        assert!(verdict.prefix_matched);
        assert!(!verdict.extension_matched);
        assert!(verdict.reasons.iter().any(|r| r.contains("extension mismatch")));
    }

    #[test]
    fn test_no_extension_never_matches_extension_filter() {
        let verdict = evaluate("Makefile", &FilterRule::extension("pdf"));
        assert!(!verdict.matches);
        assert!(!verdict.extension_matched);
    }

    #[test]
    fn test_multiple_dots_use_last_segment() {
        assert!(evaluate("archive.tar.gz", &FilterRule::extension("gz")).matches);
        assert!(!evaluate("archive.tar.gz", &FilterRule::extension("tar")).matches);
        assert!(evaluate("scan.v2.PDF", &FilterRule::extension(".pdf")).matches);
    }

    #[test]
    fn test_empty_rule_always_matches() {
        let verdict = evaluate("anything", &FilterRule::any());
        assert!(verdict.matches);
        assert_eq!(verdict.reasons, vec!["no filters configured".to_string()]);
    }

    #[test]
    fn test_prefix_case_insensitive() {
        assert!(evaluate("Invoice_001.pdf", &FilterRule::prefix("INVOICE_")).matches);
        assert!(!evaluate("receipt.pdf", &FilterRule::prefix("invoice")).matches);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("a.pdf"), "pdf");
        assert_eq!(file_extension("noext"), "");
        assert_eq!(file_extension("trailing."), "");
        assert_eq!(file_extension(".bashrc"), "bashrc");
    }

    #[test]
    fn test_leaf_filename() {
        assert_eq!(leaf_filename("/home/user/Downloads/invoice.pdf"), "invoice.pdf");
        assert_eq!(leaf_filename("C:\\Users\\me\\Downloads\\report.PDF"), "report.PDF");
        assert_eq!(leaf_filename("plain.txt"), "plain.txt");
    }
}
