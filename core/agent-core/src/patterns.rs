//! Compiled regex patterns for parsing agent logs and agent definitions.
//!
//! These patterns are compiled once on first use and reused throughout.
//! Update these when the log header or definition formats change.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// Agent Log Header
// ═══════════════════════════════════════════════════════════════════════════════

/// `Status: <token>` on its own line. Continuation lines in the header are
/// indented, so only the real field matches.
pub static RE_STATUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Status: (\S+)$").unwrap());

// ═══════════════════════════════════════════════════════════════════════════════
// Frontmatter Parsing Regexes
// ═══════════════════════════════════════════════════════════════════════════════

pub static RE_FRONTMATTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^---\s*\n(.*?)\n---[ \t]*(?:\n|$)").unwrap());
pub static RE_FRONTMATTER_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([A-Za-z][\w-]*):[ \t]*(.*?)[ \t]*$").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_ignores_indented_text() {
        let header = "Instructions: do it\n  Status: fake\nStatus: in-progress\n";
        let caps: Vec<_> = RE_STATUS_LINE
            .captures_iter(header)
            .map(|c| c[1].to_string())
            .collect();
        assert_eq!(caps, vec!["in-progress"]);
    }

    #[test]
    fn test_frontmatter_fields() {
        let doc = "---\nmodel: opus\nallowed-agents: [a, b]\n---\nBody text";
        let fm = RE_FRONTMATTER.captures(doc).unwrap();
        let fields: Vec<_> = RE_FRONTMATTER_FIELD
            .captures_iter(&fm[1])
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("model".to_string(), "opus".to_string()),
                ("allowed-agents".to_string(), "[a, b]".to_string()),
            ]
        );
        assert_eq!(&doc[fm.get(0).unwrap().end()..], "Body text");
    }
}
