//! Parsing of terse reviewer replies (`YES|NO + reason`).

use crate::core::types::Verdict;

/// Parse a reviewer reply.
///
/// The first word decides (case-insensitive, surrounding punctuation ignored); the
/// rest of the reply, minus leading separators, is the reason.
pub fn parse_verdict(reply: &str) -> Verdict {
    let trimmed = reply.trim().trim_start_matches(['*', '`', '"', '\'']);
    let (head, rest) = trimmed
        .split_once(|c: char| c.is_whitespace() || matches!(c, ':' | ',' | '.' | '-' | '*'))
        .unwrap_or((trimmed, ""));
    let reason = rest
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | ',' | '.' | '-' | '*'))
        .trim()
        .to_string();
    if head.eq_ignore_ascii_case("yes") {
        Verdict::Approved { reason }
    } else if head.eq_ignore_ascii_case("no") {
        Verdict::Rejected { reason }
    } else {
        Verdict::Inconclusive {
            raw: reply.trim().to_string(),
        }
    }
}
