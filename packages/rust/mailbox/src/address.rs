//! Address-list header parsing.

use std::sync::LazyLock;

use regex::Regex;

/// Pragmatic address shape check (not full RFC 5322).
static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid address regex"));

/// Whether `candidate` looks like a deliverable address.
pub fn is_valid_address(candidate: &str) -> bool {
    ADDRESS_RE.is_match(candidate)
}

/// Extract the addresses from a `To`/`Cc`/`Bcc` header value.
///
/// Handles `Name <addr>`, bare addresses, quoted display names containing
/// commas and `(comments)`. Malformed entries are skipped.
pub fn parse_address_list(value: &str) -> Vec<String> {
    split_top_level(value)
        .into_iter()
        .filter_map(|entry| extract_address(&entry))
        .filter(|addr| is_valid_address(addr))
        .collect()
}

/// Split on commas that are outside quotes, angle brackets and comments.
fn split_top_level(value: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut angle_depth = 0usize;
    let mut comment_depth = 0usize;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' if comment_depth == 0 => in_quotes = !in_quotes,
            '<' if !in_quotes && comment_depth == 0 => angle_depth += 1,
            '>' if !in_quotes && comment_depth == 0 => angle_depth = angle_depth.saturating_sub(1),
            '(' if !in_quotes => comment_depth += 1,
            ')' if !in_quotes => comment_depth = comment_depth.saturating_sub(1),
            ',' if !in_quotes && angle_depth == 0 && comment_depth == 0 => {
                entries.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    entries.push(current);
    entries
}

/// Pull the address out of a single `Name <addr>` or bare entry.
fn extract_address(entry: &str) -> Option<String> {
    let entry = strip_comments(entry);
    let entry = entry.trim();

    let addr = match (entry.rfind('<'), entry.rfind('>')) {
        (Some(open), Some(close)) if open < close => &entry[open + 1..close],
        _ => entry,
    };

    let addr = addr.trim().trim_matches('"').trim();
    (!addr.is_empty()).then(|| addr.to_string())
}

fn strip_comments(entry: &str) -> String {
    let mut out = String::with_capacity(entry.len());
    let mut depth = 0usize;
    let mut in_quotes = false;
    for c in entry.chars() {
        match c {
            '"' if depth == 0 => {
                in_quotes = !in_quotes;
                out.push(c);
            }
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_and_named_addresses() {
        let parsed = parse_address_list("Alice <alice@company.com>, bob@company.com");
        assert_eq!(parsed, vec!["alice@company.com", "bob@company.com"]);
    }

    #[test]
    fn quoted_display_name_with_comma() {
        let parsed = parse_address_list(r#""Smith, Alice" <alice.smith@company.com>, "Jones, Bob" <bob.jones@example.org>"#);
        assert_eq!(parsed, vec!["alice.smith@company.com", "bob.jones@example.org"]);
    }

    #[test]
    fn comments_are_ignored() {
        let parsed = parse_address_list("carol@startup.io (Carol, CTO), eve@research.org");
        assert_eq!(parsed, vec!["carol@startup.io", "eve@research.org"]);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let parsed = parse_address_list("undisclosed-recipients:;, not-an-address, <>, frank@consulting.com");
        assert_eq!(parsed, vec!["frank@consulting.com"]);
    }

    #[test]
    fn validation_requires_dotted_domain() {
        assert!(is_valid_address("david@tech.io"));
        assert!(!is_valid_address("david@localhost"));
        assert!(!is_valid_address("da vid@tech.io"));
        assert!(!is_valid_address(""));
    }
}
