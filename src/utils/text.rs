use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Collapses internal whitespace runs to a single space and trims both ends.
pub fn collapse_whitespace(line: &str) -> String {
    WHITESPACE_RUN.replace_all(line.trim(), " ").into_owned()
}

/// Cleans a block of page text: every line is whitespace-collapsed and blank lines are dropped.
pub fn clean_block(text: &str) -> String {
    text.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Returns the first `max_chars` characters of `s` (not bytes).
pub fn take_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Truncates `s` to at most `max_chars` characters, appending `suffix` when something was cut.
/// The suffix is counted against the budget whenever there is room for it.
pub fn truncate_chars(s: &str, max_chars: usize, suffix: &str) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }

    let suffix_chars = suffix.chars().count();
    if max_chars <= suffix_chars {
        return take_chars(s, max_chars).to_string();
    }

    let head = take_chars(s, max_chars - suffix_chars);
    let mut out = String::with_capacity(head.len() + suffix.len());
    out.push_str(head);
    out.push_str(suffix);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_runs_and_trims() {
        assert_eq!(collapse_whitespace("  a \t b\u{a0}  c  "), "a b c");
    }

    #[test]
    fn clean_block_drops_blank_lines() {
        let raw = "Section 1   Grace\n   \n\nPremium   due\n";
        assert_eq!(clean_block(raw), "Section 1 Grace\nPremium due");
    }

    #[test]
    fn take_chars_respects_char_boundaries() {
        assert_eq!(take_chars("保険料abc", 2), "保険");
        assert_eq!(take_chars("abc", 10), "abc");
        assert_eq!(take_chars("abc", 0), "");
    }

    #[test]
    fn truncate_appends_suffix_within_budget() {
        let out = truncate_chars("abcdefghij", 8, "..");
        assert_eq!(out, "abcdef..");
        assert_eq!(truncate_chars("abc", 8, ".."), "abc");
        assert_eq!(truncate_chars("abcdef", 1, "..."), "a");
    }
}
