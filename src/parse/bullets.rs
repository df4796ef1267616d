//! Bulleted-list extraction for object listings.

use regex::Regex;
use std::sync::OnceLock;

fn bullet_pattern() -> &'static Regex {
    static BULLET: OnceLock<Regex> = OnceLock::new();
    BULLET.get_or_init(|| Regex::new(r"^(-|\*|•|\d+[.)])\s+").expect("valid bullet regex"))
}

/// Parses bullet lines (`-`, `*`, `•`, `N.`, `N)`) into an ordered list.
///
/// Non-bullet lines are dropped, markers are stripped and empty items are
/// skipped. The list is not capped; any length limit is only requested in
/// the instruction text.
pub fn parse_bullet_list(text: &str) -> Vec<String> {
    let pattern = bullet_pattern();
    text.trim()
        .lines()
        .map(str::trim)
        .filter(|line| pattern.is_match(line))
        .map(|line| pattern.replace(line, "").trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
