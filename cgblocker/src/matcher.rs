//! Keyword matching: case-insensitive substring containment.

/// Returns the first keyword contained in `text`, ignoring case.
///
/// Blank text never matches, and neither does a blank keyword.
pub fn match_keyword<'k>(text: &str, keywords: &'k [String]) -> Option<&'k str> {
    if text.trim().is_empty() {
        return None;
    }

    let text = text.to_lowercase();
    keywords
        .iter()
        .map(|k| k.as_str())
        .filter(|k| !k.trim().is_empty())
        .find(|k| text.contains(&k.to_lowercase()))
}

pub fn is_blocked_text(text: &str, keywords: &[String]) -> bool {
    match_keyword(text, keywords).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_substring_match_ignores_case() {
        let keywords = kw(&["minecraft", "ender dragon"]);
        assert_eq!(
            match_keyword("Best MINECRAFT builds 2024", &keywords),
            Some("minecraft")
        );
        assert!(is_blocked_text("Defeating the Ender Dragon", &keywords));
        assert!(is_blocked_text("xXMinecraftXx", &keywords));
    }

    #[test]
    fn test_uppercase_keyword_still_matches() {
        let keywords = kw(&["Creeper"]);
        assert!(is_blocked_text("creeper aw man", &keywords));
    }

    #[test]
    fn test_no_match() {
        let keywords = kw(&["minecraft"]);
        assert_eq!(match_keyword("Peppa Pig", &keywords), None);
    }

    #[test]
    fn test_empty_text_never_matches() {
        let keywords = kw(&["minecraft"]);
        assert!(!is_blocked_text("", &keywords));
        assert!(!is_blocked_text("   ", &keywords));
    }

    #[test]
    fn test_empty_keyword_never_matches() {
        let keywords = kw(&["", "  "]);
        assert!(!is_blocked_text("anything at all", &keywords));
        assert!(!is_blocked_text("anything", &[]));
    }

    #[test]
    fn test_first_matching_keyword_wins() {
        let keywords = kw(&["zombie", "steve"]);
        assert_eq!(
            match_keyword("Steve vs Zombie", &keywords),
            Some("zombie")
        );
    }
}
