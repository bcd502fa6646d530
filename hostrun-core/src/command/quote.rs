//! POSIX shell quoting

/// Returns true if `s` needs no quoting in a POSIX shell
pub fn is_simple_word(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| {
            matches!(c,
                'a'..='z' | 'A'..='Z' | '0'..='9'
                | '_' | '-' | '.' | '/' | ':' | '+' | '%' | '@' | '=' | ',')
        })
}

/// Quotes `s` so a POSIX shell reads it back as a single literal word
///
/// Simple words are returned unchanged; everything else is wrapped in single
/// quotes with embedded single quotes rewritten as `'"'"'`.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if is_simple_word(s) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}
