//! Undo one layer of string-literal quoting, if present.

/// Decode `s` as a quoted JSON string literal; return it unchanged otherwise.
///
/// The engine double-encodes some text fields, so a stdout value may itself
/// be a quoted literal. Anything that does not decode cleanly is kept raw.
pub fn best_effort_unquote(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() < 2 || !trimmed.starts_with('"') || !trimmed.ends_with('"') {
        return s.to_string();
    }
    serde_json::from_str::<String>(trimmed).unwrap_or_else(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquotes_a_quoted_literal() {
        assert_eq!(best_effort_unquote("\"Washington, D.C.\""), "Washington, D.C.");
        assert_eq!(best_effort_unquote("\"line\\nbreak \\u00e9\""), "line\nbreak é");
    }

    #[test]
    fn raw_text_is_returned_unchanged() {
        assert_eq!(best_effort_unquote("plain text"), "plain text");
        assert_eq!(best_effort_unquote("\""), "\"");
        assert_eq!(best_effort_unquote(""), "");
    }

    #[test]
    fn invalid_escapes_fall_back_to_raw() {
        let raw = "\"bad \\q escape\"";
        assert_eq!(best_effort_unquote(raw), raw);
    }

    #[test]
    fn only_one_layer_is_removed() {
        assert_eq!(best_effort_unquote("\"\\\"inner\\\"\""), "\"inner\"");
    }
}
