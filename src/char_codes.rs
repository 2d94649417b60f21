//! Character classification for the declaration scanner.
//!
//! Positions throughout the pipeline are byte offsets into UTF-8 text.
//! Declaration files are overwhelmingly ASCII; the classifiers below take the
//! fast ASCII path first and fall back to Unicode checks only for multi-byte
//! characters.

/// True if `c` can start an identifier (`A-Z a-z _ $`, or a Unicode letter).
pub fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$' || (!c.is_ascii() && c.is_alphabetic())
}

/// True if `c` can continue an identifier.
pub fn is_identifier_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || (!c.is_ascii() && c.is_alphanumeric())
}

/// True if `c` is horizontal whitespace (no line terminators).
pub fn is_whitespace_single_line(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t' | '\u{000B}' | '\u{000C}' | '\u{00A0}' | '\u{FEFF}'
    ) || (!c.is_ascii() && c.is_whitespace() && !is_line_break(c))
}

/// True if `c` terminates a line.
pub fn is_line_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// True if every character of `text` is a valid identifier, with a valid
/// start character.
pub fn is_identifier_text(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if is_identifier_start(first) => chars.all(is_identifier_part),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_classification() {
        assert!(is_identifier_start('a'));
        assert!(is_identifier_start('$'));
        assert!(is_identifier_start('_'));
        assert!(!is_identifier_start('1'));
        assert!(is_identifier_part('1'));
        assert!(!is_identifier_part('-'));
    }

    #[test]
    fn identifier_text() {
        assert!(is_identifier_text("export_default"));
        assert!(is_identifier_text("$foo1"));
        assert!(!is_identifier_text("1abc"));
        assert!(!is_identifier_text(""));
        assert!(!is_identifier_text("foo-bar"));
    }

    #[test]
    fn line_breaks() {
        assert!(is_line_break('\n'));
        assert!(is_line_break('\u{2028}'));
        assert!(!is_line_break(' '));
        assert!(is_whitespace_single_line('\t'));
        assert!(!is_whitespace_single_line('\n'));
    }
}
