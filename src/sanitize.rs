//! Input sanitizer (spec §4.M): strips control bytes that never carry BASIC
//! source meaning and clears the legacy parity (high) bit left by 7-bit
//! serial transfers, so a program line loaded from an old capture decodes
//! the same characters it would have displayed on a terminal of the era.
//!
//! Grounded on `original_source/tests/test_input_sanitization.py`: parity is
//! cleared before control-byte filtering (a parity-shifted letter becomes a
//! plain letter rather than being dropped as a control byte).

/// A character is valid BASIC source input if it's printable ASCII (32-126)
/// or one of the three whitespace control codes BASIC text actually uses.
pub fn is_valid_input_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || matches!(c as u32, 0x20..=0x7E)
}

/// Clears bit 7 of a single character, undoing a 7-bit serial link's parity
/// stamp (`chr(193)` → `'A'`).
pub fn clear_parity(c: char) -> char {
    let b = c as u32;
    if b > 0x7F && b <= 0xFF {
        char::from_u32(b & 0x7F).unwrap_or(c)
    } else {
        c
    }
}

/// Applies [`clear_parity`] to every character in `text`.
pub fn clear_parity_all(text: &str) -> String {
    text.chars().map(clear_parity).collect()
}

/// Drops every character [`is_valid_input_char`] rejects.
pub fn sanitize_input(text: &str) -> String {
    text.chars().filter(|&c| is_valid_input_char(c)).collect()
}

/// Runs the full pipeline: parity clear, then control-byte filtering.
/// Returns the cleaned text and whether it differs from the input.
pub fn sanitize_and_clear_parity(text: &str) -> (String, bool) {
    let parity_cleared = clear_parity_all(text);
    let result = sanitize_input(&parity_cleared);
    let modified = result != text;
    (result, modified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_chars_accepted() {
        assert!(is_valid_input_char('A'));
        assert!(is_valid_input_char(' '));
        assert!(is_valid_input_char('\n'));
        assert!(is_valid_input_char('\t'));
        assert!(is_valid_input_char('\r'));
        assert!(is_valid_input_char('"'));
    }

    #[test]
    fn control_and_extended_chars_rejected() {
        assert!(!is_valid_input_char('\u{0}'));
        assert!(!is_valid_input_char('\u{1}'));
        assert!(!is_valid_input_char('\u{7}'));
        assert!(!is_valid_input_char('\u{7F}'));
        assert!(!is_valid_input_char('\u{80}'));
        assert!(!is_valid_input_char('\u{FF}'));
    }

    #[test]
    fn sanitize_input_removes_control_bytes_but_keeps_whitespace() {
        assert_eq!(sanitize_input("PRINT\u{1}\"Hello\""), "PRINT\"Hello\"");
        assert_eq!(sanitize_input("Line1\nLine2"), "Line1\nLine2");
        assert_eq!(sanitize_input("A\tB"), "A\tB");
    }

    #[test]
    fn clear_parity_strips_high_bit() {
        assert_eq!(clear_parity('\u{C1}'), 'A');
        assert_eq!(clear_parity('\u{C2}'), 'B');
        assert_eq!(clear_parity('A'), 'A');
    }

    #[test]
    fn combined_pipeline_clears_parity_before_filtering() {
        let mixed = "\u{C1}\u{1}\u{C2}\u{2}\u{C3}";
        let (result, modified) = sanitize_and_clear_parity(mixed);
        assert_eq!(result, "ABC");
        assert!(modified);
    }

    #[test]
    fn clean_program_is_unmodified() {
        let program = "10 PRINT \"HELLO\"\n20 FOR I=1 TO 10\n30 NEXT I";
        let (result, modified) = sanitize_and_clear_parity(program);
        assert_eq!(result, program);
        assert!(!modified);
    }

    #[test]
    fn crlf_and_trailing_whitespace_preserved() {
        let dos_file = "10 PRINT \"TEST\"\r\n20 END\r\n";
        let (result, modified) = sanitize_and_clear_parity(dos_file);
        assert_eq!(result, dos_file);
        assert!(!modified);
    }
}
