// ABOUTME: Syntax highlighter for the REPL with color support
// Implements rustyline's Highlighter trait to provide ANSI color codes
// for MBASIC syntax elements while preserving display width

use crate::token::lookup_keyword;
use rustyline::completion::Completer;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::Helper;
use std::borrow::Cow;
use std::collections::HashSet;

// ANSI color codes (3-bit/4-bit for maximum terminal compatibility)
const COLOR_RESET: &str = "\x1b[0m";
const COLOR_PARENS: &str = "\x1b[1;34m"; // Bold blue
const COLOR_KEYWORD: &str = "\x1b[1;35m"; // Bold magenta
const COLOR_BUILTIN: &str = "\x1b[36m"; // Cyan
const COLOR_NUMBER: &str = "\x1b[33m"; // Yellow
const COLOR_STRING: &str = "\x1b[32m"; // Green
const COLOR_COMMENT: &str = "\x1b[90m"; // Bright black (gray)
const COLOR_LINE_NUMBER: &str = "\x1b[1;34m"; // Bold blue

/// Main highlighter helper for the BASIC REPL. Provides syntax-aware
/// color highlighting modeled on the crate's own lexical classes
/// rather than a generic tokenizer.
pub struct BasicHelper;

impl BasicHelper {
    pub fn new() -> Self {
        BasicHelper
    }
}

impl Default for BasicHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl Helper for BasicHelper {}

impl Completer for BasicHelper {
    type Candidate = String;
}

impl Hinter for BasicHelper {
    type Hint = String;
}

impl Validator for BasicHelper {}

impl Highlighter for BasicHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let builtins = get_builtin_functions();
        let highlighted = highlight_line(line, &builtins);

        if highlighted == line {
            Cow::Borrowed(line)
        } else {
            Cow::Owned(highlighted)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

/// Tokenize a line by hand and apply syntax highlighting. Deliberately
/// tolerant of malformed input (unterminated strings, bare `&`, stray
/// punctuation) since this runs on every keystroke of a line still being
/// typed, not on a finished program (contrast `crate::lexer`, which is
/// strict and only ever sees complete lines).
fn highlight_line(line: &str, builtins: &HashSet<&'static str>) -> String {
    let mut result = String::new();
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    let mut at_line_start = true;

    while i < chars.len() {
        match chars[i] {
            c if c.is_ascii_digit() && at_line_start => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                result.push_str(COLOR_LINE_NUMBER);
                result.push_str(&text);
                result.push_str(COLOR_RESET);
                at_line_start = false;
            }

            '\'' => {
                result.push_str(COLOR_COMMENT);
                while i < chars.len() {
                    result.push(chars[i]);
                    i += 1;
                }
                result.push_str(COLOR_RESET);
            }

            '"' => {
                result.push_str(COLOR_STRING);
                result.push('"');
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == '"' {
                        result.push('"');
                        i += 1;
                        closed = true;
                        break;
                    }
                    result.push(chars[i]);
                    i += 1;
                }
                result.push_str(COLOR_RESET);
                let _ = closed; // unterminated strings still get colored to EOL
                at_line_start = false;
            }

            c if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i < chars.len() && chars[i] == '.' {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                if i < chars.len() && matches!(chars[i], 'E' | 'e' | 'D' | 'd') {
                    i += 1;
                    if i < chars.len() && matches!(chars[i], '+' | '-') {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                if i < chars.len() && matches!(chars[i], '%' | '!' | '#') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                result.push_str(COLOR_NUMBER);
                result.push_str(&text);
                result.push_str(COLOR_RESET);
                at_line_start = false;
            }

            '&' if matches!(chars.get(i + 1), Some('H') | Some('h') | Some('O') | Some('o')) => {
                let start = i;
                i += 2;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                result.push_str(COLOR_NUMBER);
                result.push_str(&text);
                result.push_str(COLOR_RESET);
                at_line_start = false;
            }

            '(' | ')' => {
                result.push_str(COLOR_PARENS);
                result.push(chars[i]);
                i += 1;
                result.push_str(COLOR_RESET);
            }

            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && matches!(chars[i], '$' | '%' | '!' | '#') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let upper = text.to_ascii_uppercase();

                if upper == "REM" {
                    result.push_str(COLOR_KEYWORD);
                    result.push_str(&text);
                    result.push_str(COLOR_RESET);
                    result.push_str(COLOR_COMMENT);
                    while i < chars.len() {
                        result.push(chars[i]);
                        i += 1;
                    }
                    result.push_str(COLOR_RESET);
                } else if lookup_keyword(&upper).is_some() {
                    result.push_str(COLOR_KEYWORD);
                    result.push_str(&text);
                    result.push_str(COLOR_RESET);
                } else if builtins.contains(upper.as_str()) {
                    result.push_str(COLOR_BUILTIN);
                    result.push_str(&text);
                    result.push_str(COLOR_RESET);
                } else {
                    result.push_str(&text);
                }
                at_line_start = false;
            }

            c => {
                result.push(c);
                i += 1;
                if !c.is_whitespace() {
                    at_line_start = false;
                }
            }
        }
    }

    result
}

/// Names recognized by `crate::builtins` (spec §4.G), used to color
/// built-in function calls distinctly from plain variable references.
fn get_builtin_functions() -> HashSet<&'static str> {
    [
        "ABS", "ATN", "COS", "EXP", "FIX", "INT", "LOG", "RND", "SGN", "SIN", "SQR", "TAN",
        "ASC", "CHR$", "HEX$", "INSTR", "LEFT$", "LEN", "MID$", "OCT$", "RIGHT$", "SPACE$",
        "SPC", "STR$", "STRING$", "TAB", "VAL",
        "CDBL", "CINT", "CSNG", "CVD", "CVI", "CVS", "MKD$", "MKI$", "MKS$",
        "EOF", "INKEY$", "INPUT$", "LOC", "LOF", "LPOS", "POS",
        "FRE", "INP", "PEEK", "USR", "VARPTR",
    ]
    .iter()
    .copied()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_number_is_colored() {
        let highlighted = highlight_line("10 PRINT 5", &get_builtin_functions());
        assert!(highlighted.contains(COLOR_LINE_NUMBER));
    }

    #[test]
    fn keyword_is_colored() {
        let highlighted = highlight_line("10 PRINT 5", &get_builtin_functions());
        assert!(highlighted.contains(COLOR_KEYWORD));
    }

    #[test]
    fn string_literal_is_colored() {
        let highlighted = highlight_line("10 PRINT \"hello\"", &get_builtin_functions());
        assert!(highlighted.contains(COLOR_STRING));
    }

    #[test]
    fn number_is_colored() {
        let highlighted = highlight_line("X = 3.14", &get_builtin_functions());
        assert!(highlighted.contains(COLOR_NUMBER));
    }

    #[test]
    fn builtin_function_is_colored() {
        let highlighted = highlight_line("PRINT LEN(A$)", &get_builtin_functions());
        assert!(highlighted.contains(COLOR_BUILTIN));
    }

    #[test]
    fn apostrophe_comment_is_colored() {
        let highlighted = highlight_line("10 PRINT 5 ' trailing remark", &get_builtin_functions());
        assert!(highlighted.contains(COLOR_COMMENT));
    }

    #[test]
    fn rem_comment_is_colored() {
        let highlighted = highlight_line("10 REM a note", &get_builtin_functions());
        assert!(highlighted.contains(COLOR_KEYWORD));
        assert!(highlighted.contains(COLOR_COMMENT));
    }

    #[test]
    fn plain_variable_is_unstyled() {
        let highlighted = highlight_line("FOOBAR", &get_builtin_functions());
        assert_eq!(highlighted, "FOOBAR");
    }
}
