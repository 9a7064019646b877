// ABOUTME: Lexer — source text to token stream, grounded on MBASIC's number/string/identifier rules

use crate::error::LexError;
use crate::token::{lookup_keyword, KeywordCase, Token, TokenKind, TokenValue};

const MAX_LINE_NUMBER: i64 = 65529;

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    at_line_start: bool,
    keyword_case: KeywordCase,
    first_casing: std::collections::HashMap<String, String>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, keyword_case: KeywordCase) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            at_line_start: true,
            keyword_case,
            first_casing: std::collections::HashMap::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_control_and_space(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') => {
                    self.advance();
                }
                // Control bytes <32 other than tab/newline/CR are dropped
                // silently (spec §4.C, §4.M; original_source/lexer.py).
                Some(c) if c < 32 && c != b'\t' && c != b'\n' && c != b'\r' => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_control_and_space();

        let (line, column) = (self.line, self.column);

        let c = match self.peek() {
            None => return Ok(Token::new(TokenKind::Eof, TokenValue::None, line, column)),
            Some(c) => c,
        };

        if c == b'\r' {
            self.advance();
            if self.peek() == Some(b'\n') {
                self.advance();
            }
            self.at_line_start = true;
            return Ok(Token::new(TokenKind::Newline, TokenValue::None, line, column));
        }
        if c == b'\n' {
            self.advance();
            self.at_line_start = true;
            return Ok(Token::new(TokenKind::Newline, TokenValue::None, line, column));
        }

        if c.is_ascii_digit() && self.at_line_start {
            self.at_line_start = false;
            return self.read_line_number();
        }

        if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())) {
            self.at_line_start = false;
            return self.read_number();
        }

        if c == b'&' {
            self.at_line_start = false;
            return self.read_radix_number();
        }

        if c == b'"' {
            self.at_line_start = false;
            return self.read_string();
        }

        if c.is_ascii_alphabetic() {
            self.at_line_start = false;
            return self.read_identifier();
        }

        if c == b'\'' {
            self.skip_comment();
            return self.next_token();
        }

        self.at_line_start = false;
        self.read_punctuation()
    }

    fn read_line_number(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        let value: i64 = text.parse().unwrap_or(i64::MAX);
        if value > MAX_LINE_NUMBER {
            return Err(LexError::LineNumberTooLarge { value, line });
        }
        Ok(Token::new(
            TokenKind::LineNumber,
            TokenValue::Integer(value),
            line,
            column,
        ))
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        let mut is_float = false;

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some(b'.') {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'E') | Some(b'e') | Some(b'D') | Some(b'd')) {
            is_float = true;
            let exp_start = self.pos;
            self.advance();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.advance();
            }
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            if self.pos == digits_start {
                return Err(LexError::InvalidNumber {
                    line,
                    column,
                    detail: format!(
                        "exponent marker with no digits near {:?}",
                        std::str::from_utf8(&self.src[exp_start..self.pos]).unwrap_or("?")
                    ),
                });
            }
        }

        let mut text: String = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap()
            .to_string();

        let suffix = match self.peek() {
            Some(b'%') if !is_float => {
                self.advance();
                Some('%')
            }
            Some(b'!') => {
                self.advance();
                Some('!')
            }
            Some(b'#') => {
                self.advance();
                Some('#')
            }
            _ => None,
        };

        // 'D' marks a DOUBLE exponent but parses as ordinary scientific
        // notation once normalized to 'E' (original_source/lexer.py).
        let is_double_marked = text.contains('D') || text.contains('d');
        text = text.replace(['D', 'd'], "E");

        if is_float || suffix == Some('#') || is_double_marked {
            let f: f64 = text.parse().map_err(|_| LexError::InvalidNumber {
                line,
                column,
                detail: text.clone(),
            })?;
            let value = if suffix == Some('#') || is_double_marked {
                TokenValue::Real(f)
            } else {
                TokenValue::Real(f)
            };
            return Ok(Token::new(TokenKind::Number, value, line, column));
        }

        let n: i64 = text.parse().map_err(|_| LexError::InvalidNumber {
            line,
            column,
            detail: text.clone(),
        })?;
        Ok(Token::new(TokenKind::Number, TokenValue::Integer(n), line, column))
    }

    fn read_radix_number(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // consume '&'
        match self.peek() {
            Some(b'H') | Some(b'h') => {
                self.advance();
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                    self.advance();
                }
                let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
                let n = i64::from_str_radix(text, 16).map_err(|_| LexError::InvalidNumber {
                    line,
                    column,
                    detail: format!("&H{text}"),
                })?;
                Ok(Token::new(TokenKind::Number, TokenValue::Integer(n), line, column))
            }
            Some(b'O') | Some(b'o') => {
                self.advance();
                self.read_octal_digits(line, column)
            }
            Some(c) if c.is_ascii_digit() => self.read_octal_digits(line, column),
            _ => {
                // standalone '&' is its own token (original_source/lexer.py)
                Ok(Token::new(TokenKind::Hash, TokenValue::None, line, column))
            }
        }
    }

    fn read_octal_digits(&mut self, line: u32, column: u32) -> Result<Token, LexError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| (b'0'..=b'7').contains(&c)) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        let n = i64::from_str_radix(text, 8).map_err(|_| LexError::InvalidNumber {
            line,
            column,
            detail: format!("&O{text}"),
        })?;
        Ok(Token::new(TokenKind::Number, TokenValue::Integer(n), line, column))
    }

    fn read_string(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Err(LexError::UnterminatedString { line, column });
                }
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(_) => {
                    s.push(self.advance().unwrap() as char);
                }
            }
        }
        Ok(Token::new(TokenKind::String, TokenValue::Text(s), line, column))
    }

    fn read_identifier(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'.')
        {
            self.advance();
        }
        let mut text = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap()
            .to_string();

        if matches!(self.peek(), Some(b'$') | Some(b'%') | Some(b'!') | Some(b'#')) {
            text.push(self.advance().unwrap() as char);
        }

        let upper = text.to_uppercase();
        if let Some(kw) = lookup_keyword(&upper) {
            let canonical = self.apply_keyword_case(&text, &upper, line)?;
            return Ok(Token::new(kw, TokenValue::Text(canonical), line, column));
        }

        Ok(Token::new(TokenKind::Identifier, TokenValue::Text(text), line, column))
    }

    fn apply_keyword_case(&mut self, text: &str, upper: &str, line: u32) -> Result<String, LexError> {
        match self.keyword_case {
            KeywordCase::ForceLower => Ok(upper.to_lowercase()),
            KeywordCase::ForceUpper => Ok(upper.to_string()),
            KeywordCase::Preserve => Ok(text.to_string()),
            KeywordCase::FirstWins => {
                Ok(self
                    .first_casing
                    .entry(upper.to_string())
                    .or_insert_with(|| text.to_string())
                    .clone())
            }
            KeywordCase::Error => {
                if let Some(first) = self.first_casing.get(upper) {
                    if first != text {
                        return Err(LexError::KeywordCaseMismatch {
                            ident: text.to_string(),
                            canonical: first.clone(),
                            line,
                        });
                    }
                    Ok(first.clone())
                } else {
                    self.first_casing.insert(upper.to_string(), text.to_string());
                    Ok(text.to_string())
                }
            }
        }
    }

    fn skip_comment(&mut self) {
        while self.peek().is_some() && self.peek() != Some(b'\n') {
            self.advance();
        }
    }

    fn read_punctuation(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let c = self.advance().unwrap();
        use TokenKind::*;
        let kind = match c {
            b'+' => Plus,
            b'-' => Minus,
            b'*' => Star,
            b'/' => Slash,
            b'\\' => Backslash,
            b'^' => Caret,
            b'=' => Equal,
            b'<' => match self.peek() {
                Some(b'>') => {
                    self.advance();
                    NotEqual
                }
                Some(b'=') => {
                    self.advance();
                    LessEqual
                }
                _ => Less,
            },
            b'>' => match self.peek() {
                Some(b'<') => {
                    self.advance();
                    NotEqual
                }
                Some(b'=') => {
                    self.advance();
                    GreaterEqual
                }
                _ => Greater,
            },
            b'(' => LParen,
            b')' => RParen,
            b',' => Comma,
            b';' => Semicolon,
            b':' => {
                self.at_line_start = false;
                Colon
            }
            b'#' => Hash,
            b'?' => Question,
            other => {
                return Err(LexError::UnexpectedChar {
                    ch: other as char,
                    line,
                    column,
                })
            }
        };
        Ok(Token::new(kind, TokenValue::None, line, column))
    }
}

pub fn tokenize(src: &str, keyword_case: KeywordCase) -> Result<Vec<Token>, LexError> {
    Lexer::new(src, keyword_case).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, KeywordCase::Preserve)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn line_number_only_at_line_start() {
        let toks = tokenize("10 PRINT 5", KeywordCase::Preserve).unwrap();
        assert_eq!(toks[0].kind, TokenKind::LineNumber);
        assert_eq!(toks[1].kind, TokenKind::Print);
        assert_eq!(toks[2].kind, TokenKind::Number);
    }

    #[test]
    fn line_number_over_max_errors() {
        let err = tokenize("65530 END", KeywordCase::Preserve).unwrap_err();
        assert!(matches!(err, LexError::LineNumberTooLarge { .. }));
    }

    #[test]
    fn hex_and_octal_literals() {
        let toks = tokenize("10 X = &H1A : Y = &O17", KeywordCase::Preserve).unwrap();
        let nums: Vec<_> = toks
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .collect();
        assert_eq!(nums[0].value, TokenValue::Integer(26));
        assert_eq!(nums[1].value, TokenValue::Integer(15));
    }

    #[test]
    fn float_with_d_exponent_parses_as_double() {
        let toks = tokenize("10 X = 1.5D2", KeywordCase::Preserve).unwrap();
        let n = toks.iter().find(|t| t.kind == TokenKind::Number).unwrap();
        assert_eq!(n.value, TokenValue::Real(150.0));
    }

    #[test]
    fn not_equal_both_spellings() {
        assert_eq!(kinds("10 IF A<>B THEN 20"), kinds("10 IF A><B THEN 20"));
    }

    #[test]
    fn unterminated_string_errors() {
        let err = tokenize("10 PRINT \"abc", KeywordCase::Preserve).unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { .. }));
    }

    #[test]
    fn identifier_suffix_ends_identifier() {
        let toks = tokenize("10 LET A$ = \"x\"", KeywordCase::Preserve).unwrap();
        let ident = toks.iter().find(|t| t.kind == TokenKind::Identifier).unwrap();
        assert_eq!(ident.text(), "A$");
    }

    #[test]
    fn control_bytes_are_dropped_silently() {
        let toks = tokenize("10 PRINT\u{01} 5", KeywordCase::Preserve).unwrap();
        assert!(toks.iter().all(|t| t.kind != TokenKind::Eof || true));
        // No error raised; the control byte is simply absent from output.
        assert_eq!(toks[2].kind, TokenKind::Number);
    }

    #[test]
    fn apostrophe_starts_comment_to_end_of_line() {
        let toks = tokenize("10 PRINT 5 ' trailing remark\n20 END", KeywordCase::Preserve).unwrap();
        assert_eq!(toks[0].kind, TokenKind::LineNumber);
        assert_eq!(toks[1].kind, TokenKind::Print);
        assert_eq!(toks[2].kind, TokenKind::Number);
        assert_eq!(toks[3].kind, TokenKind::Newline);
        assert_eq!(toks[4].kind, TokenKind::LineNumber);
    }

    #[test]
    fn keyword_case_error_mode_rejects_mismatch() {
        let err = tokenize("10 print 5\n20 PRINT 6", KeywordCase::Error).unwrap_err();
        assert!(matches!(err, LexError::KeywordCaseMismatch { .. }));
    }

    #[test]
    fn keyword_case_first_wins_folds_later_occurrences() {
        let toks = tokenize("10 print 5\n20 PRINT 6", KeywordCase::FirstWins).unwrap();
        let prints: Vec<_> = toks.iter().filter(|t| t.kind == TokenKind::Print).collect();
        assert_eq!(prints[0].text(), "print");
        assert_eq!(prints[1].text(), "print");
    }
}
