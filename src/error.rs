// ABOUTME: Error taxonomy — lex/parse errors and the runtime error taxonomy from spec §4.H

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LexError {
    #[error("unterminated string at line {line}, column {column}")]
    UnterminatedString { line: u32, column: u32 },

    #[error("invalid number format at line {line}, column {column}: {detail}")]
    InvalidNumber {
        line: u32,
        column: u32,
        detail: String,
    },

    #[error("line number {value} exceeds maximum 65529 at line {line}")]
    LineNumberTooLarge { value: i64, line: u32 },

    #[error("unexpected character {ch:?} at line {line}, column {column}")]
    UnexpectedChar { ch: char, line: u32, column: u32 },

    #[error("keyword case policy violation: {ident:?} at line {line} does not match first occurrence {canonical:?}")]
    KeywordCaseMismatch {
        ident: String,
        canonical: String,
        line: u32,
    },
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("syntax error at line {line}, column {column}: expected {expected}, found {found}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub expected: String,
    pub found: String,
}

impl ParseError {
    pub fn new(
        line: u32,
        column: u32,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        ParseError {
            line,
            column,
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Runtime error taxonomy (spec §4.H). Each variant's historical MBASIC
/// numeric `ERR` code is fixed by `code()` below (spec §9 open question:
/// "the historical MBASIC numeric codes should be preserved").
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BasicError {
    #[error("Type mismatch")]
    TypeMismatch,
    #[error("Overflow")]
    Overflow,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Subscript out of range")]
    SubscriptOutOfRange,
    #[error("Duplicate definition")]
    DuplicateDefinition,
    #[error("Out of data")]
    OutOfData,
    #[error("Undefined line {0}")]
    UndefinedLine(u32),
    #[error("Return without gosub")]
    ReturnWithoutGosub,
    #[error("Next without for")]
    NextWithoutFor,
    #[error("Wend without while")]
    WendWithoutWhile,
    #[error("Resume without error")]
    ResumeWithoutError,
    #[error("File not found")]
    FileNotFound,
    #[error("Bad file number")]
    BadFileNumber,
    #[error("Disk full")]
    DiskFull,
    #[error("Input past end")]
    InputPastEnd,
    #[error("Illegal function call")]
    IllegalFunctionCall,
    #[error("String too long")]
    StringTooLong,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("No resume")]
    NoResume,
    #[error("Gosub too deeply nested")]
    GosubStackOverflow,
    #[error("For too deeply nested")]
    ForStackOverflow,
    #[error("While too deeply nested")]
    WhileStackOverflow,
    #[error("Execution timed out")]
    TimeoutError,
    #[error("Break")]
    Interrupted,
}

impl BasicError {
    /// Historical MBASIC 5.21 `ERR` numeric codes (spec §9: names are
    /// authoritative, numbers are preserved for callers that rely on them).
    pub fn code(&self) -> u16 {
        match self {
            BasicError::NextWithoutFor => 1,
            BasicError::Interrupted => 3,
            BasicError::OutOfData => 4,
            BasicError::IllegalFunctionCall => 5,
            BasicError::Overflow => 6,
            BasicError::OutOfMemory => 7,
            BasicError::UndefinedLine(_) => 8,
            BasicError::SubscriptOutOfRange => 9,
            BasicError::DuplicateDefinition => 10,
            BasicError::DivisionByZero => 11,
            BasicError::TypeMismatch => 13,
            BasicError::StringTooLong => 15,
            BasicError::ResumeWithoutError => 20,
            BasicError::ReturnWithoutGosub => 3,
            BasicError::WendWithoutWhile => 29,
            BasicError::BadFileNumber => 52,
            BasicError::FileNotFound => 53,
            BasicError::DiskFull => 61,
            BasicError::InputPastEnd => 62,
            BasicError::GosubStackOverflow
            | BasicError::ForStackOverflow
            | BasicError::WhileStackOverflow => 28,
            BasicError::NoResume => 19,
            BasicError::TimeoutError => 100,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BasicError::TypeMismatch => "TYPE_MISMATCH",
            BasicError::Overflow => "OVERFLOW",
            BasicError::DivisionByZero => "DIVISION_BY_ZERO",
            BasicError::SubscriptOutOfRange => "SUBSCRIPT_OUT_OF_RANGE",
            BasicError::DuplicateDefinition => "DUPLICATE_DEFINITION",
            BasicError::OutOfData => "OUT_OF_DATA",
            BasicError::UndefinedLine(_) => "UNDEFINED_LINE",
            BasicError::ReturnWithoutGosub => "RETURN_WITHOUT_GOSUB",
            BasicError::NextWithoutFor => "NEXT_WITHOUT_FOR",
            BasicError::WendWithoutWhile => "WEND_WITHOUT_WHILE",
            BasicError::ResumeWithoutError => "RESUME_WITHOUT_ERROR",
            BasicError::FileNotFound => "FILE_NOT_FOUND",
            BasicError::BadFileNumber => "BAD_FILE_NUMBER",
            BasicError::DiskFull => "DISK_FULL",
            BasicError::InputPastEnd => "INPUT_PAST_END",
            BasicError::IllegalFunctionCall => "ILLEGAL_FUNCTION_CALL",
            BasicError::StringTooLong => "STRING_TOO_LONG",
            BasicError::OutOfMemory => "OUT_OF_MEMORY",
            BasicError::NoResume => "NO_RESUME",
            BasicError::GosubStackOverflow => "GOSUB_STACK_OVERFLOW",
            BasicError::ForStackOverflow => "FOR_STACK_OVERFLOW",
            BasicError::WhileStackOverflow => "WHILE_STACK_OVERFLOW",
            BasicError::TimeoutError => "TIMEOUT_ERROR",
            BasicError::Interrupted => "INTERRUPTED",
        }
    }
}

/// Combines the two compile-time failure stages (spec §7: "Compile-time
/// failures... abort the whole compile of that program").
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_by_zero_code_is_11() {
        assert_eq!(BasicError::DivisionByZero.code(), 11);
    }

    #[test]
    fn parse_error_formats_with_location() {
        let e = ParseError::new(20, 5, "THEN", "ELSE");
        let msg = format!("{e}");
        assert!(msg.contains("line 20"));
        assert!(msg.contains("column 5"));
    }
}
