// ABOUTME: Configuration and constants — keyword-case policy, resource-limit presets, analyzer flags

use crate::token::KeywordCase;

pub const VERSION: &str = "0.1.0";
pub const WELCOME_MESSAGE: &str = "MBASIC 5.21";
pub const WELCOME_SUBTITLE: &str = "A tree-walking interpreter for the CP/M-era Microsoft BASIC-80 dialect";

/// Resource-limit preset (spec §4.I / §6: `{web, local, unlimited}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPreset {
    Web,
    Local,
    Unlimited,
}

/// Budget categories consulted by the interpreter before stack pushes,
/// array allocations, variable allocations, string operations, and
/// periodically between statements (spec §4.I).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    pub max_gosub_depth: usize,
    pub max_for_depth: usize,
    pub max_while_depth: usize,
    pub max_array_bytes: usize,
    pub max_total_bytes: usize,
    pub max_string_len: usize,
    pub max_wall_time_ms: u64,
}

impl ResourceLimits {
    pub fn preset(p: LimitPreset) -> Self {
        match p {
            LimitPreset::Web => ResourceLimits {
                max_gosub_depth: 64,
                max_for_depth: 32,
                max_while_depth: 32,
                max_array_bytes: 1 << 20,
                max_total_bytes: 4 << 20,
                max_string_len: 255,
                max_wall_time_ms: 5_000,
            },
            LimitPreset::Local => ResourceLimits {
                max_gosub_depth: 4096,
                max_for_depth: 1024,
                max_while_depth: 1024,
                max_array_bytes: 256 << 20,
                max_total_bytes: 1 << 30,
                max_string_len: 32_767,
                max_wall_time_ms: 300_000,
            },
            LimitPreset::Unlimited => ResourceLimits {
                max_gosub_depth: usize::MAX,
                max_for_depth: usize::MAX,
                max_while_depth: usize::MAX,
                max_array_bytes: usize::MAX,
                max_total_bytes: usize::MAX,
                max_string_len: usize::MAX,
                max_wall_time_ms: u64::MAX,
            },
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        ResourceLimits::preset(LimitPreset::Local)
    }
}

/// Semantic-analysis flags (spec §6): "Boolean `enable_integer_size_inference`;
/// integer `max_iterations` for the fixed-point (default 10)."
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerConfig {
    pub enable_integer_size_inference: bool,
    pub max_iterations: u32,
    pub strict_type_rebinding: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            enable_integer_size_inference: true,
            max_iterations: 10,
            strict_type_rebinding: false,
        }
    }
}

/// Top-level interpreter configuration bundling the keyword-case policy,
/// resource limits, and analyzer flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpreterConfig {
    pub keyword_case: KeywordCase,
    pub limits: ResourceLimits,
    pub analyzer: AnalyzerConfig,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            keyword_case: KeywordCase::Preserve,
            limits: ResourceLimits::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

pub const HELP_TEXT: &str = r#"
REPL commands:
  LIST [range]         List program lines
  RUN [line]           Run the program
  NEW                  Clear program and variables
  LOAD "name"          Load a program from disk
  SAVE "name"          Save the program to disk
  MERGE "name"         Merge a program from disk
  DELETE a-b           Delete a line range
  RENUM [start[,inc]]  Renumber the program
  CONT                 Resume after STOP
  TRON / TROFF         Toggle statement tracing
  HELP                 Show this card

Type a line number followed by statements to add or replace a program
line; type a statement with no leading line number to execute it
immediately against the shared runtime.
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_preset_is_tighter_than_local() {
        let web = ResourceLimits::preset(LimitPreset::Web);
        let local = ResourceLimits::preset(LimitPreset::Local);
        assert!(web.max_gosub_depth < local.max_gosub_depth);
        assert!(web.max_total_bytes < local.max_total_bytes);
    }

    #[test]
    fn unlimited_preset_has_no_practical_cap() {
        let unlimited = ResourceLimits::preset(LimitPreset::Unlimited);
        assert_eq!(unlimited.max_gosub_depth, usize::MAX);
    }
}
