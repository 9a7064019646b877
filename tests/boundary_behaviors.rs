//! Boundary behaviors and quantified invariants (spec §8).

use mbasic::config::{LimitPreset, ResourceLimits};
use mbasic::error::{BasicError, LexError};
use mbasic::interp::{HaltReason, Interpreter, TickStatus};
use mbasic::io::native::NativeFileIo;
use mbasic::io::IoHandler;
use mbasic::limits::ResourceLimiter;
use mbasic::program::ProgramManager;
use mbasic::token::KeywordCase;

struct BufferIo {
    out: String,
}

impl IoHandler for BufferIo {
    fn output(&mut self, text: &str, end: &str) {
        self.out.push_str(text);
        self.out.push_str(end);
    }
    fn input(&mut self, _prompt: &str) -> String {
        String::new()
    }
    fn input_char(&mut self) -> String {
        String::new()
    }
    fn error(&mut self, text: &str) {
        self.out.push_str(text);
    }
    fn debug(&mut self, _text: &str) {}
    fn clear_screen(&mut self) {}
}

fn run(src: &str) -> (String, HaltReason) {
    let program = mbasic::parser::parse_program(src, KeywordCase::Preserve).unwrap();
    let limiter = ResourceLimiter::new(ResourceLimits::preset(LimitPreset::Local));
    let mut interp = Interpreter::new(program, limiter);
    interp.start();
    let mut io = BufferIo { out: String::new() };
    let mut file_io = NativeFileIo::new(std::env::temp_dir());
    loop {
        match interp.tick(&mut io, &mut file_io) {
            TickStatus::Halted(reason) => return (io.out, reason),
            _ => continue,
        }
    }
}

#[test]
fn chr_zero_is_a_one_byte_zero_string_and_concat_preserves_it() {
    let (out, _) = run("10 A$ = CHR$(0)\n20 B$ = \"X\" + A$ + \"Y\"\n30 PRINT LEN(B$)\n40 END\n");
    assert_eq!(out, " 3 \n");
}

#[test]
fn int_and_fix_disagree_on_negative_half() {
    let (out, _) = run("10 PRINT INT(-0.5); FIX(-0.5)\n20 END\n");
    assert_eq!(out, "-1  0 \n");
}

#[test]
fn string_concat_edge_cases() {
    let (out, _) = run("10 PRINT \"AB\" + \"\"\n20 PRINT LEN(\"\")\n30 END\n");
    assert_eq!(out, "AB\n 0 \n");
}

#[test]
fn line_number_65529_is_valid_and_65530_is_rejected() {
    let mut pm = ProgramManager::new(KeywordCase::Preserve);
    assert!(pm.add_or_replace_line("65529 END").is_ok());

    let err = mbasic::parser::parse_program("65530 END\n", KeywordCase::Preserve).unwrap_err();
    assert!(matches!(
        err,
        mbasic::error::CompileError::Lex(LexError::LineNumberTooLarge { value: 65530, .. })
    ));
}

#[test]
fn integer_overflow_raises_rather_than_wraps() {
    let (_, reason) = run("10 A% = 32767\n20 A% = A% + 1\n30 END\n");
    assert_eq!(reason, HaltReason::UnhandledError(BasicError::Overflow));
}

#[test]
fn option_base_0_sizes_array_to_eleven_elements_and_checks_bounds() {
    let (_, reason) = run("10 OPTION BASE 0\n20 DIM A(10)\n30 A(11) = 1\n40 END\n");
    assert_eq!(reason, HaltReason::UnhandledError(BasicError::SubscriptOutOfRange));

    let (_, reason) = run("10 OPTION BASE 0\n20 DIM A(10)\n30 A(-1) = 1\n40 END\n");
    assert_eq!(reason, HaltReason::UnhandledError(BasicError::SubscriptOutOfRange));

    let (out, reason) = run("10 OPTION BASE 0\n20 DIM A(10)\n30 A(0) = 1 : A(10) = 2\n40 PRINT A(0); A(10)\n50 END\n");
    assert_eq!(reason, HaltReason::EndOfProgram);
    assert_eq!(out, " 1  2 \n");
}

#[test]
fn save_new_load_round_trips_the_program_map() {
    let dir = std::env::temp_dir().join(format!("mbasic_roundtrip_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let mut file_io = NativeFileIo::new(&dir);

    let mut pm = ProgramManager::new(KeywordCase::Preserve);
    pm.add_or_replace_line("10 PRINT \"HI\"").unwrap();
    pm.add_or_replace_line("20 END").unwrap();
    let original = pm.to_source_text();
    pm.save_to_file(&mut file_io, "ROUND.BAS").unwrap();

    pm.clear();
    assert_eq!(pm.program().lines.len(), 0);

    pm.load_from_file(&file_io, "ROUND.BAS").unwrap();
    assert_eq!(pm.to_source_text(), original);

    let _ = std::fs::remove_file(dir.join("ROUND.BAS"));
    let _ = std::fs::remove_dir(&dir);
}

#[test]
fn mk_cv_round_trip_through_a_running_program() {
    let (out, reason) = run(
        "10 A$ = MKI$(-1234) : PRINT CVI(A$)\n\
         20 B$ = MKS$(3.5) : PRINT CVS(B$)\n\
         30 C$ = MKD$(2.5) : PRINT CVD(C$)\n40 END\n",
    );
    assert_eq!(reason, HaltReason::EndOfProgram);
    assert_eq!(out, "-1234 \n 3.5 \n 2.5 \n");
}
