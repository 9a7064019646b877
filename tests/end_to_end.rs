//! End-to-end interpreter scenarios (spec §8 "Concrete end-to-end scenarios").

use mbasic::analyzer;
use mbasic::config::{AnalyzerConfig, LimitPreset, ResourceLimits};
use mbasic::error::BasicError;
use mbasic::interp::{HaltReason, Interpreter, TickStatus};
use mbasic::io::native::NativeFileIo;
use mbasic::io::IoHandler;
use mbasic::limits::ResourceLimiter;
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
fn hello_world_prints_single_line_and_ends_normally() {
    let (out, reason) = run("10 PRINT \"HELLO\"\n20 END\n");
    assert_eq!(reason, HaltReason::EndOfProgram);
    assert_eq!(out, "HELLO\n");
}

#[test]
fn for_next_loop_prints_one_through_three() {
    let (out, _) = run("10 FOR I = 1 TO 3\n20   PRINT I\n30 NEXT I\n");
    assert_eq!(out, " 1 \n 2 \n 3 \n");
}

#[test]
fn gosub_side_effect_gives_x_3_y_13() {
    let (out, reason) = run(
        "10 A = 1 : B = 2\n20 X = A + B\n30 GOSUB 100\n40 Y = A + B\n\
         50 PRINT X; Y\n60 END\n100 B = B + 10 : RETURN\n",
    );
    assert_eq!(reason, HaltReason::EndOfProgram);
    assert_eq!(out, " 3  13 \n");
}

#[test]
fn gosub_side_effect_is_not_folded_as_common_subexpression() {
    let program = mbasic::parser::parse_program(
        "10 A = 1 : B = 2\n20 X = A + B\n30 GOSUB 100\n40 Y = A + B\n50 END\n100 B = B + 10 : RETURN\n",
        KeywordCase::Preserve,
    )
    .unwrap();
    let report = analyzer::analyze(&program, &AnalyzerConfig::default());
    for group in &report.cse_groups {
        assert!(
            !(group.lines.contains(&20) && group.lines.contains(&40)),
            "A+B on line 20 must not be grouped with line 40 across the mutating GOSUB"
        );
    }
}

#[test]
fn on_error_goto_traps_division_by_zero_then_resumes() {
    let (out, reason) = run(
        "10 ON ERROR GOTO 100\n20 A = 1/0\n30 PRINT \"after\"\n40 END\n\
         100 PRINT \"err\"; ERR : RESUME NEXT\n",
    );
    assert_eq!(reason, HaltReason::EndOfProgram);
    let err_pos = out.find("err").expect("handler output missing");
    let after_pos = out.find("after").expect("resumed statement missing");
    assert!(err_pos < after_pos);
}

#[test]
fn constant_folding_marks_always_false_branch_unreachable() {
    let src = "10 DEBUG = 0\n20 IF DEBUG THEN PRINT \"d\"\n30 PRINT \"ok\"\n";
    let (out, _) = run(src);
    assert_eq!(out, "ok\n");

    let program = mbasic::parser::parse_program(src, KeywordCase::Preserve).unwrap();
    let report = analyzer::analyze(&program, &AnalyzerConfig::default());
    assert!(
        report.constant_folds.iter().any(|f| f.line == 20),
        "line 20's condition should be folded to a constant"
    );
}

#[test]
fn data_read_uses_mbasic_print_spacing() {
    let (out, _) = run("10 DATA 1, \"hi\", 3\n20 READ A, B$, C\n30 PRINT A; B$; C\n");
    assert_eq!(out, " 1 hi 3 \n");
}

#[test]
fn unhandled_division_by_zero_halts_with_overflow_error() {
    let (_, reason) = run("10 X = 1 / 0\n20 END\n");
    assert_eq!(reason, HaltReason::UnhandledError(BasicError::DivisionByZero));
}
