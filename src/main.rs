mod analyzer;
mod ast;
mod builtins;
mod config;
mod error;
mod highlighter;
mod immediate;
mod interp;
mod io;
mod lexer;
mod limits;
mod parser;
mod program;
mod runtime;
mod sanitize;
mod token;
mod value;

use clap::{Parser, ValueEnum};
use config::{AnalyzerConfig, InterpreterConfig, LimitPreset, ResourceLimits, WELCOME_MESSAGE, WELCOME_SUBTITLE};
use highlighter::BasicHelper;
use immediate::{ImmediateExecutor, LineOutcome};
use io::native::{NativeFileIo, StdIoHandler};
use rustyline::error::ReadlineError;
use rustyline::{Config, Editor};
use std::path::PathBuf;
use token::KeywordCase;

/// MBASIC 5.21 interpreter — a tree-walking interpreter for the CP/M-era
/// Microsoft BASIC-80 dialect
#[derive(Parser, Debug)]
#[command(name = "mbasic")]
#[command(version = config::VERSION)]
#[command(about = "A tree-walking interpreter for MBASIC 5.21")]
struct CliArgs {
    /// Program file to run before dropping into the REPL
    #[arg(value_name = "FILE")]
    program: Option<PathBuf>,

    /// Keyword-case policy applied by the lexer
    #[arg(long, value_enum, default_value_t = CaseArg::Preserve)]
    case: CaseArg,

    /// Resource-limit preset
    #[arg(long, value_enum, default_value_t = LimitsArg::Local)]
    limits: LimitsArg,

    /// Maximum fixed-point iterations for the semantic analyzer
    #[arg(long, default_value_t = 10)]
    max_iterations: u32,

    /// Disable integer size inference in the semantic analyzer
    #[arg(long)]
    no_integer_inference: bool,

    /// Run the semantic analyzer over the loaded program (default: on)
    #[arg(long, conflicts_with = "no_analyze")]
    analyze: bool,

    /// Skip the semantic analyzer entirely
    #[arg(long)]
    no_analyze: bool,

    /// Print the analyzer's findings as JSON after loading a program
    #[arg(long)]
    dump_report: bool,

    /// Directory new files are loaded/saved relative to
    #[arg(long, value_name = "DIR", default_value = ".")]
    base_dir: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CaseArg {
    ForceLower,
    ForceUpper,
    FirstWins,
    Preserve,
    Error,
}

impl From<CaseArg> for KeywordCase {
    fn from(c: CaseArg) -> Self {
        match c {
            CaseArg::ForceLower => KeywordCase::ForceLower,
            CaseArg::ForceUpper => KeywordCase::ForceUpper,
            CaseArg::FirstWins => KeywordCase::FirstWins,
            CaseArg::Preserve => KeywordCase::Preserve,
            CaseArg::Error => KeywordCase::Error,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LimitsArg {
    Web,
    Local,
    Unlimited,
}

impl From<LimitsArg> for LimitPreset {
    fn from(l: LimitsArg) -> Self {
        match l {
            LimitsArg::Web => LimitPreset::Web,
            LimitsArg::Local => LimitPreset::Local,
            LimitsArg::Unlimited => LimitPreset::Unlimited,
        }
    }
}

fn main() {
    let args = CliArgs::parse();

    let config = InterpreterConfig {
        keyword_case: args.case.into(),
        limits: ResourceLimits::preset(args.limits.into()),
        analyzer: AnalyzerConfig {
            enable_integer_size_inference: !args.no_integer_inference,
            max_iterations: args.max_iterations,
            strict_type_rebinding: false,
        },
    };
    let analyze = args.analyze || !args.no_analyze;

    let mut io = StdIoHandler;
    let mut file_io = NativeFileIo::new(args.base_dir.clone());
    let mut exec = ImmediateExecutor::new(config);

    if let Some(path) = &args.program {
        match std::fs::read_to_string(path) {
            Err(_) => {
                eprintln!("File not found: {}", path.display());
                std::process::exit(1);
            }
            Ok(raw) => {
                let (text, _) = sanitize::sanitize_and_clear_parity(&raw);
                match exec.program_mgr.load_from_text(&text) {
                    Ok(()) => {
                        exec.interp.reload_program(exec.program_mgr.program().clone());
                        if analyze {
                            maybe_dump_report(&exec, args.dump_report);
                        }
                        exec.interp.start();
                        run_to_suspension(&mut exec, &mut io, &mut file_io);
                    }
                    Err(e) => {
                        // A parse error doesn't auto-run, but the REPL still
                        // starts (spec §6).
                        eprintln!("?{e} Error");
                    }
                }
            }
        }
    }

    run_repl(&mut exec, &mut io, &mut file_io);
}

fn maybe_dump_report(exec: &ImmediateExecutor, dump: bool) {
    if !dump {
        return;
    }
    let report = analyzer::analyze(exec.program_mgr.program(), &exec.config().analyzer);
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize analysis report: {e}"),
    }
}

fn run_to_suspension(exec: &mut ImmediateExecutor, io: &mut StdIoHandler, file_io: &mut NativeFileIo) {
    loop {
        match exec.interp.tick(io, file_io) {
            interp::TickStatus::Running | interp::TickStatus::Output(_) | interp::TickStatus::AwaitingInput { .. } => {
                continue
            }
            interp::TickStatus::Halted(reason) => {
                match reason {
                    interp::HaltReason::EndOfProgram => {}
                    interp::HaltReason::Stop | interp::HaltReason::Break => println!("Break"),
                    interp::HaltReason::UnhandledError(e) => {
                        let line = exec.interp.pc().map(|pc| pc.line.to_string()).unwrap_or_else(|| "?".to_string());
                        eprintln!("?{e} Error in {line}");
                    }
                }
                return;
            }
        }
    }
}

fn run_repl(exec: &mut ImmediateExecutor, io: &mut StdIoHandler, file_io: &mut NativeFileIo) {
    let rl_config = Config::builder().auto_add_history(true).build();
    let mut rl = match Editor::with_config(rl_config) {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Failed to initialize REPL: {e}");
            return;
        }
    };
    rl.set_helper(Some(BasicHelper::new()));

    let history_file = ".mbasic_history";
    let _ = rl.load_history(history_file);

    println!("{WELCOME_MESSAGE}");
    println!("{WELCOME_SUBTITLE}");
    println!("Type HELP for REPL commands.");

    loop {
        let readline = rl.readline("Ok\n");
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                match exec.handle_line(&line, io, file_io) {
                    LineOutcome::Ok => {}
                    LineOutcome::Quit => break,
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(history_file);
}
