// crates/pe_cli/src/main.rs
//
// Wires up exit codes, typed error mapping, logging, and the subcommand runs.
// Every scoring run is offline: load → score → optional artifact → summary.

mod args;

mod exitcodes {
    pub const OK: i32 = 0;
    pub const VALIDATION: i32 = 2;
    pub const IO: i32 = 4;
}

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use args::{Args, Command, ExamArgs, FormulaCommand, InterpolateArgs, OutputArgs, PracticalArgs};
use pe_algo::{extract_variables, interpolate_score, validate_special_formula};
use pe_core::CalculationResult;
use pe_io::{loader, IoError};
use pe_pipeline::{calculate_practical_score, calculate_score, PipelineError, CONTEXT_VARIABLES};

/// Central error type for CLI → exit-code mapping.
#[derive(Debug)]
enum MainError {
    /// Bad arguments, malformed inputs, rejected formulas.
    Validation(String),
    /// Read/write/path/limit failures.
    Io(String),
}

impl std::fmt::Display for MainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MainError::Validation(m) | MainError::Io(m) => f.write_str(m),
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(a) => a,
        Err(e) if !e.use_stderr() => {
            // --help / --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(exitcodes::VALIDATION as u8);
        }
    };
    init_tracing(args.verbose);

    let rc = match args::validate(args) {
        Ok(args) => match run(&args) {
            Ok(()) => exitcodes::OK,
            Err(e) => {
                eprintln!("pe: error: {e}");
                map_error(&e)
            }
        },
        Err(e) => {
            eprintln!("pe: error: {e}");
            exitcodes::VALIDATION
        }
    };
    ExitCode::from(rc as u8)
}

/// stderr subscriber; RUST_LOG overrides the flag-derived default.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn map_error(e: &MainError) -> i32 {
    match e {
        MainError::Validation(_) => exitcodes::VALIDATION,
        MainError::Io(_) => exitcodes::IO,
    }
}

fn map_io_err(e: IoError) -> MainError {
    match e {
        IoError::Json { pointer, msg } => MainError::Validation(format!("json {pointer}: {msg}")),
        IoError::Invalid(m) => MainError::Validation(format!("invalid input: {m}")),
        IoError::Path(m) => MainError::Io(format!("path: {m}")),
        e @ IoError::Limit { .. } => MainError::Io(format!("limit: {e}")),
    }
}

fn map_pipeline_err(e: PipelineError) -> MainError {
    match e {
        PipelineError::Formula(f) => MainError::Validation(format!("special formula: {f}")),
    }
}

fn run(args: &Args) -> Result<(), MainError> {
    match &args.command {
        Command::Exam(a) => run_exam(a, args.quiet),
        Command::Practical(a) => run_practical(a, args.quiet),
        Command::Formula(FormulaCommand::Validate { formula }) => {
            run_formula_validate(formula, args.quiet)
        }
        Command::Formula(FormulaCommand::Vars { formula }) => {
            run_formula_vars(formula.as_deref());
            Ok(())
        }
        Command::Interpolate(a) => run_interpolate(a),
    }
}

fn run_exam(a: &ExamArgs, quiet: bool) -> Result<(), MainError> {
    let formula = loader::load_formula(&a.formula).map_err(map_io_err)?;
    let scores = loader::load_scores(&a.scores).map_err(map_io_err)?;
    let highest = match &a.highest {
        Some(p) => Some(loader::load_highest_map(p).map_err(map_io_err)?),
        None => None,
    };

    let result = calculate_score(&formula.value, &scores.value, highest.as_ref().map(|h| &h.value))
        .map_err(map_pipeline_err)?;

    let mut inputs = json!({
        "formula_sha256": formula.sha256,
        "scores_sha256": scores.sha256,
    });
    if let Some(h) = &highest {
        inputs["highest_sha256"] = Value::String(h.sha256.clone());
    }
    finish("exam", &result, inputs, &a.output, quiet)
}

fn run_practical(a: &PracticalArgs, quiet: bool) -> Result<(), MainError> {
    let formula = loader::load_practical_formula(&a.formula).map_err(map_io_err)?;
    let submission = match &a.submission {
        Some(p) => Some(loader::load_practical_submission(p).map_err(map_io_err)?),
        None => None,
    };
    let student = submission.as_ref().and_then(|s| s.value.as_ref());

    let result = calculate_practical_score(&formula.value, student);

    let mut inputs = json!({ "formula_sha256": formula.sha256 });
    if let Some(s) = &submission {
        inputs["submission_sha256"] = Value::String(s.sha256.clone());
    }
    finish("practical", &result, inputs, &a.output, quiet)
}

/// Result document = result + kind + input digests.
fn finish(
    kind: &str,
    result: &CalculationResult,
    inputs: Value,
    out: &OutputArgs,
    quiet: bool,
) -> Result<(), MainError> {
    let doc = json!({
        "kind": kind,
        "engine": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") },
        "inputs": inputs,
        "result": result,
    });

    if let Some(dir) = &out.out {
        write_result(dir, &doc)?;
        tracing::debug!(dir = %dir.display(), "result.json written");
    }
    if out.json {
        let bytes = pe_io::to_canonical_json_bytes(&doc);
        println!("{}", String::from_utf8_lossy(&bytes));
    }
    if !quiet {
        println!("{kind} score: {}", result.score_text);
    }
    Ok(())
}

fn write_result(dir: &Path, doc: &Value) -> Result<(), MainError> {
    let path = dir.join("result.json");
    pe_io::write_canonical_file(&path, doc)
        .map_err(|e| MainError::Io(format!("write {}: {e}", path.display())))
}

fn run_formula_validate(formula: &str, quiet: bool) -> Result<(), MainError> {
    let v = validate_special_formula(formula);
    if !quiet {
        let text = serde_json::to_string(&v).map_err(|e| MainError::Validation(e.to_string()))?;
        println!("{text}");
    }
    match v.error {
        None => Ok(()),
        Some(err) => Err(MainError::Validation(format!("special formula: {err}"))),
    }
}

fn run_formula_vars(formula: Option<&str>) {
    match formula {
        Some(f) => {
            for name in extract_variables(f) {
                let known = if CONTEXT_VARIABLES.contains(&name.as_str()) {
                    ""
                } else {
                    "\t(unknown)"
                };
                println!("{name}{known}");
            }
        }
        None => {
            for name in CONTEXT_VARIABLES {
                println!("{name}");
            }
        }
    }
}

fn run_interpolate(a: &InterpolateArgs) -> Result<(), MainError> {
    let cuts = loader::load_grade_cuts(&a.cuts).map_err(map_io_err)?;
    let r = interpolate_score(a.raw, &cuts.value)
        .ok_or_else(|| MainError::Validation("grade-cut table is empty".into()))?;
    let text = serde_json::to_string(&json!({ "raw": a.raw, "result": r }))
        .map_err(|e| MainError::Validation(e.to_string()))?;
    println!("{text}");
    Ok(())
}
