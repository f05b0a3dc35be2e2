// crates/pe_cli/src/args.rs
//
// Offline CLI surface: subcommands, path checks, normalization.
// - Every input is a local file (no scheme:// paths)
// - Inputs must exist before anything runs; --out may not exist yet
// - --raw for `interpolate` accepts loose numeric text ("87", " 87.5 ")

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Parsed CLI arguments.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "pe",
    disable_help_subcommand = true,
    about = "Offline scoring CLI for PE admission exams and practical tests"
)]
pub struct Args {
    /// Suppress the summary line on stdout.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Debug-level diagnostics on stderr (RUST_LOG still wins when set).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Exam score from a formula and a student's scores.
    Exam(ExamArgs),
    /// Practical test score from a table and a student's records.
    Practical(PracticalArgs),
    /// Special-formula utilities.
    #[command(subcommand)]
    Formula(FormulaCommand),
    /// Standard score / percentile / grade for a raw score.
    Interpolate(InterpolateArgs),
}

/// Output flags shared by the scoring subcommands.
#[derive(Debug, ClapArgs, Clone)]
pub struct OutputArgs {
    /// Directory for result.json (created if missing).
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Print the full result document to stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, ClapArgs, Clone)]
pub struct ExamArgs {
    /// FormulaData JSON.
    #[arg(long)]
    pub formula: PathBuf,
    /// Student score entries JSON.
    #[arg(long)]
    pub scores: PathBuf,
    /// Cohort highest-score map JSON.
    #[arg(long)]
    pub highest: Option<PathBuf>,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, ClapArgs, Clone)]
pub struct PracticalArgs {
    /// PracticalFormulaData JSON.
    #[arg(long)]
    pub formula: PathBuf,
    /// Student practical records JSON (current or legacy shape).
    #[arg(long)]
    pub submission: Option<PathBuf>,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Subcommand, Clone)]
pub enum FormulaCommand {
    /// Dry-run a special formula with every variable set to 1.
    Validate {
        /// Formula text, e.g. "{kor_std} * 1.2 + {math_std}".
        formula: String,
    },
    /// List the variables a formula references, or every known variable.
    Vars {
        formula: Option<String>,
    },
}

#[derive(Debug, ClapArgs, Clone)]
pub struct InterpolateArgs {
    /// Grade-cut rows JSON.
    #[arg(long)]
    pub cuts: PathBuf,
    /// Raw score.
    #[arg(long, value_parser = parse_raw, allow_hyphen_values = true)]
    pub raw: f64,
}

/// Errors surfaced by argument validation. Messages are short and stable.
#[derive(Debug)]
pub enum CliError {
    NonLocalPath(String),
    NotFound(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::NonLocalPath(p) => write!(f, "path must be local file (no scheme): {p}"),
            CliError::NotFound(p) => write!(f, "file not found: {p}"),
        }
    }
}

impl std::error::Error for CliError {}

/// Loose numeric argument: surrounding blanks and thousands separators ignored.
pub fn parse_raw(s: &str) -> Result<f64, String> {
    pe_core::safe_parse::parse_number_text(s).ok_or_else(|| format!("not a number: {s:?}"))
}

#[inline]
fn has_scheme(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    lower.contains("://")
        || lower.starts_with("http:")
        || lower.starts_with("https:")
        || lower.starts_with("file:")
}

fn ensure_local_path(p: &Path) -> Result<(), CliError> {
    if let Some(s) = p.to_str() {
        if has_scheme(s) {
            return Err(CliError::NonLocalPath(s.to_string()));
        }
    }
    Ok(())
}

fn ensure_local_exists(p: &Path, label: &'static str) -> Result<(), CliError> {
    ensure_local_path(p)?;
    let meta = fs::metadata(p).map_err(|_| CliError::NotFound(format!("{label} {}", p.display())))?;
    if !meta.is_file() {
        return Err(CliError::NotFound(format!("{label} {}", p.display())));
    }
    Ok(())
}

/// Absolute path; relative to CWD when the path does not exist yet.
fn normalize_path(p: &Path) -> PathBuf {
    fs::canonicalize(p).unwrap_or_else(|_| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(p)
        }
    })
}

fn checked_input(p: &mut PathBuf, label: &'static str) -> Result<(), CliError> {
    ensure_local_exists(p, label)?;
    *p = normalize_path(p);
    Ok(())
}

fn checked_output(out: &mut OutputArgs) -> Result<(), CliError> {
    if let Some(dir) = out.out.as_mut() {
        ensure_local_path(dir)?;
        *dir = normalize_path(dir);
    }
    Ok(())
}

/// Check every path flag of an already parsed command line.
pub fn validate(mut args: Args) -> Result<Args, CliError> {
    match &mut args.command {
        Command::Exam(a) => {
            checked_input(&mut a.formula, "--formula")?;
            checked_input(&mut a.scores, "--scores")?;
            if let Some(h) = a.highest.as_mut() {
                checked_input(h, "--highest")?;
            }
            checked_output(&mut a.output)?;
        }
        Command::Practical(a) => {
            checked_input(&mut a.formula, "--formula")?;
            if let Some(s) = a.submission.as_mut() {
                checked_input(s, "--submission")?;
            }
            checked_output(&mut a.output)?;
        }
        Command::Interpolate(a) => checked_input(&mut a.cuts, "--cuts")?,
        Command::Formula(_) => {}
    }
    Ok(args)
}
