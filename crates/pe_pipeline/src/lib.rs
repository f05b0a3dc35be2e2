// crates/pe_pipeline/src/lib.rs
#![forbid(unsafe_code)]

//! Orchestration of admission scoring.
//!
//! Exam: institution registry → special formula → generic composite.
//! Practical: legacy adaptation → per-event lookup → basic rescale or special rule.
//!
//! Every entry point creates its own `CalcLog` and returns it inside the
//! `CalculationResult`; nothing is shared between calls.

pub mod context;
pub mod exam;
pub mod institutions;
pub mod legacy;
pub mod practical;
pub mod special_rules;

use pe_algo::FormulaError;

/// Fatal pipeline errors. Everything else degrades into the audit log.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Formula(#[from] FormulaError),
}

pub use context::{build_context, CONTEXT_VARIABLES};
pub use exam::{calculate_score, calculate_score_with, generic_composite};
pub use institutions::{builtin_registry, ExamAlgorithm, ExamOutcome, ExamRegistry};
pub use legacy::adapt_submission;
pub use practical::{calculate_practical_score, calculate_practical_score_with};
pub use special_rules::{
    builtin_practical_registry, Aggregate, PracticalRegistry, PracticalRule, RuleInput,
};
