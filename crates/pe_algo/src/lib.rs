// crates/pe_algo/src/lib.rs
#![forbid(unsafe_code)]

//! Pure scoring algorithms. No I/O; every function that records a derivation
//! takes the caller's `CalcLog`.

pub mod formula;
pub mod interpolate;
pub mod normalize;
pub mod practical;
pub mod selection;

// Convenience re-exports (pipeline imports these from crate root)
pub use formula::{
    evaluate_expression, evaluate_special_formula, extract_variables, validate_special_formula,
    FormulaContext, FormulaError, FormulaValidation,
};
pub use interpolate::{interpolate_score, percentile_to_converted, Interpolated};
pub use normalize::{normalize, pick_by_type, resolve_subjects, SubjectValue, SubjectValues};
pub use practical::{deduction_tier, infer_direction, lookup_event, EventScore, MatchKind};
pub use selection::{compose, Composite, RuleOutcome};
