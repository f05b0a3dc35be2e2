//! pe_core: Core types, loose-value parsing, rounding, and the calculation log.
//!
//! This crate is **I/O-free**. It defines the plain data records exchanged with
//! the configuration store and the request layer, and the result shape returned
//! by the engine (`pe_algo`, `pe_pipeline`, `pe_io`, `pe_cli`).
//!
//! - Exam inputs: `FormulaData`, `StudentScores`, `GradeCut`, highest-score map
//! - Practical inputs: `PracticalFormulaData`, `StudentPracticalData` (+ legacy shape)
//! - Output: `CalculationResult` built from a per-call `CalcLog`
//! - `safe_parse`: tolerant conversion of loosely typed configuration values

#![forbid(unsafe_code)]

/// Define a serde'd enum with explicit wire tokens.
macro_rules! serde_enum {
    ($(#[$meta:meta])* $name:ident => { $($variant:ident = $token:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $token)]
                $variant,
            )+
        }

        impl $name {
            /// Wire token for this variant.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $token, )+
                }
            }
        }
    };
}

pub mod errors {
    use thiserror::Error;

    /// Minimal error set for core-domain token parsing.
    #[derive(Clone, Debug, Eq, PartialEq, Error)]
    pub enum CoreError {
        #[error("invalid subject token: {0}")]
        InvalidSubject(String),
        #[error("invalid gender token: {0}")]
        InvalidGender(String),
    }
}

pub mod exam;
pub mod practical;
pub mod result;
pub mod rounding;
pub mod safe_parse;
pub mod subjects;

pub use errors::CoreError;
pub use exam::{
    BonusRule, BonusTarget, ConversionRow, ConversionTables, FormulaData, GradeCut, GradeTable,
    HighestScoreMap, MaxMethod, ScoreType, ScoreTypeConfig, ScoreTypeRule, SelectionRule,
    SubjectRatios,
};
pub use practical::{
    Direction, EventRecord, Gender, LegacyPracticalRecord, OutOfRangePolicy, PracticalFormulaData,
    PracticalMode, PracticalRow, PracticalSubmission, ScoreCell, StudentPracticalData,
};
pub use result::{Breakdown, CalcLog, CalculationResult};
pub use subjects::{ElectiveGroup, StudentScores, Subject, SubjectScore};
