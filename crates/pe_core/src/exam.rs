//! Exam-side configuration records: per-department formula data, grade-cut
//! rows, elective conversion tables, and the cohort highest-score map.
//!
//! Every field has a default so partially filled configuration rows from the
//! store still decode; loose numbers and JSON-in-text nesting are accepted
//! through `safe_parse::de`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::safe_parse::de;
use crate::subjects::{ElectiveGroup, Subject};

/// Grade (1..=9) → points.
pub type GradeTable = BTreeMap<u8, f64>;

/// Cohort-year highest standard score per subject name (collaborator supplied).
pub type HighestScoreMap = BTreeMap<String, f64>;

// ----------------------------- Score types ---------------------------------------------

serde_enum!(
    /// Which raw value a subject group contributes.
    ScoreType => {
        Standard          = "standard",
        Percentile        = "percentile",
        ConvertedStandard = "converted"
    }
);

serde_enum!(
    /// How a subject's maximum attainable score is resolved.
    MaxMethod => {
        Fixed         = "fixed",
        CohortHighest = "highest",
        ElectiveTable = "table"
    }
);

/// Score type + maximum strategy for one subject group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTypeRule {
    #[serde(rename = "type", default = "default_score_type")]
    pub score_type: ScoreType,
    #[serde(default = "default_max_method")]
    pub max: MaxMethod,
    #[serde(
        default,
        deserialize_with = "de::loose_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub fixed_max: Option<f64>,
}

fn default_score_type() -> ScoreType {
    ScoreType::Standard
}

fn default_max_method() -> MaxMethod {
    MaxMethod::Fixed
}

impl Default for ScoreTypeRule {
    fn default() -> Self {
        Self {
            score_type: ScoreType::Standard,
            max: MaxMethod::Fixed,
            fixed_max: None,
        }
    }
}

impl ScoreTypeRule {
    pub fn new(score_type: ScoreType, max: MaxMethod) -> Self {
        Self {
            score_type,
            max,
            fixed_max: None,
        }
    }

    pub fn with_fixed_max(mut self, fixed_max: f64) -> Self {
        self.fixed_max = Some(fixed_max);
        self
    }
}

/// Score-type configuration per subject group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreTypeConfig {
    #[serde(alias = "국어")]
    pub language: ScoreTypeRule,
    #[serde(alias = "수학")]
    pub math: ScoreTypeRule,
    #[serde(alias = "탐구")]
    pub elective: ScoreTypeRule,
}

impl ScoreTypeConfig {
    /// Rule for a subject; English and history are table-scored and always
    /// use the default rule.
    pub fn for_subject(&self, subject: Subject) -> ScoreTypeRule {
        match subject {
            Subject::Language => self.language.clone(),
            Subject::Math => self.math.clone(),
            Subject::Elective => self.elective.clone(),
            Subject::English | Subject::History => ScoreTypeRule::default(),
        }
    }
}

// ----------------------------- Ratios & rules ------------------------------------------

/// Per-subject ratios, in percent of the exam total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectRatios {
    #[serde(alias = "국어", deserialize_with = "de::loose_f64")]
    pub language: f64,
    #[serde(alias = "수학", deserialize_with = "de::loose_f64")]
    pub math: f64,
    #[serde(alias = "영어", deserialize_with = "de::loose_f64")]
    pub english: f64,
    #[serde(alias = "탐구", deserialize_with = "de::loose_f64")]
    pub elective: f64,
    #[serde(alias = "한국사", deserialize_with = "de::loose_f64")]
    pub history: f64,
}

impl SubjectRatios {
    pub fn get(&self, subject: Subject) -> f64 {
        match subject {
            Subject::Language => self.language,
            Subject::Math => self.math,
            Subject::English => self.english,
            Subject::Elective => self.elective,
            Subject::History => self.history,
        }
    }
}

/// Composition rule applied by the selection engine, in configured order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionRule {
    /// Keep the top `count` candidates by normalized ratio.
    SelectN {
        #[serde(alias = "subjects")]
        from: Vec<Subject>,
        #[serde(default = "one")]
        count: usize,
        /// Percent of the total reserved for the selected subjects. When absent
        /// each selected subject keeps its own configured ratio.
        #[serde(
            default,
            deserialize_with = "de::loose_opt_f64",
            skip_serializing_if = "Option::is_none"
        )]
        ratio: Option<f64>,
    },
    /// Rank candidates by normalized ratio and pair them with positional weights.
    SelectRankedWeights {
        #[serde(alias = "subjects")]
        from: Vec<Subject>,
        weights: Vec<f64>,
    },
}

fn one() -> usize {
    1
}

serde_enum!(
    /// Which entries a bonus rule boosts.
    BonusTarget => {
        Elective = "elective",
        Math     = "math"
    }
);

/// Percentage bonus on the picked score of entries whose name matches.
/// An empty `names` list with an `elective` target may instead name a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusRule {
    pub target: BonusTarget,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<ElectiveGroup>,
    #[serde(deserialize_with = "de::loose_f64")]
    pub percent: f64,
}

impl BonusRule {
    /// Whether this rule applies to an entry with the given name.
    pub fn matches(&self, name: Option<&str>) -> bool {
        let Some(name) = name else {
            return false;
        };
        if self.names.iter().any(|n| name.contains(n.as_str())) {
            return true;
        }
        match (self.target, self.group) {
            (BonusTarget::Elective, Some(g)) => ElectiveGroup::from_name(name) == g,
            _ => false,
        }
    }
}

// ----------------------------- Conversion tables ---------------------------------------

/// One row of an elective percentile → converted standard score table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionRow {
    #[serde(alias = "백분위", deserialize_with = "de::loose_f64")]
    pub percentile: f64,
    #[serde(alias = "변환표준점수", deserialize_with = "de::loose_f64")]
    pub converted: f64,
}

/// Conversion tables keyed by elective group.
pub type ConversionTables = BTreeMap<ElectiveGroup, Vec<ConversionRow>>;

/// One grade-cut row: raw cutoff → (standard score, percentile, grade).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeCut {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(alias = "등급", deserialize_with = "de::loose_u8")]
    pub grade: u8,
    #[serde(alias = "원점수", deserialize_with = "de::loose_f64")]
    pub raw: f64,
    #[serde(alias = "표준점수", deserialize_with = "de::loose_f64")]
    pub standard: f64,
    #[serde(alias = "백분위", deserialize_with = "de::loose_f64")]
    pub percentile: f64,
}

impl GradeCut {
    pub fn new(grade: u8, raw: f64, standard: f64, percentile: f64) -> Self {
        Self {
            year: None,
            subject: None,
            grade,
            raw,
            standard,
            percentile,
        }
    }
}

// ----------------------------- FormulaData ---------------------------------------------

/// Per-department, per-year exam formula configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormulaData {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "de::loose_opt_text")]
    pub department_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    /// Composite total (exam + practical).
    #[serde(alias = "총점", deserialize_with = "de::loose_f64")]
    pub total_score: f64,
    /// Exam share of the composite, in percent.
    #[serde(alias = "수능비율", deserialize_with = "de::loose_f64")]
    pub exam_ratio: f64,
    /// Practical share of the composite, in percent.
    #[serde(alias = "실기비율", deserialize_with = "de::loose_f64")]
    pub practical_ratio: f64,
    #[serde(alias = "반영비율", deserialize_with = "de::embedded")]
    pub ratios: SubjectRatios,
    /// Number of electives averaged into the representative elective score.
    #[serde(alias = "탐구과목수", deserialize_with = "de::loose_u8")]
    pub elective_count: u8,
    #[serde(deserialize_with = "de::embedded_vec")]
    pub selection_rules: Vec<SelectionRule>,
    #[serde(deserialize_with = "de::embedded_vec")]
    pub bonus_rules: Vec<BonusRule>,
    #[serde(deserialize_with = "de::embedded")]
    pub score_types: ScoreTypeConfig,
    #[serde(alias = "영어점수", deserialize_with = "de::embedded")]
    pub english_scores: GradeTable,
    #[serde(alias = "한국사점수", deserialize_with = "de::embedded")]
    pub history_scores: GradeTable,
    /// Grade-indexed post-ratio English bonus (negative values are penalties).
    #[serde(deserialize_with = "de::embedded")]
    pub english_bonus: GradeTable,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "de::loose_opt_f64")]
    pub english_fixed_bonus: Option<f64>,
    /// Fold the history score into the pre-ratio total instead of adding it afterwards.
    #[serde(alias = "한국사우선적용", deserialize_with = "de::loose_bool")]
    pub history_priority: bool,
    #[serde(
        alias = "특수공식",
        alias = "legacy_formula",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de::loose_opt_text"
    )]
    pub special_formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "de::loose_opt_text")]
    pub institution_id: Option<String>,
    #[serde(deserialize_with = "de::embedded")]
    pub elective_conversion: ConversionTables,
}

impl Default for FormulaData {
    fn default() -> Self {
        Self {
            department_id: None,
            year: None,
            total_score: 100.0,
            exam_ratio: 100.0,
            practical_ratio: 0.0,
            ratios: SubjectRatios::default(),
            elective_count: 2,
            selection_rules: Vec::new(),
            bonus_rules: Vec::new(),
            score_types: ScoreTypeConfig::default(),
            english_scores: GradeTable::new(),
            history_scores: GradeTable::new(),
            english_bonus: GradeTable::new(),
            english_fixed_bonus: None,
            history_priority: false,
            special_formula: None,
            institution_id: None,
            elective_conversion: ConversionTables::new(),
        }
    }
}

impl FormulaData {
    /// Configured special formula, ignoring blank strings.
    pub fn special_formula(&self) -> Option<&str> {
        self.special_formula
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Exam share of the composite total.
    pub fn exam_total(&self) -> f64 {
        self.total_score * self.exam_ratio / 100.0
    }
}
