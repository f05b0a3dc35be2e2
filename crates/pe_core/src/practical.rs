//! Practical (physical) test configuration and student records.
//!
//! - `PracticalFormulaData`: lookup table + scaling config for one department
//! - `StudentPracticalData`: the current per-event record shape
//! - `LegacyPracticalRecord` / `PracticalSubmission`: older record shapes that
//!   the pipeline adapts into the current one

use std::collections::BTreeMap;

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::CoreError;
use crate::safe_parse::{self, de};

// ----------------------------- Enums ---------------------------------------------------

/// Gender column of a practical table row. `Common` rows apply to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Gender {
    #[serde(rename = "male")]
    Male,
    #[serde(rename = "female")]
    Female,
    #[serde(rename = "common")]
    Common,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Common => "common",
        }
    }

    /// Lenient token parse; blank or unknown tokens mean "applies to everyone".
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Gender::Common)
    }

    /// Whether a row tagged `self` applies to a student of `student`.
    /// A `Common` student matches only `Common` rows.
    pub fn applies_to(self, student: Gender) -> bool {
        self == Gender::Common || self == student
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" | "남" | "남자" => Ok(Gender::Male),
            "female" | "f" | "여" | "여자" => Ok(Gender::Female),
            "common" | "all" | "" | "공통" => Ok(Gender::Common),
            other => Err(CoreError::InvalidGender(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Gender {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = serde_json::Value::deserialize(d)?;
        Ok(safe_parse::to_text(&v)
            .map(|s| Gender::parse_lenient(&s))
            .unwrap_or(Gender::Common))
    }
}

impl Default for Gender {
    fn default() -> Self {
        Gender::Common
    }
}

serde_enum!(
    /// Whether larger or smaller measurements are better for an event.
    Direction => {
        HigherIsBetter = "higher",
        LowerIsBetter  = "lower"
    }
);

serde_enum!(
    /// Score for a present record that matches no table row.
    OutOfRangePolicy => {
        Zero   = "zero",
        Lowest = "lowest"
    }
);

serde_enum!(
    /// Practical total computation mode.
    PracticalMode => {
        Basic   = "basic",
        Special = "special"
    }
);

impl Default for OutOfRangePolicy {
    fn default() -> Self {
        OutOfRangePolicy::Zero
    }
}

impl Default for PracticalMode {
    fn default() -> Self {
        PracticalMode::Basic
    }
}

// ----------------------------- Table rows ----------------------------------------------

/// A table cell score: numeric points or a PASS/FAIL token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScoreCell {
    Points(f64),
    Token(String),
}

impl ScoreCell {
    /// Numeric points. PASS tokens count as 100, FAIL tokens as 0, and
    /// unparseable text as 0.
    pub fn points(&self) -> f64 {
        match self {
            ScoreCell::Points(p) => *p,
            ScoreCell::Token(t) => {
                if self.is_pass() {
                    100.0
                } else {
                    safe_parse::parse_number_text(t).unwrap_or(0.0)
                }
            }
        }
    }

    pub fn is_pass(&self) -> bool {
        match self {
            ScoreCell::Points(_) => false,
            ScoreCell::Token(t) => matches!(t.trim().to_ascii_uppercase().as_str(), "PASS" | "P"),
        }
    }
}

impl Default for ScoreCell {
    fn default() -> Self {
        ScoreCell::Points(0.0)
    }
}

impl<'de> Deserialize<'de> for ScoreCell {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = serde_json::Value::deserialize(d)?;
        Ok(match &v {
            serde_json::Value::Number(_) => ScoreCell::Points(safe_parse::to_f64_or(&v, 0.0)),
            serde_json::Value::String(s) => match safe_parse::parse_number_text(s) {
                Some(x) => ScoreCell::Points(x),
                None => ScoreCell::Token(s.trim().to_string()),
            },
            _ => ScoreCell::Points(0.0),
        })
    }
}

/// One row of the practical lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticalRow {
    #[serde(alias = "종목명", deserialize_with = "de::loose_text")]
    pub event: String,
    #[serde(default, alias = "성별")]
    pub gender: Gender,
    /// Threshold ("7.5") or range expression ("250~260", "≥ 280", "11.0 이하").
    #[serde(alias = "기록", deserialize_with = "de::loose_text")]
    pub record: String,
    #[serde(alias = "배점", default)]
    pub score: ScoreCell,
    /// Explicit deduction tier, when the table carries one.
    #[serde(
        default,
        alias = "감수",
        deserialize_with = "de::loose_opt_u8",
        skip_serializing_if = "Option::is_none"
    )]
    pub deduction: Option<u8>,
}

impl PracticalRow {
    pub fn new(
        event: impl Into<String>,
        gender: Gender,
        record: impl Into<String>,
        points: f64,
    ) -> Self {
        Self {
            event: event.into(),
            gender,
            record: record.into(),
            score: ScoreCell::Points(points),
            deduction: None,
        }
    }
}

/// Practical configuration for one department.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticalFormulaData {
    #[serde(alias = "실기총점", deserialize_with = "de::loose_f64")]
    pub target_max: f64,
    #[serde(alias = "기본점수", deserialize_with = "de::loose_f64")]
    pub base_score: f64,
    pub out_of_range: OutOfRangePolicy,
    pub mode: PracticalMode,
    #[serde(alias = "배점표", deserialize_with = "de::embedded_vec")]
    pub table: Vec<PracticalRow>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "de::loose_opt_text")]
    pub institution_id: Option<String>,
    /// Per-event direction overrides; takes precedence over name heuristics.
    #[serde(deserialize_with = "de::embedded")]
    pub directions: BTreeMap<String, Direction>,
}

impl Default for PracticalFormulaData {
    fn default() -> Self {
        Self {
            target_max: 0.0,
            base_score: 0.0,
            out_of_range: OutOfRangePolicy::Zero,
            mode: PracticalMode::Basic,
            table: Vec::new(),
            institution_id: None,
            directions: BTreeMap::new(),
        }
    }
}

impl PracticalFormulaData {
    /// Distinct event names in first-seen table order.
    pub fn events(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for row in &self.table {
            if !out.iter().any(|e| e == &row.event) {
                out.push(row.event.clone());
            }
        }
        out
    }

    /// Rows for one event applicable to a gender, in table order.
    pub fn rows_for<'a>(
        &'a self,
        event: &'a str,
        gender: Gender,
    ) -> impl Iterator<Item = &'a PracticalRow> + 'a {
        self.table
            .iter()
            .filter(move |r| r.event == event && r.gender.applies_to(gender))
    }
}

// ----------------------------- Student records -----------------------------------------

/// One measured event. `value` is absent when the student did not sit the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(alias = "종목명", deserialize_with = "de::loose_text")]
    pub event: String,
    #[serde(default, alias = "record", alias = "기록", deserialize_with = "de::loose_opt_text")]
    pub value: Option<String>,
}

impl EventRecord {
    pub fn new(event: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            value: Some(value.into()),
        }
    }

    pub fn missing(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            value: None,
        }
    }
}

/// Current practical submission shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentPracticalData {
    #[serde(default, alias = "성별")]
    pub gender: Gender,
    #[serde(default)]
    pub records: Vec<EventRecord>,
}

impl StudentPracticalData {
    pub fn new(gender: Gender, records: Vec<EventRecord>) -> Self {
        Self { gender, records }
    }

    pub fn record(&self, event: &str) -> Option<&EventRecord> {
        self.records.iter().find(|r| r.event == event)
    }
}

/// Legacy flat record: each row repeats the gender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPracticalRecord {
    #[serde(alias = "종목명", alias = "name", deserialize_with = "de::loose_text")]
    pub event: String,
    #[serde(default, alias = "record", alias = "기록", deserialize_with = "de::loose_opt_text")]
    pub value: Option<String>,
    #[serde(default, alias = "성별", deserialize_with = "de::loose_opt_text")]
    pub gender: Option<String>,
}

/// Any accepted practical submission shape.
///
/// A bare array is the legacy flat shape; an object with a top-level gender
/// is the current shape; any other object is a legacy wrapper around flat rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PracticalSubmission {
    Current(StudentPracticalData),
    LegacyWrapped { records: Vec<LegacyPracticalRecord> },
    Legacy(Vec<LegacyPracticalRecord>),
}

impl From<StudentPracticalData> for PracticalSubmission {
    fn from(data: StudentPracticalData) -> Self {
        PracticalSubmission::Current(data)
    }
}

impl<'de> Deserialize<'de> for PracticalSubmission {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;
        use serde_json::Value;

        let v = safe_parse::json_or_value(&Value::deserialize(d)?);
        match v {
            Value::Array(_) => serde_json::from_value(v)
                .map(PracticalSubmission::Legacy)
                .map_err(D::Error::custom),
            Value::Object(ref m) if m.contains_key("gender") || m.contains_key("성별") => {
                serde_json::from_value(v)
                    .map(PracticalSubmission::Current)
                    .map_err(D::Error::custom)
            }
            Value::Object(mut m) => {
                let rows = m
                    .remove("records")
                    .or_else(|| m.remove("기록"))
                    .unwrap_or(Value::Null);
                let records = safe_parse::to_array(&rows)
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<LegacyPracticalRecord>, _>>()
                    .map_err(D::Error::custom)?;
                Ok(PracticalSubmission::LegacyWrapped { records })
            }
            other => Err(D::Error::custom(format!(
                "practical submission must be an object or array, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_tokens_are_lenient() {
        assert_eq!(Gender::parse_lenient("남"), Gender::Male);
        assert_eq!(Gender::parse_lenient("F"), Gender::Female);
        assert_eq!(Gender::parse_lenient("??"), Gender::Common);
        assert!(Gender::Common.applies_to(Gender::Female));
        assert!(!Gender::Male.applies_to(Gender::Female));
        assert!(!Gender::Female.applies_to(Gender::Common));
        assert!(Gender::Common.applies_to(Gender::Common));
    }

    #[test]
    fn score_cells_read_pass_tokens() {
        let rows: Vec<PracticalRow> = serde_json::from_str(
            r#"[{"event":"제자리멀리뛰기","gender":"남","record":"250","score":"95"},
                {"event":"윗몸일으키기","gender":"common","record":40,"score":"PASS"}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].score, ScoreCell::Points(95.0));
        assert_eq!(rows[0].gender, Gender::Male);
        assert!(rows[1].score.is_pass());
        assert_eq!(rows[1].score.points(), 100.0);
        assert_eq!(rows[1].record, "40");
        assert_eq!(ScoreCell::Token("FAIL".into()).points(), 0.0);
    }

    #[test]
    fn np_and_unparseable_cells_score_zero() {
        let cells: Vec<ScoreCell> = serde_json::from_str(r#"["NP", "np", "A+", "", "P"]"#).unwrap();
        assert_eq!(cells[0], ScoreCell::Token("NP".into()));
        let points: Vec<f64> = cells.iter().map(ScoreCell::points).collect();
        assert_eq!(points[..4], [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(points[4], 100.0);
        assert!(!cells[0].is_pass());
    }

    #[test]
    fn submissions_accept_legacy_shapes() {
        let cur: PracticalSubmission = serde_json::from_str(
            r#"{"gender":"female","records":[{"event":"a","value":"1"}]}"#,
        )
        .unwrap();
        assert!(matches!(cur, PracticalSubmission::Current(_)));
        let flat: PracticalSubmission =
            serde_json::from_str(r#"[{"종목명":"a","기록":3.5,"성별":"여"}]"#).unwrap();
        match flat {
            PracticalSubmission::Legacy(v) => assert_eq!(v[0].value.as_deref(), Some("3.5")),
            other => panic!("unexpected shape: {other:?}"),
        }
        let wrapped: PracticalSubmission =
            serde_json::from_str(r#"{"records":[{"name":"a","record":"2","gender":"m"}]}"#)
                .unwrap();
        assert!(matches!(
            wrapped,
            PracticalSubmission::LegacyWrapped { ref records } if records.len() == 1
        ));
    }

    #[test]
    fn events_keep_table_order() {
        let f = PracticalFormulaData {
            table: vec![
                PracticalRow::new("b", Gender::Male, "1", 10.0),
                PracticalRow::new("a", Gender::Male, "1", 10.0),
                PracticalRow::new("b", Gender::Female, "1", 10.0),
            ],
            ..PracticalFormulaData::default()
        };
        assert_eq!(f.events(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(f.rows_for("b", Gender::Female).count(), 1);
    }
}
