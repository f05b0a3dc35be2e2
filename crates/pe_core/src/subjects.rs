//! Exam subjects and the student's per-subject score entries.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::safe_parse::de;

/// Subject category. Declaration order is the canonical tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Subject {
    #[serde(rename = "language", alias = "국어", alias = "korean")]
    Language,
    #[serde(rename = "math", alias = "수학")]
    Math,
    #[serde(rename = "english", alias = "영어")]
    English,
    #[serde(rename = "elective", alias = "탐구", alias = "inquiry")]
    Elective,
    #[serde(rename = "history", alias = "한국사")]
    History,
}

impl Subject {
    pub const ALL: [Subject; 5] = [
        Subject::Language,
        Subject::Math,
        Subject::English,
        Subject::Elective,
        Subject::History,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Language => "language",
            Subject::Math => "math",
            Subject::English => "english",
            Subject::Elective => "elective",
            Subject::History => "history",
        }
    }

    /// Name used by the cohort highest-score map when an entry has no own name.
    pub fn korean_name(self) -> &'static str {
        match self {
            Subject::Language => "국어",
            Subject::Math => "수학",
            Subject::English => "영어",
            Subject::Elective => "탐구",
            Subject::History => "한국사",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "language" | "korean" | "국어" => Ok(Subject::Language),
            "math" | "수학" => Ok(Subject::Math),
            "english" | "영어" => Ok(Subject::English),
            "elective" | "inquiry" | "탐구" => Ok(Subject::Elective),
            "history" | "한국사" => Ok(Subject::History),
            other => Err(CoreError::InvalidSubject(other.to_string())),
        }
    }
}

serde_enum!(
    /// Elective track. Conversion tables and boosts are keyed by group.
    ElectiveGroup => {
        Science = "science",
        Social  = "social"
    }
);

const SCIENCE_MARKERS: [&str; 8] = [
    "물리", "화학", "생명", "지구", "physics", "chemistry", "biology", "earth",
];

impl ElectiveGroup {
    /// Classify an elective by its subject name. Anything that is not a
    /// science-track subject is treated as social track.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if SCIENCE_MARKERS.iter().any(|m| lower.contains(m)) {
            ElectiveGroup::Science
        } else {
            ElectiveGroup::Social
        }
    }
}

/// One subject score entry. Any subset of fields may be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectScore {
    #[serde(alias = "category")]
    pub subject: Subject,
    /// Elective subject name (e.g. 물리학1) or math elective (e.g. 미적분).
    #[serde(
        default,
        alias = "과목명",
        deserialize_with = "de::loose_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        alias = "등급",
        deserialize_with = "de::loose_opt_u8",
        skip_serializing_if = "Option::is_none"
    )]
    pub grade: Option<u8>,
    #[serde(
        default,
        alias = "원점수",
        deserialize_with = "de::loose_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub raw: Option<f64>,
    #[serde(
        default,
        alias = "표준점수",
        deserialize_with = "de::loose_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub standard: Option<f64>,
    #[serde(
        default,
        alias = "백분위",
        deserialize_with = "de::loose_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub percentile: Option<f64>,
    #[serde(
        default,
        alias = "변환표준점수",
        deserialize_with = "de::loose_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub converted: Option<f64>,
}

impl SubjectScore {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            name: None,
            grade: None,
            raw: None,
            standard: None,
            percentile: None,
            converted: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_grade(mut self, grade: u8) -> Self {
        self.grade = Some(grade);
        self
    }

    pub fn with_standard(mut self, standard: f64) -> Self {
        self.standard = Some(standard);
        self
    }

    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = Some(percentile);
        self
    }

    pub fn with_converted(mut self, converted: f64) -> Self {
        self.converted = Some(converted);
        self
    }

    /// Display label: own name when present, else the subject token.
    pub fn label(&self) -> String {
        match &self.name {
            Some(n) => format!("{}({})", self.subject, n),
            None => self.subject.to_string(),
        }
    }

    /// Elective track for this entry (meaningful for electives only).
    pub fn elective_group(&self) -> ElectiveGroup {
        self.name
            .as_deref()
            .map(ElectiveGroup::from_name)
            .unwrap_or(ElectiveGroup::Social)
    }
}

/// Ordered per-subject entries. Several entries may share a subject (electives).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentScores {
    pub entries: Vec<SubjectScore>,
}

impl StudentScores {
    pub fn new(entries: Vec<SubjectScore>) -> Self {
        Self { entries }
    }

    /// First entry for a subject, in input order.
    pub fn first(&self, subject: Subject) -> Option<&SubjectScore> {
        self.entries.iter().find(|e| e.subject == subject)
    }

    /// All entries for a subject, in input order.
    pub fn all(&self, subject: Subject) -> impl Iterator<Item = &SubjectScore> {
        self.entries.iter().filter(move |e| e.subject == subject)
    }

    pub fn electives(&self) -> Vec<&SubjectScore> {
        self.all(Subject::Elective).collect()
    }

    pub fn grade_of(&self, subject: Subject) -> Option<u8> {
        self.first(subject).and_then(|e| e.grade)
    }

    /// Best (numerically lowest) elective grade.
    pub fn best_elective_grade(&self) -> Option<u8> {
        self.all(Subject::Elective).filter_map(|e| e.grade).min()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_tokens_round_trip_through_korean_aliases() {
        let s: Subject = serde_json::from_str("\"국어\"").unwrap();
        assert_eq!(s, Subject::Language);
        assert_eq!("탐구".parse::<Subject>().unwrap(), Subject::Elective);
        assert!("art".parse::<Subject>().is_err());
    }

    #[test]
    fn elective_group_from_name() {
        assert_eq!(ElectiveGroup::from_name("물리학1"), ElectiveGroup::Science);
        assert_eq!(ElectiveGroup::from_name("생활과윤리"), ElectiveGroup::Social);
    }

    #[test]
    fn entries_accept_loose_values() {
        let e: SubjectScore = serde_json::from_str(
            r#"{"subject":"탐구","과목명":"화학1","표준점수":"65","백분위":91,"등급":"2등급"}"#,
        )
        .unwrap();
        assert_eq!(e.standard, Some(65.0));
        assert_eq!(e.grade, Some(2));
        assert_eq!(e.elective_group(), ElectiveGroup::Science);
    }

    #[test]
    fn best_elective_grade_is_minimum() {
        let s = StudentScores::new(vec![
            SubjectScore::new(Subject::Elective).with_grade(4),
            SubjectScore::new(Subject::Elective).with_grade(2),
        ]);
        assert_eq!(s.best_elective_grade(), Some(2));
    }
}
