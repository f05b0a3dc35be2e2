//! Loader: read local JSON inputs with a byte limit, unwrap JSON-encoded
//! payloads, decode into `pe_core` records, and digest the canonical input.
//! No network I/O.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use pe_core::{
    safe_parse, FormulaData, GradeCut, HighestScoreMap, PracticalFormulaData, PracticalSubmission,
    StudentScores,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::hasher::sha256_canonical_value;
use crate::IoError;

/// Per-file byte limit.
pub const MAX_INPUT_BYTES: u64 = 8 * 1024 * 1024;

/// A decoded input with the SHA-256 of its canonical JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub sha256: String,
}

// ----------------------------- Raw read -----------------------------

/// Read and parse `path`, refusing files over `MAX_INPUT_BYTES`.
/// A top-level JSON string holding JSON is unwrapped once.
pub fn read_json_value_with_limits(path: &Path) -> Result<Value, IoError> {
    let f = File::open(path).map_err(|e| IoError::Path(format!("{} ({e})", path.display())))?;
    let mut buf = Vec::new();
    f.take(MAX_INPUT_BYTES + 1)
        .read_to_end(&mut buf)
        .map_err(|e| IoError::Path(format!("{} ({e})", path.display())))?;
    if buf.len() as u64 > MAX_INPUT_BYTES {
        return Err(IoError::Limit {
            path: path.display().to_string(),
            limit: MAX_INPUT_BYTES,
        });
    }
    let v: Value = serde_json::from_slice(&buf).map_err(|e| IoError::Json {
        pointer: format!("{}:{}:{}", path.display(), e.line(), e.column()),
        msg: e.to_string(),
    })?;
    Ok(safe_parse::json_or_value(&v))
}

fn decode<T: DeserializeOwned>(path: &Path, v: Value) -> Result<T, IoError> {
    serde_json::from_value(v).map_err(|e| IoError::Json {
        pointer: path.display().to_string(),
        msg: e.to_string(),
    })
}

fn load_typed<T: DeserializeOwned>(path: &Path) -> Result<Loaded<T>, IoError> {
    let v = read_json_value_with_limits(path)?;
    let sha256 = sha256_canonical_value(&v);
    let value = decode(path, v)?;
    tracing::debug!(path = %path.display(), %sha256, "input loaded");
    Ok(Loaded { value, sha256 })
}

/// Pull the list out of `{ "<key>": [...] }` wrappers; bare arrays pass through.
fn unwrap_list(v: Value, keys: &[&str]) -> Value {
    match v {
        Value::Object(mut m) => {
            for k in keys {
                if let Some(inner) = m.remove(*k) {
                    return safe_parse::json_or_value(&inner);
                }
            }
            Value::Object(m)
        }
        other => other,
    }
}

// ----------------------------- Targeted loaders -----------------------------

pub fn load_formula(path: &Path) -> Result<Loaded<FormulaData>, IoError> {
    load_typed(path)
}

pub fn load_practical_formula(path: &Path) -> Result<Loaded<PracticalFormulaData>, IoError> {
    load_typed(path)
}

/// Student scores: a bare array of entries, or an object wrapping one under
/// `scores` / `성적`.
pub fn load_scores(path: &Path) -> Result<Loaded<StudentScores>, IoError> {
    let v = read_json_value_with_limits(path)?;
    let sha256 = sha256_canonical_value(&v);
    let list = unwrap_list(v, &["scores", "성적"]);
    if !list.is_array() {
        return Err(IoError::Invalid(format!(
            "{}: expected an array of score entries",
            path.display()
        )));
    }
    Ok(Loaded {
        value: decode(path, list)?,
        sha256,
    })
}

/// Cohort highest-score map. Values that do not parse as numbers are dropped.
pub fn load_highest_map(path: &Path) -> Result<Loaded<HighestScoreMap>, IoError> {
    let v = read_json_value_with_limits(path)?;
    let sha256 = sha256_canonical_value(&v);
    if !v.is_object() {
        return Err(IoError::Invalid(format!(
            "{}: expected an object of subject → score",
            path.display()
        )));
    }
    let mut map = HighestScoreMap::new();
    for (k, raw) in safe_parse::to_object(&v) {
        match safe_parse::to_f64(&raw) {
            Some(x) => {
                map.insert(k, x);
            }
            None => tracing::warn!(
                subject = %k,
                value = %raw,
                "highest-score entry is not a number, dropped"
            ),
        }
    }
    Ok(Loaded { value: map, sha256 })
}

/// Practical submission in any accepted shape; JSON `null` is no submission.
pub fn load_practical_submission(
    path: &Path,
) -> Result<Loaded<Option<PracticalSubmission>>, IoError> {
    let v = read_json_value_with_limits(path)?;
    let sha256 = sha256_canonical_value(&v);
    let value = match v {
        Value::Null => None,
        other => Some(decode(path, other)?),
    };
    Ok(Loaded { value, sha256 })
}

/// Grade-cut rows: a bare array, or an object wrapping one under `cuts` / `rows`.
pub fn load_grade_cuts(path: &Path) -> Result<Loaded<Vec<GradeCut>>, IoError> {
    let v = read_json_value_with_limits(path)?;
    let sha256 = sha256_canonical_value(&v);
    let list = unwrap_list(v, &["cuts", "rows", "등급컷"]);
    let cuts: Vec<GradeCut> = decode(path, list)?;
    if cuts.is_empty() {
        return Err(IoError::Invalid(format!("{}: grade-cut table is empty", path.display())));
    }
    Ok(Loaded { value: cuts, sha256 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn string_wrapped_json_is_unwrapped() {
        let f = file(r#""{\"총점\": \"500\", \"수능비율\": 80}""#);
        let loaded = load_formula(f.path()).unwrap();
        assert_eq!(loaded.value.total_score, 500.0);
        assert_eq!(loaded.value.exam_total(), 400.0);
    }

    #[test]
    fn digest_ignores_formatting() {
        let a = file(r#"{"a": 1, "b": [1, 2]}"#);
        let b = file("{\n  \"b\": [1,2],\n  \"a\": 1\n}");
        let ha = sha256_canonical_value(&read_json_value_with_limits(a.path()).unwrap());
        let hb = sha256_canonical_value(&read_json_value_with_limits(b.path()).unwrap());
        assert_eq!(ha, hb);
    }

    #[test]
    fn highest_map_drops_non_numbers() {
        let f = file(r#"{"국어": "139", "수학": 145, "물리학1": "n/a"}"#);
        let m = load_highest_map(f.path()).unwrap().value;
        assert_eq!(m.len(), 2);
        assert_eq!(m["국어"], 139.0);
    }

    #[test]
    fn null_submission_is_none() {
        let f = file("null");
        assert!(load_practical_submission(f.path()).unwrap().value.is_none());
    }

    #[test]
    fn oversized_input_is_refused() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let chunk = vec![b' '; 1024 * 1024];
        for _ in 0..9 {
            f.write_all(&chunk).unwrap();
        }
        f.write_all(b"{}").unwrap();
        assert!(matches!(read_json_value_with_limits(f.path()), Err(IoError::Limit { .. })));
    }

    #[test]
    fn syntax_errors_carry_location() {
        let f = file("{\"a\": }");
        match read_json_value_with_limits(f.path()) {
            Err(IoError::Json { pointer, .. }) => assert!(pointer.contains(":1:")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
