//! Format-compatibility adapter for practical submissions.
//!
//! Older submissions repeat the gender on every record. The adapter lifts the
//! first recognizable per-record gender to the top level and drops the rest.

use pe_core::{
    CalcLog, EventRecord, Gender, LegacyPracticalRecord, PracticalSubmission, StudentPracticalData,
};

/// Bring any accepted submission shape into the current one.
///
/// `None` when there is nothing usable: absent data, or a submission of either
/// shape from which no gender can be recovered. Every such case is logged.
pub fn adapt_submission(
    submission: Option<&PracticalSubmission>,
    log: &mut CalcLog,
) -> Option<StudentPracticalData> {
    match submission {
        None => {
            log.push("practical: no student data");
            tracing::warn!("practical submission absent");
            None
        }
        Some(PracticalSubmission::Current(data)) if data.gender == Gender::Common => {
            log.push(format!(
                "practical: submission of {} records carries no recognizable gender, not scored",
                data.records.len()
            ));
            tracing::warn!(records = data.records.len(), "practical submission without gender");
            None
        }
        Some(PracticalSubmission::Current(data)) => Some(data.clone()),
        Some(PracticalSubmission::Legacy(records))
        | Some(PracticalSubmission::LegacyWrapped { records }) => upgrade_legacy(records, log),
    }
}

fn upgrade_legacy(
    records: &[LegacyPracticalRecord],
    log: &mut CalcLog,
) -> Option<StudentPracticalData> {
    let gender = records
        .iter()
        .filter_map(|r| r.gender.as_deref())
        .map(Gender::parse_lenient)
        .find(|g| *g != Gender::Common);

    let Some(gender) = gender else {
        log.push(format!(
            "practical: legacy submission of {} records carries no recognizable gender, not scored",
            records.len()
        ));
        tracing::warn!(records = records.len(), "legacy practical submission without gender");
        return None;
    };

    let conflicting = records
        .iter()
        .filter_map(|r| r.gender.as_deref())
        .map(Gender::parse_lenient)
        .filter(|g| *g != Gender::Common && *g != gender)
        .count();
    if conflicting > 0 {
        log.push(format!(
            "practical: {conflicting} legacy records disagree on gender, using {gender}"
        ));
    }

    log.push(format!(
        "practical: upgraded legacy submission ({} records, gender {gender})",
        records.len()
    ));
    tracing::debug!(
        records = records.len(),
        gender = gender.as_str(),
        "legacy practical submission upgraded"
    );

    let records = records
        .iter()
        .map(|r| EventRecord {
            event: r.event.clone(),
            value: r.value.clone(),
        })
        .collect();
    Some(StudentPracticalData::new(gender, records))
}
