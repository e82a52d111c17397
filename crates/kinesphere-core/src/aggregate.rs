//! Statistics derived from a patient list.
//!
//! Pure functions, no I/O. Nothing here is persisted; two consecutive calls
//! can disagree if the underlying store changed in between.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::Patient;

/// Date format shared by session dates and [`today`].
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientStats {
    pub total_patients: u32,
    pub active_patients: u32,
    pub real_patients: u32,
    pub demo_patients: u32,
    pub sessions_today: u32,
    pub pending_evaluations: u32,
    /// Sessions per patient id
    pub session_counts: BTreeMap<String, u32>,
}

/// Today's local date formatted like stored session dates.
pub fn today() -> String {
    chrono::Local::now().format(DAY_FORMAT).to_string()
}

/// Patients that count toward totals: demo rows drop out as soon as one
/// real patient is present.
fn countable(patients: &[Patient]) -> impl Iterator<Item = &Patient> {
    let has_real = patients.iter().any(|p| !p.is_demo);
    patients.iter().filter(move |p| !has_real || !p.is_demo)
}

pub fn total_patients(patients: &[Patient]) -> u32 {
    countable(patients).count() as u32
}

pub fn active_patients(patients: &[Patient]) -> u32 {
    countable(patients).filter(|p| p.active).count() as u32
}

pub fn real_patients(patients: &[Patient]) -> u32 {
    patients.iter().filter(|p| !p.is_demo).count() as u32
}

pub fn demo_patients(patients: &[Patient]) -> u32 {
    patients.iter().filter(|p| p.is_demo).count() as u32
}

/// Patients whose last session date string equals `today` exactly.
///
/// This is string equality, not a calendar comparison: `2024-01-05` and
/// `01/05/2024` do not match.
// TODO: compare parsed calendar dates once every store writes `DAY_FORMAT`.
pub fn sessions_today(patients: &[Patient], today: &str) -> u32 {
    countable(patients)
        .filter(|p| p.last_session_date() == Some(today))
        .count() as u32
}

pub fn pending_evaluations(patients: &[Patient]) -> u32 {
    countable(patients).filter(|p| p.needs_evaluation()).count() as u32
}

/// Observed session count per patient id.
pub fn session_counts(patients: &[Patient]) -> BTreeMap<String, u32> {
    countable(patients)
        .map(|p| {
            let count = p.activity.as_ref().map_or(0, |a| a.session_count);
            (p.id.to_string(), count)
        })
        .collect()
}

pub fn compute(patients: &[Patient], today: &str) -> PatientStats {
    PatientStats {
        total_patients: total_patients(patients),
        active_patients: active_patients(patients),
        real_patients: real_patients(patients),
        demo_patients: demo_patients(patients),
        sessions_today: sessions_today(patients, today),
        pending_evaluations: pending_evaluations(patients),
        session_counts: session_counts(patients),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPatient, PatientActivity, PatientId};

    fn patient(id: i64, name: &str, is_demo: bool, last: Option<&str>) -> Patient {
        let mut p = Patient::from_new(PatientId::Int(id), &NewPatient::new(name), is_demo);
        p.activity = last.map(|d| PatientActivity {
            session_count: 1,
            last_session_date: Some(d.to_string()),
            evaluated: false,
        });
        p
    }

    #[test]
    fn test_sessions_today_is_exact_string_match() {
        let patients = vec![
            patient(1, "Juan Pérez", false, Some("2024-01-05")),
            patient(2, "María González", false, Some("01/05/2024")),
            patient(3, "Ana Silva", false, None),
        ];
        assert_eq!(sessions_today(&patients, "2024-01-05"), 1);
    }

    #[test]
    fn test_demo_rows_not_counted_once_real_exists() {
        let patients = vec![
            patient(1, "Juan Pérez", false, None),
            patient(2, "Paciente Demo", true, None),
        ];
        let stats = compute(&patients, "2024-01-05");
        assert_eq!(stats.total_patients, 1);
        assert_eq!(stats.real_patients, 1);
        assert_eq!(stats.demo_patients, 1);
        assert_eq!(stats.session_counts.len(), 1);
    }

    #[test]
    fn test_demo_only_list_is_counted() {
        let patients = vec![
            patient(1, "Paciente Demo", true, None),
            patient(2, "Carlos López", true, None),
        ];
        let stats = compute(&patients, "2024-01-05");
        assert_eq!(stats.total_patients, 2);
        assert_eq!(stats.real_patients, 0);
    }

    #[test]
    fn test_active_and_pending() {
        let mut done = patient(1, "Juan Pérez", false, Some("2024-01-05"));
        done.sessions_planned = 1;
        let mut inactive = patient(2, "María González", false, None);
        inactive.active = false;

        let patients = vec![done, inactive];
        assert_eq!(active_patients(&patients), 1);
        assert_eq!(pending_evaluations(&patients), 1);
    }

    #[test]
    fn test_today_format() {
        let day = today();
        assert!(chrono::NaiveDate::parse_from_str(&day, DAY_FORMAT).is_ok());
    }
}
