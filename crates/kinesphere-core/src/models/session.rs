//! Treatment session models.

use serde::{Deserialize, Serialize};

use super::patient::PatientId;

/// A clinical encounter for one patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Store-assigned id
    pub id: String,
    pub patient_id: PatientId,
    /// Ordinal for this patient, derived from the session count at write time
    pub number: u32,
    /// Session date (`YYYY-MM-DD`)
    pub date: String,
    /// Pain on the EVA scale, 0..=10
    pub pain_scale: Option<u8>,
    /// Sleep quality, 1..=5
    pub sleep_quality: Option<u8>,
    /// Exercises performed, free text
    pub exercises: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub sent_whatsapp: bool,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}

impl Session {
    /// Build a stored session from the add payload.
    pub fn from_new(id: String, number: u32, new: &NewSession) -> Self {
        Self {
            id,
            patient_id: new.patient_id.clone(),
            number,
            date: new.date.clone(),
            pain_scale: new.pain_scale,
            sleep_quality: new.sleep_quality,
            exercises: new.exercises.clone(),
            notes: new.notes.clone(),
            sent_whatsapp: new.sent_whatsapp,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Whether any exercises were recorded.
    pub fn exercises_done(&self) -> bool {
        self.exercises.as_deref().is_some_and(|e| !e.trim().is_empty())
    }
}

/// Payload of the record-session workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewSession {
    pub patient_id: PatientId,
    pub date: String,
    pub pain_scale: Option<u8>,
    pub sleep_quality: Option<u8>,
    pub exercises: Option<String>,
    pub notes: Option<String>,
    pub sent_whatsapp: bool,
}

impl NewSession {
    /// Create a session dated today.
    pub fn new(patient_id: PatientId) -> Self {
        Self {
            patient_id,
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            pain_scale: None,
            sleep_quality: None,
            exercises: None,
            notes: None,
            sent_whatsapp: false,
        }
    }

    /// Clamp the scale values into their clinical ranges.
    pub fn clamped(mut self) -> Self {
        self.pain_scale = self.pain_scale.map(|v| v.min(10));
        self.sleep_quality = self.sleep_quality.map(|v| v.clamp(1, 5));
        self
    }
}

/// Ordinal for the next session given the sessions already on record.
pub fn next_session_number(existing: &[Session]) -> u32 {
    existing.len() as u32 + 1
}

/// Most recent session date by string ordering.
pub fn last_session_date(sessions: &[Session]) -> Option<String> {
    sessions.iter().map(|s| s.date.clone()).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_session_number() {
        assert_eq!(next_session_number(&[]), 1);

        let new = NewSession::new(PatientId::Int(1));
        let sessions = vec![
            Session::from_new("a".into(), 1, &new),
            Session::from_new("b".into(), 2, &new),
        ];
        assert_eq!(next_session_number(&sessions), 3);
    }

    #[test]
    fn test_clamped_scales() {
        let mut new = NewSession::new(PatientId::Int(1));
        new.pain_scale = Some(14);
        new.sleep_quality = Some(0);
        let new = new.clamped();
        assert_eq!(new.pain_scale, Some(10));
        assert_eq!(new.sleep_quality, Some(1));
    }

    #[test]
    fn test_exercises_done() {
        let mut new = NewSession::new(PatientId::Int(1));
        assert!(!Session::from_new("a".into(), 1, &new).exercises_done());
        new.exercises = Some("Puente glúteo 3x10".into());
        assert!(Session::from_new("a".into(), 1, &new).exercises_done());
    }

    #[test]
    fn test_last_session_date() {
        let mut new = NewSession::new(PatientId::Int(1));
        new.date = "2024-01-03".into();
        let first = Session::from_new("a".into(), 1, &new);
        new.date = "2024-01-05".into();
        let second = Session::from_new("b".into(), 2, &new);
        assert_eq!(
            last_session_date(&[second, first]),
            Some("2024-01-05".to_string())
        );
    }
}
