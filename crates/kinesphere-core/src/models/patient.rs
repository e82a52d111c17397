//! Patient models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Store-assigned patient identifier.
///
/// The embedded and browser stores hand out integers; the remote store may
/// answer with string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatientId {
    Int(i64),
    Text(String),
}

impl PatientId {
    /// Integer view of the id, parsing numeric strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PatientId::Int(n) => Some(*n),
            PatientId::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatientId::Int(n) => write!(f, "{}", n),
            PatientId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PatientId {
    fn from(n: i64) -> Self {
        PatientId::Int(n)
    }
}

/// Canonical integers ("42") become `Int`; anything else, including "0042",
/// stays text so it reaches the owning store unchanged.
impl From<&str> for PatientId {
    fn from(s: &str) -> Self {
        match s.parse::<i64>() {
            Ok(n) if n.to_string() == s => PatientId::Int(n),
            _ => PatientId::Text(s.to_string()),
        }
    }
}

/// A patient record as held by one of the stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Id assigned by the store that owns this row
    pub id: PatientId,
    /// Full name
    pub name: String,
    /// National id (RUT)
    pub national_id: Option<String>,
    pub age: Option<u32>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Clinical diagnosis
    pub diagnosis: Option<String>,
    /// Sessions planned for the treatment
    #[serde(default)]
    pub sessions_planned: u32,
    /// Sessions completed so far
    #[serde(default)]
    pub sessions_completed: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    pub notes: Option<String>,
    /// Seeded example data, never counted as a real patient
    #[serde(default)]
    pub is_demo: bool,
    /// Derived on read by the router, never persisted
    #[serde(skip)]
    pub activity: Option<PatientActivity>,
}

fn default_active() -> bool {
    true
}

/// Per-patient counters recomputed on every load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientActivity {
    /// Sessions the owning store holds for this patient
    pub session_count: u32,
    /// Date string of the most recent session, as stored
    pub last_session_date: Option<String>,
    /// Whether a final evaluation has been recorded
    pub evaluated: bool,
}

impl Patient {
    /// Build a patient from an add/update payload.
    pub fn from_new(id: PatientId, new: &NewPatient, is_demo: bool) -> Self {
        Self {
            id,
            name: new.name.clone(),
            national_id: new.national_id.clone(),
            age: new.age,
            email: new.email.clone(),
            phone: new.phone.clone(),
            diagnosis: new.diagnosis.clone(),
            sessions_planned: new.sessions_planned,
            sessions_completed: new.sessions_completed,
            active: new.active,
            created_at: chrono::Utc::now().to_rfc3339(),
            notes: new.notes.clone(),
            is_demo,
            activity: None,
        }
    }

    /// Overwrite the editable fields, keeping identity and provenance.
    pub fn apply(&mut self, update: &NewPatient) {
        self.name = update.name.clone();
        self.national_id = update.national_id.clone();
        self.age = update.age;
        self.email = update.email.clone();
        self.phone = update.phone.clone();
        self.diagnosis = update.diagnosis.clone();
        self.sessions_planned = update.sessions_planned;
        self.sessions_completed = update.sessions_completed;
        self.active = update.active;
        self.notes = update.notes.clone();
    }

    /// Last session date, if activity has been attached.
    pub fn last_session_date(&self) -> Option<&str> {
        self.activity
            .as_ref()
            .and_then(|a| a.last_session_date.as_deref())
    }

    /// Completed sessions, taking the larger of the stored counter and
    /// the observed session rows.
    pub fn completed_sessions(&self) -> u32 {
        let observed = self.activity.as_ref().map_or(0, |a| a.session_count);
        self.sessions_completed.max(observed)
    }

    /// Active patient whose name or RUT contains `term`, ignoring case.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        self.active
            && (self.name.to_lowercase().contains(&term)
                || self
                    .national_id
                    .as_deref()
                    .is_some_and(|rut| rut.to_lowercase().contains(&term)))
    }

    /// Treatment plan reached without a final evaluation on record.
    pub fn needs_evaluation(&self) -> bool {
        let evaluated = self.activity.as_ref().is_some_and(|a| a.evaluated);
        self.active
            && self.sessions_planned > 0
            && self.completed_sessions() >= self.sessions_planned
            && !evaluated
    }
}

/// Payload of the add-patient workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPatient {
    pub name: String,
    pub national_id: Option<String>,
    pub age: Option<u32>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub diagnosis: Option<String>,
    pub sessions_planned: u32,
    pub sessions_completed: u32,
    pub active: bool,
    pub notes: Option<String>,
}

impl NewPatient {
    /// Create a payload with required fields and the form defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            national_id: None,
            age: None,
            email: None,
            phone: None,
            diagnosis: None,
            sessions_planned: 10,
            sessions_completed: 0,
            active: true,
            notes: None,
        }
    }
}

/// The fixed demo patients shown when a store has no real data.
pub fn demo_patients() -> Vec<NewPatient> {
    vec![
        NewPatient {
            name: "Paciente Demo".into(),
            national_id: Some("12.345.678-9".into()),
            age: Some(35),
            email: Some("demo@email.com".into()),
            phone: Some("+56912345678".into()),
            diagnosis: Some("Lumbalgia crónica".into()),
            sessions_planned: 5,
            sessions_completed: 0,
            active: true,
            notes: None,
        },
        NewPatient {
            name: "Carlos López".into(),
            national_id: Some("15.234.567-8".into()),
            age: Some(28),
            email: Some("carlos.lopez@email.com".into()),
            phone: Some("+56987654321".into()),
            diagnosis: Some("Esguince tobillo".into()),
            sessions_planned: 8,
            sessions_completed: 5,
            active: true,
            notes: None,
        },
        NewPatient {
            name: "Ana Silva".into(),
            national_id: Some("17.876.543-2".into()),
            age: Some(52),
            email: Some("ana.silva@email.com".into()),
            phone: Some("+56911223344".into()),
            diagnosis: Some("Cervicalgia".into()),
            sessions_planned: 10,
            sessions_completed: 2,
            active: true,
            notes: None,
        },
    ]
}

/// Built-in demo records, numbered from 1, not backed by any store.
pub fn builtin_demo_patients() -> Vec<Patient> {
    demo_patients()
        .iter()
        .enumerate()
        .map(|(i, new)| Patient::from_new(PatientId::Int(i as i64 + 1), new, true))
        .collect()
}
