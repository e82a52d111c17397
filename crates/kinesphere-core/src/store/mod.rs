//! # Storage Layer
//!
//! The [`PatientStore`] trait is the one logical data contract (patients,
//! sessions, derived statistics) over three physically incompatible stores:
//!
//! - [`embedded::EmbeddedStore`]: on-device SQLite, native runtimes only.
//! - [`browser::BrowserStore`]: key/value area of the web context.
//! - [`crate::router::RemoteStore`]: the REST backend, reached through
//!   [`crate::remote::RemoteClient`].
//!
//! Each store owns its own rows. Stores never substitute data from another
//! store; that decision belongs to [`crate::router::PersistenceRouter`].

pub mod browser;
pub mod embedded;
pub mod kv;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::aggregate::{self, PatientStats};
use crate::models::{
    Evaluation, NewEvaluation, NewPatient, NewSession, Patient, PatientActivity, PatientId,
    Session,
};
use crate::remote::RemoteError;

/// Which physical store produced or accepted something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Embedded,
    Browser,
    Remote,
}

impl StoreKind {
    /// Short label used in user-facing status messages.
    pub fn label(&self) -> &'static str {
        match self {
            StoreKind::Embedded => "mobile",
            StoreKind::Browser => "browser",
            StoreKind::Remote => "web",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Store-level errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} store is not ready")]
    NotReady(StoreKind),

    #[error("{store} store unavailable: {reason}")]
    StoreUnavailable { store: StoreKind, reason: String },

    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(#[from] RemoteError),

    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn unavailable(store: StoreKind, reason: impl fmt::Display) -> Self {
        StoreError::StoreUnavailable {
            store,
            reason: reason.to_string(),
        }
    }

    /// Whether the store could not be reached at all, as opposed to a
    /// definite answer such as `NotFound`.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The operation set every store offers.
#[async_trait]
pub trait PatientStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Wait until the store can serve calls, at most `timeout`.
    async fn await_ready(&self, _timeout: Duration) -> StoreResult<()> {
        Ok(())
    }

    /// Patients to show: real rows, or demo rows only when no real row exists.
    async fn list_patients(&self) -> StoreResult<Vec<Patient>>;

    async fn get_patient(&self, id: &PatientId) -> StoreResult<Patient>;

    /// Insert a user-entered patient. Never creates demo rows.
    async fn add_patient(&self, patient: &NewPatient) -> StoreResult<Patient>;

    async fn update_patient(&self, id: &PatientId, patient: &NewPatient) -> StoreResult<Patient>;

    /// Remove a patient and that patient's sessions from this store.
    async fn delete_patient(&self, id: &PatientId) -> StoreResult<()>;

    async fn list_sessions_for_patient(&self, id: &PatientId) -> StoreResult<Vec<Session>>;

    /// Insert a session whose ordinal the caller computed.
    async fn add_session(&self, session: &NewSession, number: u32) -> StoreResult<Session>;

    /// Remove every user-entered patient. Returns how many were removed.
    async fn clear_user_data(&self) -> StoreResult<usize>;

    /// Active patients whose name or RUT contains `term`.
    async fn search_patients(&self, term: &str) -> StoreResult<Vec<Patient>> {
        let patients = self.list_patients().await?;
        Ok(patients.into_iter().filter(|p| p.matches(term)).collect())
    }

    /// Only the embedded store keeps evaluations.
    async fn add_evaluation(&self, _evaluation: &NewEvaluation) -> StoreResult<Evaluation> {
        Err(StoreError::unavailable(self.kind(), "evaluations are not kept here"))
    }

    async fn list_evaluations_for_patient(&self, _id: &PatientId) -> StoreResult<Vec<Evaluation>> {
        Ok(Vec::new())
    }

    async fn has_final_evaluation(&self, _id: &PatientId) -> StoreResult<bool> {
        Ok(false)
    }

    /// `list_patients` with session counters attached to each patient.
    async fn list_patients_with_activity(&self) -> StoreResult<Vec<Patient>> {
        let mut patients = self.list_patients().await?;
        for patient in &mut patients {
            let sessions = self.list_sessions_for_patient(&patient.id).await?;
            patient.activity = Some(PatientActivity {
                session_count: sessions.len() as u32,
                last_session_date: crate::models::last_session_date(&sessions),
                evaluated: self.has_final_evaluation(&patient.id).await?,
            });
        }
        Ok(patients)
    }

    async fn compute_stats(&self) -> StoreResult<PatientStats> {
        let patients = self.list_patients_with_activity().await?;
        Ok(aggregate::compute(&patients, &aggregate::today()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_labels() {
        assert_eq!(StoreKind::Embedded.to_string(), "mobile");
        assert_eq!(StoreKind::Remote.to_string(), "web");
        assert_eq!(StoreKind::Browser.to_string(), "browser");
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(StoreError::NotReady(StoreKind::Embedded).is_unavailable());
        assert!(StoreError::unavailable(StoreKind::Browser, "disk full").is_unavailable());
        assert!(!StoreError::NotFound("patient 1".into()).is_unavailable());
    }
}
