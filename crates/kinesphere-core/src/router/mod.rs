//! # Persistence Router
//!
//! Single entry point for patient and session data. The detected
//! [`PlatformProfile`] decides which store is primary:
//!
//! ```text
//! native  → primary: embedded   secondary: remote
//! web     → primary: remote     secondary: browser
//! ```
//!
//! Patient lists go to the primary and fall back to the secondary only when
//! the primary errors, returns nothing, or returns only demo rows; the last
//! resort is the built-in demo list. Reads never fail.
//!
//! Ids are issued per store. Reads scoped to one patient (the patient
//! itself, sessions, evaluations) go to the store that owns that patient
//! and never consult another store under the same id.
//!
//! Writes go to both stores at once, primary issued first. A write succeeds
//! when at least one store accepted it. Stores are never reconciled
//! afterwards, so a write accepted by one store only leaves them diverged.

mod remote_store;

pub use remote_store::RemoteStore;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::aggregate::{self, PatientStats};
use crate::models::{
    builtin_demo_patients, next_session_number, Evaluation, NewEvaluation, NewPatient,
    NewSession, Patient, PatientId, Session,
};
use crate::platform::{DataStrategy, PlatformProfile};
use crate::store::embedded::DEFAULT_READY_TIMEOUT;
use crate::store::{PatientStore, StoreError, StoreKind, StoreResult};

/// Router tuning.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// How long each call waits for a store that is still initializing
    pub ready_timeout: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

/// Where a read result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Store(StoreKind),
    /// No reachable store had data; built-in demo data (or nothing).
    BuiltInDemo,
}

/// One store's failure during a routed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFailure {
    pub store: StoreKind,
    pub reason: String,
}

impl StoreFailure {
    fn new(store: StoreKind, error: &StoreError) -> Self {
        Self {
            store,
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for StoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} store failed: {}", self.store, self.reason)
    }
}

/// Best-effort read result.
#[derive(Debug, Clone)]
pub struct ReadOutcome<T> {
    pub value: T,
    pub source: Source,
    /// Human-readable summary for the UI
    pub status: String,
    pub failures: Vec<StoreFailure>,
}

impl<T> ReadOutcome<T> {
    fn new(what: &str, value: T, source: Source, failures: Vec<StoreFailure>) -> Self {
        let status = read_status(what, source, &failures);
        Self {
            value,
            source,
            status,
            failures,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ReadOutcome<U> {
        ReadOutcome {
            value: f(self.value),
            source: self.source,
            status: self.status,
            failures: self.failures,
        }
    }
}

/// Result of a write accepted by at least one store.
#[derive(Debug, Clone)]
pub struct WriteOutcome<T> {
    /// Record returned by the first accepting store, in attempt order
    pub value: T,
    /// Accepting stores, in attempt order
    pub saved_in: Vec<StoreKind>,
    pub message: String,
    pub failures: Vec<StoreFailure>,
}

/// Result of clearing user data from every store.
#[derive(Debug, Clone)]
pub struct ClearOutcome {
    /// Patients removed, summed over stores
    pub removed: usize,
    pub cleared: Vec<StoreKind>,
    pub message: String,
    pub failures: Vec<StoreFailure>,
}

/// Router errors.
#[derive(Error, Debug)]
pub enum RouterError {
    /// Every store rejected the write.
    #[error("{message}")]
    NothingSaved {
        message: String,
        failures: Vec<StoreFailure>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type RouterResult<T> = Result<T, RouterError>;

fn read_status(what: &str, source: Source, failures: &[StoreFailure]) -> String {
    let origin = match source {
        Source::Store(kind) => format!("{} loaded from {} store", what, kind),
        Source::BuiltInDemo => format!("no stored {}, showing demo data", what),
    };
    if failures.is_empty() {
        return origin;
    }
    let failed = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} ({})", origin, failed)
}

/// "mobile", "mobile and web"
fn store_list(kinds: &[StoreKind]) -> String {
    kinds
        .iter()
        .map(|k| k.label())
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Routes calls between the stores according to the platform profile.
pub struct PersistenceRouter {
    profile: PlatformProfile,
    embedded: Arc<dyn PatientStore>,
    browser: Arc<dyn PatientStore>,
    remote: Arc<dyn PatientStore>,
    settings: RouterSettings,
}

impl PersistenceRouter {
    pub fn new(
        profile: PlatformProfile,
        embedded: Arc<dyn PatientStore>,
        browser: Arc<dyn PatientStore>,
        remote: Arc<dyn PatientStore>,
        settings: RouterSettings,
    ) -> Self {
        tracing::info!(
            "persistence router for {} ({:?})",
            profile.description,
            profile.data_strategy()
        );
        Self {
            profile,
            embedded,
            browser,
            remote,
            settings,
        }
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    /// Swap in a re-detected profile; store roles follow on the next call.
    pub fn replace_profile(&mut self, profile: PlatformProfile) {
        tracing::info!("router profile replaced: {}", profile.description);
        self.profile = profile;
    }

    /// (primary, secondary) for the current profile.
    fn stores(&self) -> (&dyn PatientStore, &dyn PatientStore) {
        match self.profile.data_strategy() {
            DataStrategy::Embedded => (self.embedded.as_ref(), self.remote.as_ref()),
            DataStrategy::BrowserStorage => (self.remote.as_ref(), self.browser.as_ref()),
        }
    }

    pub fn primary_kind(&self) -> StoreKind {
        self.stores().0.kind()
    }

    fn store(&self, kind: StoreKind) -> &dyn PatientStore {
        match kind {
            StoreKind::Embedded => self.embedded.as_ref(),
            StoreKind::Browser => self.browser.as_ref(),
            StoreKind::Remote => self.remote.as_ref(),
        }
    }

    async fn ready(&self, store: &dyn PatientStore) -> StoreResult<()> {
        store.await_ready(self.settings.ready_timeout).await
    }

    // --- Reads ---

    async fn fetch_patients(
        &self,
        store: &dyn PatientStore,
        with_activity: bool,
    ) -> StoreResult<Vec<Patient>> {
        self.ready(store).await?;
        if with_activity {
            store.list_patients_with_activity().await
        } else {
            store.list_patients().await
        }
    }

    async fn read_patients(&self, with_activity: bool) -> ReadOutcome<Vec<Patient>> {
        let (primary, secondary) = self.stores();
        let mut failures = Vec::new();
        let mut demo_rows: Option<(StoreKind, Vec<Patient>)> = None;

        for store in [primary, secondary] {
            match self.fetch_patients(store, with_activity).await {
                Ok(rows) if rows.iter().any(|p| !p.is_demo) => {
                    let real: Vec<Patient> = rows.into_iter().filter(|p| !p.is_demo).collect();
                    return ReadOutcome::new("patients", real, Source::Store(store.kind()), failures);
                }
                Ok(rows) if !rows.is_empty() => {
                    tracing::debug!("{} store holds only demo patients", store.kind());
                    if demo_rows.is_none() {
                        demo_rows = Some((store.kind(), rows));
                    }
                }
                Ok(_) => tracing::debug!("{} store holds no patients", store.kind()),
                Err(e) => {
                    tracing::warn!("{} store patient read failed: {}", store.kind(), e);
                    failures.push(StoreFailure::new(store.kind(), &e));
                }
            }
        }

        match demo_rows {
            Some((kind, rows)) => ReadOutcome::new("patients", rows, Source::Store(kind), failures),
            None => ReadOutcome::new(
                "patients",
                builtin_demo_patients(),
                Source::BuiltInDemo,
                failures,
            ),
        }
    }

    /// Patients to show. Never mixes demo and real rows.
    pub async fn list_patients(&self) -> ReadOutcome<Vec<Patient>> {
        self.read_patients(false).await
    }

    /// The store owning `id`, located the way lists are served: a real row
    /// beats a demo row and the primary beats the secondary.
    ///
    /// Ids are only meaningful inside the store that issued them, so every
    /// patient-scoped read after this goes to the owner alone.
    async fn locate_patient(
        &self,
        id: &PatientId,
        failures: &mut Vec<StoreFailure>,
    ) -> Option<(&dyn PatientStore, Patient)> {
        let (primary, secondary) = self.stores();
        let mut demo: Option<(&dyn PatientStore, Patient)> = None;

        for store in [primary, secondary] {
            let result = match self.ready(store).await {
                Ok(()) => store.get_patient(id).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(patient) if !patient.is_demo => return Some((store, patient)),
                Ok(patient) => {
                    demo.get_or_insert((store, patient));
                }
                Err(StoreError::NotFound(_)) => {
                    tracing::debug!("patient {} not in {} store", id, store.kind());
                }
                Err(e) => {
                    tracing::warn!("{} store lookup of patient {} failed: {}", store.kind(), id, e);
                    failures.push(StoreFailure::new(store.kind(), &e));
                }
            }
        }
        demo
    }

    /// Stores to ask for a patient's data: its owner alone when known,
    /// otherwise every store that has not already failed, primary first.
    fn scoped_stores<'a>(
        &'a self,
        owner: Option<&'a dyn PatientStore>,
        failures: &[StoreFailure],
    ) -> Vec<&'a dyn PatientStore> {
        if let Some(store) = owner {
            return vec![store];
        }
        let (primary, secondary) = self.stores();
        [primary, secondary]
            .into_iter()
            .filter(|store| !failures.iter().any(|f| f.store == store.kind()))
            .collect()
    }

    /// One patient from the store that owns it, else the built-in demo list.
    ///
    /// A demo patient is returned only when no store holds a real patient
    /// under the same id.
    pub async fn get_patient(&self, id: &PatientId) -> ReadOutcome<Option<Patient>> {
        let mut failures = Vec::new();
        match self.locate_patient(id, &mut failures).await {
            Some((store, patient)) => {
                ReadOutcome::new("patient", Some(patient), Source::Store(store.kind()), failures)
            }
            None => {
                let demo = builtin_demo_patients().into_iter().find(|p| &p.id == id);
                ReadOutcome::new("patient", demo, Source::BuiltInDemo, failures)
            }
        }
    }

    /// Sessions of one patient, read from the store that owns the patient.
    ///
    /// An empty answer from that store is final; another store's sessions
    /// under the same id belong to a different patient.
    pub async fn list_sessions(&self, patient_id: &PatientId) -> ReadOutcome<Vec<Session>> {
        let mut failures = Vec::new();
        let owner = self
            .locate_patient(patient_id, &mut failures)
            .await
            .map(|(store, _)| store);

        for store in self.scoped_stores(owner, &failures) {
            let result = match self.ready(store).await {
                Ok(()) => store.list_sessions_for_patient(patient_id).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(sessions) => {
                    return ReadOutcome::new("sessions", sessions, Source::Store(store.kind()), failures)
                }
                Err(e) => {
                    tracing::warn!("{} store session read failed: {}", store.kind(), e);
                    failures.push(StoreFailure::new(store.kind(), &e));
                }
            }
        }

        ReadOutcome::new("sessions", Vec::new(), Source::BuiltInDemo, failures)
    }

    /// Ordinal the next session of this patient gets: authoritative count + 1.
    pub async fn next_session_number(&self, patient_id: &PatientId) -> u32 {
        next_session_number(&self.list_sessions(patient_id).await.value)
    }

    /// Dashboard statistics over whatever list the read contract yields.
    pub async fn compute_stats(&self) -> ReadOutcome<PatientStats> {
        self.compute_stats_for_day(&aggregate::today()).await
    }

    pub async fn compute_stats_for_day(&self, today: &str) -> ReadOutcome<PatientStats> {
        self.read_patients(true)
            .await
            .map(|patients| aggregate::compute(&patients, today))
    }

    /// Active patients whose name or RUT contains `term`, searched in the
    /// store that serves the patient list. Never mixes demo and real rows.
    pub async fn search_patients(&self, term: &str) -> ReadOutcome<Vec<Patient>> {
        let listed = self.read_patients(false).await;
        let showing_demo = listed.value.iter().all(|p| p.is_demo);
        let mut failures = listed.failures;

        if let Source::Store(kind) = listed.source {
            let store = self.store(kind);
            match store.search_patients(term).await {
                Ok(rows) => {
                    let rows: Vec<Patient> =
                        rows.into_iter().filter(|p| p.is_demo == showing_demo).collect();
                    return ReadOutcome::new("patients", rows, listed.source, failures);
                }
                Err(e) => {
                    tracing::warn!("{} store search failed: {}", kind, e);
                    failures.push(StoreFailure::new(kind, &e));
                }
            }
        }

        let rows: Vec<Patient> = listed.value.into_iter().filter(|p| p.matches(term)).collect();
        ReadOutcome::new("patients", rows, listed.source, failures)
    }

    /// Evaluations recorded for a patient in the store that owns it.
    pub async fn list_evaluations(&self, patient_id: &PatientId) -> ReadOutcome<Vec<Evaluation>> {
        let mut failures = Vec::new();
        let Some((store, _)) = self.locate_patient(patient_id, &mut failures).await else {
            return ReadOutcome::new("evaluations", Vec::new(), Source::BuiltInDemo, failures);
        };
        match store.list_evaluations_for_patient(patient_id).await {
            Ok(rows) => ReadOutcome::new("evaluations", rows, Source::Store(store.kind()), failures),
            Err(e) => {
                tracing::warn!("{} store evaluation read failed: {}", store.kind(), e);
                failures.push(StoreFailure::new(store.kind(), &e));
                ReadOutcome::new("evaluations", Vec::new(), Source::BuiltInDemo, failures)
            }
        }
    }

    // --- Writes ---

    fn nothing_saved(&self, what: &str, failures: Vec<StoreFailure>) -> RouterError {
        let hint = match self.profile.data_strategy() {
            DataStrategy::Embedded => "device storage error, restart the app",
            DataStrategy::BrowserStorage => "check that the remote server is running",
        };
        RouterError::NothingSaved {
            message: format!("{} not saved: {}", what, hint),
            failures,
        }
    }

    fn settle<T>(
        &self,
        what: &str,
        results: [(StoreKind, StoreResult<T>); 2],
    ) -> RouterResult<WriteOutcome<T>> {
        let mut value = None;
        let mut saved_in = Vec::new();
        let mut failures = Vec::new();

        for (kind, result) in results {
            match result {
                Ok(record) => {
                    saved_in.push(kind);
                    value.get_or_insert(record);
                }
                Err(e) => {
                    tracing::warn!("{} write to {} store failed: {}", what, kind, e);
                    failures.push(StoreFailure::new(kind, &e));
                }
            }
        }

        match value {
            Some(value) => Ok(WriteOutcome {
                value,
                message: format!("{} saved on {}", what, store_list(&saved_in)),
                saved_in,
                failures,
            }),
            None => Err(self.nothing_saved(what, failures)),
        }
    }

    /// Save a new patient to both stores.
    pub async fn save_patient(&self, patient: &NewPatient) -> RouterResult<WriteOutcome<Patient>> {
        let (primary, secondary) = self.stores();
        // join! polls in argument order, so the primary request goes out first
        let (first, second) = tokio::join!(
            async {
                self.ready(primary).await?;
                primary.add_patient(patient).await
            },
            async {
                self.ready(secondary).await?;
                secondary.add_patient(patient).await
            },
        );
        self.settle(
            "patient",
            [(primary.kind(), first), (secondary.kind(), second)],
        )
    }

    /// Save a session to both stores, numbered from the authoritative read.
    pub async fn save_session(&self, session: &NewSession) -> RouterResult<WriteOutcome<Session>> {
        let session = session.clone().clamped();
        let number = self.next_session_number(&session.patient_id).await;
        let (primary, secondary) = self.stores();
        let (first, second) = tokio::join!(
            async {
                self.ready(primary).await?;
                primary.add_session(&session, number).await
            },
            async {
                self.ready(secondary).await?;
                secondary.add_session(&session, number).await
            },
        );
        self.settle(
            "session",
            [(primary.kind(), first), (secondary.kind(), second)],
        )
    }

    /// Record an evaluation in the store that owns the patient. Only the
    /// embedded store keeps evaluations; elsewhere nothing is saved.
    pub async fn add_evaluation(
        &self,
        evaluation: &NewEvaluation,
    ) -> RouterResult<WriteOutcome<Evaluation>> {
        let mut failures = Vec::new();
        let Some((store, _)) = self.locate_patient(&evaluation.patient_id, &mut failures).await
        else {
            if failures.is_empty() {
                return Err(StoreError::NotFound(format!("patient {}", evaluation.patient_id)).into());
            }
            return Err(self.nothing_saved("evaluation", failures));
        };

        match store.add_evaluation(evaluation).await {
            Ok(saved) => {
                tracing::info!(
                    "{} evaluation for patient {} saved on {}",
                    saved.kind.as_str(),
                    evaluation.patient_id,
                    store.kind()
                );
                Ok(WriteOutcome {
                    value: saved,
                    saved_in: vec![store.kind()],
                    message: format!("evaluation saved on {}", store.kind()),
                    failures,
                })
            }
            Err(e) if e.is_unavailable() => {
                tracing::warn!("{} store evaluation write failed: {}", store.kind(), e);
                failures.push(StoreFailure::new(store.kind(), &e));
                Err(self.nothing_saved("evaluation", failures))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Update on the authoritative store; the secondary is used only when
    /// the primary cannot be reached.
    pub async fn update_patient(
        &self,
        id: &PatientId,
        patient: &NewPatient,
    ) -> RouterResult<WriteOutcome<Patient>> {
        let (primary, secondary) = self.stores();
        let mut failures = Vec::new();

        for store in [primary, secondary] {
            let result = match self.ready(store).await {
                Ok(()) => store.update_patient(id, patient).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(updated) => {
                    return Ok(WriteOutcome {
                        value: updated,
                        saved_in: vec![store.kind()],
                        message: format!("patient updated on {}", store.kind()),
                        failures,
                    })
                }
                Err(e) if e.is_unavailable() => {
                    tracing::warn!("{} store update failed: {}", store.kind(), e);
                    failures.push(StoreFailure::new(store.kind(), &e));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(self.nothing_saved("patient", failures))
    }

    /// Delete a patient and that patient's sessions from the authoritative
    /// store. Other stores keep their copies.
    pub async fn delete_patient(&self, id: &PatientId) -> RouterResult<WriteOutcome<()>> {
        let (primary, secondary) = self.stores();
        let mut failures = Vec::new();

        for store in [primary, secondary] {
            let result = match self.ready(store).await {
                Ok(()) => store.delete_patient(id).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    tracing::info!("patient {} deleted from {} store", id, store.kind());
                    return Ok(WriteOutcome {
                        value: (),
                        saved_in: vec![store.kind()],
                        message: format!("patient deleted from {}", store.kind()),
                        failures,
                    });
                }
                Err(e) if e.is_unavailable() => {
                    tracing::warn!("{} store delete failed: {}", store.kind(), e);
                    failures.push(StoreFailure::new(store.kind(), &e));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(self.nothing_saved("deletion", failures))
    }

    /// Remove user data from both stores. Demo rows survive.
    pub async fn delete_all(&self) -> ClearOutcome {
        let (primary, secondary) = self.stores();
        let mut removed = 0;
        let mut cleared = Vec::new();
        let mut failures = Vec::new();

        for store in [primary, secondary] {
            let result = match self.ready(store).await {
                Ok(()) => store.clear_user_data().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(count) => {
                    tracing::info!("cleared {} patients from {} store", count, store.kind());
                    removed += count;
                    cleared.push(store.kind());
                }
                Err(e) => {
                    tracing::warn!("{} store clear failed: {}", store.kind(), e);
                    failures.push(StoreFailure::new(store.kind(), &e));
                }
            }
        }

        let message = if cleared.is_empty() {
            "no store could be cleared".to_string()
        } else {
            format!("{} patients removed from {}", removed, store_list(&cleared))
        };
        ClearOutcome {
            removed,
            cleared,
            message,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_list() {
        assert_eq!(store_list(&[StoreKind::Embedded]), "mobile");
        assert_eq!(
            store_list(&[StoreKind::Embedded, StoreKind::Remote]),
            "mobile and web"
        );
    }

    #[test]
    fn test_read_status_names_failures() {
        let failures = vec![StoreFailure {
            store: StoreKind::Remote,
            reason: "network error: connection refused".into(),
        }];
        let status = read_status("patients", Source::Store(StoreKind::Browser), &failures);
        assert_eq!(
            status,
            "patients loaded from browser store (web store failed: network error: connection refused)"
        );
        assert_eq!(
            read_status("patients", Source::BuiltInDemo, &[]),
            "no stored patients, showing demo data"
        );
    }

    #[test]
    fn test_default_ready_timeout() {
        assert_eq!(RouterSettings::default().ready_timeout, Duration::from_secs(3));
    }
}
