//! Embedded SQLite store for native runtimes.
//!
//! Nothing is opened until [`EmbeddedStore::init`] runs. Calls made before
//! that return [`StoreError::NotReady`] immediately; callers that want to
//! wait use [`PatientStore::await_ready`], each with its own deadline.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;

use super::{PatientStore, StoreError, StoreKind, StoreResult};
use crate::db::{Database, DbError, DbResult};
use crate::models::{Evaluation, NewEvaluation, NewPatient, NewSession, Patient, PatientId, Session};
use crate::platform::PlatformProfile;

/// Database file name inside the data directory.
pub const DATABASE_FILE: &str = "kinesphere.db";

/// Default bound on how long a caller waits for readiness.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(3);

/// Most rows a search returns.
pub const SEARCH_LIMIT: usize = 50;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where the database lives.
#[derive(Debug, Clone)]
pub enum DbLocation {
    File(PathBuf),
    InMemory,
}

/// Patient store over the on-device database.
pub struct EmbeddedStore {
    location: DbLocation,
    db: OnceLock<Arc<Mutex<Database>>>,
}

impl EmbeddedStore {
    pub fn new(location: DbLocation) -> Self {
        Self {
            location,
            db: OnceLock::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.db.get().is_some()
    }

    /// Open the database, create the schema and seed demo rows if needed.
    ///
    /// Only native profiles may open the embedded database. Calling again
    /// once ready is a no-op.
    pub async fn init(&self, profile: &PlatformProfile) -> StoreResult<()> {
        if !profile.is_native_embedded_capable {
            return Err(StoreError::unavailable(
                StoreKind::Embedded,
                format!("no embedded database on {}", profile.description),
            ));
        }
        if self.is_ready() {
            return Ok(());
        }

        let location = self.location.clone();
        let (db, seeded) = tokio::task::spawn_blocking(move || -> DbResult<(Database, usize)> {
            let mut db = match location {
                DbLocation::File(path) => Database::open(path)?,
                DbLocation::InMemory => Database::open_in_memory()?,
            };
            let seeded = db.seed_demo_patients()?;
            Ok((db, seeded))
        })
        .await
        .map_err(|e| StoreError::unavailable(StoreKind::Embedded, e))?
        .map_err(map_db_error)?;

        if self.db.set(Arc::new(Mutex::new(db))).is_err() {
            tracing::debug!("embedded store initialized concurrently, keeping first handle");
        }
        tracing::info!(seeded, "embedded store ready");
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> DbResult<T> + Send + 'static,
    {
        let db = self
            .db
            .get()
            .cloned()
            .ok_or(StoreError::NotReady(StoreKind::Embedded))?;
        tokio::task::spawn_blocking(move || {
            let mut db = db
                .lock()
                .map_err(|_| StoreError::unavailable(StoreKind::Embedded, "connection lock poisoned"))?;
            f(&mut *db).map_err(map_db_error)
        })
        .await
        .map_err(|e| StoreError::unavailable(StoreKind::Embedded, e))?
    }

    async fn find_active(&self, id: i64) -> StoreResult<Patient> {
        self.with_db(move |db| db.get_patient(id))
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| StoreError::NotFound(format!("patient {}", id)))
    }
}

fn map_db_error(e: DbError) -> StoreError {
    match e {
        DbError::NotFound(what) => StoreError::NotFound(what),
        other => StoreError::unavailable(StoreKind::Embedded, other),
    }
}

/// Embedded rows are keyed by integer; anything else cannot exist here.
fn row_id(id: &PatientId) -> StoreResult<i64> {
    id.as_i64()
        .ok_or_else(|| StoreError::NotFound(format!("patient {}", id)))
}

#[async_trait]
impl PatientStore for EmbeddedStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Embedded
    }

    async fn await_ready(&self, timeout: Duration) -> StoreResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_ready() {
                return Ok(());
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::warn!("embedded store not ready after {:?}", timeout);
                return Err(StoreError::NotReady(StoreKind::Embedded));
            }
            tokio::time::sleep(READY_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn list_patients(&self) -> StoreResult<Vec<Patient>> {
        self.with_db(|db| {
            let real = db.list_active_patients(false)?;
            if real.is_empty() {
                return db.list_active_patients(true);
            }
            Ok(real)
        })
        .await
    }

    async fn get_patient(&self, id: &PatientId) -> StoreResult<Patient> {
        self.find_active(row_id(id)?).await
    }

    async fn add_patient(&self, patient: &NewPatient) -> StoreResult<Patient> {
        let patient = patient.clone();
        let id = self.with_db(move |db| db.insert_patient(&patient, false)).await?;
        tracing::debug!("embedded store added patient {}", id);
        self.find_active(id).await
    }

    async fn update_patient(&self, id: &PatientId, patient: &NewPatient) -> StoreResult<Patient> {
        let id = row_id(id)?;
        let patient = patient.clone();
        self.with_db(move |db| {
            if !db.update_patient(id, &patient)? {
                return Err(DbError::NotFound(format!("patient {}", id)));
            }
            db.get_patient(id)?
                .ok_or_else(|| DbError::NotFound(format!("patient {}", id)))
        })
        .await
    }

    async fn delete_patient(&self, id: &PatientId) -> StoreResult<()> {
        let id = row_id(id)?;
        self.with_db(move |db| db.soft_delete_patient(id)).await
    }

    async fn list_sessions_for_patient(&self, id: &PatientId) -> StoreResult<Vec<Session>> {
        let id = row_id(id)?;
        self.with_db(move |db| db.list_sessions_for_patient(id)).await
    }

    async fn add_session(&self, session: &NewSession, number: u32) -> StoreResult<Session> {
        let patient_id = row_id(&session.patient_id)?;
        let row = session.clone();
        let id = self
            .with_db(move |db| db.insert_session(patient_id, &row))
            .await?;
        Ok(Session::from_new(id.to_string(), number, session))
    }

    async fn clear_user_data(&self) -> StoreResult<usize> {
        self.with_db(|db| db.clear_user_data()).await
    }

    async fn search_patients(&self, term: &str) -> StoreResult<Vec<Patient>> {
        let term = term.trim().to_string();
        self.with_db(move |db| db.search_patients(&term, SEARCH_LIMIT))
            .await
    }

    async fn add_evaluation(&self, evaluation: &NewEvaluation) -> StoreResult<Evaluation> {
        let patient_id = row_id(&evaluation.patient_id)?;
        let evaluation = evaluation.clone();
        self.with_db(move |db| {
            let id = db.insert_evaluation(patient_id, &evaluation)?;
            db.list_evaluations_for_patient(patient_id)?
                .into_iter()
                .find(|e| e.id == id)
                .ok_or_else(|| DbError::NotFound(format!("evaluation {}", id)))
        })
        .await
    }

    async fn list_evaluations_for_patient(&self, id: &PatientId) -> StoreResult<Vec<Evaluation>> {
        let id = row_id(id)?;
        self.with_db(move |db| db.list_evaluations_for_patient(id)).await
    }

    async fn has_final_evaluation(&self, id: &PatientId) -> StoreResult<bool> {
        let id = row_id(id)?;
        self.with_db(move |db| db.has_final_evaluation(id)).await
    }

    async fn list_patients_with_activity(&self) -> StoreResult<Vec<Patient>> {
        self.with_db(|db| {
            let real = db.list_active_patients_with_activity(false)?;
            if real.is_empty() {
                return db.list_active_patients_with_activity(true);
            }
            Ok(real)
        })
        .await
    }
}
