//! Browser key/value store.
//!
//! Layout:
//! ```text
//! user_pacientes          JSON array of every stored patient
//! user_sesiones_<id>      JSON array of that patient's sessions
//! ```
//! Entries are read, modified and written back whole. An absent, empty or
//! unreadable patient collection presents the built-in demo list, which is
//! never written back.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::kv::{KeyValueArea, KvError, KvResult, MemoryArea};
use super::{PatientStore, StoreError, StoreKind, StoreResult};
use crate::models::{
    builtin_demo_patients, NewPatient, NewSession, Patient, PatientId, Session,
};

/// Key of the patient collection.
pub const PATIENTS_KEY: &str = "user_pacientes";

const SESSIONS_KEY_PREFIX: &str = "user_sesiones_";

/// Key holding one patient's sessions.
pub fn sessions_key(id: &PatientId) -> String {
    format!("{}{}", SESSIONS_KEY_PREFIX, id)
}

/// Patient/session store over a [`KeyValueArea`].
pub struct BrowserStore {
    area: Arc<dyn KeyValueArea>,
    write_lock: Mutex<()>,
}

impl BrowserStore {
    pub fn new(area: Arc<dyn KeyValueArea>) -> Self {
        Self {
            area,
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryArea::new()))
    }

    /// Parse the stored patient collection. `Ok(None)` when the key is absent.
    pub fn load_collection(&self) -> KvResult<Option<Vec<Patient>>> {
        match self.area.get(PATIENTS_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Stored patients, with unreadable data treated as empty.
    fn stored_patients(&self) -> Vec<Patient> {
        self.load_collection()
            .unwrap_or_else(|e| {
                tracing::warn!("browser patient collection unreadable, treating as empty: {}", e);
                None
            })
            .unwrap_or_default()
    }

    fn save_collection(&self, patients: &[Patient]) -> StoreResult<()> {
        let raw = serde_json::to_string(patients).map_err(|e| self.unavailable(e))?;
        self.area
            .set(PATIENTS_KEY, &raw)
            .map_err(|e| self.unavailable(e))
    }

    /// Parse one patient's stored sessions; absent means none.
    pub fn load_sessions(&self, id: &PatientId) -> KvResult<Vec<Session>> {
        match self.area.get(&sessions_key(id))? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn stored_sessions(&self, id: &PatientId) -> Vec<Session> {
        self.load_sessions(id).unwrap_or_else(|e| {
            tracing::warn!("browser sessions for patient {} unreadable: {}", id, e);
            Vec::new()
        })
    }

    fn unavailable(&self, e: impl std::fmt::Display) -> StoreError {
        StoreError::unavailable(StoreKind::Browser, e)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| self.unavailable(KvError::Poisoned))
    }
}

/// Millisecond timestamp id, bumped past any id already in the collection.
fn next_patient_id(patients: &[Patient]) -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let max_existing = patients.iter().filter_map(|p| p.id.as_i64()).max();
    match max_existing {
        Some(max) if max >= now => max + 1,
        _ => now,
    }
}

#[async_trait]
impl PatientStore for BrowserStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Browser
    }

    async fn list_patients(&self) -> StoreResult<Vec<Patient>> {
        let stored = self.stored_patients();
        if stored.is_empty() {
            return Ok(builtin_demo_patients());
        }
        if stored.iter().any(|p| !p.is_demo) {
            return Ok(stored.into_iter().filter(|p| !p.is_demo).collect());
        }
        Ok(stored)
    }

    async fn get_patient(&self, id: &PatientId) -> StoreResult<Patient> {
        let mut stored = self.stored_patients();
        if stored.is_empty() {
            stored = builtin_demo_patients();
        }
        stored
            .into_iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("patient {}", id)))
    }

    async fn add_patient(&self, patient: &NewPatient) -> StoreResult<Patient> {
        let _guard = self.lock()?;
        let mut stored = self.stored_patients();
        let created = Patient::from_new(PatientId::Int(next_patient_id(&stored)), patient, false);
        stored.push(created.clone());
        self.save_collection(&stored)?;
        tracing::debug!("browser store added patient {}", created.id);
        Ok(created)
    }

    async fn update_patient(&self, id: &PatientId, patient: &NewPatient) -> StoreResult<Patient> {
        let _guard = self.lock()?;
        let mut stored = self.stored_patients();
        let existing = stored
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("patient {}", id)))?;
        existing.apply(patient);
        let updated = existing.clone();
        self.save_collection(&stored)?;
        Ok(updated)
    }

    async fn delete_patient(&self, id: &PatientId) -> StoreResult<()> {
        let _guard = self.lock()?;
        let mut stored = self.stored_patients();
        let before = stored.len();
        stored.retain(|p| &p.id != id);
        if stored.len() == before {
            return Err(StoreError::NotFound(format!("patient {}", id)));
        }
        self.save_collection(&stored)?;
        self.area
            .remove(&sessions_key(id))
            .map_err(|e| self.unavailable(e))
    }

    async fn list_sessions_for_patient(&self, id: &PatientId) -> StoreResult<Vec<Session>> {
        Ok(self.stored_sessions(id))
    }

    async fn add_session(&self, session: &NewSession, number: u32) -> StoreResult<Session> {
        let _guard = self.lock()?;
        let mut sessions = self.stored_sessions(&session.patient_id);
        let created = Session::from_new(uuid::Uuid::new_v4().to_string(), number, session);
        sessions.push(created.clone());
        let raw = serde_json::to_string(&sessions).map_err(|e| self.unavailable(e))?;
        self.area
            .set(&sessions_key(&session.patient_id), &raw)
            .map_err(|e| self.unavailable(e))?;
        Ok(created)
    }

    async fn clear_user_data(&self) -> StoreResult<usize> {
        let _guard = self.lock()?;
        let removed = self.stored_patients().iter().filter(|p| !p.is_demo).count();
        let keys = self.area.keys().map_err(|e| self.unavailable(e))?;
        for key in keys
            .iter()
            .filter(|k| k.as_str() == PATIENTS_KEY || k.starts_with(SESSIONS_KEY_PREFIX))
        {
            self.area.remove(key).map_err(|e| self.unavailable(e))?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(raw: &str) -> BrowserStore {
        let area = MemoryArea::new();
        area.set(PATIENTS_KEY, raw).unwrap();
        BrowserStore::new(Arc::new(area))
    }

    #[tokio::test]
    async fn test_empty_store_shows_builtin_demo() {
        let store = BrowserStore::in_memory();
        let patients = store.list_patients().await.unwrap();
        assert_eq!(patients.len(), 3);
        assert!(patients.iter().all(|p| p.is_demo));

        // Demo fallback is never persisted
        assert!(store.load_collection().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stored_patients_returned() {
        let store = BrowserStore::in_memory();
        store
            .add_patient(&NewPatient::new("María González"))
            .await
            .unwrap();

        let patients = store.list_patients().await.unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].name, "María González");
        assert!(!patients[0].is_demo);
    }

    #[tokio::test]
    async fn test_corrupted_collection_treated_as_empty() {
        let store = store_with("{not json");
        assert!(store.load_collection().is_err());

        let patients = store.list_patients().await.unwrap();
        assert_eq!(patients.len(), 3);
        assert!(patients.iter().all(|p| p.is_demo));
    }

    #[tokio::test]
    async fn test_empty_array_shows_builtin_demo() {
        let store = store_with("[]");
        let patients = store.list_patients().await.unwrap();
        assert!(patients.iter().all(|p| p.is_demo));
    }

    #[tokio::test]
    async fn test_add_twice_gives_distinct_ids() {
        let store = BrowserStore::in_memory();
        let new = NewPatient::new("Juan Pérez");
        let first = store.add_patient(&new).await.unwrap();
        let second = store.add_patient(&new).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(store.list_patients().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = BrowserStore::in_memory();
        let mut new = NewPatient::new("Juan Pérez");
        let created = store.add_patient(&new).await.unwrap();

        new.diagnosis = Some("Cervicalgia".into());
        let updated = store.update_patient(&created.id, &new).await.unwrap();
        assert_eq!(updated.diagnosis, Some("Cervicalgia".into()));

        store
            .add_session(&NewSession::new(created.id.clone()), 1)
            .await
            .unwrap();
        store.delete_patient(&created.id).await.unwrap();

        assert!(store.load_sessions(&created.id).unwrap().is_empty());
        assert!(matches!(
            store.delete_patient(&created.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sessions_keyed_per_patient() {
        let store = BrowserStore::in_memory();
        let juan = store.add_patient(&NewPatient::new("Juan Pérez")).await.unwrap();
        let maria = store
            .add_patient(&NewPatient::new("María González"))
            .await
            .unwrap();

        store.add_session(&NewSession::new(juan.id.clone()), 1).await.unwrap();
        store.add_session(&NewSession::new(juan.id.clone()), 2).await.unwrap();
        store.add_session(&NewSession::new(maria.id.clone()), 1).await.unwrap();

        let sessions = store.list_sessions_for_patient(&juan.id).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[1].number, 2);
        assert_eq!(store.list_sessions_for_patient(&maria.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_user_data() {
        let store = BrowserStore::in_memory();
        let juan = store.add_patient(&NewPatient::new("Juan Pérez")).await.unwrap();
        store.add_session(&NewSession::new(juan.id.clone()), 1).await.unwrap();

        assert_eq!(store.clear_user_data().await.unwrap(), 1);
        assert!(store.load_collection().unwrap().is_none());
        assert!(store.load_sessions(&juan.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compute_stats_over_stored_patients() {
        let store = BrowserStore::in_memory();
        let juan = store.add_patient(&NewPatient::new("Juan Pérez")).await.unwrap();
        let mut today = NewSession::new(juan.id.clone());
        today.date = crate::aggregate::today();
        store.add_session(&today, 1).await.unwrap();

        let stats = store.compute_stats().await.unwrap();
        assert_eq!(stats.total_patients, 1);
        assert_eq!(stats.sessions_today, 1);
        assert_eq!(stats.session_counts.get(&juan.id.to_string()), Some(&1));
    }
}
