//! KineSphere Core Library
//!
//! Platform-adaptive persistence for the KineSphere physiotherapy patient
//! tracker.
//!
//! # Architecture
//!
//! ```text
//!                    Host (native shell or web view)
//!                                 │
//!                      RuntimeEnvironment snapshot
//!                                 │
//!                        PlatformDetector ──► PlatformProfile
//!                                 │
//!                        PersistenceRouter
//!                 ┌───────────────┼───────────────┐
//!                 │               │               │
//!                 ▼               ▼               ▼
//!           EmbeddedStore    RemoteStore     BrowserStore
//!            (SQLite)      (REST backend)   (key/value area)
//! ```
//!
//! On native runtimes the embedded store is primary and the backend
//! secondary; in a browser the backend is primary and the key/value area
//! secondary. Writes go to both, reads fall back from primary to secondary
//! to built-in demo data.
//!
//! # Modules
//!
//! - [`platform`]: runtime classification
//! - [`db`]: SQLite layer behind the embedded store
//! - [`store`]: the common store contract and the local stores
//! - [`remote`]: REST client
//! - [`router`]: store selection, fallback reads, dual writes
//! - [`aggregate`]: dashboard statistics
//! - [`models`]: domain types (Patient, Session, Evaluation)

pub mod aggregate;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod platform;
pub mod remote;
pub mod router;
pub mod store;

// Re-export commonly used types
pub use aggregate::PatientStats;
pub use config::{Config, ConfigError, Environment};
pub use db::Database;
pub use models::{
    Evaluation, EvaluationKind, NewEvaluation, NewPatient, NewSession, Patient, PatientId,
    Session,
};
pub use platform::{PlatformDetector, PlatformProfile, RuntimeEnvironment};
pub use remote::{RemoteClient, RemoteError};
pub use router::{PersistenceRouter, ReadOutcome, RemoteStore, RouterError, RouterSettings};
pub use store::{PatientStore, StoreError, StoreKind};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use platform::{NativeBridge, StaticProbe};
use router::{ClearOutcome, Source, WriteOutcome};
use store::browser::BrowserStore;
use store::embedded::{DbLocation, EmbeddedStore};
use store::kv::DirectoryArea;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum KinesphereError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The backend could not be reached or answered with an error
    #[error("Remote error: {0}")]
    RemoteError(String),

    /// Neither store accepted a write
    #[error("{0}")]
    NothingSaved(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<ConfigError> for KinesphereError {
    fn from(e: ConfigError) -> Self {
        KinesphereError::ConfigError(e.to_string())
    }
}

impl From<RemoteError> for KinesphereError {
    fn from(e: RemoteError) -> Self {
        match e {
            // A base URL that does not parse comes from configuration
            RemoteError::Url(reason) => KinesphereError::ConfigError(reason),
            other => KinesphereError::RemoteError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for KinesphereError {
    fn from(e: std::io::Error) -> Self {
        KinesphereError::RuntimeError(e.to_string())
    }
}

impl From<RouterError> for KinesphereError {
    fn from(e: RouterError) -> Self {
        match e {
            RouterError::NothingSaved { message, .. } => KinesphereError::NothingSaved(message),
            RouterError::Store(StoreError::NotFound(what)) => KinesphereError::NotFound(what),
            RouterError::Store(StoreError::RemoteUnavailable(e)) => e.into(),
            RouterError::Store(other) => KinesphereError::StorageError(other.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for KinesphereError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        KinesphereError::RuntimeError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Detect the platform and build the stores and router.
///
/// On native runtimes the embedded database is opened and seeded before
/// returning. If that fails, calls fall back to the backend.
#[uniffi::export]
pub fn open_core(
    config: FfiConfig,
    environment: FfiEnvironment,
) -> Result<Arc<KinesphereCore>, KinesphereError> {
    let config = Config::try_from(config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let mut detector = PlatformDetector::new(StaticProbe(environment.into()))
        .with_force_browser_mode(config.force_browser_mode);
    let profile = detector.detect();

    let embedded = Arc::new(EmbeddedStore::new(DbLocation::File(config.database_path())));
    if profile.is_native_embedded_capable {
        std::fs::create_dir_all(&config.data_dir)?;
        if let Err(e) = runtime.block_on(embedded.init(&profile)) {
            tracing::warn!("embedded store init failed: {}", e);
        }
    }
    let browser = Arc::new(BrowserStore::new(Arc::new(DirectoryArea::new(
        config.web_storage_dir(),
    ))));
    let client = RemoteClient::new(&config.remote_base_url, config.remote_timeout)?
        .with_retries(config.remote_retries);
    let remote = Arc::new(RemoteStore::new(client));

    let router = PersistenceRouter::new(
        profile,
        embedded,
        browser,
        remote,
        RouterSettings {
            ready_timeout: config.ready_timeout,
        },
    );

    Ok(Arc::new(KinesphereCore {
        runtime,
        router,
        last_read: Mutex::new(None),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Persistence entry point for the host UI.
#[derive(uniffi::Object)]
pub struct KinesphereCore {
    runtime: tokio::runtime::Runtime,
    router: PersistenceRouter,
    last_read: Mutex<Option<FfiReadStatus>>,
}

impl KinesphereCore {
    fn remember<T>(&self, outcome: &ReadOutcome<T>) {
        if let Ok(mut last) = self.last_read.lock() {
            *last = Some(FfiReadStatus::from_outcome(outcome));
        }
    }
}

#[uniffi::export]
impl KinesphereCore {
    /// Profile the router was built with.
    pub fn profile(&self) -> FfiProfile {
        self.router.profile().clone().into()
    }

    /// Status of the most recent read, for user-facing notices.
    pub fn last_read_status(&self) -> Result<Option<FfiReadStatus>, KinesphereError> {
        Ok(self.last_read.lock()?.clone())
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Patients to display. Never fails; see `last_read_status`.
    pub fn list_patients(&self) -> Vec<FfiPatient> {
        let outcome = self.runtime.block_on(self.router.list_patients());
        self.remember(&outcome);
        outcome.value.into_iter().map(Into::into).collect()
    }

    pub fn get_patient(&self, id: String) -> Option<FfiPatient> {
        let outcome = self
            .runtime
            .block_on(self.router.get_patient(&PatientId::from(id.as_str())));
        self.remember(&outcome);
        outcome.value.map(Into::into)
    }

    /// Save a new patient to every reachable store.
    pub fn save_patient(&self, patient: FfiNewPatient) -> Result<FfiSaveResult, KinesphereError> {
        let outcome = self
            .runtime
            .block_on(self.router.save_patient(&patient.into()))?;
        Ok(FfiSaveResult::from_outcome(&outcome, outcome.value.id.to_string()))
    }

    pub fn update_patient(
        &self,
        id: String,
        patient: FfiNewPatient,
    ) -> Result<FfiSaveResult, KinesphereError> {
        let outcome = self.runtime.block_on(
            self.router
                .update_patient(&PatientId::from(id.as_str()), &patient.into()),
        )?;
        Ok(FfiSaveResult::from_outcome(&outcome, outcome.value.id.to_string()))
    }

    /// Delete a patient and its sessions from the authoritative store.
    pub fn delete_patient(&self, id: String) -> Result<FfiSaveResult, KinesphereError> {
        let outcome = self
            .runtime
            .block_on(self.router.delete_patient(&PatientId::from(id.as_str())))?;
        Ok(FfiSaveResult::from_outcome(&outcome, id))
    }

    /// Patients whose name or RUT contains `term`.
    pub fn search_patients(&self, term: String) -> Vec<FfiPatient> {
        let outcome = self.runtime.block_on(self.router.search_patients(&term));
        self.remember(&outcome);
        outcome.value.into_iter().map(Into::into).collect()
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    pub fn list_sessions(&self, patient_id: String) -> Vec<FfiSession> {
        let outcome = self
            .runtime
            .block_on(self.router.list_sessions(&PatientId::from(patient_id.as_str())));
        self.remember(&outcome);
        outcome.value.into_iter().map(Into::into).collect()
    }

    pub fn next_session_number(&self, patient_id: String) -> u32 {
        self.runtime.block_on(
            self.router
                .next_session_number(&PatientId::from(patient_id.as_str())),
        )
    }

    pub fn save_session(&self, session: FfiNewSession) -> Result<FfiSaveResult, KinesphereError> {
        let outcome = self
            .runtime
            .block_on(self.router.save_session(&session.into()))?;
        Ok(FfiSaveResult::from_outcome(&outcome, outcome.value.id.clone()))
    }

    // =========================================================================
    // Evaluation Operations
    // =========================================================================

    /// Record an intake (`inicial`) or discharge (`final`) evaluation.
    pub fn add_evaluation(
        &self,
        evaluation: FfiNewEvaluation,
    ) -> Result<FfiSaveResult, KinesphereError> {
        let evaluation = NewEvaluation::try_from(evaluation)?;
        let outcome = self
            .runtime
            .block_on(self.router.add_evaluation(&evaluation))?;
        Ok(FfiSaveResult::from_outcome(&outcome, outcome.value.id.to_string()))
    }

    pub fn list_evaluations(&self, patient_id: String) -> Vec<FfiEvaluation> {
        let outcome = self
            .runtime
            .block_on(self.router.list_evaluations(&PatientId::from(patient_id.as_str())));
        self.remember(&outcome);
        outcome.value.into_iter().map(Into::into).collect()
    }

    // =========================================================================
    // Dashboard & Maintenance
    // =========================================================================

    pub fn compute_stats(&self) -> FfiStats {
        let outcome = self.runtime.block_on(self.router.compute_stats());
        self.remember(&outcome);
        FfiStats::from_outcome(outcome)
    }

    /// Clear user-entered data from every store. Demo rows survive.
    pub fn delete_all(&self) -> FfiClearResult {
        self.runtime.block_on(self.router.delete_all()).into()
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// Host configuration; unset fields take the environment defaults.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConfig {
    /// `development`, `staging` or `production`
    pub environment: String,
    pub remote_base_url: Option<String>,
    pub remote_timeout_ms: Option<u64>,
    pub remote_retries: Option<u32>,
    pub ready_timeout_ms: Option<u64>,
    pub data_dir: String,
    pub force_browser_mode: bool,
}

impl TryFrom<FfiConfig> for Config {
    type Error = ConfigError;

    fn try_from(ffi: FfiConfig) -> Result<Self, Self::Error> {
        let mut config = Config::for_environment(ffi.environment.parse()?);
        if let Some(url) = ffi.remote_base_url {
            config.remote_base_url = url;
        }
        if let Some(ms) = ffi.remote_timeout_ms {
            config.remote_timeout = std::time::Duration::from_millis(ms);
        }
        if let Some(retries) = ffi.remote_retries {
            config.remote_retries = retries;
        }
        if let Some(ms) = ffi.ready_timeout_ms {
            config.ready_timeout = std::time::Duration::from_millis(ms);
        }
        config.data_dir = ffi.data_dir.into();
        config.force_browser_mode = ffi.force_browser_mode;
        Ok(config)
    }
}

/// What the host can see of its runtime.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEnvironment {
    /// Whether the native bridge global exists at all
    pub has_bridge: bool,
    pub bridge_platform_name: Option<String>,
    pub bridge_plugins: Option<Vec<String>>,
    pub legacy_bridge: Option<String>,
    pub user_agent: String,
}

impl From<FfiEnvironment> for RuntimeEnvironment {
    fn from(env: FfiEnvironment) -> Self {
        RuntimeEnvironment {
            bridge: env.has_bridge.then(|| NativeBridge {
                platform_name: env.bridge_platform_name,
                plugins: env.bridge_plugins,
            }),
            legacy_bridge: env.legacy_bridge,
            user_agent: env.user_agent,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiProfile {
    pub is_native_embedded_capable: bool,
    pub platform_name: String,
    pub description: String,
}

impl From<PlatformProfile> for FfiProfile {
    fn from(profile: PlatformProfile) -> Self {
        Self {
            is_native_embedded_capable: profile.is_native_embedded_capable,
            platform_name: profile.platform_name,
            description: profile.description,
        }
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub name: String,
    pub national_id: Option<String>,
    pub age: Option<u32>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub diagnosis: Option<String>,
    pub sessions_planned: u32,
    pub sessions_completed: u32,
    pub active: bool,
    pub created_at: String,
    pub notes: Option<String>,
    pub is_demo: bool,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id.to_string(),
            name: patient.name,
            national_id: patient.national_id,
            age: patient.age,
            email: patient.email,
            phone: patient.phone,
            diagnosis: patient.diagnosis,
            sessions_planned: patient.sessions_planned,
            sessions_completed: patient.sessions_completed,
            active: patient.active,
            created_at: patient.created_at,
            notes: patient.notes,
            is_demo: patient.is_demo,
        }
    }
}

/// FFI-safe add/update payload.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewPatient {
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

impl From<FfiNewPatient> for NewPatient {
    fn from(p: FfiNewPatient) -> Self {
        NewPatient {
            name: p.name,
            national_id: p.national_id,
            age: p.age,
            email: p.email,
            phone: p.phone,
            diagnosis: p.diagnosis,
            sessions_planned: p.sessions_planned,
            sessions_completed: p.sessions_completed,
            active: p.active,
            notes: p.notes,
        }
    }
}

/// FFI-safe session.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSession {
    pub id: String,
    pub patient_id: String,
    pub number: u32,
    pub date: String,
    pub pain_scale: Option<u8>,
    pub sleep_quality: Option<u8>,
    pub exercises: Option<String>,
    pub notes: Option<String>,
    pub sent_whatsapp: bool,
    pub created_at: String,
}

impl From<Session> for FfiSession {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            patient_id: s.patient_id.to_string(),
            number: s.number,
            date: s.date,
            pain_scale: s.pain_scale,
            sleep_quality: s.sleep_quality,
            exercises: s.exercises,
            notes: s.notes,
            sent_whatsapp: s.sent_whatsapp,
            created_at: s.created_at,
        }
    }
}

/// FFI-safe session payload. A missing date means today.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewSession {
    pub patient_id: String,
    pub date: Option<String>,
    pub pain_scale: Option<u8>,
    pub sleep_quality: Option<u8>,
    pub exercises: Option<String>,
    pub notes: Option<String>,
    pub sent_whatsapp: bool,
}

impl From<FfiNewSession> for NewSession {
    fn from(s: FfiNewSession) -> Self {
        let mut session = NewSession::new(PatientId::from(s.patient_id.as_str()));
        if let Some(date) = s.date {
            session.date = date;
        }
        session.pain_scale = s.pain_scale;
        session.sleep_quality = s.sleep_quality;
        session.exercises = s.exercises;
        session.notes = s.notes;
        session.sent_whatsapp = s.sent_whatsapp;
        session
    }
}

/// FFI-safe evaluation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEvaluation {
    pub id: String,
    pub patient_id: String,
    /// `inicial` or `final`
    pub kind: String,
    pub date: String,
    pub mobility: Option<String>,
    pub strength: Option<String>,
    pub pain: Option<String>,
    pub initial_eva: Option<u8>,
    pub notes: Option<String>,
    pub created_at: String,
}

impl From<Evaluation> for FfiEvaluation {
    fn from(e: Evaluation) -> Self {
        Self {
            id: e.id.to_string(),
            patient_id: e.patient_id.to_string(),
            kind: e.kind.as_str().to_string(),
            date: e.date,
            mobility: e.mobility,
            strength: e.strength,
            pain: e.pain,
            initial_eva: e.initial_eva,
            notes: e.notes,
            created_at: e.created_at,
        }
    }
}

/// FFI-safe evaluation payload. A missing date means today.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewEvaluation {
    pub patient_id: String,
    /// `inicial` or `final`
    pub kind: String,
    pub date: Option<String>,
    pub mobility: Option<String>,
    pub strength: Option<String>,
    pub pain: Option<String>,
    pub initial_eva: Option<u8>,
    pub notes: Option<String>,
}

impl TryFrom<FfiNewEvaluation> for NewEvaluation {
    type Error = KinesphereError;

    fn try_from(e: FfiNewEvaluation) -> Result<Self, Self::Error> {
        let kind = EvaluationKind::parse(&e.kind).ok_or_else(|| {
            KinesphereError::InvalidInput(format!("unknown evaluation kind '{}'", e.kind))
        })?;
        let mut evaluation = NewEvaluation::new(PatientId::from(e.patient_id.as_str()), kind);
        if let Some(date) = e.date {
            evaluation.date = date;
        }
        evaluation.mobility = e.mobility;
        evaluation.strength = e.strength;
        evaluation.pain = e.pain;
        evaluation.initial_eva = e.initial_eva;
        evaluation.notes = e.notes;
        Ok(evaluation)
    }
}

/// Where the last read came from and what failed on the way.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReadStatus {
    /// Store label, or `demo` for built-in data
    pub source: String,
    pub message: String,
    pub failures: Vec<String>,
}

impl FfiReadStatus {
    fn from_outcome<T>(outcome: &ReadOutcome<T>) -> Self {
        Self {
            source: match outcome.source {
                Source::Store(kind) => kind.label().to_string(),
                Source::BuiltInDemo => "demo".to_string(),
            },
            message: outcome.status.clone(),
            failures: outcome.failures.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Result of a write accepted by at least one store.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSaveResult {
    pub id: String,
    pub message: String,
    pub stores: Vec<String>,
    pub failures: Vec<String>,
}

impl FfiSaveResult {
    fn from_outcome<T>(outcome: &WriteOutcome<T>, id: String) -> Self {
        Self {
            id,
            message: outcome.message.clone(),
            stores: outcome.saved_in.iter().map(|k| k.label().to_string()).collect(),
            failures: outcome.failures.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiClearResult {
    pub removed: u32,
    pub message: String,
    pub failures: Vec<String>,
}

impl From<ClearOutcome> for FfiClearResult {
    fn from(outcome: ClearOutcome) -> Self {
        Self {
            removed: outcome.removed as u32,
            message: outcome.message,
            failures: outcome.failures.iter().map(ToString::to_string).collect(),
        }
    }
}

/// FFI-safe dashboard counters.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStats {
    pub total_patients: u32,
    pub active_patients: u32,
    pub real_patients: u32,
    pub demo_patients: u32,
    pub sessions_today: u32,
    pub pending_evaluations: u32,
    pub status: FfiReadStatus,
}

impl FfiStats {
    fn from_outcome(outcome: ReadOutcome<PatientStats>) -> Self {
        let status = FfiReadStatus::from_outcome(&outcome);
        let stats = outcome.value;
        Self {
            total_patients: stats.total_patients,
            active_patients: stats.active_patients,
            real_patients: stats.real_patients,
            demo_patients: stats.demo_patients,
            sessions_today: stats.sessions_today,
            pending_evaluations: stats.pending_evaluations,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_environment() -> FfiEnvironment {
        FfiEnvironment {
            has_bridge: false,
            bridge_platform_name: None,
            bridge_plugins: None,
            legacy_bridge: None,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".into(),
        }
    }

    fn config(dir: &std::path::Path) -> FfiConfig {
        FfiConfig {
            environment: "development".into(),
            // Nothing listens on port 9; the backend is unreachable
            remote_base_url: Some("http://127.0.0.1:9".into()),
            remote_timeout_ms: Some(500),
            remote_retries: Some(0),
            ready_timeout_ms: Some(200),
            data_dir: dir.to_string_lossy().into_owned(),
            force_browser_mode: false,
        }
    }

    #[test]
    fn test_config_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::try_from(config(dir.path())).unwrap();
        assert_eq!(config.remote_retries, 0);
        assert_eq!(config.data_dir, dir.path());

        let mut bad = self::config(dir.path());
        bad.environment = "qa".into();
        assert!(Config::try_from(bad).is_err());
    }

    #[test]
    fn test_environment_conversion() {
        let mut env = web_environment();
        env.has_bridge = true;
        env.bridge_platform_name = Some("android".into());
        env.bridge_plugins = Some(vec!["CapacitorSQLite".into()]);
        let runtime: RuntimeEnvironment = env.into();
        assert_eq!(
            runtime.bridge.and_then(|b| b.platform_name),
            Some("android".to_string())
        );
    }

    fn new_patient(name: &str, sessions_planned: u32) -> FfiNewPatient {
        FfiNewPatient {
            name: name.into(),
            national_id: None,
            age: None,
            email: None,
            phone: None,
            diagnosis: None,
            sessions_planned,
            sessions_completed: 0,
            active: true,
            notes: None,
        }
    }

    fn evaluation(patient_id: &str, kind: &str) -> FfiNewEvaluation {
        FfiNewEvaluation {
            patient_id: patient_id.into(),
            kind: kind.into(),
            date: None,
            mobility: Some("Completa".into()),
            strength: None,
            pain: None,
            initial_eva: None,
            notes: None,
        }
    }

    #[test]
    fn test_remote_errors_keep_their_own_variant() {
        let network: KinesphereError = RemoteError::Network("connection refused".into()).into();
        assert!(matches!(network, KinesphereError::RemoteError(_)));

        let status: KinesphereError = RemoteError::Status {
            code: 503,
            body: String::new(),
        }
        .into();
        assert!(matches!(status, KinesphereError::RemoteError(_)));

        let url: KinesphereError = RemoteError::Url("relative URL without a base".into()).into();
        assert!(matches!(url, KinesphereError::ConfigError(_)));

        let routed: KinesphereError =
            RouterError::Store(StoreError::RemoteUnavailable(RemoteError::Decode("eof".into()))).into();
        assert!(matches!(routed, KinesphereError::RemoteError(_)));
    }

    #[test]
    fn test_unknown_evaluation_kind_rejected() {
        let result = NewEvaluation::try_from(evaluation("1", "control"));
        assert!(matches!(result, Err(KinesphereError::InvalidInput(_))));
    }

    #[test]
    fn test_web_core_falls_back_to_browser_storage() {
        let dir = tempfile::tempdir().unwrap();
        let core = open_core(config(dir.path()), web_environment()).unwrap();
        assert!(!core.profile().is_native_embedded_capable);

        // Backend down: demo data, with the failure reported
        let patients = core.list_patients();
        assert!(patients.iter().all(|p| p.is_demo));
        let status = core.last_read_status().unwrap().unwrap();
        assert!(!status.failures.is_empty());

        let saved = core
            .save_patient(FfiNewPatient {
                name: "María González".into(),
                national_id: None,
                age: Some(41),
                email: None,
                phone: None,
                diagnosis: None,
                sessions_planned: 10,
                sessions_completed: 0,
                active: true,
                notes: None,
            })
            .unwrap();
        assert_eq!(saved.stores, vec!["browser".to_string()]);

        let patients = core.list_patients();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].name, "María González");
    }

    #[test]
    fn test_native_core_uses_embedded_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = web_environment();
        env.legacy_bridge = Some("ios".into());
        let core = open_core(config(dir.path()), env).unwrap();
        assert!(core.profile().is_native_embedded_capable);
        assert!(dir.path().join("kinesphere.db").exists());

        let patients = core.list_patients();
        assert_eq!(patients.len(), 3);
        assert_eq!(core.last_read_status().unwrap().unwrap().source, "mobile");
        assert_eq!(core.next_session_number(patients[0].id.clone()), 1);
    }

    #[test]
    fn test_native_core_final_evaluation_clears_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = web_environment();
        env.legacy_bridge = Some("android".into());
        let core = open_core(config(dir.path()), env).unwrap();

        let saved = core.save_patient(new_patient("Juan Pérez", 1)).unwrap();
        core.save_session(FfiNewSession {
            patient_id: saved.id.clone(),
            date: None,
            pain_scale: Some(3),
            sleep_quality: None,
            exercises: None,
            notes: None,
            sent_whatsapp: false,
        })
        .unwrap();
        assert_eq!(core.compute_stats().pending_evaluations, 1);

        let recorded = core.add_evaluation(evaluation(&saved.id, "final")).unwrap();
        assert_eq!(recorded.stores, vec!["mobile".to_string()]);
        assert_eq!(core.compute_stats().pending_evaluations, 0);

        let evaluations = core.list_evaluations(saved.id.clone());
        assert_eq!(evaluations.len(), 1);
        assert_eq!(evaluations[0].kind, "final");

        let found = core.search_patients("pérez".into());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, saved.id);
    }
}
