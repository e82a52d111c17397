//! [`PatientStore`] over the backend, translating wire records.

use async_trait::async_trait;

use crate::aggregate::DAY_FORMAT;
use crate::models::{NewPatient, NewSession, Patient, PatientId, Session};
use crate::remote::{RemoteClient, RemoteError, RemoteId, RemotePatient, RemoteSession};
use crate::store::{PatientStore, StoreError, StoreKind, StoreResult};

/// The backend seen through the common store contract.
pub struct RemoteStore {
    client: RemoteClient,
}

impl RemoteStore {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }
}

fn store_error(e: RemoteError, what: impl std::fmt::Display) -> StoreError {
    if e.is_not_found() {
        StoreError::NotFound(what.to_string())
    } else {
        StoreError::RemoteUnavailable(e)
    }
}

/// Backend timestamps (`2024-01-05T10:00:00.000Z`) become the stored day
/// format; anything else passes through untouched.
pub(crate) fn normalize_date(raw: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.date_naive().format(DAY_FORMAT).to_string(),
        Err(_) => raw.to_string(),
    }
}

fn remote_id(id: &PatientId) -> RemoteId {
    match id {
        PatientId::Int(n) => RemoteId::Int(*n),
        PatientId::Text(s) => RemoteId::Text(s.clone()),
    }
}

pub(crate) fn patient_from_remote(dto: RemotePatient) -> StoreResult<Patient> {
    let id = dto.id.ok_or_else(|| {
        StoreError::RemoteUnavailable(RemoteError::Decode(format!(
            "patient {:?} has no id",
            dto.name
        )))
    })?;
    Ok(Patient {
        id: id.into(),
        name: dto.name,
        national_id: dto.national_id,
        age: dto.age,
        email: dto.email,
        phone: dto.phone,
        diagnosis: dto.diagnosis,
        sessions_planned: dto.sessions_planned,
        sessions_completed: dto.sessions_completed,
        active: dto.active,
        created_at: dto
            .created_at
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        notes: dto.notes,
        is_demo: false,
        activity: None,
    })
}

pub(crate) fn patient_to_remote(patient: &NewPatient) -> RemotePatient {
    RemotePatient {
        id: None,
        name: patient.name.clone(),
        national_id: patient.national_id.clone(),
        age: patient.age,
        email: patient.email.clone(),
        phone: patient.phone.clone(),
        diagnosis: patient.diagnosis.clone(),
        sessions_planned: patient.sessions_planned,
        sessions_completed: patient.sessions_completed,
        active: patient.active,
        created_at: Some(chrono::Utc::now().to_rfc3339()),
        notes: patient.notes.clone(),
    }
}

/// `position` is the session's index in the listing, used when the backend
/// kept no ordinal.
pub(crate) fn session_from_remote(dto: RemoteSession, position: usize) -> StoreResult<Session> {
    let id = dto.id.ok_or_else(|| {
        StoreError::RemoteUnavailable(RemoteError::Decode(format!(
            "session for patient {} has no id",
            dto.patient_id
        )))
    })?;
    Ok(Session {
        id: id.to_string(),
        patient_id: dto.patient_id.into(),
        number: if dto.number == 0 {
            position as u32 + 1
        } else {
            dto.number
        },
        date: normalize_date(&dto.date),
        pain_scale: dto.pain_scale,
        sleep_quality: dto.sleep_quality,
        exercises: dto.exercises,
        notes: dto.notes,
        sent_whatsapp: dto.sent_whatsapp,
        created_at: dto
            .created_at
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
    })
}

pub(crate) fn session_to_remote(session: &NewSession, number: u32) -> RemoteSession {
    RemoteSession {
        id: None,
        patient_id: remote_id(&session.patient_id),
        number,
        date: session.date.clone(),
        pain_scale: session.pain_scale,
        sleep_quality: session.sleep_quality,
        exercises: session.exercises.clone(),
        notes: session.notes.clone(),
        sent_whatsapp: session.sent_whatsapp,
        created_at: Some(chrono::Utc::now().to_rfc3339()),
    }
}

#[async_trait]
impl PatientStore for RemoteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }

    async fn list_patients(&self) -> StoreResult<Vec<Patient>> {
        let rows = self
            .client
            .list_patients()
            .await
            .map_err(|e| store_error(e, "patients"))?;
        rows.into_iter().map(patient_from_remote).collect()
    }

    async fn get_patient(&self, id: &PatientId) -> StoreResult<Patient> {
        let dto = self
            .client
            .get_patient(&id.to_string())
            .await
            .map_err(|e| store_error(e, format!("patient {}", id)))?;
        patient_from_remote(dto)
    }

    async fn add_patient(&self, patient: &NewPatient) -> StoreResult<Patient> {
        let dto = self
            .client
            .create_patient(&patient_to_remote(patient))
            .await
            .map_err(|e| store_error(e, "patients"))?;
        patient_from_remote(dto)
    }

    async fn update_patient(&self, id: &PatientId, patient: &NewPatient) -> StoreResult<Patient> {
        let mut body = patient_to_remote(patient);
        body.id = Some(remote_id(id));
        let dto = self
            .client
            .update_patient(&id.to_string(), &body)
            .await
            .map_err(|e| store_error(e, format!("patient {}", id)))?;
        patient_from_remote(dto)
    }

    async fn delete_patient(&self, id: &PatientId) -> StoreResult<()> {
        let key = id.to_string();
        let sessions = self
            .client
            .list_sessions_for_patient(&key)
            .await
            .map_err(|e| store_error(e, format!("sessions of patient {}", id)))?;
        for session in sessions.iter().filter_map(|s| s.id.as_ref()) {
            self.client
                .delete_session(&session.to_string())
                .await
                .map_err(|e| store_error(e, format!("session {}", session)))?;
        }
        self.client
            .delete_patient(&key)
            .await
            .map_err(|e| store_error(e, format!("patient {}", id)))
    }

    async fn list_sessions_for_patient(&self, id: &PatientId) -> StoreResult<Vec<Session>> {
        let rows = self
            .client
            .list_sessions_for_patient(&id.to_string())
            .await
            .map_err(|e| store_error(e, format!("sessions of patient {}", id)))?;
        rows.into_iter()
            .enumerate()
            .map(|(position, dto)| session_from_remote(dto, position))
            .collect()
    }

    async fn add_session(&self, session: &NewSession, number: u32) -> StoreResult<Session> {
        let dto = self
            .client
            .create_session(&session_to_remote(session, number))
            .await
            .map_err(|e| store_error(e, "sessions"))?;
        session_from_remote(dto, number.saturating_sub(1) as usize)
    }

    async fn clear_user_data(&self) -> StoreResult<usize> {
        let patients = self.list_patients().await?;
        for patient in &patients {
            self.delete_patient(&patient.id).await?;
        }
        Ok(patients.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("2024-01-05T10:00:00.000Z"), "2024-01-05");
        assert_eq!(normalize_date("2024-01-05"), "2024-01-05");
        assert_eq!(normalize_date("01/05/2024"), "01/05/2024");
    }

    #[test]
    fn test_patient_translation() {
        let mut dto = patient_to_remote(&NewPatient::new("María González"));
        dto.id = Some(RemoteId::Text("0015".into()));
        let patient = patient_from_remote(dto).unwrap();
        assert_eq!(patient.id, PatientId::Text("0015".into()));
        assert_eq!(patient.sessions_planned, 10);
        assert!(!patient.is_demo);
    }

    #[test]
    fn test_patient_without_id_is_decode_error() {
        let dto = patient_to_remote(&NewPatient::new("María González"));
        let result = patient_from_remote(dto);
        assert!(matches!(
            result,
            Err(StoreError::RemoteUnavailable(RemoteError::Decode(_)))
        ));
    }

    #[test]
    fn test_session_ordinal_from_position() {
        let mut dto = session_to_remote(&NewSession::new(PatientId::Int(1)), 0);
        dto.id = Some(RemoteId::Int(9));
        dto.date = "2024-01-05T08:30:00Z".into();
        let session = session_from_remote(dto, 2).unwrap();
        assert_eq!(session.number, 3);
        assert_eq!(session.date, "2024-01-05");
        assert_eq!(session.id, "9");
    }

    #[test]
    fn test_not_found_mapping() {
        let e = store_error(
            RemoteError::Status { code: 404, body: String::new() },
            "patient 3",
        );
        assert!(matches!(e, StoreError::NotFound(_)));
        let e = store_error(RemoteError::Network("refused".into()), "patients");
        assert!(e.is_unavailable());
    }
}
