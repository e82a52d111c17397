//! Wire records exchanged with the backend.
//!
//! Patients travel with camelCase Spanish field names, sessions with
//! snake_case ones (`paciente_id` is also the list filter).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::PatientId;

/// Server-assigned id; numeric or string depending on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Int(n) => write!(f, "{}", n),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

impl From<RemoteId> for PatientId {
    fn from(id: RemoteId) -> Self {
        match id {
            RemoteId::Int(n) => PatientId::Int(n),
            RemoteId::Text(s) => PatientId::Text(s),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePatient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RemoteId>,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "rut", default)]
    pub national_id: Option<String>,
    #[serde(rename = "edad", default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "telefono", default)]
    pub phone: Option<String>,
    #[serde(rename = "diagnostico", default)]
    pub diagnosis: Option<String>,
    #[serde(rename = "sesionesPlanificadas", default)]
    pub sessions_planned: u32,
    #[serde(rename = "sesionesCompletadas", default)]
    pub sessions_completed: u32,
    #[serde(rename = "activo", default = "default_true")]
    pub active: bool,
    #[serde(rename = "fechaCreacion", default)]
    pub created_at: Option<String>,
    #[serde(rename = "observaciones", default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RemoteId>,
    #[serde(rename = "paciente_id")]
    pub patient_id: RemoteId,
    /// Zero when the backend did not store an ordinal
    #[serde(rename = "numero_sesion", default)]
    pub number: u32,
    #[serde(rename = "fecha")]
    pub date: String,
    #[serde(rename = "eva", default)]
    pub pain_scale: Option<u8>,
    #[serde(rename = "sueno", default)]
    pub sleep_quality: Option<u8>,
    #[serde(rename = "ejercicios", default)]
    pub exercises: Option<String>,
    #[serde(rename = "observaciones", default)]
    pub notes: Option<String>,
    #[serde(rename = "enviado_whatsapp", default)]
    pub sent_whatsapp: bool,
    #[serde(rename = "creado_en", default)]
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_wire_names() {
        let raw = r#"{
            "id": "7f3a",
            "nombre": "María González",
            "rut": "11.111.111-1",
            "sesionesPlanificadas": 12,
            "fechaCreacion": "2024-01-05T10:00:00.000Z"
        }"#;
        let patient: RemotePatient = serde_json::from_str(raw).unwrap();
        assert_eq!(patient.id, Some(RemoteId::Text("7f3a".into())));
        assert_eq!(patient.name, "María González");
        assert_eq!(patient.sessions_planned, 12);
        assert!(patient.active);

        let json = serde_json::to_value(&patient).unwrap();
        assert_eq!(json["nombre"], "María González");
        assert_eq!(json["sesionesPlanificadas"], 12);
    }

    #[test]
    fn test_session_accepts_numeric_patient_id() {
        let raw = r#"{"id": 3, "paciente_id": 1, "fecha": "2024-01-05", "eva": 4}"#;
        let session: RemoteSession = serde_json::from_str(raw).unwrap();
        assert_eq!(session.patient_id, RemoteId::Int(1));
        assert_eq!(session.number, 0);
        assert_eq!(session.pain_scale, Some(4));
    }

    #[test]
    fn test_unsaved_records_omit_id() {
        let session = RemoteSession {
            id: None,
            patient_id: RemoteId::Int(1),
            number: 1,
            date: "2024-01-05".into(),
            pain_scale: None,
            sleep_quality: None,
            exercises: None,
            notes: None,
            sent_whatsapp: false,
            created_at: None,
        };
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["paciente_id"], 1);
    }

    #[test]
    fn test_text_id_kept_verbatim() {
        assert_eq!(PatientId::from(RemoteId::Int(42)), PatientId::Int(42));
        assert_eq!(
            PatientId::from(RemoteId::Text("7f3a".into())),
            PatientId::Text("7f3a".into())
        );

        // Zero-padded ids survive a round trip through the host
        let padded = PatientId::from(RemoteId::Text("0042".into()));
        assert_eq!(padded, PatientId::Text("0042".into()));
        assert_eq!(padded.to_string(), "0042");
        assert_eq!(PatientId::from(padded.to_string().as_str()), padded);
        assert_eq!(
            PatientId::from(RemoteId::Text("42".into())).to_string(),
            "42"
        );
    }
}
