//! Clinical evaluation models.

use serde::{Deserialize, Serialize};

use super::patient::PatientId;

/// Evaluation kind. Serialized the way the `tipo` column stores it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EvaluationKind {
    /// Intake evaluation
    #[serde(rename = "inicial")]
    Initial,
    /// Discharge evaluation closing the treatment
    #[serde(rename = "final")]
    Final,
}

impl EvaluationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationKind::Initial => "inicial",
            EvaluationKind::Final => "final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inicial" => Some(EvaluationKind::Initial),
            "final" => Some(EvaluationKind::Final),
            _ => None,
        }
    }
}

/// A terminal clinical summary tied to a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub id: i64,
    pub patient_id: i64,
    pub kind: EvaluationKind,
    pub date: String,
    pub mobility: Option<String>,
    pub strength: Option<String>,
    pub pain: Option<String>,
    /// EVA score at intake
    pub initial_eva: Option<u8>,
    pub notes: Option<String>,
    pub created_at: String,
}

/// Payload for recording an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEvaluation {
    pub patient_id: PatientId,
    pub kind: EvaluationKind,
    pub date: String,
    pub mobility: Option<String>,
    pub strength: Option<String>,
    pub pain: Option<String>,
    pub initial_eva: Option<u8>,
    pub notes: Option<String>,
}

impl NewEvaluation {
    pub fn new(patient_id: PatientId, kind: EvaluationKind) -> Self {
        Self {
            patient_id,
            kind,
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            mobility: None,
            strength: None,
            pain: None,
            initial_eva: None,
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_as_stored() {
        for kind in [EvaluationKind::Initial, EvaluationKind::Final] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(EvaluationKind::parse(kind.as_str()), Some(kind));
        }
        let kind: EvaluationKind = serde_json::from_str("\"inicial\"").unwrap();
        assert_eq!(kind, EvaluationKind::Initial);
        assert!(serde_json::from_str::<EvaluationKind>("\"initial\"").is_err());
    }
}
