//! Session database operations.

use rusqlite::params;

use super::{Database, DbError, DbResult};
use crate::models::{NewSession, PatientId, Session};

impl Database {
    /// Insert a session for an existing, active patient. Returns the row id.
    pub fn insert_session(&self, patient_id: i64, session: &NewSession) -> DbResult<i64> {
        match self.get_patient(patient_id)? {
            Some(patient) if patient.active => {}
            _ => return Err(DbError::NotFound(format!("patient {}", patient_id))),
        }

        self.conn.execute(
            r#"
            INSERT INTO sesiones (
                paciente_id, fecha, ejercicios, observaciones, eva, "sueño",
                enviado_whatsapp, creado_en
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                patient_id,
                session.date,
                session.exercises,
                session.notes,
                session.pain_scale,
                session.sleep_quality,
                session.sent_whatsapp,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Sessions for a patient in insertion order, numbered from 1.
    pub fn list_sessions_for_patient(&self, patient_id: i64) -> DbResult<Vec<Session>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, paciente_id, fecha, ejercicios, observaciones, eva, "sueño",
                   enviado_whatsapp, creado_en
            FROM sesiones
            WHERE paciente_id = ?
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([patient_id], |row| {
            Ok(Session {
                id: row.get::<_, i64>(0)?.to_string(),
                patient_id: PatientId::Int(row.get(1)?),
                number: 0,
                date: row.get(2)?,
                exercises: row.get(3)?,
                notes: row.get(4)?,
                pain_scale: row.get(5)?,
                sleep_quality: row.get(6)?,
                sent_whatsapp: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?;

        let mut sessions = rows.collect::<Result<Vec<_>, _>>()?;
        for (i, session) in sessions.iter_mut().enumerate() {
            session.number = i as u32 + 1;
        }
        Ok(sessions)
    }
}
