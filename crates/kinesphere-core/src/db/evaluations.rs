//! Evaluation database operations.

use rusqlite::params;

use super::{Database, DbError, DbResult};
use crate::models::{Evaluation, EvaluationKind, NewEvaluation};

impl Database {
    /// Insert an evaluation. Returns the row id.
    pub fn insert_evaluation(&self, patient_id: i64, evaluation: &NewEvaluation) -> DbResult<i64> {
        if self.get_patient(patient_id)?.is_none() {
            return Err(DbError::NotFound(format!("patient {}", patient_id)));
        }

        self.conn.execute(
            r#"
            INSERT INTO evaluaciones (
                paciente_id, tipo, fecha, movilidad, fuerza, dolor,
                eva_inicial, observaciones, creado_en
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                patient_id,
                evaluation.kind.as_str(),
                evaluation.date,
                evaluation.mobility,
                evaluation.strength,
                evaluation.pain,
                evaluation.initial_eva,
                evaluation.notes,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Evaluations recorded for a patient, oldest first.
    pub fn list_evaluations_for_patient(&self, patient_id: i64) -> DbResult<Vec<Evaluation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, paciente_id, tipo, fecha, movilidad, fuerza, dolor,
                   eva_inicial, observaciones, creado_en
            FROM evaluaciones
            WHERE paciente_id = ?
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([patient_id], |row| {
            let kind: String = row.get(2)?;
            Ok(Evaluation {
                id: row.get(0)?,
                patient_id: row.get(1)?,
                kind: parse_kind(&kind)?,
                date: row.get(3)?,
                mobility: row.get(4)?,
                strength: row.get(5)?,
                pain: row.get(6)?,
                initial_eva: row.get(7)?,
                notes: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Whether a final evaluation exists for the patient.
    pub fn has_final_evaluation(&self, patient_id: i64) -> DbResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM evaluaciones WHERE paciente_id = ? AND tipo = 'final')",
            [patient_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

fn parse_kind(raw: &str) -> rusqlite::Result<EvaluationKind> {
    EvaluationKind::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown evaluation kind '{}'", raw),
            )),
        )
    })
}
