//! Patient database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{demo_patients, NewPatient, Patient, PatientActivity, PatientId};

const PATIENT_COLUMNS: &str = r#"
    p.id, p.nombre, p.rut, p.edad, p.email, p.telefono, p.diagnostico,
    p.sesiones_planificadas, p.sesiones_completadas, p.activo,
    p.fecha_creacion, p.observaciones, p.es_demo
"#;

const ACTIVITY_COLUMNS: &str = r#"
    (SELECT COUNT(*) FROM sesiones s WHERE s.paciente_id = p.id),
    (SELECT MAX(s.fecha) FROM sesiones s WHERE s.paciente_id = p.id),
    EXISTS (SELECT 1 FROM evaluaciones e WHERE e.paciente_id = p.id AND e.tipo = 'final')
"#;

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: PatientId::Int(row.get(0)?),
        name: row.get(1)?,
        national_id: row.get(2)?,
        age: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        diagnosis: row.get(6)?,
        sessions_planned: row.get(7)?,
        sessions_completed: row.get(8)?,
        active: row.get(9)?,
        created_at: row.get(10)?,
        notes: row.get(11)?,
        is_demo: row.get(12)?,
        activity: None,
    })
}

fn patient_with_activity_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    let mut patient = patient_from_row(row)?;
    patient.activity = Some(PatientActivity {
        session_count: row.get(13)?,
        last_session_date: row.get(14)?,
        evaluated: row.get(15)?,
    });
    Ok(patient)
}

impl Database {
    /// Insert a patient. Returns the assigned row id.
    pub fn insert_patient(&self, patient: &NewPatient, is_demo: bool) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO pacientes (
                nombre, rut, edad, email, telefono, diagnostico,
                sesiones_planificadas, sesiones_completadas, activo,
                fecha_creacion, observaciones, es_demo
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                patient.name,
                patient.national_id,
                patient.age,
                patient.email,
                patient.phone,
                patient.diagnosis,
                patient.sessions_planned,
                patient.sessions_completed,
                patient.active,
                chrono::Utc::now().to_rfc3339(),
                patient.notes,
                is_demo,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update the editable fields of a patient.
    pub fn update_patient(&self, id: i64, patient: &NewPatient) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE pacientes SET
                nombre = ?2,
                rut = ?3,
                edad = ?4,
                email = ?5,
                telefono = ?6,
                diagnostico = ?7,
                sesiones_planificadas = ?8,
                sesiones_completadas = ?9,
                activo = ?10,
                observaciones = ?11
            WHERE id = ?1
            "#,
            params![
                id,
                patient.name,
                patient.national_id,
                patient.age,
                patient.email,
                patient.phone,
                patient.diagnosis,
                patient.sessions_planned,
                patient.sessions_completed,
                patient.active,
                patient.notes,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by id, including soft-deleted rows.
    pub fn get_patient(&self, id: i64) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {PATIENT_COLUMNS} FROM pacientes p WHERE p.id = ?"),
                [id],
                patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Active patients with the given demo flag, newest first.
    pub fn list_active_patients(&self, demo: bool) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {PATIENT_COLUMNS}
            FROM pacientes p
            WHERE p.es_demo = ? AND p.activo = 1
            ORDER BY p.id DESC
            "#
        ))?;

        let rows = stmt.query_map([demo], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Active patients with session counters attached.
    pub fn list_active_patients_with_activity(&self, demo: bool) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {PATIENT_COLUMNS}, {ACTIVITY_COLUMNS}
            FROM pacientes p
            WHERE p.es_demo = ? AND p.activo = 1
            ORDER BY p.id DESC
            "#
        ))?;

        let rows = stmt.query_map([demo], patient_with_activity_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Search patients by name or RUT (substring match).
    pub fn search_patients(&self, term: &str, limit: usize) -> DbResult<Vec<Patient>> {
        let pattern = format!("%{}%", term);
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {PATIENT_COLUMNS}
            FROM pacientes p
            WHERE p.activo = 1 AND (p.nombre LIKE ?1 OR p.rut LIKE ?1)
            ORDER BY p.es_demo, p.nombre
            LIMIT ?2
            "#
        ))?;

        let rows = stmt.query_map(params![pattern, limit as i64], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Count rows by demo flag, ignoring the active flag.
    pub fn count_patients(&self, demo: bool) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM pacientes WHERE es_demo = ?",
            [demo],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Flip the active flag off and drop the patient's sessions.
    pub fn soft_delete_patient(&mut self, id: i64) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        let rows_affected = tx.execute(
            "UPDATE pacientes SET activo = 0 WHERE id = ? AND activo = 1",
            [id],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("patient {}", id)));
        }
        tx.execute("DELETE FROM sesiones WHERE paciente_id = ?", [id])?;
        tx.commit()?;
        Ok(())
    }

    /// Seed the demo patients unless real or demo rows already exist.
    ///
    /// Returns the number of rows inserted.
    pub fn seed_demo_patients(&mut self) -> DbResult<usize> {
        if self.count_patients(false)? > 0 || self.count_patients(true)? > 0 {
            return Ok(0);
        }

        let demos = demo_patients();
        let tx = self.transaction()?;
        for demo in &demos {
            tx.execute(
                r#"
                INSERT INTO pacientes (
                    nombre, rut, edad, email, telefono, diagnostico,
                    sesiones_planificadas, sesiones_completadas, activo, es_demo
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1)
                "#,
                params![
                    demo.name,
                    demo.national_id,
                    demo.age,
                    demo.email,
                    demo.phone,
                    demo.diagnosis,
                    demo.sessions_planned,
                    demo.sessions_completed,
                    demo.active,
                ],
            )?;
        }
        tx.commit()?;
        Ok(demos.len())
    }

    /// Hard-delete every non-demo patient with their sessions and evaluations.
    ///
    /// Returns the number of patients removed.
    pub fn clear_user_data(&mut self) -> DbResult<usize> {
        let tx = self.transaction()?;
        tx.execute(
            "DELETE FROM sesiones WHERE paciente_id IN (SELECT id FROM pacientes WHERE es_demo = 0)",
            [],
        )?;
        tx.execute(
            "DELETE FROM evaluaciones WHERE paciente_id IN (SELECT id FROM pacientes WHERE es_demo = 0)",
            [],
        )?;
        let removed = tx.execute("DELETE FROM pacientes WHERE es_demo = 0", [])?;
        tx.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();

        let mut patient = NewPatient::new("Juan Pérez");
        patient.national_id = Some("11.111.111-1".into());
        patient.age = Some(45);
        patient.diagnosis = Some("Lumbalgia crónica".into());

        let id = db.insert_patient(&patient, false).unwrap();

        let retrieved = db.get_patient(id).unwrap().unwrap();
        assert_eq!(retrieved.id, PatientId::Int(id));
        assert_eq!(retrieved.name, "Juan Pérez");
        assert_eq!(retrieved.age, Some(45));
        assert_eq!(retrieved.diagnosis, Some("Lumbalgia crónica".into()));
        assert!(retrieved.active);
        assert!(!retrieved.is_demo);
    }

    #[test]
    fn test_update_patient() {
        let db = setup_db();

        let mut patient = NewPatient::new("Juan Pérez");
        let id = db.insert_patient(&patient, false).unwrap();

        patient.sessions_completed = 3;
        patient.notes = Some("Mejoría en movilidad".into());
        assert!(db.update_patient(id, &patient).unwrap());

        let retrieved = db.get_patient(id).unwrap().unwrap();
        assert_eq!(retrieved.sessions_completed, 3);
        assert_eq!(retrieved.notes, Some("Mejoría en movilidad".into()));

        assert!(!db.update_patient(999, &patient).unwrap());
    }

    #[test]
    fn test_seed_is_idempotent() {
        let mut db = setup_db();

        assert_eq!(db.seed_demo_patients().unwrap(), 3);
        assert_eq!(db.seed_demo_patients().unwrap(), 0);
        assert_eq!(db.count_patients(true).unwrap(), 3);
    }

    #[test]
    fn test_seed_skipped_when_real_patients_exist() {
        let mut db = setup_db();
        db.insert_patient(&NewPatient::new("Juan Pérez"), false)
            .unwrap();

        assert_eq!(db.seed_demo_patients().unwrap(), 0);
        assert_eq!(db.count_patients(true).unwrap(), 0);
    }

    #[test]
    fn test_list_active_by_demo_flag() {
        let mut db = setup_db();
        db.seed_demo_patients().unwrap();
        db.insert_patient(&NewPatient::new("Juan Pérez"), false)
            .unwrap();

        let real = db.list_active_patients(false).unwrap();
        assert_eq!(real.len(), 1);
        assert!(real.iter().all(|p| !p.is_demo));

        let demo = db.list_active_patients(true).unwrap();
        assert_eq!(demo.len(), 3);
        assert!(demo.iter().all(|p| p.is_demo));
    }

    #[test]
    fn test_soft_delete() {
        let mut db = setup_db();
        let id = db
            .insert_patient(&NewPatient::new("Juan Pérez"), false)
            .unwrap();

        db.soft_delete_patient(id).unwrap();

        assert!(db.list_active_patients(false).unwrap().is_empty());
        // Row is kept with the flag flipped
        let row = db.get_patient(id).unwrap().unwrap();
        assert!(!row.active);

        assert!(matches!(
            db.soft_delete_patient(id),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_search_patients() {
        let db = setup_db();

        let mut juan = NewPatient::new("Juan Pérez");
        juan.national_id = Some("11.111.111-1".into());
        db.insert_patient(&juan, false).unwrap();
        db.insert_patient(&NewPatient::new("María González"), false)
            .unwrap();

        let by_name = db.search_patients("María", 10).unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "María González");

        let by_rut = db.search_patients("111.111", 10).unwrap();
        assert_eq!(by_rut.len(), 1);
        assert_eq!(by_rut[0].name, "Juan Pérez");
    }

    #[test]
    fn test_clear_user_data_keeps_demo_rows() {
        let mut db = setup_db();
        db.seed_demo_patients().unwrap();
        db.insert_patient(&NewPatient::new("Juan Pérez"), false)
            .unwrap();

        assert_eq!(db.clear_user_data().unwrap(), 1);
        assert_eq!(db.count_patients(false).unwrap(), 0);
        assert_eq!(db.count_patients(true).unwrap(), 3);
    }
}
