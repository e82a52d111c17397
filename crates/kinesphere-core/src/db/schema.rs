//! SQLite schema definition.

/// Complete embedded database schema. Every statement is idempotent.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS pacientes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    nombre TEXT NOT NULL,
    rut TEXT,
    edad INTEGER,
    email TEXT,
    telefono TEXT,
    diagnostico TEXT,
    sesiones_planificadas INTEGER NOT NULL DEFAULT 0,
    sesiones_completadas INTEGER NOT NULL DEFAULT 0,
    activo INTEGER NOT NULL DEFAULT 1,
    fecha_creacion TEXT NOT NULL DEFAULT (datetime('now')),
    observaciones TEXT,
    es_demo INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pacientes_demo ON pacientes(es_demo, activo);
CREATE INDEX IF NOT EXISTS idx_pacientes_nombre ON pacientes(nombre);

-- ============================================================================
-- Sessions (ordinal is derived from insertion order, never stored)
-- ============================================================================

CREATE TABLE IF NOT EXISTS sesiones (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    paciente_id INTEGER NOT NULL REFERENCES pacientes(id),
    fecha TEXT NOT NULL DEFAULT (date('now')),
    ejercicios TEXT,
    observaciones TEXT,
    eva INTEGER CHECK (eva IS NULL OR (eva >= 0 AND eva <= 10)),
    "sueño" INTEGER CHECK ("sueño" IS NULL OR ("sueño" >= 1 AND "sueño" <= 5)),
    enviado_whatsapp INTEGER NOT NULL DEFAULT 0,
    creado_en TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_sesiones_paciente ON sesiones(paciente_id);
CREATE INDEX IF NOT EXISTS idx_sesiones_fecha ON sesiones(fecha);

-- ============================================================================
-- Evaluations
-- ============================================================================

CREATE TABLE IF NOT EXISTS evaluaciones (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    paciente_id INTEGER NOT NULL REFERENCES pacientes(id),
    tipo TEXT NOT NULL CHECK (tipo IN ('inicial', 'final')),
    fecha TEXT NOT NULL DEFAULT (date('now')),
    movilidad TEXT,
    fuerza TEXT,
    dolor TEXT,
    eva_inicial INTEGER,
    observaciones TEXT,
    creado_en TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_evaluaciones_paciente ON evaluaciones(paciente_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_eva_range_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute("INSERT INTO pacientes (nombre) VALUES ('Juan Pérez')", [])
            .unwrap();

        let result = conn.execute(
            "INSERT INTO sesiones (paciente_id, eva) VALUES (1, 11)",
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO sesiones (paciente_id, eva) VALUES (1, 7)",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_session_requires_existing_patient() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute("INSERT INTO sesiones (paciente_id) VALUES (99)", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_evaluation_kind_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute("INSERT INTO pacientes (nombre) VALUES ('Juan Pérez')", [])
            .unwrap();

        let result = conn.execute(
            "INSERT INTO evaluaciones (paciente_id, tipo) VALUES (1, 'intermedia')",
            [],
        );
        assert!(result.is_err());
    }
}
