use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::calc::CategoryKind;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            current_quarter INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    ensure_classes_current_quarter(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_categories(
            id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            label TEXT NOT NULL,
            kind TEXT,
            weight REAL NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(class_id, id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    ensure_grade_categories_kind(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_tasks(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            category_id TEXT NOT NULL,
            quarter INTEGER NOT NULL,
            label TEXT NOT NULL,
            total REAL NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id, category_id) REFERENCES grade_categories(class_id, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_tasks_category ON grade_tasks(class_id, category_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            task_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            raw_value REAL,
            updated_at TEXT,
            PRIMARY KEY(task_id, student_id),
            FOREIGN KEY(task_id) REFERENCES grade_tasks(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_student ON scores(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            quarter INTEGER NOT NULL,
            present_days INTEGER NOT NULL DEFAULT 0,
            absent_days INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(class_id, student_id, quarter),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn ensure_classes_current_quarter(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "classes", "current_quarter")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE classes ADD COLUMN current_quarter INTEGER NOT NULL DEFAULT 1",
        [],
    )?;
    Ok(())
}

/// Workspaces created before categories carried an explicit kind get one
/// assigned here, once, from the legacy id/label convention.
fn ensure_grade_categories_kind(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "grade_categories", "kind")? {
        conn.execute("ALTER TABLE grade_categories ADD COLUMN kind TEXT", [])?;
    }

    let mut stmt =
        conn.prepare("SELECT class_id, id, label FROM grade_categories WHERE kind IS NULL")?;
    let legacy = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (class_id, id, label) in legacy {
        let kind = CategoryKind::from_convention(&id, &label);
        conn.execute(
            "UPDATE grade_categories SET kind = ? WHERE class_id = ? AND id = ?",
            (kind.as_str(), &class_id, &id),
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
