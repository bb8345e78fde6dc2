//! Loads the grade engine's inputs from the workspace database and writes
//! collaborator edits back. The engine itself never sees a `Connection`.

use std::collections::HashMap;

use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::calc::{
    validate_weights, AttendanceSummary, CategoryKind, GradeCategory, GradeStructure,
    GradingPolicy, ScoreMap, StudentScores, Task,
};
use crate::db;

pub const POLICY_SETTINGS_KEY: &str = "grading.policy";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub id: String,
    pub name: String,
    pub current_quarter: u8,
    pub student_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub display_name: String,
    pub sort_order: i64,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct TaskRef {
    pub class_id: String,
    pub total: f64,
}

pub fn create_class(conn: &Connection, name: &str) -> anyhow::Result<String> {
    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, current_quarter) VALUES(?, ?, 1)",
        (&class_id, name),
    )?;
    Ok(class_id)
}

pub fn list_classes(conn: &Connection) -> anyhow::Result<Vec<ClassRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.current_quarter,
                (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id)
         FROM classes c
         ORDER BY c.name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                name: r.get(1)?,
                current_quarter: r.get::<_, i64>(2)?.clamp(1, 4) as u8,
                student_count: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn class_current_quarter(conn: &Connection, class_id: &str) -> anyhow::Result<Option<u8>> {
    let q: Option<i64> = conn
        .query_row(
            "SELECT current_quarter FROM classes WHERE id = ?",
            [class_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(q.map(|v| v.clamp(1, 4) as u8))
}

pub fn set_current_quarter(conn: &Connection, class_id: &str, quarter: u8) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE classes SET current_quarter = ? WHERE id = ?",
        (quarter as i64, class_id),
    )?;
    Ok(n > 0)
}

pub fn add_student(conn: &Connection, class_id: &str, last_name: &str, first_name: &str) -> anyhow::Result<String> {
    let next_sort: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, last_name, first_name, active, sort_order)
         VALUES(?, ?, ?, ?, 1, ?)",
        (&student_id, class_id, last_name, first_name, next_sort),
    )?;
    Ok(student_id)
}

pub fn list_students(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<StudentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, last_name, first_name, sort_order, active
         FROM students
         WHERE class_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            Ok(StudentRow {
                id: r.get(0)?,
                display_name: format!("{}, {}", last, first),
                sort_order: r.get(3)?,
                active: r.get::<_, i64>(4)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn student_in_class(conn: &Connection, class_id: &str, student_id: &str) -> anyhow::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND class_id = ?",
            (student_id, class_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

/// Snapshot of a class's categories and tasks in display/chronological order.
pub fn load_structure(conn: &Connection, class_id: &str) -> anyhow::Result<GradeStructure> {
    let mut cat_stmt = conn.prepare(
        "SELECT id, label, kind, weight
         FROM grade_categories
         WHERE class_id = ?
         ORDER BY sort_order",
    )?;
    let mut categories = cat_stmt
        .query_map([class_id], |r| {
            let id: String = r.get(0)?;
            let label: String = r.get(1)?;
            let kind: Option<String> = r.get(2)?;
            Ok(GradeCategory {
                kind: kind
                    .as_deref()
                    .and_then(CategoryKind::parse)
                    .unwrap_or(CategoryKind::Custom),
                id,
                label,
                weight: r.get(3)?,
                tasks: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut task_stmt = conn.prepare(
        "SELECT category_id, id, label, total, quarter
         FROM grade_tasks
         WHERE class_id = ?
         ORDER BY sort_order",
    )?;
    let tasks = task_stmt
        .query_map([class_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                Task {
                    id: r.get(1)?,
                    label: r.get(2)?,
                    total: r.get(3)?,
                    quarter: r.get::<_, i64>(4)?.clamp(1, 4) as u8,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (category_id, task) in tasks {
        if let Some(c) = categories.iter_mut().find(|c| c.id == category_id) {
            c.tasks.push(task);
        }
    }

    if let Err(e) = validate_weights(&categories) {
        tracing::warn!(class_id, code = %e.code, "stored grade structure is invalid: {}", e.message);
    }
    Ok(GradeStructure { categories })
}

/// Replaces the class's category list. Categories missing from `categories`
/// are removed together with their tasks and scores. Tasks in the input are
/// ignored; they are added through `add_task`.
pub fn save_categories(conn: &Connection, class_id: &str, categories: &[GradeCategory]) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;

    let existing: Vec<String> = {
        let mut stmt = tx.prepare("SELECT id FROM grade_categories WHERE class_id = ?")?;
        let rows = stmt
            .query_map([class_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    for old in existing
        .iter()
        .filter(|id| !categories.iter().any(|c| &c.id == *id))
    {
        tx.execute(
            "DELETE FROM scores WHERE task_id IN (
               SELECT id FROM grade_tasks WHERE class_id = ? AND category_id = ?
             )",
            (class_id, old),
        )?;
        tx.execute(
            "DELETE FROM grade_tasks WHERE class_id = ? AND category_id = ?",
            (class_id, old),
        )?;
        tx.execute(
            "DELETE FROM grade_categories WHERE class_id = ? AND id = ?",
            (class_id, old),
        )?;
    }

    for (i, c) in categories.iter().enumerate() {
        tx.execute(
            "INSERT INTO grade_categories(id, class_id, label, kind, weight, sort_order)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(class_id, id) DO UPDATE SET
               label = excluded.label,
               kind = excluded.kind,
               weight = excluded.weight,
               sort_order = excluded.sort_order",
            (&c.id, class_id, &c.label, c.kind.as_str(), c.weight, i as i64),
        )?;
    }

    tx.commit()?;
    Ok(())
}

pub fn category_exists(conn: &Connection, class_id: &str, category_id: &str) -> anyhow::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM grade_categories WHERE class_id = ? AND id = ?",
            (class_id, category_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

/// Appends a task to the end of a category; insertion order is chronological.
pub fn add_task(
    conn: &Connection,
    class_id: &str,
    category_id: &str,
    task_id: Option<&str>,
    quarter: u8,
    label: &str,
    total: f64,
) -> anyhow::Result<String> {
    let next_sort: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM grade_tasks WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    let id = task_id
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    conn.execute(
        "INSERT INTO grade_tasks(id, class_id, category_id, quarter, label, total, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&id, class_id, category_id, quarter as i64, label, total, next_sort),
    )
    .with_context(|| format!("insert task {}", id))?;
    Ok(id)
}

pub fn find_task(conn: &Connection, task_id: &str) -> anyhow::Result<Option<TaskRef>> {
    let row = conn
        .query_row(
            "SELECT class_id, total FROM grade_tasks WHERE id = ?",
            [task_id],
            |r| {
                Ok(TaskRef {
                    class_id: r.get(0)?,
                    total: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Stores a score, or marks the task ungraded when `value` is `None`.
pub fn set_score(conn: &Connection, task_id: &str, student_id: &str, value: Option<f64>) -> anyhow::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO scores(task_id, student_id, raw_value, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(task_id, student_id) DO UPDATE SET
           raw_value = excluded.raw_value,
           updated_at = excluded.updated_at",
        (task_id, student_id, value, now),
    )?;
    Ok(())
}

pub fn load_student_scores(conn: &Connection, class_id: &str, student_id: &str) -> anyhow::Result<StudentScores> {
    let mut stmt = conn.prepare(
        "SELECT s.task_id, s.raw_value
         FROM scores s
         JOIN grade_tasks t ON t.id = s.task_id
         WHERE t.class_id = ? AND s.student_id = ?",
    )?;
    let rows = stmt
        .query_map((class_id, student_id), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Option<f64>>(1)?))
        })?
        .collect::<Result<StudentScores, _>>()?;
    Ok(rows)
}

pub fn load_class_scores(conn: &Connection, class_id: &str) -> anyhow::Result<ScoreMap> {
    let mut stmt = conn.prepare(
        "SELECT s.student_id, s.task_id, s.raw_value
         FROM scores s
         JOIN grade_tasks t ON t.id = s.task_id
         WHERE t.class_id = ?",
    )?;
    let mut out = ScoreMap::new();
    let mut rows = stmt.query([class_id])?;
    while let Some(r) = rows.next()? {
        let student_id: String = r.get(0)?;
        let task_id: String = r.get(1)?;
        let value: Option<f64> = r.get(2)?;
        out.entry(student_id).or_default().insert(task_id, value);
    }
    Ok(out)
}

pub fn set_attendance(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
    quarter: u8,
    summary: AttendanceSummary,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO attendance(class_id, student_id, quarter, present_days, absent_days)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(class_id, student_id, quarter) DO UPDATE SET
           present_days = excluded.present_days,
           absent_days = excluded.absent_days",
        (
            class_id,
            student_id,
            quarter as i64,
            summary.present_days as i64,
            summary.absent_days as i64,
        ),
    )?;
    Ok(())
}

pub fn load_attendance(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> anyhow::Result<HashMap<u8, AttendanceSummary>> {
    let mut stmt = conn.prepare(
        "SELECT quarter, present_days, absent_days
         FROM attendance
         WHERE class_id = ? AND student_id = ?",
    )?;
    let rows = stmt
        .query_map((class_id, student_id), |r| {
            Ok((
                r.get::<_, i64>(0)?.clamp(1, 4) as u8,
                AttendanceSummary {
                    present_days: r.get::<_, i64>(1)?.max(0) as u32,
                    absent_days: r.get::<_, i64>(2)?.max(0) as u32,
                },
            ))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

/// The workspace grading policy; fields absent from storage use defaults.
pub fn load_policy(conn: &Connection) -> anyhow::Result<GradingPolicy> {
    match db::settings_get_json(conn, POLICY_SETTINGS_KEY)? {
        Some(v) => serde_json::from_value(v).context("parse grading policy"),
        None => Ok(GradingPolicy::default()),
    }
}

pub fn save_policy(conn: &Connection, policy: &GradingPolicy) -> anyhow::Result<()> {
    db::settings_set_json(conn, POLICY_SETTINGS_KEY, &serde_json::to_value(policy)?)
}
