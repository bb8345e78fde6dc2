use rusqlite::Connection;

use crate::calc::StudentScores;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::store;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn db_err(req: &Request, e: anyhow::Error) -> serde_json::Value {
    tracing::error!(method = %req.method, "database call failed: {:#}", e);
    err(&req.id, "db_query_failed", format!("{:#}", e), None)
}

/// Parses `params[key]` as a quarter number 1-4.
pub fn parse_quarter(req: &Request, key: &str) -> Result<u8, serde_json::Value> {
    let Some(v) = req.params.get(key) else {
        return Err(err(&req.id, "bad_params", format!("missing {}", key), None));
    };
    match v.as_u64() {
        Some(q @ 1..=4) => Ok(q as u8),
        _ => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be an integer between 1 and 4", key),
            None,
        )),
    }
}

pub fn optional_quarter(req: &Request, key: &str) -> Result<Option<u8>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(_) => parse_quarter(req, key).map(Some),
    }
}

/// Unsaved edits `{ taskId: number|null }` to overlay on persisted scores.
pub fn parse_drafts(req: &Request) -> Result<StudentScores, serde_json::Value> {
    let mut out = StudentScores::new();
    let Some(raw) = req.params.get("drafts") else {
        return Ok(out);
    };
    if raw.is_null() {
        return Ok(out);
    }
    let Some(obj) = raw.as_object() else {
        return Err(err(&req.id, "bad_params", "drafts must be an object", None));
    };
    for (task_id, v) in obj {
        if v.is_null() {
            out.insert(task_id.clone(), None);
            continue;
        }
        let Some(n) = v.as_f64() else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("drafts.{} must be a number or null", task_id),
                None,
            ));
        };
        out.insert(task_id.clone(), Some(n));
    }
    Ok(out)
}

pub fn ensure_class(conn: &Connection, req: &Request, class_id: &str) -> Result<u8, serde_json::Value> {
    match store::class_current_quarter(conn, class_id) {
        Ok(Some(q)) => Ok(q),
        Ok(None) => Err(err(&req.id, "not_found", "class not found", None)),
        Err(e) => Err(db_err(req, e)),
    }
}

pub fn ensure_student(conn: &Connection, req: &Request, class_id: &str, student_id: &str) -> Result<(), serde_json::Value> {
    match store::student_in_class(conn, class_id, student_id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(err(&req.id, "not_found", "student not found in class", None)),
        Err(e) => Err(db_err(req, e)),
    }
}
