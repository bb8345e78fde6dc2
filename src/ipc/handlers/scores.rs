use crate::calc::scores::clamp_score;
use crate::calc::AttendanceSummary;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err, ensure_class, ensure_student, parse_quarter, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn set_or_clear(state: &mut AppState, req: &Request, clear: bool) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let task_id = match required_str(req, "taskId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let task = match store::find_task(conn, &task_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "bad_params", format!("unknown task: {}", task_id), None),
        Err(e) => return db_err(req, e),
    };
    if let Err(e) = ensure_student(conn, req, &task.class_id, &student_id) {
        return e;
    }

    let (value, clamped) = if clear {
        (None, false)
    } else {
        match req.params.get("value") {
            None => return err(&req.id, "bad_params", "missing value", None),
            Some(v) if v.is_null() => (None, false),
            Some(v) => {
                let Some(raw) = v.as_f64().filter(|n| n.is_finite()) else {
                    return err(&req.id, "bad_params", "value must be a number or null", None);
                };
                let stored = clamp_score(raw, task.total);
                (Some(stored), stored != raw)
            }
        }
    };

    if let Err(e) = store::set_score(conn, &task_id, &student_id, value) {
        return db_err(req, e);
    }
    ok(
        &req.id,
        json!({
            "taskId": task_id,
            "studentId": student_id,
            "value": value,
            "clamped": clamped,
        }),
    )
}

fn handle_scores_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    set_or_clear(state, req, false)
}

fn handle_scores_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    set_or_clear(state, req, true)
}

fn handle_attendance_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let quarter = match parse_quarter(req, "quarter") {
        Ok(q) => q,
        Err(e) => return e,
    };
    let day_count = |key: &str| -> Result<u32, serde_json::Value> {
        req.params
            .get(key)
            .and_then(|v| v.as_u64())
            .filter(|n| *n <= 366)
            .map(|n| n as u32)
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be a non-negative integer", key),
                    None,
                )
            })
    };
    let present_days = match day_count("presentDays") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let absent_days = match day_count("absentDays") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = ensure_class(conn, req, &class_id) {
        return e;
    }
    if let Err(e) = ensure_student(conn, req, &class_id, &student_id) {
        return e;
    }

    let summary = AttendanceSummary {
        present_days,
        absent_days,
    };
    if let Err(e) = store::set_attendance(conn, &class_id, &student_id, quarter, summary) {
        return db_err(req, e);
    }
    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "quarter": quarter,
            "rate": summary.rate(),
            "presentDays": present_days,
            "absentDays": absent_days,
            "totalDays": summary.total_days(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.set" => Some(handle_scores_set(state, req)),
        "scores.clear" => Some(handle_scores_clear(state, req)),
        "attendance.set" => Some(handle_attendance_set(state, req)),
        _ => None,
    }
}
