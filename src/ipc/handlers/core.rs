use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

/// Every method the router dispatches, reported by `health`.
pub const METHODS: &[&str] = &[
    "health",
    "workspace.select",
    "classes.create",
    "classes.list",
    "classes.setCurrentQuarter",
    "students.add",
    "students.list",
    "structure.get",
    "structure.saveCategories",
    "structure.validate",
    "structure.addTask",
    "scores.set",
    "scores.clear",
    "attendance.set",
    "grades.categoryAverage",
    "grades.blended",
    "grades.final",
    "grades.overall",
    "grades.hasQuarterlyExam",
    "grades.canUnlockQuarter",
    "grades.expected",
    "grades.plan",
    "grades.student.analytics",
    "grades.class.overview",
    "settings.grading.get",
    "settings.grading.update",
];

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "methods": METHODS,
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match state.select_workspace(&path) {
        Ok(()) => {
            tracing::info!(workspace = %path.display(), "workspace selected");
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "dbFile": db::DB_FILE_NAME,
                }),
            )
        }
        Err(e) => {
            tracing::error!(workspace = %path.display(), "failed to open workspace: {:#}", e);
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
