use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{db_conn, db_err};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_grading_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match store::load_policy(conn) {
        Ok(policy) => ok(&req.id, json!({ "policy": policy })),
        Err(e) => db_err(req, e),
    }
}

fn handle_grading_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    let current = match store::load_policy(conn) {
        Ok(p) => p,
        Err(e) => return db_err(req, e),
    };
    let next = match current.patched(patch) {
        Ok(p) => p,
        Err(e) => return calc_err(&req.id, e),
    };
    if let Err(e) = store::save_policy(conn, &next) {
        return db_err(req, e);
    }
    tracing::info!(target_grade = next.target_grade, "grading policy updated");
    ok(&req.id, json!({ "policy": next }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.grading.get" => Some(handle_grading_get(state, req)),
        "settings.grading.update" => Some(handle_grading_update(state, req)),
        _ => None,
    }
}
