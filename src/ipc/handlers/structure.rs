use crate::calc::{validate_weights, CategoryKind, GradeCategory};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{db_conn, db_err, ensure_class, parse_quarter, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryInput {
    id: String,
    label: String,
    #[serde(default)]
    kind: Option<CategoryKind>,
    weight: f64,
}

fn parse_categories(req: &Request) -> Result<Vec<GradeCategory>, serde_json::Value> {
    let Some(raw) = req.params.get("categories") else {
        return Err(err(&req.id, "bad_params", "missing categories", None));
    };
    let inputs: Vec<CategoryInput> = serde_json::from_value(raw.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            format!("categories must be a list of {{id, label, kind?, weight}}: {}", e),
            None,
        )
    })?;
    Ok(inputs
        .into_iter()
        .map(|c| {
            let id = c.id.trim().to_string();
            // Without an explicit kind, assign one now from the id/label
            // convention; it is stored and never re-derived.
            let kind = c
                .kind
                .unwrap_or_else(|| CategoryKind::from_convention(&id, &c.label));
            GradeCategory {
                id,
                label: c.label,
                kind,
                weight: c.weight,
                tasks: Vec::new(),
            }
        })
        .collect())
}

fn validation_json(categories: &[GradeCategory]) -> serde_json::Value {
    let sum: f64 = categories.iter().map(|c| c.weight).sum();
    match validate_weights(categories) {
        Ok(()) => json!({ "valid": true, "weightSum": sum }),
        Err(e) => json!({ "valid": false, "weightSum": sum, "error": e }),
    }
}

fn handle_structure_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = ensure_class(conn, req, &class_id) {
        return e;
    }
    match store::load_structure(conn, &class_id) {
        Ok(structure) => ok(
            &req.id,
            json!({
                "classId": class_id,
                "categories": structure.categories,
                "quarters": structure.quarters(),
                "validation": validation_json(&structure.categories),
            }),
        ),
        Err(e) => db_err(req, e),
    }
}

fn handle_structure_save_categories(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let categories = match parse_categories(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = ensure_class(conn, req, &class_id) {
        return e;
    }
    if categories.iter().any(|c| c.id.is_empty()) {
        return err(&req.id, "bad_params", "category id must not be empty", None);
    }
    if let Err(e) = validate_weights(&categories) {
        return calc_err(&req.id, e);
    }
    if let Err(e) = store::save_categories(conn, &class_id, &categories) {
        return db_err(req, e);
    }
    match store::load_structure(conn, &class_id) {
        Ok(structure) => ok(
            &req.id,
            json!({ "classId": class_id, "categories": structure.categories }),
        ),
        Err(e) => db_err(req, e),
    }
}

fn handle_structure_validate(state: &mut AppState, req: &Request) -> serde_json::Value {
    if req.params.get("categories").is_some() {
        return match parse_categories(req) {
            Ok(categories) => ok(&req.id, validation_json(&categories)),
            Err(e) => e,
        };
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = ensure_class(conn, req, &class_id) {
        return e;
    }
    match store::load_structure(conn, &class_id) {
        Ok(structure) => ok(&req.id, validation_json(&structure.categories)),
        Err(e) => db_err(req, e),
    }
}

fn handle_structure_add_task(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let category_id = match required_str(req, "categoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let label = match required_str(req, "label") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let quarter = match parse_quarter(req, "quarter") {
        Ok(q) => q,
        Err(e) => return e,
    };
    let Some(total) = req
        .params
        .get("total")
        .and_then(|v| v.as_f64())
        .filter(|t| t.is_finite() && *t > 0.0)
    else {
        return err(&req.id, "bad_params", "total must be a positive number", None);
    };
    let task_id = req
        .params
        .get("taskId")
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());

    if let Err(e) = ensure_class(conn, req, &class_id) {
        return e;
    }
    match store::category_exists(conn, &class_id, &category_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "category not found", None),
        Err(e) => return db_err(req, e),
    }
    if let Some(id) = task_id {
        match store::find_task(conn, id) {
            Ok(Some(_)) => {
                return err(
                    &req.id,
                    "conflict",
                    format!("task id already exists: {}", id),
                    None,
                )
            }
            Ok(None) => {}
            Err(e) => return db_err(req, e),
        }
    }

    match store::add_task(conn, &class_id, &category_id, task_id, quarter, &label, total) {
        Ok(id) => ok(
            &req.id,
            json!({
                "taskId": id,
                "categoryId": category_id,
                "quarter": quarter,
                "label": label,
                "total": total,
            }),
        ),
        Err(e) => db_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "structure.get" => Some(handle_structure_get(state, req)),
        "structure.saveCategories" => Some(handle_structure_save_categories(state, req)),
        "structure.validate" => Some(handle_structure_validate(state, req)),
        "structure.addTask" => Some(handle_structure_add_task(state, req)),
        _ => None,
    }
}
