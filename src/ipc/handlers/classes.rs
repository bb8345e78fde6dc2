use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err, ensure_class, parse_quarter, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::create_class(conn, &name) {
        Ok(class_id) => ok(&req.id, json!({ "classId": class_id, "name": name })),
        Err(e) => db_err(req, e),
    }
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match store::list_classes(conn) {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => db_err(req, e),
    }
}

fn handle_classes_set_current_quarter(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let quarter = match parse_quarter(req, "quarter") {
        Ok(q) => q,
        Err(e) => return e,
    };
    match store::set_current_quarter(conn, &class_id, quarter) {
        Ok(true) => ok(&req.id, json!({ "classId": class_id, "currentQuarter": quarter })),
        Ok(false) => err(&req.id, "not_found", "class not found", None),
        Err(e) => db_err(req, e),
    }
}

fn handle_students_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let last_name = match required_str(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = ensure_class(conn, req, &class_id) {
        return e;
    }
    match store::add_student(conn, &class_id, &last_name, &first_name) {
        Ok(student_id) => ok(&req.id, json!({ "studentId": student_id })),
        Err(e) => db_err(req, e),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match store::list_students(conn, &class_id) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => db_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.setCurrentQuarter" => Some(handle_classes_set_current_quarter(state, req)),
        "students.add" => Some(handle_students_add(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
