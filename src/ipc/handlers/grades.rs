use std::collections::HashMap;

use crate::calc::{
    analyze_student, can_unlock_quarter, category_averages, compute_blended_grade,
    compute_category_average, compute_final_grade, compute_overall_final_grade,
    display_grade, has_quarterly_exam_scores, merge_drafts, AttendanceSummary, GradeStructure,
    GradingPolicy, StudentScores,
};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, db_err, ensure_class, ensure_student, optional_quarter, parse_drafts, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

/// Everything a per-student grade method needs, loaded once per request.
struct StudentContext {
    student_id: String,
    current_quarter: u8,
    quarter: u8,
    structure: GradeStructure,
    scores: StudentScores,
    attendance: HashMap<u8, AttendanceSummary>,
    policy: GradingPolicy,
}

fn load_student_context(state: &AppState, req: &Request) -> Result<StudentContext, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let student_id = required_str(req, "studentId")?;
    let quarter = optional_quarter(req, "quarter")?;
    let drafts = parse_drafts(req)?;

    let current_quarter = ensure_class(conn, req, &class_id)?;
    ensure_student(conn, req, &class_id, &student_id)?;

    let structure = store::load_structure(conn, &class_id).map_err(|e| db_err(req, e))?;
    let persisted =
        store::load_student_scores(conn, &class_id, &student_id).map_err(|e| db_err(req, e))?;
    let attendance =
        store::load_attendance(conn, &class_id, &student_id).map_err(|e| db_err(req, e))?;
    let policy = store::load_policy(conn).map_err(|e| db_err(req, e))?;

    Ok(StudentContext {
        student_id,
        current_quarter,
        quarter: quarter.unwrap_or(current_quarter),
        structure,
        scores: merge_drafts(&persisted, &drafts),
        attendance,
        policy,
    })
}

fn display_opt(v: Option<f64>) -> serde_json::Value {
    match v {
        Some(x) => json!(display_grade(x)),
        None => serde_json::Value::Null,
    }
}

fn handle_category_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match load_student_context(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let category_id = match required_str(req, "categoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(category) = ctx.structure.categories.iter().find(|c| c.id == category_id) else {
        return err(&req.id, "not_found", "category not found", None);
    };
    let scoped = category.for_quarter(ctx.quarter);
    let average = compute_category_average(&scoped, &ctx.scores);
    ok(
        &req.id,
        json!({
            "studentId": ctx.student_id,
            "categoryId": category_id,
            "quarter": ctx.quarter,
            "average": average,
            "display": display_opt(average),
        }),
    )
}

fn handle_blended(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match load_student_context(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scoped = ctx.structure.for_quarter(ctx.quarter);
    let blended = compute_blended_grade(&scoped, &ctx.scores);
    ok(
        &req.id,
        json!({
            "studentId": ctx.student_id,
            "quarter": ctx.quarter,
            "blendedGrade": blended,
            "display": display_opt(blended),
            "categories": category_averages(&scoped, &ctx.scores),
        }),
    )
}

fn handle_final(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match load_student_context(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let fg = compute_final_grade(&ctx.scores, &ctx.structure.categories, ctx.quarter);
    ok(
        &req.id,
        json!({
            "studentId": ctx.student_id,
            "quarter": ctx.quarter,
            "finalGrade": fg,
            "display": fg.display(),
        }),
    )
}

fn handle_overall(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match load_student_context(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let overall = compute_overall_final_grade(&ctx.scores, &ctx.structure.categories);
    ok(
        &req.id,
        json!({
            "studentId": ctx.student_id,
            "overallFinalGrade": overall,
            "display": overall.display(),
        }),
    )
}

fn handle_has_quarterly_exam(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match load_student_context(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "studentId": ctx.student_id,
            "quarter": ctx.quarter,
            "hasQuarterlyExamScores":
                has_quarterly_exam_scores(&ctx.scores, &ctx.structure.categories, ctx.quarter),
        }),
    )
}

fn handle_can_unlock_quarter(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match load_student_context(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let prior_has_exam = ctx.quarter > 1
        && has_quarterly_exam_scores(&ctx.scores, &ctx.structure.categories, ctx.quarter - 1);
    ok(
        &req.id,
        json!({
            "studentId": ctx.student_id,
            "quarter": ctx.quarter,
            "classCurrentQuarter": ctx.current_quarter,
            "priorQuarterHasExam": prior_has_exam,
            "unlocked": can_unlock_quarter(ctx.quarter, prior_has_exam, ctx.current_quarter),
        }),
    )
}

fn handle_expected(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match load_student_context(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let analytics = analyze_student(
        &ctx.structure,
        &ctx.scores,
        &ctx.attendance,
        ctx.quarter,
        ctx.current_quarter,
        &ctx.policy,
    );
    ok(&req.id, json!(analytics.expected))
}

fn handle_plan(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match load_student_context(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let analytics = analyze_student(
        &ctx.structure,
        &ctx.scores,
        &ctx.attendance,
        ctx.quarter,
        ctx.current_quarter,
        &ctx.policy,
    );
    ok(&req.id, json!(analytics.plan))
}

fn handle_student_analytics(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match load_student_context(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let analytics = analyze_student(
        &ctx.structure,
        &ctx.scores,
        &ctx.attendance,
        ctx.quarter,
        ctx.current_quarter,
        &ctx.policy,
    );
    ok(
        &req.id,
        json!({
            "studentId": ctx.student_id,
            "analytics": analytics,
        }),
    )
}

fn handle_class_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let quarter = match optional_quarter(req, "quarter") {
        Ok(q) => q,
        Err(e) => return e,
    };
    let current_quarter = match ensure_class(conn, req, &class_id) {
        Ok(q) => q,
        Err(e) => return e,
    };
    let quarter = quarter.unwrap_or(current_quarter);

    let load = || -> anyhow::Result<_> {
        Ok((
            store::load_structure(conn, &class_id)?,
            store::list_students(conn, &class_id)?,
            store::load_class_scores(conn, &class_id)?,
            store::load_policy(conn)?,
        ))
    };
    let (structure, students, class_scores, policy) = match load() {
        Ok(v) => v,
        Err(e) => return db_err(req, e),
    };

    let mut quarters: Vec<u8> = structure.quarters();
    if !quarters.contains(&quarter) {
        quarters.push(quarter);
        quarters.sort_unstable();
    }

    let empty = StudentScores::new();
    let mut rows = Vec::new();
    for s in students.iter().filter(|s| s.active) {
        let attendance = match store::load_attendance(conn, &class_id, &s.id) {
            Ok(a) => a,
            Err(e) => return db_err(req, e),
        };
        let scores = class_scores.get(&s.id).unwrap_or(&empty);
        let analytics = analyze_student(
            &structure,
            scores,
            &attendance,
            quarter,
            current_quarter,
            &policy,
        );
        let finals: Vec<serde_json::Value> = quarters
            .iter()
            .map(|q| {
                let fg = compute_final_grade(scores, &structure.categories, *q);
                json!({ "quarter": q, "finalGrade": fg, "display": fg.display() })
            })
            .collect();
        rows.push(json!({
            "studentId": s.id,
            "displayName": s.display_name,
            "sortOrder": s.sort_order,
            "quarterFinals": finals,
            "expectedGrade": analytics.expected.expected_grade,
            "overallFinalGrade": analytics.overall_final_grade,
            "overallDisplay": analytics.overall_final_grade.display(),
        }));
    }

    ok(
        &req.id,
        json!({
            "classId": class_id,
            "quarter": quarter,
            "currentQuarter": current_quarter,
            "quarters": quarters,
            "rows": rows,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.categoryAverage" => Some(handle_category_average(state, req)),
        "grades.blended" => Some(handle_blended(state, req)),
        "grades.final" => Some(handle_final(state, req)),
        "grades.overall" => Some(handle_overall(state, req)),
        "grades.hasQuarterlyExam" => Some(handle_has_quarterly_exam(state, req)),
        "grades.canUnlockQuarter" => Some(handle_can_unlock_quarter(state, req)),
        "grades.expected" => Some(handle_expected(state, req)),
        "grades.plan" => Some(handle_plan(state, req)),
        "grades.student.analytics" => Some(handle_student_analytics(state, req)),
        "grades.class.overview" => Some(handle_class_overview(state, req)),
        _ => None,
    }
}
