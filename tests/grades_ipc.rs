use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn approx(v: &serde_json::Value, expected: f64) {
    let got = v.as_f64().unwrap_or_else(|| panic!("expected number, got {}", v));
    assert!((got - expected).abs() < 1e-9, "expected {}, got {}", expected, got);
}

struct Fixture {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    workspace: PathBuf,
    class_id: String,
    student_id: String,
    seq: u32,
}

impl Fixture {
    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.seq += 1;
        let id = format!("r{}", self.seq);
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn call_raw(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.seq += 1;
        let id = format!("r{}", self.seq);
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn student(&self, extra: serde_json::Value) -> serde_json::Value {
        let mut params = json!({ "classId": self.class_id, "studentId": self.student_id });
        if let (Some(base), Some(more)) = (params.as_object_mut(), extra.as_object()) {
            for (k, v) in more {
                base.insert(k.clone(), v.clone());
            }
        }
        params
    }

    fn set_score(&mut self, task_id: &str, value: serde_json::Value) -> serde_json::Value {
        let params = json!({ "taskId": task_id, "studentId": self.student_id, "value": value });
        self.call("scores.set", params)
    }

    fn finish(self) {
        drop(self.stdin);
        let mut child = self.child;
        let _ = child.wait();
        let _ = std::fs::remove_dir_all(self.workspace);
    }
}

/// Written Works 0.3 / Performance Task 0.5 / Quarterly Exam 0.2 with one
/// quarter-1 task each plus a quarter-2 exam task.
fn setup(prefix: &str) -> Fixture {
    let workspace = temp_dir(prefix);
    let (child, stdin, reader) = spawn_sidecar();
    let mut fx = Fixture {
        child,
        stdin,
        reader,
        workspace: workspace.clone(),
        class_id: String::new(),
        student_id: String::new(),
        seq: 0,
    };
    fx.call("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    fx.class_id = fx.call("classes.create", json!({ "name": "English 9" }))["classId"]
        .as_str()
        .expect("classId")
        .to_string();
    let class_id = fx.class_id.clone();
    fx.student_id = fx.call(
        "students.add",
        json!({ "classId": class_id, "lastName": "Reyes", "firstName": "Jose" }),
    )["studentId"]
        .as_str()
        .expect("studentId")
        .to_string();
    fx.call(
        "structure.saveCategories",
        json!({ "classId": class_id, "categories": [
            { "id": "written_works", "label": "Written Works", "kind": "writtenWorks", "weight": 0.3 },
            { "id": "performance_task", "label": "Performance Task", "kind": "performanceTask", "weight": 0.5 },
            { "id": "quarterly_exam", "label": "Quarterly Exam", "kind": "quarterlyExam", "weight": 0.2 }
        ] }),
    );
    for (task_id, category_id, quarter, total) in [
        ("ww1", "written_works", 1, 10),
        ("pt1", "performance_task", 1, 10),
        ("qe1", "quarterly_exam", 1, 50),
        ("qe2", "quarterly_exam", 2, 50),
    ] {
        fx.call(
            "structure.addTask",
            json!({
                "classId": class_id,
                "categoryId": category_id,
                "taskId": task_id,
                "quarter": quarter,
                "label": task_id,
                "total": total,
            }),
        );
    }
    fx
}

#[test]
fn blended_grade_renormalizes_over_graded_categories() {
    let mut fx = setup("gradebook-blended");
    fx.set_score("ww1", json!(10));
    fx.set_score("pt1", json!(8));

    let params = fx.student(json!({ "quarter": 1 }));
    let blended = fx.call("grades.blended", params);
    approx(&blended["blendedGrade"], 87.5);
    assert_eq!(blended["display"], json!(88));
    let cats = blended["categories"].as_array().expect("categories");
    assert!(cats[2]["average"].is_null());

    // Ungraded is null; a zero score is a real 0.
    let params = fx.student(json!({ "quarter": 1, "categoryId": "quarterly_exam" }));
    let ungraded = fx.call("grades.categoryAverage", params);
    assert!(ungraded["average"].is_null());
    assert!(ungraded["display"].is_null());

    let params = fx.student(json!({ "quarter": 1 }));
    let fin = fx.call("grades.final", params);
    assert_eq!(fin["finalGrade"], json!("—"));
    assert_eq!(fin["display"], json!("—"));

    fx.set_score("qe1", json!(0));
    let params = fx.student(json!({ "quarter": 1, "categoryId": "quarterly_exam" }));
    let zero = fx.call("grades.categoryAverage", params);
    approx(&zero["average"], 0.0);

    let params = fx.student(json!({ "quarter": 1 }));
    let fin = fx.call("grades.final", params);
    approx(&fin["finalGrade"], 70.0);
    assert_eq!(fin["display"], json!("70"));

    fx.finish();
}

#[test]
fn exam_task_with_null_score_does_not_count() {
    let mut fx = setup("gradebook-null-exam");
    fx.set_score("qe1", json!(45));
    fx.set_score("qe1", json!(null));

    let params = fx.student(json!({ "quarter": 1 }));
    let has = fx.call("grades.hasQuarterlyExam", params);
    assert_eq!(has["hasQuarterlyExamScores"], json!(false));

    let params = fx.student(json!({ "quarter": 1 }));
    let fin = fx.call("grades.final", params);
    assert_eq!(fin["finalGrade"], json!("—"));

    fx.set_score("qe1", json!(45));
    let student_id = fx.student_id.clone();
    fx.call("scores.clear", json!({ "taskId": "qe1", "studentId": student_id }));
    let params = fx.student(json!({ "quarter": 1 }));
    let has = fx.call("grades.hasQuarterlyExam", params);
    assert_eq!(has["hasQuarterlyExamScores"], json!(false));

    fx.finish();
}

#[test]
fn drafts_override_persisted_scores_without_saving() {
    let mut fx = setup("gradebook-drafts");
    fx.set_score("ww1", json!(10));
    fx.set_score("pt1", json!(8));

    // Draft exam score of 40/50 = 80%.
    let params = fx.student(json!({ "quarter": 1, "drafts": { "qe1": 40 } }));
    let drafted = fx.call("grades.final", params);
    approx(&drafted["finalGrade"], 86.0);

    // A null draft hides the persisted score.
    let params = fx.student(json!({ "quarter": 1, "drafts": { "pt1": null } }));
    let hidden = fx.call("grades.blended", params);
    approx(&hidden["blendedGrade"], 100.0);

    let params = fx.student(json!({ "quarter": 1 }));
    let persisted = fx.call("grades.blended", params);
    approx(&persisted["blendedGrade"], 87.5);

    let params = fx.student(json!({ "drafts": ["qe1"] }));
    let bad = fx.call_raw("grades.blended", params);
    assert_eq!(bad["error"]["code"], json!("bad_params"));

    fx.finish();
}

#[test]
fn out_of_range_scores_are_clamped_on_save() {
    let mut fx = setup("gradebook-clamp");
    let over = fx.set_score("pt1", json!(12));
    approx(&over["value"], 10.0);
    assert_eq!(over["clamped"], json!(true));

    let under = fx.set_score("ww1", json!(-3));
    approx(&under["value"], 0.0);
    assert_eq!(under["clamped"], json!(true));

    let fine = fx.set_score("qe1", json!(25));
    assert_eq!(fine["clamped"], json!(false));

    let student_id = fx.student_id.clone();
    let unknown = fx.call_raw(
        "scores.set",
        json!({ "taskId": "nope", "studentId": student_id, "value": 1 }),
    );
    assert_eq!(unknown["error"]["code"], json!("bad_params"));

    // ww 0%, pt 100%, exam 50%.
    let params = fx.student(json!({ "quarter": 1 }));
    let fin = fx.call("grades.final", params);
    approx(&fin["finalGrade"], 60.0);

    fx.finish();
}

#[test]
fn overall_grade_and_quarter_unlock_follow_exam_scores() {
    let mut fx = setup("gradebook-overall");

    let params = fx.student(json!({}));
    let none = fx.call("grades.overall", params);
    assert_eq!(none["overallFinalGrade"], json!("—"));

    let params = fx.student(json!({ "quarter": 2 }));
    let locked = fx.call("grades.canUnlockQuarter", params);
    assert_eq!(locked["unlocked"], json!(false));
    assert_eq!(locked["priorQuarterHasExam"], json!(false));

    let params = fx.student(json!({ "quarter": 1 }));
    let first = fx.call("grades.canUnlockQuarter", params);
    assert_eq!(first["unlocked"], json!(true));

    fx.set_score("ww1", json!(10));
    fx.set_score("pt1", json!(8));
    fx.set_score("qe1", json!(0));

    let params = fx.student(json!({ "quarter": 2 }));
    let unlocked = fx.call("grades.canUnlockQuarter", params);
    assert_eq!(unlocked["unlocked"], json!(true));

    let params = fx.student(json!({}));
    let q1_only = fx.call("grades.overall", params);
    approx(&q1_only["overallFinalGrade"], 70.0);

    fx.set_score("qe2", json!(50));
    let params = fx.student(json!({}));
    let both = fx.call("grades.overall", params);
    approx(&both["overallFinalGrade"], 85.0);
    assert_eq!(both["display"], json!("85"));

    // Moving the class forward opens quarter 3 regardless of exams.
    let class_id = fx.class_id.clone();
    fx.call("classes.setCurrentQuarter", json!({ "classId": class_id, "quarter": 3 }));
    let params = fx.student(json!({ "quarter": 3 }));
    let third = fx.call("grades.canUnlockQuarter", params);
    assert_eq!(third["classCurrentQuarter"], json!(3));
    assert_eq!(third["unlocked"], json!(true));

    fx.finish();
}
