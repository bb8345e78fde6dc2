use serde::{Deserialize, Serialize};

use super::{fmt_num, CalcError};

/// Allowed drift of the category weight sum away from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CategoryKind {
    WrittenWorks,
    PerformanceTask,
    QuarterlyExam,
    Custom,
}

impl CategoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryKind::WrittenWorks => "writtenWorks",
            CategoryKind::PerformanceTask => "performanceTask",
            CategoryKind::QuarterlyExam => "quarterlyExam",
            CategoryKind::Custom => "custom",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "writtenWorks" => Some(CategoryKind::WrittenWorks),
            "performanceTask" => Some(CategoryKind::PerformanceTask),
            "quarterlyExam" => Some(CategoryKind::QuarterlyExam),
            "custom" => Some(CategoryKind::Custom),
            _ => None,
        }
    }

    /// Kind implied by the DepEd id/label convention, used once when a
    /// category is created or migrated without one. Unmatched ids/labels
    /// become `Custom`.
    pub fn from_convention(id: &str, label: &str) -> Self {
        let id = id.trim().to_ascii_lowercase();
        let label = label.to_ascii_lowercase();
        if id == "quarterly_exam" || label.contains("quarterly exam") {
            CategoryKind::QuarterlyExam
        } else if id == "written_works" || label.contains("written work") {
            CategoryKind::WrittenWorks
        } else if id == "performance_task" || label.contains("performance task") {
            CategoryKind::PerformanceTask
        } else {
            CategoryKind::Custom
        }
    }

    /// DepEd weight used when sizing the weak-category plan step.
    pub fn deped_weight(self) -> Option<f64> {
        match self {
            CategoryKind::WrittenWorks => Some(0.25),
            CategoryKind::PerformanceTask => Some(0.50),
            CategoryKind::QuarterlyExam => Some(0.25),
            CategoryKind::Custom => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub label: String,
    pub total: f64,
    #[serde(default = "default_quarter")]
    pub quarter: u8,
}

fn default_quarter() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCategory {
    pub id: String,
    pub label: String,
    pub kind: CategoryKind,
    pub weight: f64,
    /// Chronological order; the last task is the latest.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl GradeCategory {
    /// Copy of this category restricted to one quarter's tasks.
    pub fn for_quarter(&self, quarter: u8) -> GradeCategory {
        GradeCategory {
            id: self.id.clone(),
            label: self.label.clone(),
            kind: self.kind,
            weight: self.weight,
            tasks: self
                .tasks
                .iter()
                .filter(|t| t.quarter == quarter)
                .cloned()
                .collect(),
        }
    }

    pub fn is_quarterly_exam(&self) -> bool {
        self.kind == CategoryKind::QuarterlyExam
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeStructure {
    pub categories: Vec<GradeCategory>,
}

impl GradeStructure {
    pub fn for_quarter(&self, quarter: u8) -> Vec<GradeCategory> {
        scope_to_quarter(&self.categories, quarter)
    }

    /// Quarters that have at least one task, ascending.
    pub fn quarters(&self) -> Vec<u8> {
        let mut out: Vec<u8> = self
            .categories
            .iter()
            .flat_map(|c| c.tasks.iter().map(|t| t.quarter))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

pub fn scope_to_quarter(categories: &[GradeCategory], quarter: u8) -> Vec<GradeCategory> {
    categories.iter().map(|c| c.for_quarter(quarter)).collect()
}

/// Checks the category-editing invariants: weights in [0,1] summing to
/// 1.0 (within tolerance), unique category ids, unique positive-total tasks.
pub fn validate_weights(categories: &[GradeCategory]) -> Result<(), CalcError> {
    if categories.is_empty() {
        return Err(CalcError::new(
            "bad_weights",
            "a grade structure needs at least one category",
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for c in categories {
        if !seen.insert(c.id.as_str()) {
            return Err(CalcError::new(
                "bad_params",
                format!("duplicate category id: {}", c.id),
            ));
        }
        if !c.weight.is_finite() || !(0.0..=1.0).contains(&c.weight) {
            return Err(CalcError::new(
                "bad_weights",
                format!("weight for {} must be between 0 and 1", c.label),
            )
            .with_details(serde_json::json!({ "categoryId": c.id, "weight": c.weight })));
        }
        let mut task_ids = std::collections::HashSet::new();
        for t in &c.tasks {
            if !task_ids.insert(t.id.as_str()) {
                return Err(CalcError::new(
                    "bad_params",
                    format!("duplicate task id {} in {}", t.id, c.label),
                ));
            }
            if t.total.is_nan() || t.total <= 0.0 {
                return Err(CalcError::new(
                    "bad_params",
                    format!("task {} must have a positive total", t.label),
                ));
            }
        }
    }

    let sum: f64 = categories.iter().map(|c| c.weight).sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(CalcError::new(
            "bad_weights",
            format!("category weights sum to {}, expected 1", fmt_num(sum)),
        )
        .with_details(serde_json::json!({ "sum": sum })));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: &str, kind: CategoryKind, weight: f64) -> GradeCategory {
        GradeCategory {
            id: id.to_string(),
            label: id.to_string(),
            kind,
            weight,
            tasks: vec![],
        }
    }

    #[test]
    fn deped_weights_validate() {
        let cats = vec![
            cat("ww", CategoryKind::WrittenWorks, 0.25),
            cat("pt", CategoryKind::PerformanceTask, 0.5),
            cat("qe", CategoryKind::QuarterlyExam, 0.25),
        ];
        assert!(validate_weights(&cats).is_ok());
    }

    #[test]
    fn weight_sum_within_tolerance_is_accepted() {
        let cats = vec![
            cat("a", CategoryKind::Custom, 0.333),
            cat("b", CategoryKind::Custom, 0.333),
            cat("c", CategoryKind::Custom, 0.333),
        ];
        assert!(validate_weights(&cats).is_ok());
    }

    #[test]
    fn bad_weight_sum_is_reported_not_corrected() {
        let cats = vec![
            cat("a", CategoryKind::Custom, 0.3),
            cat("b", CategoryKind::Custom, 0.3),
        ];
        let e = validate_weights(&cats).expect_err("sum 0.6 must fail");
        assert_eq!(e.code, "bad_weights");
        assert!(e.message.contains("0.6"));
        assert_eq!(cats[0].weight, 0.3);
    }

    #[test]
    fn duplicate_category_and_nonpositive_total_rejected() {
        let cats = vec![
            cat("a", CategoryKind::Custom, 0.5),
            cat("a", CategoryKind::Custom, 0.5),
        ];
        assert_eq!(validate_weights(&cats).unwrap_err().code, "bad_params");

        let mut one = cat("a", CategoryKind::Custom, 1.0);
        one.tasks.push(Task {
            id: "t1".into(),
            label: "Quiz".into(),
            total: 0.0,
            quarter: 1,
        });
        assert_eq!(validate_weights(&[one]).unwrap_err().code, "bad_params");
    }

    #[test]
    fn convention_never_promotes_unmatched_to_exam() {
        assert_eq!(
            CategoryKind::from_convention("quarterly_exam", "Exam"),
            CategoryKind::QuarterlyExam
        );
        assert_eq!(
            CategoryKind::from_convention("x", "Q1 Quarterly Exam"),
            CategoryKind::QuarterlyExam
        );
        assert_eq!(
            CategoryKind::from_convention("midterm", "Midterm Exam"),
            CategoryKind::Custom
        );
        assert_eq!(
            CategoryKind::from_convention("ww", "Written Works"),
            CategoryKind::WrittenWorks
        );
    }

    #[test]
    fn for_quarter_keeps_task_order() {
        let mut c = cat("ww", CategoryKind::WrittenWorks, 1.0);
        for (i, q) in [1u8, 2, 1, 2].iter().enumerate() {
            c.tasks.push(Task {
                id: format!("t{}", i),
                label: format!("Task {}", i),
                total: 10.0,
                quarter: *q,
            });
        }
        let q2 = c.for_quarter(2);
        let ids: Vec<&str> = q2.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);
        let s = GradeStructure {
            categories: vec![c],
        };
        assert_eq!(s.quarters(), vec![1, 2]);
    }
}
