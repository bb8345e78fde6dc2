use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::aggregate::{category_averages, compute_blended_grade, CategoryAverage};
use super::plan::{build_improvement_plan, ImprovementPlan};
use super::policy::GradingPolicy;
use super::projection::{project_expected_grade, ExpectedGradeResult, QuarterGrade};
use super::quarter::{
    can_unlock_quarter, compute_final_grade, compute_overall_final_grade,
    has_quarterly_exam_scores, FinalGrade,
};
use super::scores::{task_percent, StudentScores};
use super::structure::{GradeCategory, GradeStructure};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub present_days: u32,
    pub absent_days: u32,
}

impl AttendanceSummary {
    pub fn total_days(&self) -> u32 {
        self.present_days.saturating_add(self.absent_days)
    }

    /// Percentage of recorded days present; 100 when nothing is recorded.
    pub fn rate(&self) -> f64 {
        let total = self.total_days();
        if total == 0 {
            100.0
        } else {
            100.0 * self.present_days as f64 / total as f64
        }
    }
}

/// Scored tasks over all tasks, as a percentage. 0 when there are no tasks.
pub fn compute_completion_rate(categories: &[GradeCategory], scores: &StudentScores) -> f64 {
    let mut total = 0_usize;
    let mut scored = 0_usize;
    for t in categories.iter().flat_map(|c| c.tasks.iter()) {
        total += 1;
        if task_percent(scores, t).is_some() {
            scored += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        100.0 * scored as f64 / total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterSnapshot {
    pub quarter_number: u8,
    pub category_averages: Vec<CategoryAverage>,
    pub blended_grade: Option<f64>,
    pub final_grade: FinalGrade,
    pub has_quarterly_exam: bool,
    pub attendance_rate: f64,
    pub completion_rate: f64,
    pub assignment_count: usize,
}

pub fn build_quarter_snapshot(
    structure: &GradeStructure,
    scores: &StudentScores,
    quarter: u8,
    attendance: AttendanceSummary,
) -> QuarterSnapshot {
    let scoped = structure.for_quarter(quarter);
    let averages = category_averages(&scoped, scores);
    let assignment_count = averages.iter().map(|a| a.scored_count).sum();
    QuarterSnapshot {
        quarter_number: quarter,
        blended_grade: compute_blended_grade(&scoped, scores),
        final_grade: compute_final_grade(scores, &structure.categories, quarter),
        has_quarterly_exam: has_quarterly_exam_scores(scores, &structure.categories, quarter),
        attendance_rate: attendance.rate(),
        completion_rate: compute_completion_rate(&scoped, scores),
        category_averages: averages,
        assignment_count,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAnalytics {
    pub quarter: u8,
    pub unlocked: bool,
    pub snapshots: Vec<QuarterSnapshot>,
    pub historical_quarter_grades: Vec<QuarterGrade>,
    pub overall_final_grade: FinalGrade,
    pub expected: ExpectedGradeResult,
    pub plan: ImprovementPlan,
}

/// Everything the student analytics page shows for `quarter`.
///
/// Quarters up to and including `quarter` feed the trend, so the current
/// quarter's blended grade is the last historical entry.
pub fn analyze_student(
    structure: &GradeStructure,
    scores: &StudentScores,
    attendance: &HashMap<u8, AttendanceSummary>,
    quarter: u8,
    class_current_quarter: u8,
    policy: &GradingPolicy,
) -> StudentAnalytics {
    let mut quarters = structure.quarters();
    if !quarters.contains(&quarter) {
        quarters.push(quarter);
        quarters.sort_unstable();
    }

    let snapshots: Vec<QuarterSnapshot> = quarters
        .iter()
        .map(|q| {
            let att = attendance.get(q).copied().unwrap_or_default();
            build_quarter_snapshot(structure, scores, *q, att)
        })
        .collect();

    let historical: Vec<QuarterGrade> = snapshots
        .iter()
        .filter(|s| s.quarter_number <= quarter)
        .map(|s| QuarterGrade {
            quarter_number: s.quarter_number,
            grade: s.blended_grade,
            assignment_count: s.assignment_count,
        })
        .collect();

    // `quarters` always contains `quarter`, so the lookup cannot miss.
    let current = snapshots
        .iter()
        .find(|s| s.quarter_number == quarter)
        .cloned()
        .unwrap_or_else(|| {
            build_quarter_snapshot(structure, scores, quarter, AttendanceSummary::default())
        });

    let expected = project_expected_grade(
        current.blended_grade,
        current.attendance_rate,
        current.completion_rate,
        &historical,
        &current.category_averages,
        policy,
    );
    let plan = build_improvement_plan(
        &expected,
        current.attendance_rate,
        current.completion_rate,
        expected.weakest_category.as_ref(),
        expected.trend,
        policy,
    );

    let prior_has_exam = quarter > 1
        && has_quarterly_exam_scores(scores, &structure.categories, quarter - 1);

    StudentAnalytics {
        quarter,
        unlocked: can_unlock_quarter(quarter, prior_has_exam, class_current_quarter),
        snapshots,
        historical_quarter_grades: historical,
        overall_final_grade: compute_overall_final_grade(scores, &structure.categories),
        expected,
        plan,
    }
}
