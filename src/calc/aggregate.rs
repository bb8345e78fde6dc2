use serde::Serialize;

use super::scores::{task_percent, StudentScores};
use super::structure::{CategoryKind, GradeCategory};

/// Mean of the scored task percentages in a category.
///
/// Returns `None` when no task has a score; an ungraded category is not a zero.
pub fn compute_category_average(category: &GradeCategory, scores: &StudentScores) -> Option<f64> {
    let mut sum = 0.0_f64;
    let mut count = 0_usize;
    for task in &category.tasks {
        if let Some(pct) = task_percent(scores, task) {
            sum += pct;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Weighted blend of category averages for one quarter's worth of tasks.
///
/// Categories without a scored task (a Quarterly Exam nobody has written yet,
/// say) drop out and the remaining weights are re-normalized to sum to 1.
/// If every graded category carries zero weight the graded categories count
/// equally. `None` when nothing is graded.
pub fn compute_blended_grade(categories: &[GradeCategory], scores: &StudentScores) -> Option<f64> {
    let mut sum = 0.0_f64;
    let mut denom = 0.0_f64;
    let mut sum_equal = 0.0_f64;
    let mut denom_equal = 0.0_f64;

    for c in categories {
        let Some(avg) = compute_category_average(c, scores) else {
            continue;
        };
        if c.weight > 0.0 {
            sum += avg * c.weight;
            denom += c.weight;
        }
        sum_equal += avg;
        denom_equal += 1.0;
    }

    if denom > 0.0 {
        Some(sum / denom)
    } else if denom_equal > 0.0 {
        Some(sum_equal / denom_equal)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAverage {
    pub category_id: String,
    pub label: String,
    pub kind: CategoryKind,
    pub weight: f64,
    pub average: Option<f64>,
    pub scored_count: usize,
    pub task_count: usize,
}

/// Per-category averages in structure order.
pub fn category_averages(categories: &[GradeCategory], scores: &StudentScores) -> Vec<CategoryAverage> {
    categories
        .iter()
        .map(|c| CategoryAverage {
            category_id: c.id.clone(),
            label: c.label.clone(),
            kind: c.kind,
            weight: c.weight,
            average: compute_category_average(c, scores),
            scored_count: c
                .tasks
                .iter()
                .filter(|t| task_percent(scores, t).is_some())
                .count(),
            task_count: c.tasks.len(),
        })
        .collect()
}
