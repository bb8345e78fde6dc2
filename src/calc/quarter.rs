use serde::{Serialize, Serializer};

use super::aggregate::compute_blended_grade;
use super::scores::{task_score, StudentScores};
use super::structure::{scope_to_quarter, GradeCategory};
use super::{display_grade, fmt_num};

pub const NOT_AVAILABLE: &str = "—";

/// A quarter's final grade, or the "not available" sentinel shown as "—".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FinalGrade {
    Available(f64),
    NotAvailable,
}

impl FinalGrade {
    pub fn value(self) -> Option<f64> {
        match self {
            FinalGrade::Available(v) => Some(v),
            FinalGrade::NotAvailable => None,
        }
    }

    /// Integer grade for display, or "—".
    pub fn display(self) -> String {
        match self {
            FinalGrade::Available(v) => display_grade(v).to_string(),
            FinalGrade::NotAvailable => NOT_AVAILABLE.to_string(),
        }
    }
}

impl std::fmt::Display for FinalGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalGrade::Available(v) => write!(f, "{}", fmt_num(*v)),
            FinalGrade::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl Serialize for FinalGrade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FinalGrade::Available(v) => serializer.serialize_f64(*v),
            FinalGrade::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

/// True iff a Quarterly Exam category has a scored task in `quarter`.
/// A structure without such a category yields `false`.
pub fn has_quarterly_exam_scores(scores: &StudentScores, categories: &[GradeCategory], quarter: u8) -> bool {
    categories
        .iter()
        .filter(|c| c.is_quarterly_exam())
        .flat_map(|c| c.tasks.iter())
        .filter(|t| t.quarter == quarter)
        .any(|t| task_score(scores, t).is_some())
}

/// Blended grade for `quarter`, available only once its exam is scored.
pub fn compute_final_grade(scores: &StudentScores, categories: &[GradeCategory], quarter: u8) -> FinalGrade {
    if !has_quarterly_exam_scores(scores, categories, quarter) {
        return FinalGrade::NotAvailable;
    }
    let scoped = scope_to_quarter(categories, quarter);
    match compute_blended_grade(&scoped, scores) {
        Some(v) => FinalGrade::Available(v),
        None => FinalGrade::NotAvailable,
    }
}

/// Mean of the available quarter final grades. Quarters still waiting on an
/// exam are left out rather than counted as zero.
pub fn compute_overall_final_grade(scores: &StudentScores, categories: &[GradeCategory]) -> FinalGrade {
    let mut quarters: Vec<u8> = categories
        .iter()
        .flat_map(|c| c.tasks.iter().map(|t| t.quarter))
        .collect();
    quarters.sort_unstable();
    quarters.dedup();

    let finals: Vec<f64> = quarters
        .into_iter()
        .filter_map(|q| compute_final_grade(scores, categories, q).value())
        .collect();
    if finals.is_empty() {
        FinalGrade::NotAvailable
    } else {
        FinalGrade::Available(finals.iter().sum::<f64>() / finals.len() as f64)
    }
}

/// Whether grade entry for `quarter` is open: quarter 1 always is; later
/// quarters open when the class has reached them or the prior quarter's
/// exam has been scored.
pub fn can_unlock_quarter(quarter: u8, prior_quarter_has_exam: bool, class_current_quarter: u8) -> bool {
    quarter <= 1 || class_current_quarter >= quarter || prior_quarter_has_exam
}
