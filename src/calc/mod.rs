//! Pure grade engine: aggregation, quarter grades, projection and
//! improvement plans. Nothing in here touches the database.

pub mod aggregate;
pub mod plan;
pub mod policy;
pub mod projection;
pub mod quarter;
pub mod scores;
pub mod snapshot;
pub mod structure;

use serde::Serialize;

pub use aggregate::{category_averages, compute_blended_grade, compute_category_average};
pub use policy::GradingPolicy;
pub use quarter::{
    can_unlock_quarter, compute_final_grade, compute_overall_final_grade,
    has_quarterly_exam_scores,
};
pub use scores::{merge_drafts, ScoreMap, StudentScores};
pub use snapshot::{analyze_student, AttendanceSummary};
pub use structure::{validate_weights, CategoryKind, GradeCategory, GradeStructure, Task};

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Half-up rounding to an integer: `Int(x + 0.5)`.
///
/// Negative halves round toward positive infinity (-1.5 -> -1), which is what
/// the trend penalty relies on.
pub fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Display rounding for grades and percentages (integers 0-100).
pub fn display_grade(x: f64) -> i64 {
    round_half_up(x) as i64
}

/// Formats a number for explanation strings: integers print without a
/// decimal point, everything else with up to two decimals rounded half-up.
pub(crate) fn fmt_num(x: f64) -> String {
    if (x - x.round()).abs() < 1e-9 {
        format!("{}", x.round() as i64)
    } else {
        let s = format!("{:.2}", round_half_up(x * 100.0) / 100.0);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_half_up_matches_int_plus_half() {
        assert_eq!(round_half_up(87.5), 88.0);
        assert_eq!(round_half_up(87.49), 87.0);
        assert_eq!(round_half_up(-1.5), -1.0);
        assert_eq!(round_half_up(-1.51), -2.0);
        assert_eq!(round_half_up(0.0), 0.0);
    }

    #[test]
    fn fmt_num_trims_trailing_zeros() {
        assert_eq!(fmt_num(2.0), "2");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(87.125), "87.13");
        assert_eq!(fmt_num(0.375), "0.38");
        assert_eq!(fmt_num(-3.0), "-3");
        assert_eq!(fmt_num(0.25), "0.25");
        assert_eq!(fmt_num(66.666_666), "66.67");
    }
}
