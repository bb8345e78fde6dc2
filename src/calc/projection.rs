//! Expected-grade projection.
//!
//! Starts from the current blended grade (or the passing floor) and applies
//! bounded additive adjustments for attendance, quarter-over-quarter trend,
//! task completion and improvement potential. Every adjustment is reported
//! as an explanation step so the UI can render the running computation.

use serde::{Deserialize, Serialize};

use super::aggregate::CategoryAverage;
use super::policy::GradingPolicy;
use super::structure::CategoryKind;
use super::{fmt_num, round_half_up};

pub const MIN_EXPECTED: f64 = 60.0;
pub const MAX_EXPECTED: f64 = 100.0;
pub const IMPROVEMENT_GAP_THRESHOLD: f64 = 10.0;
pub const IMPROVEMENT_BONUS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterGrade {
    pub quarter_number: u8,
    pub grade: Option<f64>,
    #[serde(default)]
    pub assignment_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakCategory {
    pub category_id: String,
    pub label: String,
    pub kind: CategoryKind,
    pub weight: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExplanationKind {
    Base,
    Attendance,
    Trend,
    Completion,
    ImprovementPotential,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationStep {
    pub kind: ExplanationKind,
    pub label: String,
    pub raw_value: f64,
    /// For the base step this is the base itself, so impacts sum to the
    /// unclamped projection.
    pub point_impact: f64,
    pub formula_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedGradeResult {
    pub expected_grade: i64,
    pub unclamped_grade: f64,
    pub trend: TrendDirection,
    pub trend_delta: f64,
    pub weakest_category: Option<WeakCategory>,
    pub explanation_steps: Vec<ExplanationStep>,
}

#[cfg(test)]
impl ExpectedGradeResult {
    pub fn step(&self, kind: ExplanationKind) -> Option<&ExplanationStep> {
        self.explanation_steps.iter().find(|s| s.kind == kind)
    }
}

/// Direction and size of the change between the first and last graded quarter.
/// Fewer than two graded quarters is `Stable` with a delta of 0.
pub fn trend_direction(historical: &[QuarterGrade]) -> (TrendDirection, f64) {
    let graded: Vec<f64> = historical
        .iter()
        .filter_map(|q| q.grade)
        .filter(|g| g.is_finite())
        .collect();
    let (Some(first), Some(last)) = (graded.first(), graded.last()) else {
        return (TrendDirection::Stable, 0.0);
    };
    if graded.len() < 2 {
        return (TrendDirection::Stable, 0.0);
    }
    let delta = last - first;
    if delta > 0.0 {
        (TrendDirection::Improving, delta)
    } else if delta < 0.0 {
        (TrendDirection::Declining, delta)
    } else {
        (TrendDirection::Stable, 0.0)
    }
}

/// Lowest average among categories with at least one scored task.
/// Ties keep the earlier category.
pub fn weakest_category(averages: &[CategoryAverage]) -> Option<WeakCategory> {
    let mut best: Option<WeakCategory> = None;
    for c in averages {
        let Some(avg) = c.average else {
            continue;
        };
        if best.as_ref().map(|b| avg < b.score).unwrap_or(true) {
            best = Some(WeakCategory {
                category_id: c.category_id.clone(),
                label: c.label.clone(),
                kind: c.kind,
                weight: c.weight,
                score: avg,
            });
        }
    }
    best
}

pub fn attendance_adjustment(rate: f64) -> f64 {
    let rate = sanitize_rate(rate);
    if rate >= 90.0 {
        1.0
    } else if rate >= 80.0 {
        0.0
    } else {
        -round_half_up((90.0 - rate) * 0.3)
    }
}

pub fn trend_adjustment(direction: TrendDirection, delta: f64) -> f64 {
    match direction {
        TrendDirection::Improving => round_half_up(delta * 0.4).min(3.0),
        TrendDirection::Declining => round_half_up(delta * 0.3).max(-3.0),
        TrendDirection::Stable => 0.0,
    }
}

pub fn completion_adjustment(rate: f64) -> f64 {
    let rate = sanitize_rate(rate);
    if rate >= 80.0 {
        1.0
    } else if rate < 60.0 {
        -2.0
    } else {
        0.0
    }
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 100.0)
    }
}

/// Projects the grade a student is heading for in the current quarter.
pub fn project_expected_grade(
    current_blended_grade: Option<f64>,
    attendance_rate: f64,
    completion_rate: f64,
    historical_quarter_grades: &[QuarterGrade],
    category_averages: &[CategoryAverage],
    policy: &GradingPolicy,
) -> ExpectedGradeResult {
    let mut steps = Vec::with_capacity(5);

    let (base, base_formula) = match current_blended_grade.filter(|g| g.is_finite()) {
        Some(g) => (g, format!("current blended grade {}", fmt_num(g))),
        None => (
            policy.passing_floor,
            format!(
                "no graded work yet, passing floor {}",
                fmt_num(policy.passing_floor)
            ),
        ),
    };
    steps.push(ExplanationStep {
        kind: ExplanationKind::Base,
        label: "Base".to_string(),
        raw_value: base,
        point_impact: base,
        formula_description: base_formula,
    });

    let att_rate = sanitize_rate(attendance_rate);
    let att = attendance_adjustment(att_rate);
    let att_formula = if att_rate >= 90.0 {
        format!("attendance {}% >= 90: +1", fmt_num(att_rate))
    } else if att_rate >= 80.0 {
        format!("80 <= attendance {}% < 90: 0", fmt_num(att_rate))
    } else {
        format!(
            "-round((90 - {}) * 0.3) = {}",
            fmt_num(att_rate),
            fmt_num(att)
        )
    };
    steps.push(ExplanationStep {
        kind: ExplanationKind::Attendance,
        label: "Attendance".to_string(),
        raw_value: att_rate,
        point_impact: att,
        formula_description: att_formula,
    });

    let (trend, delta) = trend_direction(historical_quarter_grades);
    let trend_adj = trend_adjustment(trend, delta);
    let trend_formula = match trend {
        TrendDirection::Improving => format!(
            "improving by {}: min(3, round({} * 0.4)) = {}",
            fmt_num(delta),
            fmt_num(delta),
            fmt_num(trend_adj)
        ),
        TrendDirection::Declining => format!(
            "declining by {}: max(-3, round({} * 0.3)) = {}",
            fmt_num(-delta),
            fmt_num(delta),
            fmt_num(trend_adj)
        ),
        TrendDirection::Stable => "no change between first and last graded quarter: 0".to_string(),
    };
    steps.push(ExplanationStep {
        kind: ExplanationKind::Trend,
        label: "Trend".to_string(),
        raw_value: delta,
        point_impact: trend_adj,
        formula_description: trend_formula,
    });

    let comp_rate = sanitize_rate(completion_rate);
    let comp = completion_adjustment(comp_rate);
    let comp_formula = if comp_rate >= 80.0 {
        format!("completion {}% >= 80: +1", fmt_num(comp_rate))
    } else if comp_rate < 60.0 {
        format!("completion {}% < 60: -2", fmt_num(comp_rate))
    } else {
        format!("60 <= completion {}% < 80: 0", fmt_num(comp_rate))
    };
    steps.push(ExplanationStep {
        kind: ExplanationKind::Completion,
        label: "Completion".to_string(),
        raw_value: comp_rate,
        point_impact: comp,
        formula_description: comp_formula,
    });

    let weakest = weakest_category(category_averages);
    if policy.improvement_potential_bonus {
        if let Some(w) = &weakest {
            let graded: Vec<f64> = category_averages.iter().filter_map(|c| c.average).collect();
            let mean = graded.iter().sum::<f64>() / graded.len() as f64;
            let gap = mean - w.score;
            if gap >= IMPROVEMENT_GAP_THRESHOLD {
                steps.push(ExplanationStep {
                    kind: ExplanationKind::ImprovementPotential,
                    label: "Improvement Potential".to_string(),
                    raw_value: gap,
                    point_impact: IMPROVEMENT_BONUS,
                    formula_description: format!(
                        "category average {} - {} {} = {} >= 10: +2",
                        fmt_num(mean),
                        w.label,
                        fmt_num(w.score),
                        fmt_num(gap)
                    ),
                });
            }
        }
    }

    let unclamped: f64 = steps.iter().map(|s| s.point_impact).sum();
    let expected = round_half_up(unclamped.clamp(MIN_EXPECTED, MAX_EXPECTED)) as i64;

    ExpectedGradeResult {
        expected_grade: expected,
        unclamped_grade: unclamped,
        trend,
        trend_delta: delta,
        weakest_category: weakest,
        explanation_steps: steps,
    }
}
