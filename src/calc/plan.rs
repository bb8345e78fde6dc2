//! Improvement plans: ordered corrective actions, each with the number of
//! points it is worth toward the target grade and the arithmetic behind it.

use serde::Serialize;

use super::policy::GradingPolicy;
use super::projection::{ExpectedGradeResult, TrendDirection, WeakCategory};
use super::{fmt_num, round_half_up};

pub const ATTENDANCE_GOAL: f64 = 95.0;
pub const COMPLETION_GOAL: f64 = 90.0;
pub const CATEGORY_SCORE_CAP: f64 = 90.0;
pub const SCORE_TARGET_CAP: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanStepKind {
    Attendance,
    Completion,
    WeakCategory,
    TrendMomentum,
    ScoreTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub kind: PlanStepKind,
    pub title: String,
    pub current_value: Option<f64>,
    pub target_value: Option<f64>,
    pub point_impact: i64,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementPlan {
    pub target_grade: i64,
    pub expected_grade: i64,
    pub gap_to_target: i64,
    pub is_already_met: bool,
    pub steps: Vec<PlanStep>,
    pub projected_grade: i64,
    pub conclusion: String,
}

#[cfg(test)]
impl ImprovementPlan {
    pub fn step(&self, kind: PlanStepKind) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    pub fn total_impact(&self) -> i64 {
        self.steps.iter().map(|s| s.point_impact).sum()
    }
}

/// Builds the plan that closes the gap between the projected grade and the
/// policy target. Steps appear in a fixed priority order and only when their
/// precondition holds; the score-target step is always last.
pub fn build_improvement_plan(
    expected: &ExpectedGradeResult,
    attendance_rate: f64,
    completion_rate: f64,
    weakest_category: Option<&WeakCategory>,
    trend: TrendDirection,
    policy: &GradingPolicy,
) -> ImprovementPlan {
    let target = policy.target_grade;
    let expected_grade = expected.expected_grade;
    let gap = (target - expected_grade).max(0);

    if gap == 0 {
        return ImprovementPlan {
            target_grade: target,
            expected_grade,
            gap_to_target: 0,
            is_already_met: true,
            steps: Vec::new(),
            projected_grade: expected_grade,
            conclusion: format!(
                "Expected grade {} already meets the target of {}.",
                expected_grade, target
            ),
        };
    }

    let attendance_rate = if attendance_rate.is_nan() {
        0.0
    } else {
        attendance_rate.clamp(0.0, 100.0)
    };
    let completion_rate = if completion_rate.is_nan() {
        0.0
    } else {
        completion_rate.clamp(0.0, 100.0)
    };

    let mut steps: Vec<PlanStep> = Vec::new();

    if attendance_rate < ATTENDANCE_GOAL {
        let goal = (attendance_rate + 10.0).min(ATTENDANCE_GOAL);
        let impact = round_half_up((goal - attendance_rate) * 0.5).min(2.0) as i64;
        steps.push(PlanStep {
            kind: PlanStepKind::Attendance,
            title: format!("Raise attendance to {}%", fmt_num(goal)),
            current_value: Some(attendance_rate),
            target_value: Some(goal),
            point_impact: impact,
            rationale: format!(
                "target = min(95, {} + 10) = {}; impact = min(2, round(({} - {}) * 0.5)) = {}",
                fmt_num(attendance_rate),
                fmt_num(goal),
                fmt_num(goal),
                fmt_num(attendance_rate),
                impact
            ),
        });
    }

    if completion_rate < COMPLETION_GOAL {
        let goal = (completion_rate + 20.0).min(100.0);
        let impact: i64 = if goal >= COMPLETION_GOAL { 2 } else { 1 };
        steps.push(PlanStep {
            kind: PlanStepKind::Completion,
            title: format!("Complete more activities ({}% submitted)", fmt_num(goal)),
            current_value: Some(completion_rate),
            target_value: Some(goal),
            point_impact: impact,
            rationale: format!(
                "target = min(100, {} + 20) = {}; impact = {} because target {} 90",
                fmt_num(completion_rate),
                fmt_num(goal),
                impact,
                if goal >= COMPLETION_GOAL { ">=" } else { "<" }
            ),
        });
    }

    // A category already above the cap yields a non-positive impact.
    if let Some(w) = weakest_category {
        let goal = (w.score + 15.0).min(CATEGORY_SCORE_CAP);
        let weight = w.kind.deped_weight().unwrap_or(w.weight);
        let impact = round_half_up((goal - w.score) * weight).min(3.0) as i64;
        steps.push(PlanStep {
            kind: PlanStepKind::WeakCategory,
            title: format!("Bring {} up to {}%", w.label, fmt_num(goal)),
            current_value: Some(w.score),
            target_value: Some(goal),
            point_impact: impact,
            rationale: format!(
                "target = min(90, {} + 15) = {}; impact = min(3, round(({} - {}) * {})) = {}",
                fmt_num(w.score),
                fmt_num(goal),
                fmt_num(goal),
                fmt_num(w.score),
                fmt_num(weight),
                impact
            ),
        });
    }

    if trend != TrendDirection::Improving {
        let current = match trend {
            TrendDirection::Declining => "declining",
            _ => "stable",
        };
        steps.push(PlanStep {
            kind: PlanStepKind::TrendMomentum,
            title: "Build upward momentum between quarters".to_string(),
            current_value: Some(expected.trend_delta),
            target_value: None,
            point_impact: 1,
            rationale: format!("trend is {}; turning it upward is worth +1", current),
        });
    }

    let prior: i64 = steps.iter().map(|s| s.point_impact).sum();
    let required = (expected_grade as f64 + gap as f64 * 1.5).min(SCORE_TARGET_CAP);
    let impact = (gap - prior).max(1);
    let n = policy.score_target_activities;
    steps.push(PlanStep {
        kind: PlanStepKind::ScoreTarget,
        title: format!(
            "Average {}% on the next {} activities",
            fmt_num(required),
            n
        ),
        current_value: Some(expected_grade as f64),
        target_value: Some(required),
        point_impact: impact,
        rationale: format!(
            "required = min(95, {} + {} * 1.5) = {}; impact = max(1, {} - {}) = {}",
            expected_grade,
            gap,
            fmt_num(required),
            gap,
            prior,
            impact
        ),
    });

    let total: i64 = steps.iter().map(|s| s.point_impact).sum();
    let projected = (expected_grade + total).min(100);
    let conclusion = if projected >= target {
        format!(
            "Following this plan brings the grade from {} to {}, reaching the target of {}.",
            expected_grade, projected, target
        )
    } else {
        format!(
            "Following this plan brings the grade from {} to {}, narrowing but not closing the gap to {}.",
            expected_grade, projected, target
        )
    };

    ImprovementPlan {
        target_grade: target,
        expected_grade,
        gap_to_target: gap,
        is_already_met: false,
        steps,
        projected_grade: projected,
        conclusion,
    }
}
