use serde::{Deserialize, Serialize};

use super::CalcError;

/// Workspace grading policy, persisted under the `grading.policy` settings key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradingPolicy {
    pub target_grade: i64,
    /// Projection base when nothing has been graded yet.
    pub passing_floor: f64,
    pub improvement_potential_bonus: bool,
    /// N in "required average on the next N activities".
    pub score_target_activities: u32,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            target_grade: 85,
            passing_floor: 75.0,
            improvement_potential_bonus: true,
            score_target_activities: 5,
        }
    }
}

impl GradingPolicy {
    /// Applies a partial JSON patch; unknown keys are rejected.
    pub fn patched(&self, patch: &serde_json::Value) -> Result<GradingPolicy, CalcError> {
        let Some(obj) = patch.as_object() else {
            return Err(CalcError::new("bad_params", "policy patch must be an object"));
        };
        let mut next = self.clone();
        for (key, value) in obj {
            match key.as_str() {
                "targetGrade" => {
                    let Some(v) = value.as_i64().filter(|v| (60..=100).contains(v)) else {
                        return Err(CalcError::new(
                            "bad_params",
                            "targetGrade must be an integer between 60 and 100",
                        ));
                    };
                    next.target_grade = v;
                }
                "passingFloor" => {
                    let Some(v) = value.as_f64().filter(|v| (0.0..=100.0).contains(v)) else {
                        return Err(CalcError::new(
                            "bad_params",
                            "passingFloor must be a number between 0 and 100",
                        ));
                    };
                    next.passing_floor = v;
                }
                "improvementPotentialBonus" => {
                    let Some(v) = value.as_bool() else {
                        return Err(CalcError::new(
                            "bad_params",
                            "improvementPotentialBonus must be a boolean",
                        ));
                    };
                    next.improvement_potential_bonus = v;
                }
                "scoreTargetActivities" => {
                    let Some(v) = value.as_u64().filter(|v| (1..=50).contains(v)) else {
                        return Err(CalcError::new(
                            "bad_params",
                            "scoreTargetActivities must be an integer between 1 and 50",
                        ));
                    };
                    next.score_target_activities = v as u32;
                }
                other => {
                    return Err(CalcError::new(
                        "bad_params",
                        format!("unknown policy field: {}", other),
                    ));
                }
            }
        }
        Ok(next)
    }
}
