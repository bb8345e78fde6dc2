use std::collections::HashMap;

use super::structure::Task;

/// One student's scores: task id -> raw score, `None` meaning "not yet graded".
pub type StudentScores = HashMap<String, Option<f64>>;

/// Roster-wide scores: student id -> that student's scores.
pub type ScoreMap = HashMap<String, StudentScores>;

/// Overlays unsaved draft edits on persisted scores.
///
/// A draft key always wins, including a draft of `None` which clears a
/// persisted score. Neither input is modified.
pub fn merge_drafts(persisted: &StudentScores, drafts: &StudentScores) -> StudentScores {
    let mut merged = persisted.clone();
    for (task_id, value) in drafts {
        merged.insert(task_id.clone(), *value);
    }
    merged
}

/// The usable score for a task, clamped into `[0, total]`.
///
/// Missing, null and non-finite entries are "not graded".
pub fn task_score(scores: &StudentScores, task: &Task) -> Option<f64> {
    let raw = scores.get(&task.id).copied().flatten()?;
    if !raw.is_finite() {
        return None;
    }
    Some(clamp_score(raw, task.total))
}

pub fn clamp_score(raw: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    raw.clamp(0.0, total)
}

/// Score as a percentage of the task total; `None` when ungraded or the
/// task has no usable total.
pub fn task_percent(scores: &StudentScores, task: &Task) -> Option<f64> {
    if !(task.total.is_finite() && task.total > 0.0) {
        return None;
    }
    task_score(scores, task).map(|s| 100.0 * s / task.total)
}
