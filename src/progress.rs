use chrono::{DateTime, Utc};

use crate::error::{non_negative, Result};
use crate::models::{
    CompletionUpdate, Lesson, ProgressRecord, ProgressStatus, RewardFlags, UserSnapshot,
};
use crate::xp;

impl ProgressRecord {
    pub fn new(course_id: &str, lesson_id: &str) -> Self {
        Self {
            lesson_id: lesson_id.to_string(),
            course_id: course_id.to_string(),
            status: ProgressStatus::Available,
            xp_earned: 0,
            completed_at: None,
            attempts: 0,
            best_score: 0,
        }
    }

    /// A submission that did not finish the lesson.
    pub fn record_attempt(&mut self, score: i32) {
        self.attempts = self.attempts.saturating_add(1);
        self.best_score = self.best_score.max(score);
        if matches!(
            self.status,
            ProgressStatus::Locked | ProgressStatus::Available
        ) {
            self.status = ProgressStatus::InProgress;
        }
    }

    /// Marks the lesson finished. The first completion fixes the timestamp and
    /// the XP earned; later completions only count as attempts.
    pub fn record_completion(&mut self, xp_earned: u64, score: i32, at: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.best_score = self.best_score.max(score);
        if self.status != ProgressStatus::Completed {
            self.status = ProgressStatus::Completed;
            self.xp_earned = i64::try_from(xp_earned).unwrap_or(i64::MAX);
            self.completed_at = Some(at);
        }
    }

    pub fn is_first_try(&self) -> bool {
        self.attempts == 0
    }
}

/// Computes what the account store should hold once `lesson` is finished.
/// Finishing a lesson twice earns nothing the second time.
pub fn plan_completion(
    snapshot: &UserSnapshot,
    lesson: &Lesson,
    flags: RewardFlags,
) -> Result<CompletionUpdate> {
    let old_total = non_negative("total_xp", snapshot.total_xp)?;
    let already_completed = snapshot.completed_lesson_ids.contains(&lesson.id);
    let reward = if already_completed {
        0
    } else {
        xp::calculate_reward(i64::from(lesson.xp_reward), flags)?
    };

    let new_total_xp = old_total.saturating_add(reward).min(i64::MAX as u64);
    let level_before = xp::level_from_xp(snapshot.total_xp)?;
    let level_after = xp::level_from_xp(new_total_xp as i64)?;

    let mut completed_lesson_ids: Vec<String> =
        snapshot.completed_lesson_ids.iter().cloned().collect();
    if !already_completed {
        completed_lesson_ids.push(lesson.id.clone());
    }
    completed_lesson_ids.sort();

    Ok(CompletionUpdate {
        course_id: lesson.course_id.clone(),
        lesson_id: lesson.id.clone(),
        reward,
        new_total_xp,
        completed_lesson_ids,
        level_before,
        level_after,
        leveled_up: level_after > level_before,
        already_completed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::lesson;
    use crate::error::ProgressionError;
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    fn snapshot(total_xp: i64, completed: &[&str]) -> UserSnapshot {
        UserSnapshot {
            email: "sam@example.com".to_string(),
            display_name: "Sam Rivera".to_string(),
            total_xp,
            streak: 2,
            created_at: Utc::now() - Duration::days(10),
            completed_lesson_ids: completed.iter().map(|id| id.to_string()).collect::<HashSet<_>>(),
            current_lesson_id: None,
        }
    }

    #[test]
    fn attempts_move_lesson_in_progress_and_keep_best_score() {
        let mut record = ProgressRecord::new("web-dev", "js-variables");
        assert!(record.is_first_try());

        record.record_attempt(40);
        record.record_attempt(25);
        assert_eq!(record.status, ProgressStatus::InProgress);
        assert_eq!(record.attempts, 2);
        assert_eq!(record.best_score, 40);
        assert!(!record.is_first_try());
    }

    #[test]
    fn completion_is_sticky() {
        let first = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let later = first + Duration::days(2);
        let mut record = ProgressRecord::new("web-dev", "js-variables");

        record.record_completion(31, 90, first);
        record.record_completion(25, 100, later);
        record.record_attempt(10);

        assert_eq!(record.status, ProgressStatus::Completed);
        assert_eq!(record.completed_at, Some(first));
        assert_eq!(record.xp_earned, 31);
        assert_eq!(record.best_score, 100);
        assert_eq!(record.attempts, 3);
    }

    #[test]
    fn completion_adds_reward_and_lesson() {
        let lesson = lesson("web-dev", "html-basics", "html-elements", 2, 100);
        let flags = RewardFlags {
            first_try: true,
            under_time: true,
            perfect_score: false,
        };
        let update = plan_completion(&snapshot(150, &["welcome"]), &lesson, flags).unwrap();

        assert_eq!(update.reward, 138);
        assert_eq!(update.new_total_xp, 288);
        assert_eq!(update.completed_lesson_ids, vec!["html-elements", "welcome"]);
        assert_eq!(update.level_before, 1);
        assert_eq!(update.level_after, 2);
        assert!(update.leveled_up);
        assert!(!update.already_completed);
        assert_eq!(update.course_id, "web-dev");
    }

    #[test]
    fn repeat_completion_awards_nothing() {
        let lesson = lesson("web-dev", "html-basics", "welcome", 1, 10);
        let update =
            plan_completion(&snapshot(150, &["welcome"]), &lesson, RewardFlags::default()).unwrap();
        assert_eq!(update.reward, 0);
        assert_eq!(update.new_total_xp, 150);
        assert_eq!(update.completed_lesson_ids, vec!["welcome"]);
        assert!(update.already_completed);
        assert!(!update.leveled_up);
    }

    #[test]
    fn negative_total_is_rejected() {
        let lesson = lesson("web-dev", "html-basics", "welcome", 1, 10);
        assert!(matches!(
            plan_completion(&snapshot(-20, &[]), &lesson, RewardFlags::default()),
            Err(ProgressionError::InvalidInput {
                field: "total_xp",
                value: -20
            })
        ));
    }
}
