use std::fmt::Write;

use crate::catalog::{self, Catalog};
use crate::error::Result;
use crate::models::{AchievementProgress, ProgressRecord, UserSnapshot};
use crate::unlock;
use crate::xp;

pub fn build_report(
    snapshot: &UserSnapshot,
    catalog: &Catalog,
    records: &[ProgressRecord],
    achievements: &[AchievementProgress],
) -> Result<String> {
    let level = xp::level_from_xp(snapshot.total_xp)?;
    let percent = xp::progress_to_next(snapshot.total_xp)?;
    let remaining = xp::xp_to_next(snapshot.total_xp)?;

    let mut output = String::new();

    let _ = writeln!(output, "# Learner Progress Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}), learning since {}",
        snapshot.display_name,
        snapshot.email,
        snapshot.created_at.date_naive()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Level");
    let _ = writeln!(
        output,
        "- Level {} {} with {} XP",
        level,
        xp::title_for_level(level),
        snapshot.total_xp
    );
    let _ = writeln!(
        output,
        "- {}% of the way to level {} ({} XP to go)",
        percent,
        level + 1,
        remaining
    );
    let _ = writeln!(output, "- {} day streak", snapshot.streak);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Courses");

    if catalog.courses().is_empty() {
        let _ = writeln!(output, "No courses in the catalog.");
    } else {
        for course in catalog.courses() {
            let completion = catalog::course_completion(course, &snapshot.completed_lesson_ids);
            let _ = writeln!(
                output,
                "- {}: {} / {} lessons ({}%)",
                completion.course_name, completion.completed, completion.total, completion.percent
            );

            let nodes = unlock::resolve_statuses(
                course,
                &snapshot.completed_lesson_ids,
                snapshot.current_lesson_id.as_deref(),
            );
            for node in unlock::next_available(&nodes).take(3) {
                let _ = writeln!(
                    output,
                    "  - next up: {} ({} XP, {})",
                    node.title, node.xp_reward, node.status
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Achievements");

    let unlocked: Vec<&AchievementProgress> =
        achievements.iter().filter(|entry| entry.unlocked).collect();
    let _ = writeln!(
        output,
        "{} of {} unlocked",
        unlocked.len(),
        achievements.len()
    );
    for entry in achievements {
        let marker = if entry.unlocked { "x" } else { " " };
        let _ = writeln!(
            output,
            "- [{}] {}: {} ({:?}) {}/{}",
            marker,
            entry.name,
            entry.description,
            entry.rarity,
            entry.progress,
            entry.max_progress
        );
    }

    let mut recent: Vec<&ProgressRecord> = records
        .iter()
        .filter(|record| record.completed_at.is_some())
        .collect();
    recent.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Completions");

    if recent.is_empty() {
        let _ = writeln!(output, "No lessons completed yet.");
    } else {
        for record in recent.iter().take(5) {
            let title = catalog
                .lesson(&record.course_id, &record.lesson_id)
                .map(|lesson| lesson.title.as_str())
                .unwrap_or(record.lesson_id.as_str());
            let when = record
                .completed_at
                .map(|at| at.date_naive().to_string())
                .unwrap_or_default();
            let _ = writeln!(
                output,
                "- {} on {}: {} XP, best score {}, {} attempts",
                title, when, record.xp_earned, record.best_score, record.attempts
            );
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements;
    use crate::models::ProgressStatus;
    use chrono::{Duration, TimeZone, Utc};

    const SHIPPED_CATALOG: &str = include_str!("../content/courses.json");

    fn snapshot(total_xp: i64, completed: &[&str]) -> UserSnapshot {
        UserSnapshot {
            email: "sam@example.com".to_string(),
            display_name: "Sam Rivera".to_string(),
            total_xp,
            streak: 3,
            created_at: Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
            completed_lesson_ids: completed.iter().map(|id| id.to_string()).collect(),
            current_lesson_id: None,
        }
    }

    fn record(lesson_id: &str, days_ago: i64) -> ProgressRecord {
        ProgressRecord {
            lesson_id: lesson_id.to_string(),
            course_id: "web-dev".to_string(),
            status: ProgressStatus::Completed,
            xp_earned: 20,
            completed_at: Some(Utc::now() - Duration::days(days_ago)),
            attempts: 2,
            best_score: 90,
        }
    }

    #[test]
    fn report_covers_level_courses_and_history() {
        let catalog = Catalog::from_json(SHIPPED_CATALOG).unwrap();
        let snapshot = snapshot(150, &["welcome", "html-elements"]);
        let records = vec![record("welcome", 3), record("html-elements", 1)];
        let progress = achievements::evaluate(
            &achievements::definitions(),
            &snapshot,
            &records,
            &catalog,
        );

        let report = build_report(&snapshot, &catalog, &records, &progress).unwrap();

        assert!(report.starts_with("# Learner Progress Report"));
        assert!(report.contains("learning since 2026-01-05"));
        assert!(report.contains("- Level 1 Newcomer with 150 XP"));
        assert!(report.contains("- 75% of the way to level 2 (50 XP to go)"));
        assert!(report.contains("- Web Development: 2 / 8 lessons (25%)"));
        assert!(report.contains("  - next up: Attributes and Links (20 XP, available)"));
        assert!(report.contains("- Python & Machine Learning: 0 / 5 lessons (0%)"));
        assert!(report.contains("- [x] First Steps"));

        let newest = report.find("- HTML Elements and Tags on").unwrap();
        let older = report.find("- Welcome to Web Development on").unwrap();
        assert!(newest < older);
    }

    #[test]
    fn empty_history_is_called_out() {
        let catalog = Catalog::from_json(r#"{"courses": []}"#).unwrap();
        let report = build_report(&snapshot(0, &[]), &catalog, &[], &[]).unwrap();
        assert!(report.contains("No courses in the catalog."));
        assert!(report.contains("0 of 0 unlocked"));
        assert!(report.contains("No lessons completed yet."));
    }

    #[test]
    fn negative_xp_fails_the_report() {
        let catalog = Catalog::from_json(r#"{"courses": []}"#).unwrap();
        assert!(build_report(&snapshot(-5, &[]), &catalog, &[], &[]).is_err());
    }
}
