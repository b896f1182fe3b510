use std::collections::HashSet;

use crate::catalog;
use crate::error::Result;
use crate::models::{Course, LessonNode, LessonStatus, ProgressionView, UserSnapshot};
use crate::xp;

/// Derives a status for every lesson of `course` in global order.
///
/// A lesson opens as soon as the lesson right before it in the flattened
/// sequence is completed, regardless of module boundaries. Completion wins
/// over the current marker. Ids in `completed` or `current` that the course
/// does not know are ignored.
pub fn resolve_statuses(
    course: &Course,
    completed: &HashSet<String>,
    current: Option<&str>,
) -> Vec<LessonNode> {
    let lessons = catalog::flatten(course);

    lessons
        .iter()
        .enumerate()
        .map(|(index, lesson)| {
            let status = if completed.contains(&lesson.id) {
                LessonStatus::Completed
            } else if current == Some(lesson.id.as_str()) {
                LessonStatus::Current
            } else if index == 0 || completed.contains(&lessons[index - 1].id) {
                LessonStatus::Available
            } else {
                LessonStatus::Locked
            };

            LessonNode {
                lesson_id: lesson.id.clone(),
                module_id: lesson.module_id.clone(),
                title: lesson.title.clone(),
                xp_reward: lesson.xp_reward,
                global_index: index,
                status,
            }
        })
        .collect()
}

/// Status of one lesson, `None` when the course does not contain it.
pub fn lesson_status(
    course: &Course,
    completed: &HashSet<String>,
    current: Option<&str>,
    lesson_id: &str,
) -> Option<LessonStatus> {
    resolve_statuses(course, completed, current)
        .into_iter()
        .find(|node| node.lesson_id == lesson_id)
        .map(|node| node.status)
}

/// Everything the lesson map and profile header show for one learner.
pub fn build_view(snapshot: &UserSnapshot, course: &Course) -> Result<ProgressionView> {
    let level = xp::level_from_xp(snapshot.total_xp)?;
    let progress_percent = xp::progress_to_next(snapshot.total_xp)?;
    let lessons = resolve_statuses(
        course,
        &snapshot.completed_lesson_ids,
        snapshot.current_lesson_id.as_deref(),
    );

    Ok(ProgressionView {
        level,
        progress_percent,
        title: xp::title_for_level(level),
        lessons,
    })
}

/// Lessons the learner can open right now, in course order.
pub fn next_available(nodes: &[LessonNode]) -> impl Iterator<Item = &LessonNode> {
    nodes.iter().filter(|node| {
        matches!(node.status, LessonStatus::Available | LessonStatus::Current)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::course;
    use crate::error::ProgressionError;
    use crate::xp::LevelTitle;
    use chrono::Utc;

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn statuses(nodes: &[LessonNode]) -> Vec<(&str, LessonStatus)> {
        nodes
            .iter()
            .map(|node| (node.lesson_id.as_str(), node.status))
            .collect()
    }

    fn snapshot(total_xp: i64, completed: &[&str], current: Option<&str>) -> UserSnapshot {
        UserSnapshot {
            email: "sam@example.com".to_string(),
            display_name: "Sam Rivera".to_string(),
            total_xp,
            streak: 0,
            created_at: Utc::now(),
            completed_lesson_ids: set(completed),
            current_lesson_id: current.map(str::to_string),
        }
    }

    #[test]
    fn fresh_learner_sees_only_first_lesson() {
        let course = course("web", &[("m1", &["A", "B", "C", "D"])]);
        let nodes = resolve_statuses(&course, &set(&[]), None);
        assert_eq!(
            statuses(&nodes),
            vec![
                ("A", LessonStatus::Available),
                ("B", LessonStatus::Locked),
                ("C", LessonStatus::Locked),
                ("D", LessonStatus::Locked),
            ]
        );
    }

    #[test]
    fn completing_a_lesson_opens_the_next() {
        let course = course("web", &[("m1", &["A", "B", "C", "D"])]);
        let nodes = resolve_statuses(&course, &set(&["A"]), None);
        assert_eq!(
            statuses(&nodes),
            vec![
                ("A", LessonStatus::Completed),
                ("B", LessonStatus::Available),
                ("C", LessonStatus::Locked),
                ("D", LessonStatus::Locked),
            ]
        );
    }

    #[test]
    fn current_marker_replaces_available() {
        let course = course("web", &[("m1", &["A", "B", "C", "D"])]);
        let nodes = resolve_statuses(&course, &set(&["A", "B"]), Some("C"));
        assert_eq!(
            statuses(&nodes),
            vec![
                ("A", LessonStatus::Completed),
                ("B", LessonStatus::Completed),
                ("C", LessonStatus::Current),
                ("D", LessonStatus::Locked),
            ]
        );
    }

    #[test]
    fn completed_wins_over_current() {
        let course = course("web", &[("m1", &["A", "B"])]);
        let nodes = resolve_statuses(&course, &set(&["A"]), Some("A"));
        assert_eq!(nodes[0].status, LessonStatus::Completed);
        assert_eq!(nodes[1].status, LessonStatus::Available);
    }

    #[test]
    fn gating_crosses_module_boundaries() {
        let course = course("web", &[("m1", &["A", "B"]), ("m2", &["C", "D"])]);
        let nodes = resolve_statuses(&course, &set(&["A", "B"]), None);
        assert_eq!(nodes[2].lesson_id, "C");
        assert_eq!(nodes[2].global_index, 2);
        assert_eq!(nodes[2].module_id, "m2");
        assert_eq!(nodes[2].status, LessonStatus::Available);
        assert_eq!(nodes[3].status, LessonStatus::Locked);
    }

    #[test]
    fn out_of_order_completion_opens_following_lesson() {
        let course = course("web", &[("m1", &["A", "B", "C", "D"])]);
        let nodes = resolve_statuses(&course, &set(&["C"]), None);
        assert_eq!(
            statuses(&nodes),
            vec![
                ("A", LessonStatus::Available),
                ("B", LessonStatus::Locked),
                ("C", LessonStatus::Completed),
                ("D", LessonStatus::Available),
            ]
        );
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let course = course("web", &[("m1", &["A", "B"])]);
        let nodes = resolve_statuses(&course, &set(&["stale", "other"]), Some("ghost"));
        assert_eq!(
            statuses(&nodes),
            vec![("A", LessonStatus::Available), ("B", LessonStatus::Locked)]
        );
    }

    #[test]
    fn empty_course_yields_no_statuses() {
        let empty_module = course("empty", &[("m1", &[])]);
        assert!(resolve_statuses(&empty_module, &set(&["A"]), Some("A")).is_empty());
        let no_modules = course("empty", &[]);
        assert!(resolve_statuses(&no_modules, &set(&[]), None).is_empty());
    }

    #[test]
    fn view_combines_level_and_statuses() {
        let course = course("web", &[("m1", &["A", "B", "C"])]);
        let view = build_view(&snapshot(550, &["A"], Some("B")), &course).unwrap();
        assert_eq!(view.level, 3);
        assert_eq!(view.title, LevelTitle::Newcomer);
        // Level 3 spans 500..900.
        assert_eq!(view.progress_percent, 13);

        let map = view.lesson_statuses();
        assert_eq!(map["A"], LessonStatus::Completed);
        assert_eq!(map["B"], LessonStatus::Current);
        assert_eq!(map["C"], LessonStatus::Locked);
    }

    #[test]
    fn view_rejects_negative_xp() {
        let course = course("web", &[("m1", &["A"])]);
        assert!(matches!(
            build_view(&snapshot(-1, &[], None), &course),
            Err(ProgressionError::InvalidInput { .. })
        ));
    }

    #[test]
    fn next_available_lists_open_lessons() {
        let course = course("web", &[("m1", &["A", "B", "C", "D"])]);
        let nodes = resolve_statuses(&course, &set(&["A", "C"]), Some("B"));
        let open: Vec<&str> = next_available(&nodes)
            .map(|node| node.lesson_id.as_str())
            .collect();
        assert_eq!(open, vec!["B", "D"]);
    }

    #[test]
    fn single_lesson_status_follows_the_gating_chain() {
        let course = course("web", &[("m1", &["A", "B"]), ("m2", &["C"])]);
        let completed = set(&["A"]);
        assert_eq!(
            lesson_status(&course, &completed, None, "A"),
            Some(LessonStatus::Completed)
        );
        assert_eq!(
            lesson_status(&course, &completed, None, "B"),
            Some(LessonStatus::Available)
        );
        assert_eq!(
            lesson_status(&course, &completed, None, "C"),
            Some(LessonStatus::Locked)
        );
        assert_eq!(
            lesson_status(&course, &completed, Some("C"), "C"),
            Some(LessonStatus::Current)
        );
        assert_eq!(lesson_status(&course, &completed, None, "missing"), None);
    }

    #[test]
    fn resolution_is_repeatable() {
        let course = course("web", &[("m1", &["A", "B", "C"])]);
        let completed = set(&["A"]);
        assert_eq!(
            resolve_statuses(&course, &completed, Some("B")),
            resolve_statuses(&course, &completed, Some("B"))
        );
    }
}
