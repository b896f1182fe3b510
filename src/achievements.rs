use chrono::Timelike;

use crate::catalog::Catalog;
use crate::models::{
    Achievement, AchievementProgress, AchievementRule, ProgressRecord, Rarity, UserSnapshot,
};

const DAWN_HOUR: u32 = 5;

pub fn definitions() -> Vec<Achievement> {
    vec![
        Achievement {
            id: "first_lesson",
            name: "First Steps",
            description: "Complete your first lesson",
            rarity: Rarity::Common,
            xp_bonus: 10,
            rule: AchievementRule::LessonsCompleted(1),
        },
        Achievement {
            id: "streak_7",
            name: "Week Warrior",
            description: "7-day learning streak",
            rarity: Rarity::Uncommon,
            xp_bonus: 50,
            rule: AchievementRule::Streak(7),
        },
        Achievement {
            id: "html_complete",
            name: "HTML Hero",
            description: "Complete all HTML lessons",
            rarity: Rarity::Rare,
            xp_bonus: 75,
            rule: AchievementRule::ModuleComplete {
                course_id: "web-dev",
                module_id: "html-basics",
            },
        },
        Achievement {
            id: "xp_1000",
            name: "XP Hunter",
            description: "Earn 1,000 total XP",
            rarity: Rarity::Uncommon,
            xp_bonus: 50,
            rule: AchievementRule::TotalXp(1000),
        },
        Achievement {
            id: "night_owl",
            name: "Night Owl",
            description: "Complete a lesson after midnight",
            rarity: Rarity::Rare,
            xp_bonus: 25,
            rule: AchievementRule::CompletedBeforeDawn,
        },
    ]
}

pub fn evaluate(
    achievements: &[Achievement],
    snapshot: &UserSnapshot,
    records: &[ProgressRecord],
    catalog: &Catalog,
) -> Vec<AchievementProgress> {
    achievements
        .iter()
        .map(|achievement| {
            let (progress, max_progress) = measure(&achievement.rule, snapshot, records, catalog);
            AchievementProgress {
                id: achievement.id,
                name: achievement.name,
                description: achievement.description,
                rarity: achievement.rarity,
                unlocked: max_progress > 0 && progress >= max_progress,
                progress,
                max_progress,
            }
        })
        .collect()
}

fn measure(
    rule: &AchievementRule,
    snapshot: &UserSnapshot,
    records: &[ProgressRecord],
    catalog: &Catalog,
) -> (u64, u64) {
    match rule {
        AchievementRule::LessonsCompleted(target) => {
            let target = *target as u64;
            (
                (snapshot.completed_lesson_ids.len() as u64).min(target),
                target,
            )
        }
        AchievementRule::Streak(target) => {
            let target = u64::try_from(*target).unwrap_or(0);
            let streak = u64::try_from(snapshot.streak).unwrap_or(0);
            (streak.min(target), target)
        }
        AchievementRule::TotalXp(target) => {
            let target = u64::try_from(*target).unwrap_or(0);
            let total = u64::try_from(snapshot.total_xp).unwrap_or(0);
            (total.min(target), target)
        }
        AchievementRule::ModuleComplete {
            course_id,
            module_id,
        } => {
            let Some(module) = catalog
                .course(course_id)
                .and_then(|course| course.modules.iter().find(|m| m.id == *module_id))
            else {
                return (0, 0);
            };
            let done = module
                .lessons
                .iter()
                .filter(|lesson| snapshot.completed_lesson_ids.contains(&lesson.id))
                .count();
            (done as u64, module.lessons.len() as u64)
        }
        AchievementRule::CompletedBeforeDawn => {
            let hit = records.iter().any(|record| {
                record
                    .completed_at
                    .is_some_and(|at| at.hour() < DAWN_HOUR)
            });
            (u64::from(hit), 1)
        }
    }
}

/// Sum of XP bonuses for the unlocked entries.
pub fn bonus_xp(achievements: &[Achievement], progress: &[AchievementProgress]) -> u64 {
    progress
        .iter()
        .filter(|entry| entry.unlocked)
        .filter_map(|entry| achievements.iter().find(|a| a.id == entry.id))
        .map(|achievement| u64::from(achievement.xp_bonus))
        .sum()
}
