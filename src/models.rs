use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::xp::LevelTitle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonType {
    Reading,
    Interactive,
    Challenge,
    Project,
}

impl LessonType {
    pub fn as_str(self) -> &'static str {
        match self {
            LessonType::Reading => "reading",
            LessonType::Interactive => "interactive",
            LessonType::Challenge => "challenge",
            LessonType::Project => "project",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub input: String,
    pub expected_output: String,
    pub description: String,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub course_id: String,
    pub module_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub lesson_type: LessonType,
    pub xp_reward: u32,
    pub estimated_minutes: u32,
    pub order: u32,
    #[serde(default)]
    pub content: String,
    pub code_template: Option<String>,
    pub solution: Option<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub difficulty: Difficulty,
    pub total_lessons: u32,
    #[serde(rename = "totalXP")]
    pub total_xp: u64,
    pub estimated_hours: u32,
    pub modules: Vec<Module>,
}

/// Stored per-learner, per-lesson state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Locked,
    Available,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Locked => "locked",
            ProgressStatus::Available => "available",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "locked" => Some(ProgressStatus::Locked),
            "available" => Some(ProgressStatus::Available),
            "in_progress" => Some(ProgressStatus::InProgress),
            "completed" => Some(ProgressStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub lesson_id: String,
    pub course_id: String,
    pub status: ProgressStatus,
    pub xp_earned: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub best_score: i32,
}

/// Derived per-lesson state on the lesson map. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonStatus {
    Locked,
    Available,
    Current,
    Completed,
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LessonStatus::Locked => "locked",
            LessonStatus::Available => "available",
            LessonStatus::Current => "current",
            LessonStatus::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// What the account store hands the engine for one learner.
#[derive(Debug, Clone)]
pub struct UserSnapshot {
    pub email: String,
    pub display_name: String,
    pub total_xp: i64,
    pub streak: i32,
    pub created_at: DateTime<Utc>,
    pub completed_lesson_ids: HashSet<String>,
    pub current_lesson_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardFlags {
    pub first_try: bool,
    pub under_time: bool,
    pub perfect_score: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonNode {
    pub lesson_id: String,
    pub module_id: String,
    pub title: String,
    pub xp_reward: u32,
    pub global_index: usize,
    pub status: LessonStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressionView {
    pub level: u32,
    pub progress_percent: u8,
    pub title: LevelTitle,
    pub lessons: Vec<LessonNode>,
}

impl ProgressionView {
    pub fn lesson_statuses(&self) -> BTreeMap<&str, LessonStatus> {
        self.lessons
            .iter()
            .map(|node| (node.lesson_id.as_str(), node.status))
            .collect()
    }
}

/// Values to be written back to the account store after a lesson is finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionUpdate {
    pub course_id: String,
    pub lesson_id: String,
    pub reward: u64,
    pub new_total_xp: u64,
    pub completed_lesson_ids: Vec<String>,
    pub level_before: u32,
    pub level_after: u32,
    pub leveled_up: bool,
    pub already_completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AchievementRule {
    LessonsCompleted(usize),
    Streak(i32),
    TotalXp(i64),
    ModuleComplete {
        course_id: &'static str,
        module_id: &'static str,
    },
    CompletedBeforeDawn,
}

#[derive(Debug, Clone)]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub rarity: Rarity,
    pub xp_bonus: u32,
    pub rule: AchievementRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementProgress {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub rarity: Rarity,
    pub unlocked: bool,
    pub progress: u64,
    pub max_progress: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseCompletion {
    pub course_id: String,
    pub course_name: String,
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}
