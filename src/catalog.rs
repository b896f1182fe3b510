use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::models::{Course, CourseCompletion, Lesson};

/// Read-only course content, authored outside this tool.
#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    courses: Vec<Course>,
}

impl Catalog {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("failed to parse catalog {}", path.display()))
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    pub fn course(&self, course_id: &str) -> Option<&Course> {
        self.courses.iter().find(|course| course.id == course_id)
    }

    pub fn lesson(&self, course_id: &str, lesson_id: &str) -> Option<&Lesson> {
        self.course(course_id)?
            .modules
            .iter()
            .flat_map(|module| module.lessons.iter())
            .find(|lesson| lesson.id == lesson_id)
    }

    /// Checks every course, plus the catalog-wide rules: course ids are unique
    /// and a lesson id belongs to one course only, since learners carry a single
    /// completed-lesson set across courses.
    pub fn validate(&self) -> Vec<CatalogIssue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for course in &self.courses {
            if !seen.insert(course.id.as_str()) {
                issues.push(CatalogIssue::DuplicateCourse {
                    course_id: course.id.clone(),
                });
            }
            for lesson in flatten(course) {
                let owner = *owners.entry(lesson.id.as_str()).or_insert(course.id.as_str());
                if owner != course.id {
                    issues.push(CatalogIssue::SharedLessonId {
                        lesson_id: lesson.id.clone(),
                        first_course: owner.to_string(),
                        course_id: course.id.clone(),
                    });
                }
            }
            issues.extend(validate_course(course));
        }
        issues
    }
}

/// Module-major, lesson-minor order. Position in the result is the global index.
pub fn flatten(course: &Course) -> Vec<&Lesson> {
    course
        .modules
        .iter()
        .flat_map(|module| module.lessons.iter())
        .collect()
}

/// Previous and next lesson around `lesson_id`, crossing module boundaries.
/// `None` when the lesson is not part of the course.
pub fn neighbors<'a>(
    course: &'a Course,
    lesson_id: &str,
) -> Option<(Option<&'a Lesson>, Option<&'a Lesson>)> {
    let lessons = flatten(course);
    let index = lessons.iter().position(|lesson| lesson.id == lesson_id)?;
    let previous = index.checked_sub(1).map(|i| lessons[i]);
    let next = lessons.get(index + 1).copied();
    Some((previous, next))
}

pub fn course_completion(course: &Course, completed: &HashSet<String>) -> CourseCompletion {
    let lessons = flatten(course);
    let total = lessons.len();
    let done = lessons
        .iter()
        .filter(|lesson| completed.contains(&lesson.id))
        .count();
    let percent = if total == 0 {
        0
    } else {
        ((done * 200 + total) / (total * 2)) as u8
    };

    CourseCompletion {
        course_id: course.id.clone(),
        course_name: course.name.clone(),
        completed: done,
        total,
        percent,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogIssue {
    DuplicateCourse {
        course_id: String,
    },
    LessonCountMismatch {
        course_id: String,
        declared: u32,
        actual: usize,
    },
    XpTotalMismatch {
        course_id: String,
        declared: u64,
        actual: u64,
    },
    DuplicateLesson {
        course_id: String,
        lesson_id: String,
    },
    OrderNotIncreasing {
        course_id: String,
        module_id: String,
        lesson_id: String,
        order: u32,
    },
    ZeroReward {
        course_id: String,
        lesson_id: String,
    },
    MisplacedLesson {
        course_id: String,
        module_id: String,
        lesson_id: String,
    },
    SharedLessonId {
        lesson_id: String,
        first_course: String,
        course_id: String,
    },
}

impl fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogIssue::DuplicateCourse { course_id } => {
                write!(f, "{course_id}: course id appears more than once")
            }
            CatalogIssue::LessonCountMismatch {
                course_id,
                declared,
                actual,
            } => write!(
                f,
                "{course_id}: totalLessons is {declared} but modules hold {actual} lessons"
            ),
            CatalogIssue::XpTotalMismatch {
                course_id,
                declared,
                actual,
            } => write!(
                f,
                "{course_id}: totalXP is {declared} but lesson rewards sum to {actual}"
            ),
            CatalogIssue::DuplicateLesson {
                course_id,
                lesson_id,
            } => write!(f, "{course_id}: lesson id {lesson_id} is not unique"),
            CatalogIssue::OrderNotIncreasing {
                course_id,
                module_id,
                lesson_id,
                order,
            } => write!(
                f,
                "{course_id}/{module_id}: lesson {lesson_id} has order {order}, not after its predecessor"
            ),
            CatalogIssue::ZeroReward {
                course_id,
                lesson_id,
            } => write!(f, "{course_id}: lesson {lesson_id} awards no XP"),
            CatalogIssue::MisplacedLesson {
                course_id,
                module_id,
                lesson_id,
            } => write!(
                f,
                "{course_id}/{module_id}: lesson {lesson_id} names a different course or module"
            ),
            CatalogIssue::SharedLessonId {
                lesson_id,
                first_course,
                course_id,
            } => write!(
                f,
                "{course_id}: lesson id {lesson_id} is already used by {first_course}"
            ),
        }
    }
}

pub fn validate_course(course: &Course) -> Vec<CatalogIssue> {
    let mut issues = Vec::new();
    let mut lesson_ids = HashSet::new();
    let mut lesson_count = 0usize;
    let mut xp_total = 0u64;

    for module in &course.modules {
        let mut last_order: Option<u32> = None;
        for lesson in &module.lessons {
            lesson_count += 1;
            xp_total += u64::from(lesson.xp_reward);

            if !lesson_ids.insert(lesson.id.as_str()) {
                issues.push(CatalogIssue::DuplicateLesson {
                    course_id: course.id.clone(),
                    lesson_id: lesson.id.clone(),
                });
            }
            if last_order.is_some_and(|previous| lesson.order <= previous) {
                issues.push(CatalogIssue::OrderNotIncreasing {
                    course_id: course.id.clone(),
                    module_id: module.id.clone(),
                    lesson_id: lesson.id.clone(),
                    order: lesson.order,
                });
            }
            last_order = Some(lesson.order);

            if lesson.xp_reward == 0 {
                issues.push(CatalogIssue::ZeroReward {
                    course_id: course.id.clone(),
                    lesson_id: lesson.id.clone(),
                });
            }
            if lesson.course_id != course.id || lesson.module_id != module.id {
                issues.push(CatalogIssue::MisplacedLesson {
                    course_id: course.id.clone(),
                    module_id: module.id.clone(),
                    lesson_id: lesson.id.clone(),
                });
            }
        }
    }

    if course.total_lessons as usize != lesson_count {
        issues.push(CatalogIssue::LessonCountMismatch {
            course_id: course.id.clone(),
            declared: course.total_lessons,
            actual: lesson_count,
        });
    }
    if course.total_xp != xp_total {
        issues.push(CatalogIssue::XpTotalMismatch {
            course_id: course.id.clone(),
            declared: course.total_xp,
            actual: xp_total,
        });
    }

    issues
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::{Course, Difficulty, Lesson, LessonType, Module};

    pub fn lesson(course_id: &str, module_id: &str, id: &str, order: u32, xp: u32) -> Lesson {
        Lesson {
            id: id.to_string(),
            course_id: course_id.to_string(),
            module_id: module_id.to_string(),
            title: format!("Lesson {id}"),
            description: String::new(),
            lesson_type: LessonType::Interactive,
            xp_reward: xp,
            estimated_minutes: 10,
            order,
            content: String::new(),
            code_template: None,
            solution: None,
            hints: Vec::new(),
            test_cases: Vec::new(),
            language: None,
        }
    }

    /// Builds a consistent course from `(module_id, [lesson_id, ...])` pairs,
    /// every lesson worth 50 XP.
    pub fn course(id: &str, modules: &[(&str, &[&str])]) -> Course {
        let modules: Vec<Module> = modules
            .iter()
            .map(|(module_id, lesson_ids)| Module {
                id: module_id.to_string(),
                name: format!("Module {module_id}"),
                description: String::new(),
                lessons: lesson_ids
                    .iter()
                    .enumerate()
                    .map(|(i, lesson_id)| lesson(id, module_id, lesson_id, i as u32 + 1, 50))
                    .collect(),
            })
            .collect();
        let total_lessons: usize = modules.iter().map(|m| m.lessons.len()).sum();

        Course {
            id: id.to_string(),
            name: format!("Course {id}"),
            description: String::new(),
            difficulty: Difficulty::Beginner,
            total_lessons: total_lessons as u32,
            total_xp: total_lessons as u64 * 50,
            estimated_hours: 1,
            modules,
        }
    }
}
