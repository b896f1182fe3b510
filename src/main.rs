use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

mod achievements;
mod catalog;
mod config;
mod db;
mod error;
mod models;
mod progress;
mod report;
mod unlock;
mod xp;

use catalog::Catalog;
use config::Config;
use models::{LessonStatus, ProgressRecord, RewardFlags, UserSnapshot};

#[derive(Parser)]
#[command(name = "lesson-progression")]
#[command(about = "XP, levels and lesson unlocks for the course catalog", long_about = None)]
struct Cli {
    /// Course catalog JSON (defaults to PROGRESSION_CATALOG or content/courses.json)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the account store schema
    InitDb,
    /// Load demo learners
    Seed,
    /// Import lesson progress from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Check catalog totals, ordering and lesson ids
    Validate,
    /// List courses and their modules
    Courses,
    /// Show one lesson with its neighbours in the course
    Lesson {
        #[arg(long)]
        course: String,
        #[arg(long)]
        lesson: String,
        #[arg(long)]
        show_solution: bool,
    },
    /// Show level, title and progress for an XP total
    Level {
        #[arg(long, allow_hyphen_values = true)]
        xp: i64,
    },
    /// Compute a lesson reward with bonuses
    Reward {
        #[arg(long, allow_hyphen_values = true)]
        base: i64,
        #[arg(long)]
        first_try: bool,
        #[arg(long)]
        under_time: bool,
        #[arg(long)]
        perfect_score: bool,
    },
    /// Print the lesson map for a course
    #[command(group(
        ArgGroup::new("learner")
            .args(["email", "xp"])
            .required(true)
            .multiple(false)
    ))]
    Map {
        #[arg(long)]
        course: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        xp: Option<i64>,
        /// Completed lesson ids for an XP-only preview
        #[arg(long, value_delimiter = ',', conflicts_with = "email")]
        completed: Vec<String>,
        #[arg(long, conflicts_with = "email")]
        current: Option<String>,
        /// Print lesson statuses as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a submission that did not finish the lesson
    Attempt {
        #[arg(long)]
        course: String,
        #[arg(long)]
        lesson: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        score: i32,
    },
    /// Finish a lesson for a learner and record the reward
    Complete {
        #[arg(long)]
        course: String,
        #[arg(long)]
        lesson: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 100)]
        score: i32,
        #[arg(long)]
        under_time: bool,
        /// Print the update without writing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate a markdown learner report
    Report {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "progress-report.md")]
        out: PathBuf,
    },
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to the account store")
}

fn load_catalog(cli_path: Option<PathBuf>, config: &Config) -> anyhow::Result<Catalog> {
    let path = cli_path.unwrap_or_else(|| config.catalog_path.clone());
    let catalog = Catalog::load(&path)?;
    tracing::debug!(path = %path.display(), courses = catalog.courses().len(), "catalog loaded");
    Ok(catalog)
}

/// Refuses to complete a lesson the learner has not unlocked yet.
fn ensure_unlocked(
    course: &models::Course,
    snapshot: &UserSnapshot,
    lesson_id: &str,
) -> anyhow::Result<()> {
    let status = unlock::lesson_status(
        course,
        &snapshot.completed_lesson_ids,
        snapshot.current_lesson_id.as_deref(),
        lesson_id,
    )
    .with_context(|| format!("unknown lesson {lesson_id} in course {}", course.id))?;

    if status == LessonStatus::Locked {
        anyhow::bail!(
            "lesson {lesson_id} is locked; complete the lesson before it in {} first",
            course.id
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lesson_progression=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect(&config).await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} progress records from {}.", csv.display());
        }
        Commands::Validate => {
            let catalog = load_catalog(cli.catalog, &config)?;
            let issues = catalog.validate();
            if issues.is_empty() {
                println!("Catalog is consistent ({} courses).", catalog.courses().len());
            } else {
                for issue in &issues {
                    println!("- {issue}");
                }
                anyhow::bail!("catalog has {} issues", issues.len());
            }
        }
        Commands::Courses => {
            let catalog = load_catalog(cli.catalog, &config)?;
            for course in catalog.courses() {
                println!(
                    "{} ({}, {}): {} lessons, {} XP, ~{}h",
                    course.name,
                    course.id,
                    course.difficulty.as_str(),
                    course.total_lessons,
                    course.total_xp,
                    course.estimated_hours
                );
                println!("  {}", course.description);
                for module in &course.modules {
                    println!(
                        "  - {}: {} ({} lessons)",
                        module.name,
                        module.description,
                        module.lessons.len()
                    );
                }
            }
        }
        Commands::Lesson {
            course,
            lesson,
            show_solution,
        } => {
            let catalog = load_catalog(cli.catalog, &config)?;
            let course = catalog
                .course(&course)
                .with_context(|| format!("unknown course {course}"))?;
            let (previous, next) = catalog::neighbors(course, &lesson)
                .with_context(|| format!("unknown lesson {lesson} in course {}", course.id))?;
            let lesson = catalog
                .lesson(&course.id, &lesson)
                .with_context(|| format!("unknown lesson {lesson}"))?;

            println!("# {}", lesson.title);
            println!(
                "{} | {} XP | ~{} min{}",
                lesson.lesson_type.as_str(),
                lesson.xp_reward,
                lesson.estimated_minutes,
                lesson
                    .language
                    .as_deref()
                    .map(|language| format!(" | {language}"))
                    .unwrap_or_default()
            );
            println!();
            println!("{}", lesson.description);
            println!();
            println!("{}", lesson.content);
            if let Some(template) = &lesson.code_template {
                println!();
                println!("Starter code:");
                println!("{template}");
            }
            for (i, hint) in lesson.hints.iter().enumerate() {
                println!("Hint {}: {hint}", i + 1);
            }
            for case in lesson.test_cases.iter().filter(|case| !case.hidden) {
                println!(
                    "Test {} ({}): {} => {}",
                    case.id, case.description, case.input, case.expected_output
                );
            }
            if show_solution {
                if let Some(solution) = &lesson.solution {
                    println!();
                    println!("Solution:");
                    println!("{solution}");
                }
            }
            if let Some(previous) = previous {
                println!("Previous: {} ({})", previous.title, previous.id);
            }
            if let Some(next) = next {
                println!("Next: {} ({})", next.title, next.id);
            }
        }
        Commands::Level { xp } => {
            let level = xp::level_from_xp(xp)?;
            println!(
                "Level {} {} ({}% to level {}, {} XP to go)",
                level,
                xp::title_for_level(level),
                xp::progress_to_next(xp)?,
                level + 1,
                xp::xp_to_next(xp)?
            );
        }
        Commands::Reward {
            base,
            first_try,
            under_time,
            perfect_score,
        } => {
            let flags = RewardFlags {
                first_try,
                under_time,
                perfect_score,
            };
            println!("{} XP", xp::calculate_reward(base, flags)?);
        }
        Commands::Map {
            course,
            email,
            xp,
            completed,
            current,
            json,
        } => {
            let catalog = load_catalog(cli.catalog, &config)?;
            let course = catalog
                .course(&course)
                .with_context(|| format!("unknown course {course}"))?;

            let snapshot = match email {
                Some(email) => {
                    let pool = connect(&config).await?;
                    db::fetch_snapshot(&pool, &email).await?
                }
                None => UserSnapshot {
                    email: String::new(),
                    display_name: String::new(),
                    total_xp: xp.unwrap_or_default(),
                    streak: 0,
                    created_at: Utc::now(),
                    completed_lesson_ids: completed.into_iter().collect::<HashSet<_>>(),
                    current_lesson_id: current,
                },
            };

            let view = unlock::build_view(&snapshot, course)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view.lesson_statuses())?);
                return Ok(());
            }
            println!(
                "{}: level {} {} ({}% to next)",
                course.name, view.level, view.title, view.progress_percent
            );
            for node in &view.lessons {
                println!(
                    "{:>3}. [{}] {} ({} XP)",
                    node.global_index + 1,
                    node.status,
                    node.title,
                    node.xp_reward
                );
            }
        }
        Commands::Attempt {
            course,
            lesson,
            email,
            score,
        } => {
            let catalog = load_catalog(cli.catalog, &config)?;
            let lesson = catalog
                .lesson(&course, &lesson)
                .with_context(|| format!("unknown lesson {lesson} in course {course}"))?;

            let pool = connect(&config).await?;
            let mut record = db::fetch_records(&pool, &email)
                .await?
                .into_iter()
                .find(|r| r.course_id == lesson.course_id && r.lesson_id == lesson.id)
                .unwrap_or_else(|| ProgressRecord::new(&lesson.course_id, &lesson.id));
            record.record_attempt(score);
            db::save_record(&pool, &email, &record).await?;
            println!(
                "Attempt {} on {} saved (best score {}).",
                record.attempts, lesson.title, record.best_score
            );
        }
        Commands::Complete {
            course,
            lesson,
            email,
            score,
            under_time,
            dry_run,
        } => {
            let catalog = load_catalog(cli.catalog, &config)?;
            let lesson = catalog
                .lesson(&course, &lesson)
                .with_context(|| format!("unknown lesson {lesson} in course {course}"))?;

            let course = catalog
                .course(&lesson.course_id)
                .with_context(|| format!("unknown course {}", lesson.course_id))?;

            let pool = connect(&config).await?;
            let snapshot = db::fetch_snapshot(&pool, &email).await?;
            ensure_unlocked(course, &snapshot, &lesson.id)?;
            let mut record = db::fetch_records(&pool, &email)
                .await?
                .into_iter()
                .find(|r| r.course_id == lesson.course_id && r.lesson_id == lesson.id)
                .unwrap_or_else(|| ProgressRecord::new(&lesson.course_id, &lesson.id));

            let flags = RewardFlags {
                first_try: record.is_first_try(),
                under_time,
                perfect_score: score >= 100,
            };
            let update = progress::plan_completion(&snapshot, lesson, flags)?;
            record.record_completion(update.reward, score, Utc::now());

            println!("{}", serde_json::to_string_pretty(&update)?);
            if update.leveled_up {
                println!(
                    "Level up! {} -> {} {}",
                    update.level_before,
                    update.level_after,
                    xp::title_for_level(update.level_after)
                );
            }

            if let Some((_, Some(next))) = catalog::neighbors(course, &lesson.id) {
                println!("Next up: {} ({})", next.title, next.id);
            }

            if dry_run {
                tracing::info!(lesson = %lesson.id, "dry run, account store untouched");
            } else if !db::apply_completion(&pool, &email, &update, &record).await? {
                println!("{} was already completed, no XP awarded.", lesson.title);
            }
        }
        Commands::Report { email, out } => {
            let catalog = load_catalog(cli.catalog, &config)?;
            let pool = connect(&config).await?;
            let snapshot = db::fetch_snapshot(&pool, &email).await?;
            let records = db::fetch_records(&pool, &email).await?;
            let definitions = achievements::definitions();
            let unlocked = achievements::evaluate(&definitions, &snapshot, &records, &catalog);
            tracing::debug!(
                bonus_xp = achievements::bonus_xp(&definitions, &unlocked),
                "achievement bonuses"
            );

            let report = report::build_report(&snapshot, &catalog, &records, &unlocked)?;
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
