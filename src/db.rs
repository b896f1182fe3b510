use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{CompletionUpdate, ProgressRecord, ProgressStatus, UserSnapshot};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let learners = vec![
        (
            Uuid::parse_str("6f1c2a4e-8d3b-4c5a-9e7f-1a2b3c4d5e6f")?,
            "maya.chen@example.com",
            "Maya Chen",
            150i64,
            3i32,
            Some("html-attributes"),
        ),
        (
            Uuid::parse_str("a7b8c9d0-1e2f-4a3b-8c4d-5e6f7a8b9c0d")?,
            "leo.okafor@example.com",
            "Leo Okafor",
            0i64,
            0i32,
            None,
        ),
    ];

    for (id, email, name, total_xp, streak, current) in learners {
        sqlx::query(
            r#"
            INSERT INTO progression.learners
            (id, email, display_name, total_xp, streak, current_lesson_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE
            SET display_name = EXCLUDED.display_name
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(name)
        .bind(total_xp)
        .bind(streak)
        .bind(current)
        .execute(pool)
        .await?;
    }

    let progress = vec![
        ("maya.chen@example.com", "welcome", 12i64, 1i32, 100i32, (2026, 2, 2, 18)),
        ("maya.chen@example.com", "html-elements", 138i64, 1i32, 95i32, (2026, 2, 3, 1)),
    ];

    for (email, lesson_id, xp_earned, attempts, best_score, (y, m, d, h)) in progress {
        let completed_at = Utc
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .single()
            .context("invalid seed timestamp")?;

        sqlx::query(
            r#"
            INSERT INTO progression.lesson_progress
            (learner_id, course_id, lesson_id, status, xp_earned, completed_at, attempts, best_score)
            SELECT id, 'web-dev', $2, 'completed', $3, $4, $5, $6
            FROM progression.learners WHERE email = $1
            ON CONFLICT (learner_id, course_id, lesson_id) DO NOTHING
            "#,
        )
        .bind(email)
        .bind(lesson_id)
        .bind(xp_earned)
        .bind(completed_at)
        .bind(attempts)
        .bind(best_score)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn learner_id(pool: &PgPool, email: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM progression.learners WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no learner with email {email}"))?;
    Ok(row.get("id"))
}

pub async fn fetch_snapshot(pool: &PgPool, email: &str) -> anyhow::Result<UserSnapshot> {
    let row = sqlx::query(
        "SELECT id, email, display_name, total_xp, streak, current_lesson_id, created_at \
         FROM progression.learners WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no learner with email {email}"))?;

    let id: Uuid = row.get("id");
    let completed = sqlx::query(
        "SELECT lesson_id FROM progression.lesson_progress \
         WHERE learner_id = $1 AND status = 'completed'",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let snapshot = UserSnapshot {
        email: row.get("email"),
        display_name: row.get("display_name"),
        total_xp: row.get("total_xp"),
        streak: row.get("streak"),
        created_at: row.get("created_at"),
        completed_lesson_ids: completed
            .iter()
            .map(|r| r.get::<String, _>("lesson_id"))
            .collect(),
        current_lesson_id: row.get("current_lesson_id"),
    };
    tracing::debug!(
        email,
        total_xp = snapshot.total_xp,
        completed = snapshot.completed_lesson_ids.len(),
        "fetched learner snapshot"
    );
    Ok(snapshot)
}

pub async fn fetch_records(pool: &PgPool, email: &str) -> anyhow::Result<Vec<ProgressRecord>> {
    let id = learner_id(pool, email).await?;
    let rows = sqlx::query(
        "SELECT course_id, lesson_id, status, xp_earned, completed_at, attempts, best_score \
         FROM progression.lesson_progress WHERE learner_id = $1 \
         ORDER BY course_id, lesson_id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::new();
    for row in rows {
        let status: String = row.get("status");
        records.push(ProgressRecord {
            lesson_id: row.get("lesson_id"),
            course_id: row.get("course_id"),
            status: ProgressStatus::parse(&status)
                .with_context(|| format!("unknown progress status {status}"))?,
            xp_earned: row.get("xp_earned"),
            completed_at: row.get("completed_at"),
            attempts: row.get("attempts"),
            best_score: row.get("best_score"),
        });
    }

    Ok(records)
}

async fn upsert_record(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    learner_id: Uuid,
    record: &ProgressRecord,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO progression.lesson_progress
        (learner_id, course_id, lesson_id, status, xp_earned, completed_at, attempts, best_score)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (learner_id, course_id, lesson_id) DO UPDATE
        SET status = EXCLUDED.status,
            xp_earned = EXCLUDED.xp_earned,
            completed_at = EXCLUDED.completed_at,
            attempts = EXCLUDED.attempts,
            best_score = EXCLUDED.best_score
        "#,
    )
    .bind(learner_id)
    .bind(&record.course_id)
    .bind(&record.lesson_id)
    .bind(record.status.as_str())
    .bind(record.xp_earned)
    .bind(record.completed_at)
    .bind(record.attempts)
    .bind(record.best_score)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Stores an attempt that did not finish the lesson and marks it current.
pub async fn save_record(pool: &PgPool, email: &str, record: &ProgressRecord) -> anyhow::Result<()> {
    let id = learner_id(pool, email).await?;
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE progression.learners SET current_lesson_id = $2 WHERE id = $1")
        .bind(id)
        .bind(&record.lesson_id)
        .execute(&mut *tx)
        .await?;
    upsert_record(&mut tx, id, record).await?;

    tx.commit().await?;
    tracing::info!(
        email,
        lesson = %record.lesson_id,
        attempts = record.attempts,
        status = record.status.as_str(),
        "saved lesson attempt"
    );
    Ok(())
}

/// Writes a planned completion and the lesson's updated record in one transaction.
///
/// The reward is added to the stored total rather than overwriting it, so two
/// completions planned from the same snapshot both count. A lesson that is
/// already completed in the store keeps its record and awards nothing; the
/// function then returns `false`.
pub async fn apply_completion(
    pool: &PgPool,
    email: &str,
    update: &CompletionUpdate,
    record: &ProgressRecord,
) -> anyhow::Result<bool> {
    let reward = i64::try_from(update.reward).context("reward out of range")?;
    let mut tx = pool.begin().await?;

    let id: Uuid = sqlx::query("SELECT id FROM progression.learners WHERE email = $1 FOR UPDATE")
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?
        .with_context(|| format!("no learner with email {email}"))?
        .get("id");

    let changed = sqlx::query(
        r#"
        INSERT INTO progression.lesson_progress AS lp
        (learner_id, course_id, lesson_id, status, xp_earned, completed_at, attempts, best_score)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (learner_id, course_id, lesson_id) DO UPDATE
        SET status = EXCLUDED.status,
            xp_earned = EXCLUDED.xp_earned,
            completed_at = EXCLUDED.completed_at,
            attempts = EXCLUDED.attempts,
            best_score = EXCLUDED.best_score
        WHERE lp.status <> 'completed'
        "#,
    )
    .bind(id)
    .bind(&record.course_id)
    .bind(&record.lesson_id)
    .bind(record.status.as_str())
    .bind(record.xp_earned)
    .bind(record.completed_at)
    .bind(record.attempts)
    .bind(record.best_score)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if changed == 0 {
        tx.rollback().await?;
        tracing::warn!(
            email,
            lesson = %update.lesson_id,
            "lesson already completed in the store, nothing awarded"
        );
        return Ok(false);
    }

    let total_xp: i64 = sqlx::query(
        r#"
        UPDATE progression.learners
        SET total_xp = total_xp + $2,
            current_lesson_id = CASE WHEN current_lesson_id = $3 THEN NULL ELSE current_lesson_id END
        WHERE id = $1
        RETURNING total_xp
        "#,
    )
    .bind(id)
    .bind(reward)
    .bind(&update.lesson_id)
    .fetch_one(&mut *tx)
    .await?
    .get("total_xp");

    tx.commit().await?;
    tracing::info!(
        email,
        lesson = %update.lesson_id,
        reward = update.reward,
        total_xp,
        "recorded lesson completion"
    );
    Ok(true)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        email: String,
        display_name: String,
        course_id: String,
        lesson_id: String,
        status: String,
        xp_earned: i64,
        attempts: i32,
        best_score: i32,
        completed_at: Option<DateTime<Utc>>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let status = ProgressStatus::parse(&row.status)
            .with_context(|| format!("unknown progress status {}", row.status))?;
        if row.xp_earned < 0 {
            anyhow::bail!("negative xp_earned for {} / {}", row.email, row.lesson_id);
        }

        // One transaction per row: the progress row and the XP it adds land together.
        let mut tx = pool.begin().await?;

        let learner_id: Uuid = sqlx::query(
            r#"
            INSERT INTO progression.learners (id, email, display_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET display_name = EXCLUDED.display_name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.email)
        .bind(&row.display_name)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        let result = sqlx::query(
            r#"
            INSERT INTO progression.lesson_progress
            (learner_id, course_id, lesson_id, status, xp_earned, completed_at, attempts, best_score)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (learner_id, course_id, lesson_id) DO NOTHING
            "#,
        )
        .bind(learner_id)
        .bind(&row.course_id)
        .bind(&row.lesson_id)
        .bind(status.as_str())
        .bind(row.xp_earned)
        .bind(row.completed_at)
        .bind(row.attempts)
        .bind(row.best_score)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            sqlx::query("UPDATE progression.learners SET total_xp = total_xp + $2 WHERE id = $1")
                .bind(learner_id)
                .bind(row.xp_earned)
                .execute(&mut *tx)
                .await?;
            inserted += 1;
        }

        tx.commit().await?;
    }

    tracing::info!(inserted, path = %csv_path.display(), "imported progress records");
    Ok(inserted)
}
