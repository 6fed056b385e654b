use sqlx::{Executor, SqlitePool};

use crate::domain::error::DomainError;

pub async fn migrate(pool: &SqlitePool) -> Result<(), DomainError> {
    let migration = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;

    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

    CREATE TABLE IF NOT EXISTS user_sessions (
        session_id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL,
        last_active_ms INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_user_sessions_user ON user_sessions(user_id);

    CREATE TABLE IF NOT EXISTS medications (
        medication_id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        schedule_json TEXT NOT NULL,
        is_completed INTEGER NOT NULL,
        last_taken_at_ms INTEGER,
        last_notified_at_ms INTEGER,
        schedule_generation INTEGER NOT NULL,
        created_at_ms INTEGER NOT NULL,
        updated_at_ms INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_medications_user ON medications(user_id);

    CREATE TABLE IF NOT EXISTS medication_logs (
        log_id TEXT PRIMARY KEY NOT NULL,
        medication_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        taken_at_ms INTEGER NOT NULL,
        was_on_time INTEGER NOT NULL,
        notes TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_medication_logs_user_taken ON medication_logs(user_id, taken_at_ms DESC);

    CREATE TABLE IF NOT EXISTS reports (
        report_id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        report_type TEXT NOT NULL,
        start_date_ms INTEGER,
        end_date_ms INTEGER,
        status TEXT NOT NULL,
        report_url TEXT,
        generated_at_ms INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_reports_user_generated ON reports(user_id, generated_at_ms DESC);

    CREATE TABLE IF NOT EXISTS delivery_queue (
        message_id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        destination TEXT NOT NULL,
        subject TEXT NOT NULL,
        body TEXT NOT NULL,
        attachments_json TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL,
        sent_at_ms INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_delivery_queue_status ON delivery_queue(status, created_at_ms ASC);

    CREATE TABLE IF NOT EXISTS scheduled_jobs (
        job_id TEXT PRIMARY KEY NOT NULL,
        subject_id TEXT NOT NULL,
        run_at_ms INTEGER NOT NULL,
        payload_json TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_run_at ON scheduled_jobs(run_at_ms ASC);
    CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_subject ON scheduled_jobs(subject_id);
    "#;

    pool.execute(migration)
        .await
        .map_err(|error| DomainError::Storage(format!("migration failed: {error}")))?;

    Ok(())
}
