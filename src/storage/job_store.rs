use crate::{
    domain::{
        error::DomainError,
        models::{JobPayload, ScheduledJobRecord},
    },
    storage::{SqliteStore, util},
};

type JobRow = (String, i64, String, i64);

impl SqliteStore {
    pub async fn insert_scheduled_job(&self, job: &ScheduledJobRecord) -> Result<(), DomainError> {
        let payload_json = util::to_json_text(&job.payload).map_err(DomainError::Storage)?;
        let subject_id = match &job.payload {
            JobPayload::ReminderFire { medication_id, .. } => medication_id.as_str(),
            JobPayload::ReportGenerate { report_id } => report_id.as_str(),
        };

        sqlx::query(
            "INSERT INTO scheduled_jobs(job_id, subject_id, run_at_ms, payload_json, created_at_ms) \
             VALUES(?, ?, ?, ?, ?)",
        )
        .bind(&job.id)
        .bind(subject_id)
        .bind(util::ms_to_i64(job.run_at_ms))
        .bind(payload_json)
        .bind(util::ms_to_i64(job.created_at_ms))
        .execute(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to insert job: {error}")))?;
        Ok(())
    }

    pub async fn list_due_jobs(&self, now_ms: u64) -> Result<Vec<ScheduledJobRecord>, DomainError> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT job_id, run_at_ms, payload_json, created_at_ms \
             FROM scheduled_jobs WHERE run_at_ms <= ? ORDER BY run_at_ms ASC",
        )
        .bind(util::ms_to_i64(now_ms))
        .fetch_all(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to list due jobs: {error}")))?;

        rows.into_iter().map(map_job_row).collect()
    }

    pub async fn remove_scheduled_job(&self, id: &str) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE job_id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|error| DomainError::Storage(format!("failed to remove job: {error}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Best-effort cleanup when a medication goes away; any job that slips
    /// through is discarded by the fire-time guards instead.
    pub async fn remove_jobs_for_subject(&self, subject_id: &str) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE subject_id = ?")
            .bind(subject_id)
            .execute(self.pool())
            .await
            .map_err(|error| {
                DomainError::Storage(format!("failed to remove subject jobs: {error}"))
            })?;
        Ok(result.rows_affected())
    }

    /// Earliest pending fire time for a medication or report, if any.
    pub async fn next_run_for_subject(&self, subject_id: &str) -> Result<Option<u64>, DomainError> {
        let next = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MIN(run_at_ms) FROM scheduled_jobs WHERE subject_id = ?",
        )
        .bind(subject_id)
        .fetch_one(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to query next run: {error}")))?;
        Ok(next.and_then(|value| u64::try_from(value).ok()))
    }

    pub async fn count_jobs_for_subject(&self, subject_id: &str) -> Result<u64, DomainError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM scheduled_jobs WHERE subject_id = ?",
        )
        .bind(subject_id)
        .fetch_one(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to count jobs: {error}")))?;
        Ok(util::i64_to_ms(count))
    }

    pub async fn count_scheduled_jobs(&self) -> Result<u64, DomainError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM scheduled_jobs")
            .fetch_one(self.pool())
            .await
            .map_err(|error| DomainError::Storage(format!("failed to count jobs: {error}")))?;
        Ok(util::i64_to_ms(count))
    }
}

fn map_job_row(row: JobRow) -> Result<ScheduledJobRecord, DomainError> {
    let (id, run_at_ms, payload_json, created_at_ms) = row;
    let payload = util::from_json_text::<JobPayload>(&payload_json).map_err(DomainError::Storage)?;

    Ok(ScheduledJobRecord {
        id,
        run_at_ms: util::i64_to_ms(run_at_ms),
        payload,
        created_at_ms: util::i64_to_ms(created_at_ms),
    })
}
