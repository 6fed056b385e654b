use crate::{
    domain::{
        error::DomainError,
        models::{ReportRecord, ReportStatus, ReportType},
    },
    storage::{SqliteStore, util},
};

type ReportRow = (
    String,
    String,
    String,
    Option<i64>,
    Option<i64>,
    String,
    Option<String>,
    i64,
);

impl SqliteStore {
    pub async fn insert_report(&self, report: &ReportRecord) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO reports(report_id, user_id, report_type, start_date_ms, end_date_ms, \
             status, report_url, generated_at_ms) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&report.id)
        .bind(&report.user_id)
        .bind(report.report_type.label())
        .bind(util::opt_ms_to_i64(report.start_date_ms))
        .bind(util::opt_ms_to_i64(report.end_date_ms))
        .bind(report.status.label())
        .bind(&report.report_url)
        .bind(util::ms_to_i64(report.generated_at_ms))
        .execute(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to insert report: {error}")))?;
        Ok(())
    }

    pub async fn get_report(&self, id: &str) -> Result<Option<ReportRecord>, DomainError> {
        let row = sqlx::query_as::<_, ReportRow>(
            "SELECT report_id, user_id, report_type, start_date_ms, end_date_ms, status, report_url, generated_at_ms \
             FROM reports WHERE report_id = ? LIMIT 1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to get report: {error}")))?;

        row.map(map_report_row).transpose()
    }

    pub async fn list_reports_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ReportRecord>, DomainError> {
        let rows = sqlx::query_as::<_, ReportRow>(
            "SELECT report_id, user_id, report_type, start_date_ms, end_date_ms, status, report_url, generated_at_ms \
             FROM reports WHERE user_id = ? ORDER BY generated_at_ms DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to list reports: {error}")))?;

        rows.into_iter().map(map_report_row).collect()
    }

    /// Conditional pending -> processing transition. Returns false when the
    /// report was already claimed, so a duplicate generation job can bail out.
    pub async fn claim_report_for_processing(&self, id: &str) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE reports SET status = ? WHERE report_id = ? AND status = ?",
        )
        .bind(ReportStatus::Processing.label())
        .bind(id)
        .bind(ReportStatus::Pending.label())
        .execute(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to claim report: {error}")))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_report_completed(&self, id: &str, url: &str) -> Result<(), DomainError> {
        sqlx::query("UPDATE reports SET status = ?, report_url = ? WHERE report_id = ?")
            .bind(ReportStatus::Completed.label())
            .bind(url)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|error| {
                DomainError::Storage(format!("failed to complete report: {error}"))
            })?;
        Ok(())
    }

    pub async fn set_report_failed(&self, id: &str) -> Result<(), DomainError> {
        sqlx::query("UPDATE reports SET status = ? WHERE report_id = ?")
            .bind(ReportStatus::Failed.label())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|error| DomainError::Storage(format!("failed to fail report: {error}")))?;
        Ok(())
    }

    pub async fn count_reports(&self) -> Result<u64, DomainError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reports")
            .fetch_one(self.pool())
            .await
            .map_err(|error| DomainError::Storage(format!("failed to count reports: {error}")))?;
        Ok(util::i64_to_ms(count))
    }
}

fn map_report_row(row: ReportRow) -> Result<ReportRecord, DomainError> {
    let (id, user_id, report_type, start_date_ms, end_date_ms, status, report_url, generated_at_ms) =
        row;

    Ok(ReportRecord {
        id,
        user_id,
        report_type: ReportType::parse(&report_type).map_err(DomainError::Storage)?,
        start_date_ms: util::opt_i64_to_ms(start_date_ms),
        end_date_ms: util::opt_i64_to_ms(end_date_ms),
        status: ReportStatus::parse(&status).map_err(DomainError::Storage)?,
        report_url,
        generated_at_ms: util::i64_to_ms(generated_at_ms),
    })
}
