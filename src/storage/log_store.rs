use crate::{
    domain::{error::DomainError, models::MedicationLogRecord},
    storage::{SqliteStore, util},
};

type LogRow = (String, String, String, i64, i64, Option<String>);

impl SqliteStore {
    /// Window bounds are inclusive; either side may be open.
    pub async fn list_logs_in_window(
        &self,
        user_id: &str,
        start_ms: Option<u64>,
        end_ms: Option<u64>,
    ) -> Result<Vec<MedicationLogRecord>, DomainError> {
        let mut query = String::from(
            "SELECT log_id, medication_id, user_id, taken_at_ms, was_on_time, notes \
             FROM medication_logs WHERE user_id = ?",
        );
        if start_ms.is_some() {
            query.push_str(" AND taken_at_ms >= ?");
        }
        if end_ms.is_some() {
            query.push_str(" AND taken_at_ms <= ?");
        }
        query.push_str(" ORDER BY taken_at_ms ASC");

        let mut statement = sqlx::query_as::<_, LogRow>(&query).bind(user_id);
        if let Some(start_ms) = start_ms {
            statement = statement.bind(util::ms_to_i64(start_ms));
        }
        if let Some(end_ms) = end_ms {
            statement = statement.bind(util::ms_to_i64(end_ms));
        }

        let rows = statement
            .fetch_all(self.pool())
            .await
            .map_err(|error| DomainError::Storage(format!("failed to list logs: {error}")))?;

        Ok(rows.into_iter().map(map_log_row).collect())
    }
}

fn map_log_row(row: LogRow) -> MedicationLogRecord {
    let (id, medication_id, user_id, taken_at_ms, was_on_time, notes) = row;
    MedicationLogRecord {
        id,
        medication_id,
        user_id,
        taken_at_ms: util::i64_to_ms(taken_at_ms),
        was_on_time: was_on_time == 1,
        notes,
    }
}
