use crate::{
    domain::{
        error::DomainError,
        models::{MedicationLogRecord, MedicationRecord, ReminderSchedule},
    },
    storage::{SqliteStore, util},
};

type MedicationRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    i64,
    Option<i64>,
    Option<i64>,
    i64,
    i64,
    i64,
);

const MEDICATION_COLUMNS: &str = "medication_id, user_id, name, description, schedule_json, \
     is_completed, last_taken_at_ms, last_notified_at_ms, schedule_generation, created_at_ms, updated_at_ms";

impl SqliteStore {
    pub async fn list_medications_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<MedicationRecord>, DomainError> {
        let rows = sqlx::query_as::<_, MedicationRow>(&format!(
            "SELECT {MEDICATION_COLUMNS} FROM medications WHERE user_id = ? ORDER BY created_at_ms ASC",
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to list medications: {error}")))?;

        rows.into_iter().map(map_medication_row).collect()
    }

    pub async fn list_all_medications(&self) -> Result<Vec<MedicationRecord>, DomainError> {
        let rows = sqlx::query_as::<_, MedicationRow>(&format!(
            "SELECT {MEDICATION_COLUMNS} FROM medications ORDER BY created_at_ms ASC",
        ))
        .fetch_all(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to list medications: {error}")))?;

        rows.into_iter().map(map_medication_row).collect()
    }

    pub async fn get_medication(&self, id: &str) -> Result<Option<MedicationRecord>, DomainError> {
        let row = sqlx::query_as::<_, MedicationRow>(&format!(
            "SELECT {MEDICATION_COLUMNS} FROM medications WHERE medication_id = ? LIMIT 1",
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to get medication: {error}")))?;

        row.map(map_medication_row).transpose()
    }

    pub async fn insert_medication(
        &self,
        medication: &MedicationRecord,
    ) -> Result<(), DomainError> {
        let schedule_json =
            util::to_json_text(&medication.schedule).map_err(DomainError::Storage)?;

        sqlx::query(
            "INSERT INTO medications(medication_id, user_id, name, description, schedule_json, \
             is_completed, last_taken_at_ms, last_notified_at_ms, schedule_generation, created_at_ms, updated_at_ms) \
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&medication.id)
        .bind(&medication.user_id)
        .bind(&medication.name)
        .bind(&medication.description)
        .bind(schedule_json)
        .bind(if medication.is_completed { 1_i64 } else { 0_i64 })
        .bind(util::opt_ms_to_i64(medication.last_taken_at_ms))
        .bind(util::opt_ms_to_i64(medication.last_notified_at_ms))
        .bind(util::ms_to_i64(medication.schedule_generation))
        .bind(util::ms_to_i64(medication.created_at_ms))
        .bind(util::ms_to_i64(medication.updated_at_ms))
        .execute(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to insert medication: {error}")))?;
        Ok(())
    }

    /// Writes back a record whose fields were already patched and
    /// re-validated by the caller.
    pub async fn save_medication(&self, medication: &MedicationRecord) -> Result<(), DomainError> {
        let schedule_json =
            util::to_json_text(&medication.schedule).map_err(DomainError::Storage)?;

        sqlx::query(
            "UPDATE medications SET name = ?, description = ?, schedule_json = ?, is_completed = ?, \
             last_taken_at_ms = ?, last_notified_at_ms = ?, schedule_generation = ?, updated_at_ms = ? \
             WHERE medication_id = ?",
        )
        .bind(&medication.name)
        .bind(&medication.description)
        .bind(schedule_json)
        .bind(if medication.is_completed { 1_i64 } else { 0_i64 })
        .bind(util::opt_ms_to_i64(medication.last_taken_at_ms))
        .bind(util::opt_ms_to_i64(medication.last_notified_at_ms))
        .bind(util::ms_to_i64(medication.schedule_generation))
        .bind(util::ms_to_i64(medication.updated_at_ms))
        .bind(&medication.id)
        .execute(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to save medication: {error}")))?;
        Ok(())
    }

    pub async fn set_medication_notified(&self, id: &str, ts_ms: u64) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE medications SET last_notified_at_ms = ?, updated_at_ms = ? WHERE medication_id = ?",
        )
        .bind(util::ms_to_i64(ts_ms))
        .bind(util::ms_to_i64(util::now_unix_ms()))
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|error| {
            DomainError::Storage(format!("failed to record notification time: {error}"))
        })?;
        Ok(())
    }

    /// Log insert and medication patch happen in one transaction so a dose
    /// is never logged without its completion state moving, or vice versa.
    pub async fn mark_medication_taken(
        &self,
        log: &MedicationLogRecord,
        complete: bool,
    ) -> Result<(), DomainError> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|error| DomainError::Storage(format!("failed to start tx: {error}")))?;

        sqlx::query(
            "INSERT INTO medication_logs(log_id, medication_id, user_id, taken_at_ms, was_on_time, notes) \
             VALUES(?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.id)
        .bind(&log.medication_id)
        .bind(&log.user_id)
        .bind(util::ms_to_i64(log.taken_at_ms))
        .bind(if log.was_on_time { 1_i64 } else { 0_i64 })
        .bind(&log.notes)
        .execute(&mut *tx)
        .await
        .map_err(|error| DomainError::Storage(format!("failed to insert log: {error}")))?;

        let query = if complete {
            "UPDATE medications SET is_completed = 1, last_taken_at_ms = ?, updated_at_ms = ? \
             WHERE medication_id = ?"
        } else {
            "UPDATE medications SET last_taken_at_ms = ?, updated_at_ms = ? WHERE medication_id = ?"
        };
        sqlx::query(query)
            .bind(util::ms_to_i64(log.taken_at_ms))
            .bind(util::ms_to_i64(util::now_unix_ms()))
            .bind(&log.medication_id)
            .execute(&mut *tx)
            .await
            .map_err(|error| {
                DomainError::Storage(format!("failed to update medication: {error}"))
            })?;

        tx.commit()
            .await
            .map_err(|error| DomainError::Storage(format!("failed to commit tx: {error}")))?;
        Ok(())
    }

    pub async fn bump_schedule_generation(&self, id: &str) -> Result<u64, DomainError> {
        let generation = sqlx::query_scalar::<_, i64>(
            "UPDATE medications SET schedule_generation = schedule_generation + 1 \
             WHERE medication_id = ? RETURNING schedule_generation",
        )
        .bind(id)
        .fetch_one(self.pool())
        .await
        .map_err(|error| {
            DomainError::Storage(format!("failed to bump schedule generation: {error}"))
        })?;
        Ok(util::i64_to_ms(generation))
    }

    pub async fn remove_medication(&self, id: &str) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM medications WHERE medication_id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|error| {
                DomainError::Storage(format!("failed to remove medication: {error}"))
            })?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_medications(&self) -> Result<u64, DomainError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM medications")
            .fetch_one(self.pool())
            .await
            .map_err(|error| {
                DomainError::Storage(format!("failed to count medications: {error}"))
            })?;
        Ok(util::i64_to_ms(count))
    }
}

fn map_medication_row(row: MedicationRow) -> Result<MedicationRecord, DomainError> {
    let (
        id,
        user_id,
        name,
        description,
        schedule_json,
        is_completed,
        last_taken_at_ms,
        last_notified_at_ms,
        schedule_generation,
        created_at_ms,
        updated_at_ms,
    ) = row;

    let schedule =
        util::from_json_text::<ReminderSchedule>(&schedule_json).map_err(DomainError::Storage)?;

    Ok(MedicationRecord {
        id,
        user_id,
        name,
        description,
        schedule,
        is_completed: is_completed == 1,
        last_taken_at_ms: util::opt_i64_to_ms(last_taken_at_ms),
        last_notified_at_ms: util::opt_i64_to_ms(last_notified_at_ms),
        schedule_generation: util::i64_to_ms(schedule_generation),
        created_at_ms: util::i64_to_ms(created_at_ms),
        updated_at_ms: util::i64_to_ms(updated_at_ms),
    })
}
