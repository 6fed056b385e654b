use crate::{
    domain::{
        error::DomainError,
        models::{DeliveryMessageRecord, DeliveryStatus},
    },
    storage::{SqliteStore, util},
};

type DeliveryRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    Option<i64>,
);

const DELIVERY_COLUMNS: &str = "message_id, user_id, destination, subject, body, \
     attachments_json, status, created_at_ms, sent_at_ms";

impl SqliteStore {
    pub async fn enqueue_delivery(
        &self,
        message: &DeliveryMessageRecord,
    ) -> Result<(), DomainError> {
        let attachments_json =
            util::to_json_text(&message.attachments).map_err(DomainError::Storage)?;

        sqlx::query(
            "INSERT INTO delivery_queue(message_id, user_id, destination, subject, body, \
             attachments_json, status, created_at_ms, sent_at_ms) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.user_id)
        .bind(&message.destination)
        .bind(&message.subject)
        .bind(&message.body)
        .bind(attachments_json)
        .bind(message.status.label())
        .bind(util::ms_to_i64(message.created_at_ms))
        .bind(util::opt_ms_to_i64(message.sent_at_ms))
        .execute(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to enqueue delivery: {error}")))?;
        Ok(())
    }

    pub async fn list_pending_deliveries(
        &self,
    ) -> Result<Vec<DeliveryMessageRecord>, DomainError> {
        let rows = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM delivery_queue WHERE status = ? ORDER BY created_at_ms ASC",
        ))
        .bind(DeliveryStatus::Pending.label())
        .fetch_all(self.pool())
        .await
        .map_err(|error| {
            DomainError::Storage(format!("failed to list pending deliveries: {error}"))
        })?;

        rows.into_iter().map(map_delivery_row).collect()
    }

    pub async fn list_deliveries_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<DeliveryMessageRecord>, DomainError> {
        let rows = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM delivery_queue WHERE user_id = ? ORDER BY created_at_ms ASC",
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(|error| DomainError::Storage(format!("failed to list deliveries: {error}")))?;

        rows.into_iter().map(map_delivery_row).collect()
    }

    pub async fn mark_delivery_sent(&self, id: &str, sent_at_ms: u64) -> Result<(), DomainError> {
        sqlx::query("UPDATE delivery_queue SET status = ?, sent_at_ms = ? WHERE message_id = ?")
            .bind(DeliveryStatus::Sent.label())
            .bind(util::ms_to_i64(sent_at_ms))
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|error| {
                DomainError::Storage(format!("failed to mark delivery sent: {error}"))
            })?;
        Ok(())
    }

    pub async fn mark_delivery_failed(&self, id: &str) -> Result<(), DomainError> {
        sqlx::query("UPDATE delivery_queue SET status = ? WHERE message_id = ?")
            .bind(DeliveryStatus::Failed.label())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|error| {
                DomainError::Storage(format!("failed to mark delivery failed: {error}"))
            })?;
        Ok(())
    }

    pub async fn count_pending_deliveries(&self) -> Result<u64, DomainError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM delivery_queue WHERE status = ?")
                .bind(DeliveryStatus::Pending.label())
                .fetch_one(self.pool())
                .await
                .map_err(|error| {
                    DomainError::Storage(format!("failed to count pending deliveries: {error}"))
                })?;
        Ok(util::i64_to_ms(count))
    }
}

fn map_delivery_row(row: DeliveryRow) -> Result<DeliveryMessageRecord, DomainError> {
    let (id, user_id, destination, subject, body, attachments_json, status, created_at_ms, sent_at_ms) =
        row;

    let attachments =
        util::from_json_text::<Vec<String>>(&attachments_json).map_err(DomainError::Storage)?;

    Ok(DeliveryMessageRecord {
        id,
        user_id,
        destination,
        subject,
        body,
        attachments,
        status: DeliveryStatus::parse(&status).map_err(DomainError::Storage)?,
        created_at_ms: util::i64_to_ms(created_at_ms),
        sent_at_ms: util::opt_i64_to_ms(sent_at_ms),
    })
}
