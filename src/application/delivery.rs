use tracing::{info, warn};

use crate::{
    application::state::SharedState,
    domain::{error::DomainError, models::DeliveryMessageRecord},
    storage::now_unix_ms,
};

impl SharedState {
    /// One send attempt per pending message per drain; failures are marked
    /// and not retried. The external mail sender consumes from here.
    pub async fn drain_pending_deliveries(&self) -> Result<usize, DomainError> {
        let pending = self.store().list_pending_deliveries().await?;
        let mut drained = 0_usize;

        for message in pending {
            match self.mailer().send(&message).await {
                Ok(()) => {
                    self.store()
                        .mark_delivery_sent(&message.id, now_unix_ms())
                        .await?;
                    drained = drained.saturating_add(1);
                }
                Err(send_error) => {
                    warn!("delivery {} failed: {send_error}", message.id);
                    self.store().mark_delivery_failed(&message.id).await?;
                }
            }
        }

        if drained > 0 {
            info!("drained {drained} pending deliveries");
        }
        Ok(drained)
    }

    pub async fn list_deliveries(
        &self,
        user_id: &str,
    ) -> Result<Vec<DeliveryMessageRecord>, DomainError> {
        self.store().list_deliveries_for_user(user_id).await
    }
}
