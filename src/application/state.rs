use std::{sync::Arc, time::Instant};

use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::{
    application::config::RuntimeConfig,
    domain::{error::DomainError, models::UserRecord},
    interfaces::mailer::Mailer,
    storage::{FileBlobStore, SqliteStore, now_unix_ms},
};

/// Shared handle over the durable store, export storage, and the outbound
/// mailer. Engine operations live in sibling modules (`medications`,
/// `scheduler`, `reports`, `delivery`) as further impl blocks on this type.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<InnerState>,
}

struct InnerState {
    config: RuntimeConfig,
    store: SqliteStore,
    exports: FileBlobStore,
    mailer: Mailer,
    started_at: Instant,
    scheduler_last_tick_ms: RwLock<Option<u64>>,
}

impl SharedState {
    pub async fn new(config: RuntimeConfig) -> Result<Self, DomainError> {
        let store = SqliteStore::connect(&config.db_path).await?;
        let exports = FileBlobStore::open(&config.export_dir).await?;
        let mailer = Mailer::from_config(&config);

        Ok(Self {
            inner: Arc::new(InnerState {
                store,
                exports,
                mailer,
                started_at: Instant::now(),
                scheduler_last_tick_ms: RwLock::new(None),
                config,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn store(&self) -> &SqliteStore {
        &self.inner.store
    }

    pub(crate) fn exports(&self) -> &FileBlobStore {
        &self.inner.exports
    }

    pub(crate) fn mailer(&self) -> &Mailer {
        &self.inner.mailer
    }

    #[must_use]
    pub fn uptime_ms(&self) -> u64 {
        u64::try_from(self.inner.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub(crate) async fn record_scheduler_tick(&self, ts_ms: u64) {
        let mut last_tick = self.inner.scheduler_last_tick_ms.write().await;
        *last_tick = Some(ts_ms);
    }

    pub async fn health_payload(&self) -> Result<Value, DomainError> {
        let users = self.inner.store.count_users().await?;
        let medications = self.inner.store.count_medications().await?;
        let jobs = self.inner.store.count_scheduled_jobs().await?;
        let pending_deliveries = self.inner.store.count_pending_deliveries().await?;
        let reports = self.inner.store.count_reports().await?;
        let last_tick_ms = *self.inner.scheduler_last_tick_ms.read().await;

        Ok(json!({
            "ok": true,
            "ts": now_unix_ms(),
            "runtime": "rust",
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeMs": self.uptime_ms(),
            "users": users,
            "medications": medications,
            "scheduledJobs": jobs,
            "pendingDeliveries": pending_deliveries,
            "reports": reports,
            "schedulerLastTickMs": last_tick_ms,
            "schedulerPollIntervalMs": self.config().scheduler_poll_interval.as_millis(),
        }))
    }

    pub async fn upsert_user(&self, user: &UserRecord) -> Result<(), DomainError> {
        self.inner.store.upsert_user(user).await
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, DomainError> {
        self.inner.store.get_user(id).await
    }

    pub async fn put_session(&self, session_id: &str, user_id: &str) -> Result<(), DomainError> {
        self.inner
            .store
            .put_session(session_id, user_id, now_unix_ms())
            .await
    }

    pub async fn find_user_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<UserRecord>, DomainError> {
        self.inner.store.find_user_by_session(session_id).await
    }

    pub async fn read_export(&self, export_id: &str) -> Result<Option<String>, DomainError> {
        self.inner.exports.read_csv(export_id).await
    }
}
