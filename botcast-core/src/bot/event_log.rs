//! Append-only record of every delivery attempt.

use super::delivery::DeliveryReport;
use crate::entities::event_log::BotEventLog;
use crate::store::{EventLogStore, StoreError};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[derive(Clone)]
pub struct EventLog {
    store: Arc<dyn EventLogStore>,
}

impl EventLog {
    pub fn new(store: Arc<dyn EventLogStore>) -> Self {
        Self { store }
    }

    /// Append one record. A record without a request id is dropped silently.
    pub async fn append(&self, log: BotEventLog) -> Result<(), StoreError> {
        if log.request_id.is_nil() {
            return Ok(());
        }
        self.store.append_event_log(&log).await
    }

    /// Append the record of a finished delivery, logging storage failures.
    pub async fn record(&self, report: &DeliveryReport) {
        if let Err(e) = self.append(report.to_log()).await {
            error!(
                error = %e,
                bot_id = %report.bot_id,
                request_id = %report.request_id,
                "Failed to append bot event log"
            );
        }
    }

    /// Newest first. A negative `limit` means no limit and a negative
    /// `offset` starts from the newest record.
    pub async fn list(
        &self,
        bot_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BotEventLog>, StoreError> {
        let limit = (limit >= 0).then_some(limit);
        self.store
            .list_event_logs(bot_id, limit, offset.max(0))
            .await
    }
}
