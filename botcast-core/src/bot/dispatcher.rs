//! Fan-out of one encoded payload to its targets.

use super::codec::PayloadCodec;
use super::delivery::{DeliveryReport, HttpDelivery};
use super::event_log::EventLog;
use crate::entities::bot::Bot;
use botcast_sdk::objects::EventPayload;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error};

#[derive(Clone)]
pub struct Dispatcher {
    codec: Arc<PayloadCodec>,
    delivery: HttpDelivery,
    log: EventLog,
}

impl Dispatcher {
    pub fn new(codec: Arc<PayloadCodec>, delivery: HttpDelivery, log: EventLog) -> Self {
        Self {
            codec,
            delivery,
            log,
        }
    }

    pub fn codec(&self) -> &PayloadCodec {
        &self.codec
    }

    /// Deliver `payload` to every target concurrently and wait for all of
    /// them. Each delivery appends exactly one log record.
    ///
    /// Nothing is encoded for an empty target list. Reports come back in
    /// completion order.
    pub async fn multicast(
        &self,
        payload: &EventPayload,
        targets: Vec<Arc<Bot>>,
    ) -> Vec<DeliveryReport> {
        if targets.is_empty() {
            return Vec::new();
        }
        let encoded = match self.codec.encode(payload) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(error = %e, event = %payload.kind(), "Failed to encode bot event payload");
                return Vec::new();
            }
        };
        debug!(
            event = %encoded.kind(),
            targets = targets.len(),
            "Multicasting bot event"
        );

        let mut tasks = JoinSet::new();
        for bot in targets {
            let delivery = self.delivery.clone();
            let log = self.log.clone();
            let payload = encoded.clone();
            tasks.spawn(async move {
                let report = delivery.deliver(&bot, &payload).await;
                log.record(&report).await;
                report
            });
        }

        let mut reports = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "Bot event delivery task failed"),
            }
        }
        self.codec.release(encoded);
        reports
    }

    /// Deliver to a single bot on the calling task.
    pub async fn unicast(&self, payload: &EventPayload, bot: &Bot) -> Option<DeliveryReport> {
        let encoded = match self.codec.encode(payload) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(error = %e, bot_id = %bot.id, event = %payload.kind(), "Failed to encode bot event payload");
                return None;
            }
        };
        let report = self.delivery.deliver(bot, &encoded).await;
        self.log.record(&report).await;
        self.codec.release(encoded);
        Some(report)
    }
}
