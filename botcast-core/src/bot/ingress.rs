//! BotIngress processor.
//!
//! The BotIngress is responsible for:
//! - Receiving every bus event the bot subsystem subscribes to
//! - Running the matching handler on its own task, so a slow delivery never
//!   holds up the bus
//! - Logging handler failures; the bus event counts as consumed either way

use super::handlers::BotEventHandlers;
use crate::events::{BusEvent, EventReceivers};
use kanau::processor::Processor;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

fn topic<E: BusEvent>(_: &E) -> &'static str {
    E::NAME
}

/// Spawn the handler of one received bus event.
macro_rules! spawn_handler {
    ($self:ident, $event:expr) => {{
        let handlers = $self.handlers.clone();
        let event = $event;
        let name = topic(&event);
        debug!(event = ?event, topic = name, "Received bus event");
        $self.tasks.spawn(async move {
            match handlers.process(event).await {
                Ok(reports) => {
                    debug!(topic = name, deliveries = reports.len(), "Bus event handled");
                }
                Err(e) => {
                    error!(topic = name, error = %e, "Bot event handler failed");
                }
            }
        });
    }};
}

pub struct BotIngress {
    handlers: BotEventHandlers,
    receivers: EventReceivers,
    shutdown_rx: watch::Receiver<bool>,
    tasks: JoinSet<()>,
}

impl BotIngress {
    pub fn new(
        handlers: BotEventHandlers,
        receivers: EventReceivers,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            handlers,
            receivers,
            shutdown_rx,
            tasks: JoinSet::new(),
        }
    }

    /// Run until shutdown is signalled.
    ///
    /// Handlers already running are awaited before returning; each of their
    /// deliveries is bounded by the delivery timeout.
    pub async fn run(mut self) {
        info!("BotIngress started");

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("BotIngress received shutdown signal");
                        break;
                    }
                }

                Some(joined) = self.tasks.join_next() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Bot event handler task panicked");
                    }
                }

                Some(event) = self.receivers.bot_ping_request.recv() => spawn_handler!(self, event),
                Some(event) = self.receivers.bot_joined.recv() => spawn_handler!(self, event),
                Some(event) = self.receivers.bot_left.recv() => spawn_handler!(self, event),
                Some(event) = self.receivers.message_created.recv() => spawn_handler!(self, event),
                Some(event) = self.receivers.user_created.recv() => spawn_handler!(self, event),
                Some(event) = self.receivers.channel_created.recv() => spawn_handler!(self, event),
                Some(event) = self.receivers.channel_topic_updated.recv() => spawn_handler!(self, event),
                Some(event) = self.receivers.stamp_created.recv() => spawn_handler!(self, event),
            }
        }

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Bot event handler task panicked");
            }
        }

        info!("BotIngress shutdown complete");
    }
}
