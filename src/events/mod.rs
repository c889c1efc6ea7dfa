use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving half of a bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Domain events published after a mutation has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    StockAdded {
        owner_id: Uuid,
        stock_record_id: Uuid,
        quantity: i64,
    },
    StockUpdated {
        owner_id: Uuid,
        stock_record_id: Uuid,
    },
    StockRemoved {
        owner_id: Uuid,
        stock_record_id: Uuid,
    },
    /// Stock quantity reached zero through consumption and the record was deleted.
    StockDepleted {
        owner_id: Uuid,
        stock_record_id: Uuid,
    },
    StockRestored {
        owner_id: Uuid,
        stock_record_id: Uuid,
        restored_quantity: i64,
        new_quantity: i64,
    },
    ConsumptionLogged {
        owner_id: Uuid,
        consumption_id: Uuid,
        stock_record_id: Uuid,
        quantity: i64,
        remaining: i64,
        at: DateTime<Utc>,
    },
    ConsumptionUpdated {
        owner_id: Uuid,
        consumption_id: Uuid,
        old_quantity: i64,
        new_quantity: i64,
    },
    ConsumptionDeleted {
        owner_id: Uuid,
        consumption_id: Uuid,
        stock_restored: bool,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StockAdded { .. } => "stock_added",
            Event::StockUpdated { .. } => "stock_updated",
            Event::StockRemoved { .. } => "stock_removed",
            Event::StockDepleted { .. } => "stock_depleted",
            Event::StockRestored { .. } => "stock_restored",
            Event::ConsumptionLogged { .. } => "consumption_logged",
            Event::ConsumptionUpdated { .. } => "consumption_updated",
            Event::ConsumptionDeleted { .. } => "consumption_deleted",
        }
    }

    pub fn owner_id(&self) -> Uuid {
        match self {
            Event::StockAdded { owner_id, .. }
            | Event::StockUpdated { owner_id, .. }
            | Event::StockRemoved { owner_id, .. }
            | Event::StockDepleted { owner_id, .. }
            | Event::StockRestored { owner_id, .. }
            | Event::ConsumptionLogged { owner_id, .. }
            | Event::ConsumptionUpdated { owner_id, .. }
            | Event::ConsumptionDeleted { owner_id, .. } => *owner_id,
        }
    }
}

/// Publishes `event` if a sender is configured. Failures are logged only:
/// the mutation that produced the event has already been committed.
pub(crate) async fn publish(sender: Option<&EventSender>, event: Event) {
    if let Some(sender) = sender {
        let name = event.name();
        if let Err(e) = sender.send(event).await {
            warn!(error = %e, event = name, "Failed to publish event");
        }
    }
}

/// Drains the event channel, logging and counting every event.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("pantry.events.processed", 1, "event" => event.name());

        match &event {
            Event::StockDepleted {
                owner_id,
                stock_record_id,
            } => {
                info!(owner_id = %owner_id, stock_record_id = %stock_record_id, "Stock fully consumed");
            }
            Event::StockRestored {
                stock_record_id,
                restored_quantity,
                new_quantity,
                ..
            } => {
                info!(
                    stock_record_id = %stock_record_id,
                    restored_quantity,
                    new_quantity,
                    "Stock restored from deleted consumption"
                );
            }
            other => {
                info!(event = other.name(), owner_id = %other.owner_id(), "Received event");
            }
        }
    }

    info!("Event channel closed, stopping event processing loop");
}
