use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

/// Domain events emitted by the checkout/order core after a successful
/// commit. Consumers (notifications, analytics) subscribe out of band; the
/// core only guarantees best-effort delivery after the transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCanceled {
        order_id: Uuid,
        canceled_at: DateTime<Utc>,
    },
    InventoryDecremented {
        variant_id: Uuid,
        quantity: i32,
    },
    InventoryRestored {
        variant_id: Uuid,
        quantity: i32,
    },
    VoucherRedeemed {
        voucher_id: Uuid,
        user_id: Uuid,
    },
    VoucherReleased {
        voucher_id: Uuid,
    },
    VoucherSaved {
        voucher_id: Uuid,
        user_id: Uuid,
    },
    FlashSalePurchaseRecorded {
        flash_sale_id: Uuid,
        user_id: Uuid,
        quantity: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel and logs each event. Runs for the lifetime of
/// the process; exits when all senders are dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = %payload, "Processing event"),
            Err(e) => error!(error = %e, "Failed to serialize event"),
        }
    }
    info!("Event channel closed; event processor shutting down");
}
