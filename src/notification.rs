//! Notifications pushed by the light over BLE.

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// The last notification received from the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Characteristic handle the data arrived on
    pub handle: u16,
    /// Raw notification payload
    pub payload: Vec<u8>,
}

/// Single-slot sink for device notifications.
///
/// Every call to [`NotificationSink::record`] overwrites the previous
/// record. Nothing is queued: a record not read before the next notification
/// arrives is lost. Clones share the same slot, so the BLE stack's event task
/// can hold one while the connection manager reads from another.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    slot: Arc<watch::Sender<Option<NotificationRecord>>>,
}

impl Default for NotificationSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Store a notification, replacing whatever was there.
    pub fn record(&self, handle: u16, payload: Vec<u8>) {
        debug!(
            "Received notification (handle={}): {:02x?}",
            handle, payload
        );
        self.slot
            .send_replace(Some(NotificationRecord { handle, payload }));
    }

    /// The most recent notification, if any arrived.
    pub fn latest(&self) -> Option<NotificationRecord> {
        self.slot.borrow().clone()
    }

    /// Forget the stored notification.
    pub fn clear(&self) {
        self.slot.send_replace(None);
    }

    /// A receiver that wakes whenever the slot is overwritten.
    pub fn subscribe(&self) -> watch::Receiver<Option<NotificationRecord>> {
        self.slot.subscribe()
    }
}
