//! BLE transport abstraction.
//!
//! The connection state machine is written against these traits rather than
//! a concrete Bluetooth stack; the real backend lives in
//! [`backend`](super::backend) and tests drive the machine through a scripted
//! mock.
//!
//! Notifications and the disconnect for a link are not callbacks: the
//! backend pushes slot-tagged [`SlotEvent`]s onto one unbounded channel and
//! the registry drains it on the game-loop thread, preserving delivery order.

use crate::domain::models::SlotEvent;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no bluetooth adapter available")]
    NoAdapter,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("characteristic {0} not found on device")]
    CharacteristicNotFound(Uuid),
    #[error("subscription failed: {0}")]
    Subscription(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("operation timed out")]
    Timeout,
}

/// Factory side of a BLE backend: turns a derived service UUID into a live
/// link.
#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    type Link: BleLink;

    /// Discover a peripheral advertising `service_uuid`, connect, and
    /// enumerate the characteristics of that service.
    ///
    /// All asynchronous events of the returned link (notifications,
    /// disconnect) are delivered on `events`, tagged with `slot` and the
    /// caller's `generation` for the attempt.
    async fn connect(
        &self,
        slot: usize,
        generation: u64,
        service_uuid: Uuid,
        events: mpsc::UnboundedSender<SlotEvent>,
    ) -> Result<Self::Link, TransportError>;
}

/// One established peripheral link.
///
/// Methods take `&self`: links are shared behind an `Arc` so a background
/// acknowledgment write never has to hold the slot lock across an await.
#[async_trait]
pub trait BleLink: Send + Sync + 'static {
    /// Characteristics discovered under the connected service.
    fn characteristics(&self) -> Vec<Uuid>;

    /// Start the notification feed for `characteristic`; each received value
    /// arrives as a `LinkEvent::Notification` on the channel given at
    /// connect time, in the order the peripheral sent them.
    async fn subscribe(&self, characteristic: Uuid) -> Result<(), TransportError>;

    /// Single best-effort write, no implicit retry.
    async fn write_value(&self, characteristic: Uuid, payload: &[u8])
        -> Result<(), TransportError>;

    /// Idempotent; safe on an already-dropped link.
    async fn disconnect(&self);

    /// Whatever human-readable name the platform exposes, if any.
    fn device_name(&self) -> Option<String>;
}
