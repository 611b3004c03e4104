//! Per-player connection state machine.
//!
//! One [`PlayerSlot`] exists per player for the whole process lifetime and
//! cycles through connect/disconnect many times. All methods here are
//! synchronous transitions executed under the registry's slot lock; the
//! asynchronous transport work happens in registry-spawned tasks that report
//! back through the ticket types below.
//!
//! Two disciplines keep the slot safe against the usual BLE hazards:
//!
//! - `operation_in_flight` is set before the first suspension point of any
//!   transport call and cleared on every resolution path, so a double-click
//!   can never start an overlapping connect or write for the same slot.
//! - `generation` is bumped by every connect attempt and every disconnect.
//!   A completion carrying a stale generation is ignored (and hands its link
//!   back for teardown), so a disconnect issued while a connect is still
//!   pending cannot race the slot into a half-connected state.

use crate::domain::models::{ConnectionState, MovementCode, MovementPolarity};
use crate::infrastructure::bluetooth::protocol::{
    derive_characteristic_uuid, derive_service_uuid, ProtocolError,
};
use crate::infrastructure::bluetooth::transport::BleLink;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handed to the connect task; identifies the attempt it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub generation: u64,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
}

/// Handed to a background write task (handshake ack, identify pattern).
pub struct WriteTicket<L> {
    pub generation: u64,
    pub link: Arc<L>,
    pub characteristic: Uuid,
}

pub struct PlayerSlot<L: BleLink> {
    index: usize,
    state: ConnectionState,
    device_number: Option<u8>,
    characteristic_uuid: Option<Uuid>,
    movement_intent: i32,
    move_multiplier: i32,
    display_name: Option<String>,
    handshake_acknowledged: bool,
    operation_in_flight: bool,
    generation: u64,
    link: Option<Arc<L>>,
}

impl<L: BleLink> PlayerSlot<L> {
    pub fn new(index: usize, move_multiplier: i32) -> Self {
        Self {
            index,
            state: ConnectionState::Idle,
            device_number: None,
            characteristic_uuid: None,
            movement_intent: 0,
            move_multiplier,
            display_name: None,
            handshake_acknowledged: false,
            operation_in_flight: false,
            generation: 0,
            link: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Scaled movement; 0 whenever the slot is not streaming.
    pub fn movement(&self) -> i32 {
        if self.state.is_connected() {
            self.movement_intent * self.move_multiplier
        } else {
            0
        }
    }

    pub fn move_multiplier(&self) -> i32 {
        self.move_multiplier
    }

    pub fn set_move_multiplier(&mut self, multiplier: i32) {
        self.move_multiplier = multiplier;
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn device_number(&self) -> Option<u8> {
        self.device_number
    }

    pub fn handshake_acknowledged(&self) -> bool {
        self.handshake_acknowledged
    }

    pub fn operation_in_flight(&self) -> bool {
        self.operation_in_flight
    }

    /// Current attempt generation; link events carrying an older one are
    /// stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a connect attempt.
    ///
    /// Returns `Ok(None)` when the request is dropped because the slot is
    /// busy or not idle; accidental double-clicks are logged, never surfaced
    /// as errors. An out-of-range device number fails immediately; no
    /// operation is started and no flag is set.
    pub fn begin_connect(
        &mut self,
        device_number: u8,
    ) -> Result<Option<ConnectAttempt>, ProtocolError> {
        if self.operation_in_flight {
            warn!(
                "Slot {}: connect request ignored, operation already in progress",
                self.index
            );
            return Ok(None);
        }
        if self.state != ConnectionState::Idle {
            warn!(
                "Slot {}: connect request ignored in state {:?}",
                self.index, self.state
            );
            return Ok(None);
        }

        let service_uuid = derive_service_uuid(device_number)?;
        let characteristic_uuid = derive_characteristic_uuid(device_number)?;

        self.generation += 1;
        self.operation_in_flight = true;
        self.state = ConnectionState::Connecting;
        self.device_number = Some(device_number);
        self.characteristic_uuid = Some(characteristic_uuid);

        debug!(
            "Slot {}: connecting to device #{} (service {})",
            self.index, device_number, service_uuid
        );
        Ok(Some(ConnectAttempt {
            generation: self.generation,
            service_uuid,
            characteristic_uuid,
        }))
    }

    /// Progress marker from the connect task; ignored when stale.
    pub fn mark_progress(&mut self, generation: u64, state: ConnectionState) {
        if generation == self.generation && self.operation_in_flight {
            self.state = state;
        }
    }

    /// Install the link and enter `Streaming`.
    ///
    /// A stale completion (superseded by a disconnect or a newer attempt)
    /// gets its link back so the caller can tear it down.
    pub fn complete_connect(
        &mut self,
        generation: u64,
        link: Arc<L>,
        display_name: String,
    ) -> Result<(), Arc<L>> {
        if generation != self.generation || !self.operation_in_flight {
            debug!("Slot {}: dropping superseded connect result", self.index);
            return Err(link);
        }

        self.link = Some(link);
        self.display_name = Some(display_name);
        self.movement_intent = 0;
        self.handshake_acknowledged = false;
        self.state = ConnectionState::Streaming;
        self.operation_in_flight = false;
        info!("Slot {}: streaming", self.index);
        Ok(())
    }

    /// Resolve a failed operation: pass through `Failed` and recover to
    /// `Idle` immediately. The slot is reusable as soon as this returns.
    pub fn fail_operation(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }
        self.generation += 1;
        self.state = ConnectionState::Failed;
        self.cleanup_to_idle();
    }

    /// Transport-reported disconnect. Idempotent; converges with the
    /// explicit-disconnect path on the same cleanup. Returns whether the
    /// slot actually held a connection.
    pub fn handle_disconnected(&mut self) -> bool {
        if self.state == ConnectionState::Idle && self.link.is_none() && !self.operation_in_flight
        {
            return false;
        }
        self.generation += 1;
        let was_connected = self.state.is_connected();
        self.cleanup_to_idle();
        was_connected
    }

    /// Explicit disconnect request. Safe in any state: a pending operation
    /// is invalidated by the generation bump and will discard its own
    /// result. Returns the link, if any, so the caller can close it.
    pub fn begin_disconnect(&mut self) -> Option<Arc<L>> {
        if self.state == ConnectionState::Idle && self.link.is_none() && !self.operation_in_flight
        {
            debug!("Slot {}: already idle, disconnect is a no-op", self.index);
            return None;
        }
        self.generation += 1;
        self.state = ConnectionState::Disconnecting;
        let link = self.link.take();
        self.cleanup_to_idle();
        link
    }

    fn cleanup_to_idle(&mut self) {
        self.movement_intent = 0;
        self.handshake_acknowledged = false;
        self.operation_in_flight = false;
        self.link = None;
        self.display_name = None;
        self.state = ConnectionState::Idle;
    }

    /// Apply a decoded movement code. `Hello` never reaches this point; the
    /// registry routes it into [`begin_handshake`](Self::begin_handshake).
    pub fn apply_movement(&mut self, code: MovementCode, polarity: MovementPolarity) {
        if self.state.is_connected() {
            self.movement_intent = polarity.intent(code);
        }
    }

    /// React to a decoded hello: enter `HandshakePending` and hand out a
    /// ticket for the acknowledgment write. `None` when not streaming or a
    /// write is already outstanding (the device will simply say hello again).
    pub fn begin_handshake(&mut self) -> Option<WriteTicket<L>> {
        if self.state != ConnectionState::Streaming || self.operation_in_flight {
            debug!(
                "Slot {}: hello ignored in state {:?} (busy: {})",
                self.index, self.state, self.operation_in_flight
            );
            return None;
        }
        let (link, characteristic) = match (self.link.clone(), self.characteristic_uuid) {
            (Some(link), Some(characteristic)) => (link, characteristic),
            _ => return None,
        };
        self.state = ConnectionState::HandshakePending;
        self.operation_in_flight = true;
        Some(WriteTicket {
            generation: self.generation,
            link,
            characteristic,
        })
    }

    /// Acknowledgment write completed; movement intent is left untouched.
    pub fn finish_handshake(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }
        self.operation_in_flight = false;
        self.handshake_acknowledged = true;
        if self.state == ConnectionState::HandshakePending {
            self.state = ConnectionState::Streaming;
        }
        info!("Slot {}: handshake acknowledged", self.index);
    }

    /// Claim the link for the identify flash pattern. Guarded like any
    /// other write; state stays `Streaming`.
    pub fn begin_identify(&mut self) -> Option<WriteTicket<L>> {
        if !self.state.is_connected() || self.operation_in_flight {
            info!(
                "Slot {}: identify skipped (state {:?}, busy: {})",
                self.index, self.state, self.operation_in_flight
            );
            return None;
        }
        let (link, characteristic) = match (self.link.clone(), self.characteristic_uuid) {
            (Some(link), Some(characteristic)) => (link, characteristic),
            _ => return None,
        };
        self.operation_in_flight = true;
        Some(WriteTicket {
            generation: self.generation,
            link,
            characteristic,
        })
    }

    /// Identify sequence finished (or gave up); failures are diagnostic
    /// noise, not a reason to drop the link.
    pub fn finish_identify(&mut self, generation: u64) {
        if generation == self.generation {
            self.operation_in_flight = false;
        }
    }
}
