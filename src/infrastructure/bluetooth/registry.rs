//! Connection registry: the single owner of all player slots.
//!
//! The game loop talks only to this type. Every public method is synchronous
//! and returns immediately; transport work runs in spawned tasks that report
//! back through slot generations (see [`slot`](super::slot)) and the shared
//! event channel. Call [`process_events`](ConnectionRegistry::process_events)
//! once per frame to drain pending notifications and disconnects, then read
//! [`movement_for`](ConnectionRegistry::movement_for) per slot.

use crate::domain::models::{
    ConnectionState, LinkEvent, MessageSeverity, MovementCode, MovementPolarity, SlotEvent,
    StatusMessage,
};
use crate::domain::roster::PlayerRoster;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::protocol::{
    self, HANDSHAKE_ACK_DELAY_MS, HELLO_ACK, IDENTIFY_SEQUENCE, IDENTIFY_STEP_DELAY_MS,
};
use crate::infrastructure::bluetooth::slot::{ConnectAttempt, PlayerSlot};
use crate::infrastructure::bluetooth::transport::{BleLink, BleTransport, TransportError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub player_count: usize,
    pub polarity: MovementPolarity,
    pub connect_timeout: Duration,
    pub points_to_win: u32,
    pub move_multipliers: Vec<i32>,
    pub placeholder_names: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for RegistryConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            player_count: settings.player_count,
            polarity: settings.polarity,
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            points_to_win: settings.points_to_win,
            move_multipliers: settings.move_multipliers.clone(),
            placeholder_names: settings.placeholder_names.clone(),
        }
    }
}

pub struct ConnectionRegistry<T: BleTransport> {
    transport: Arc<T>,
    config: RegistryConfig,
    roster: PlayerRoster,
    slots: Vec<Arc<Mutex<PlayerSlot<T::Link>>>>,
    events_tx: mpsc::UnboundedSender<SlotEvent>,
    events_rx: mpsc::UnboundedReceiver<SlotEvent>,
    status_tx: mpsc::UnboundedSender<StatusMessage>,
    status_rx: mpsc::UnboundedReceiver<StatusMessage>,
}

impl<T: BleTransport> ConnectionRegistry<T> {
    pub fn new(transport: T, roster: PlayerRoster, config: RegistryConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let slots = (1..=config.player_count)
            .map(|index| {
                let multiplier = config
                    .move_multipliers
                    .get(index - 1)
                    .copied()
                    .unwrap_or(crate::domain::settings::DEFAULT_MULTIPLIER);
                Arc::new(Mutex::new(PlayerSlot::new(index, multiplier)))
            })
            .collect();

        Self {
            transport: Arc::new(transport),
            config,
            roster,
            slots,
            events_tx,
            events_rx,
            status_tx,
            status_rx,
        }
    }

    pub fn player_count(&self) -> usize {
        self.slots.len()
    }

    pub fn points_to_win(&self) -> u32 {
        self.config.points_to_win
    }

    fn slot(&self, index: usize) -> Option<&Arc<Mutex<PlayerSlot<T::Link>>>> {
        index.checked_sub(1).and_then(|i| self.slots.get(i))
    }

    fn push_status(&self, severity: MessageSeverity, message: String) {
        let _ = self.status_tx.send(StatusMessage { message, severity });
    }

    /// Start connecting `slot` to the controller with `device_number`.
    ///
    /// Returns immediately. An out-of-range device number is the one error
    /// surfaced to the caller; a busy or unknown slot is logged and dropped.
    pub fn request_connect(
        &self,
        slot: usize,
        device_number: u8,
    ) -> Result<(), protocol::ProtocolError> {
        let Some(slot_arc) = self.slot(slot) else {
            warn!("Connect requested for unknown slot {}", slot);
            return Ok(());
        };

        let attempt = slot_arc
            .lock()
            .expect("slot mutex poisoned")
            .begin_connect(device_number)?;
        let Some(attempt) = attempt else {
            return Ok(());
        };

        info!("Slot {}: connect requested for device #{}", slot, device_number);
        let display_name = self
            .roster
            .name_for(device_number)
            .map(str::to_string);

        let transport = Arc::clone(&self.transport);
        let slot_arc = Arc::clone(slot_arc);
        let events = self.events_tx.clone();
        let status = self.status_tx.clone();
        let timeout = self.config.connect_timeout;
        tokio::spawn(async move {
            run_connect(
                transport,
                slot_arc,
                slot,
                attempt,
                device_number,
                display_name,
                events,
                status,
                timeout,
            )
            .await;
        });
        Ok(())
    }

    /// Tear down `slot`'s connection. Safe to call in any state, including
    /// mid-connect; repeated calls are no-ops.
    pub fn request_disconnect(&self, slot: usize) {
        let Some(slot_arc) = self.slot(slot) else {
            return;
        };
        let (name, link) = {
            let mut guard = slot_arc.lock().expect("slot mutex poisoned");
            let name = guard.display_name().map(str::to_string);
            (name, guard.begin_disconnect())
        };
        let Some(link) = link else {
            return;
        };
        info!("Slot {}: disconnecting", slot);
        self.push_status(
            MessageSeverity::Info,
            format!(
                "{} disconnected",
                name.unwrap_or_else(|| format!("Player {}", slot))
            ),
        );
        tokio::spawn(async move {
            link.disconnect().await;
        });
    }

    pub fn disconnect_all(&self) {
        for slot in 1..=self.slots.len() {
            self.request_disconnect(slot);
        }
    }

    /// Flash the controller on `slot` so a player can tell which physical
    /// device their slot is bound to.
    pub fn identify(&self, slot: usize) {
        let Some(slot_arc) = self.slot(slot) else {
            return;
        };
        let Some(ticket) = slot_arc
            .lock()
            .expect("slot mutex poisoned")
            .begin_identify()
        else {
            return;
        };

        info!("Slot {}: running identify pattern", slot);
        let slot_arc = Arc::clone(slot_arc);
        tokio::spawn(async move {
            for &step in IDENTIFY_SEQUENCE.iter() {
                if let Err(e) = ticket
                    .link
                    .write_value(ticket.characteristic, &[step])
                    .await
                {
                    warn!("Slot {}: identify write failed: {}", slot, e);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(IDENTIFY_STEP_DELAY_MS)).await;
            }
            slot_arc
                .lock()
                .expect("slot mutex poisoned")
                .finish_identify(ticket.generation);
        });
    }

    /// Drain pending transport events. Call once per frame, before reading
    /// movement.
    pub fn process_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.route_event(event);
        }
    }

    fn route_event(&self, event: SlotEvent) {
        let Some(slot_arc) = self.slot(event.slot) else {
            warn!("Dropping event for unknown slot {}", event.slot);
            return;
        };
        // An event queued by a superseded link must not touch the slot.
        let current = slot_arc
            .lock()
            .expect("slot mutex poisoned")
            .generation();
        if event.generation != current {
            debug!("Slot {}: dropping stale {:?}", event.slot, event.kind);
            return;
        }
        match event.kind {
            LinkEvent::Notification(payload) => {
                let byte = payload.first().copied().unwrap_or(0);
                let code = protocol::decode(byte);
                if code == MovementCode::Hello {
                    self.spawn_handshake(event.slot, slot_arc);
                } else {
                    slot_arc
                        .lock()
                        .expect("slot mutex poisoned")
                        .apply_movement(code, self.config.polarity);
                }
            }
            LinkEvent::Disconnected => {
                let (name, was_connected) = {
                    let mut guard = slot_arc.lock().expect("slot mutex poisoned");
                    let name = guard.display_name().map(str::to_string);
                    (name, guard.handle_disconnected())
                };
                if was_connected {
                    warn!("Slot {}: link lost", event.slot);
                    self.push_status(
                        MessageSeverity::Warning,
                        format!(
                            "{} disconnected",
                            name.unwrap_or_else(|| format!("Player {}", event.slot))
                        ),
                    );
                } else {
                    debug!("Slot {}: disconnect event on idle slot", event.slot);
                }
            }
        }
    }

    fn spawn_handshake(&self, slot: usize, slot_arc: &Arc<Mutex<PlayerSlot<T::Link>>>) {
        let Some(ticket) = slot_arc
            .lock()
            .expect("slot mutex poisoned")
            .begin_handshake()
        else {
            return;
        };

        debug!("Slot {}: hello received, scheduling acknowledgment", slot);
        let slot_arc = Arc::clone(slot_arc);
        let status = self.status_tx.clone();
        tokio::spawn(async move {
            // Writing straight out of the notification path races the
            // peripheral's own GATT activity; give it a beat.
            tokio::time::sleep(Duration::from_millis(HANDSHAKE_ACK_DELAY_MS)).await;
            match ticket
                .link
                .write_value(ticket.characteristic, &[HELLO_ACK])
                .await
            {
                Ok(()) => {
                    slot_arc
                        .lock()
                        .expect("slot mutex poisoned")
                        .finish_handshake(ticket.generation);
                }
                Err(e) => {
                    warn!("Slot {}: handshake write failed: {}", slot, e);
                    ticket.link.disconnect().await;
                    slot_arc
                        .lock()
                        .expect("slot mutex poisoned")
                        .fail_operation(ticket.generation);
                    let _ = status.send(StatusMessage {
                        message: format!("Player {} dropped: handshake failed ({})", slot, e),
                        severity: MessageSeverity::Error,
                    });
                }
            }
        });
    }

    /// Next queued user-facing status line, if any.
    pub fn poll_status(&mut self) -> Option<StatusMessage> {
        self.status_rx.try_recv().ok()
    }

    /// Scaled movement for the frame; 0 for disconnected or unknown slots.
    pub fn movement_for(&self, slot: usize) -> i32 {
        self.slot(slot)
            .map(|s| s.lock().expect("slot mutex poisoned").movement())
            .unwrap_or(0)
    }

    pub fn is_connected(&self, slot: usize) -> bool {
        self.slot(slot)
            .map(|s| s.lock().expect("slot mutex poisoned").is_connected())
            .unwrap_or(false)
    }

    pub fn connection_state(&self, slot: usize) -> ConnectionState {
        self.slot(slot)
            .map(|s| s.lock().expect("slot mutex poisoned").state())
            .unwrap_or(ConnectionState::Idle)
    }

    pub fn handshake_acknowledged(&self, slot: usize) -> bool {
        self.slot(slot)
            .map(|s| s.lock().expect("slot mutex poisoned").handshake_acknowledged())
            .unwrap_or(false)
    }

    /// Connected player's name, or the configured placeholder while the
    /// slot is empty.
    pub fn display_name_for(&self, slot: usize) -> String {
        if let Some(slot_arc) = self.slot(slot) {
            if let Some(name) = slot_arc
                .lock()
                .expect("slot mutex poisoned")
                .display_name()
                .map(str::to_string)
            {
                return name;
            }
        }
        slot.checked_sub(1)
            .and_then(|i| self.config.placeholder_names.get(i))
            .cloned()
            .unwrap_or_default()
    }

    pub fn move_multiplier(&self, slot: usize) -> i32 {
        self.slot(slot)
            .map(|s| s.lock().expect("slot mutex poisoned").move_multiplier())
            .unwrap_or(crate::domain::settings::DEFAULT_MULTIPLIER)
    }

    /// Takes effect on the next movement read; no reconnect needed.
    pub fn set_move_multiplier(&self, slot: usize, multiplier: i32) {
        if let Some(slot_arc) = self.slot(slot) {
            slot_arc
                .lock()
                .expect("slot mutex poisoned")
                .set_move_multiplier(multiplier);
        }
    }
}

/// The asynchronous half of a connect attempt: resolve the link, verify the
/// movement characteristic, subscribe, then hand the result back to the slot.
#[allow(clippy::too_many_arguments)]
async fn run_connect<T: BleTransport>(
    transport: Arc<T>,
    slot_arc: Arc<Mutex<PlayerSlot<T::Link>>>,
    slot: usize,
    attempt: ConnectAttempt,
    device_number: u8,
    display_name: Option<String>,
    events: mpsc::UnboundedSender<SlotEvent>,
    status: mpsc::UnboundedSender<StatusMessage>,
    timeout: Duration,
) {
    // The sequence runs as its own task so that a timeout does not cancel it
    // mid-flight and strand a half-established link: when the timeout wins,
    // the task is left to finish and whatever link it produced is closed.
    let mut sequence_task = tokio::spawn({
        let transport = Arc::clone(&transport);
        let slot_arc = Arc::clone(&slot_arc);
        async move {
            let link = transport
                .connect(slot, attempt.generation, attempt.service_uuid, events)
                .await?;
            slot_arc
                .lock()
                .expect("slot mutex poisoned")
                .mark_progress(attempt.generation, ConnectionState::AwaitingCharacteristic);

            if !link.characteristics().contains(&attempt.characteristic_uuid) {
                link.disconnect().await;
                return Err(TransportError::CharacteristicNotFound(
                    attempt.characteristic_uuid,
                ));
            }

            slot_arc
                .lock()
                .expect("slot mutex poisoned")
                .mark_progress(attempt.generation, ConnectionState::Subscribing);
            if let Err(e) = link.subscribe(attempt.characteristic_uuid).await {
                link.disconnect().await;
                return Err(e);
            }
            Ok(link)
        }
    });

    let outcome = match tokio::time::timeout(timeout, &mut sequence_task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(TransportError::Connection(join_error.to_string())),
        Err(_) => {
            tokio::spawn(async move {
                if let Ok(Ok(link)) = sequence_task.await {
                    link.disconnect().await;
                }
            });
            Err(TransportError::Timeout)
        }
    };

    match outcome {
        Ok(link) => {
            let name = display_name
                .or_else(|| link.device_name())
                .unwrap_or_else(|| format!("Player #{}", device_number));
            let link = Arc::new(link);
            let stale = slot_arc
                .lock()
                .expect("slot mutex poisoned")
                .complete_connect(attempt.generation, link, name.clone());
            match stale {
                Ok(()) => {
                    info!("Slot {}: connected to {}", slot, name);
                    let _ = status.send(StatusMessage {
                        message: format!("Connected to {}", name),
                        severity: MessageSeverity::Success,
                    });
                }
                Err(superseded) => {
                    // A disconnect (or newer attempt) won the race; this link
                    // must not be left open.
                    superseded.disconnect().await;
                }
            }
        }
        Err(e) => {
            warn!("Slot {}: connect to device #{} failed: {}", slot, device_number, e);
            slot_arc
                .lock()
                .expect("slot mutex poisoned")
                .fail_operation(attempt.generation);
            let _ = status.send(StatusMessage {
                message: format!(
                    "Failed to connect to Player #{}: {}. Check the controller is powered on and in range.",
                    device_number, e
                ),
                severity: MessageSeverity::Error,
            });
        }
    }
}
