use serde::{Deserialize, Serialize};

/// Lifecycle of one player's controller link.
///
/// `Failed` is transient: the slot passes through it during cleanup and
/// always lands back in `Idle`, so callers never observe it between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    AwaitingCharacteristic,
    Subscribing,
    HandshakePending,
    Streaming,
    Disconnecting,
    Failed,
}

impl ConnectionState {
    /// Single source of truth for what counts as "connected".
    ///
    /// `HandshakePending` is included: the link is live, we are merely
    /// acknowledging a hello in the background.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Streaming | Self::HandshakePending)
    }
}

/// Decoded wire code of a single movement notification byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementCode {
    Up,
    Down,
    /// Application-level hello request; consumed by the handshake, never
    /// reflected in the movement intent.
    Hello,
    Stop,
}

/// Which sign `Up` maps to.
///
/// Both polarities have shipped on real hardware, so this is a single
/// configurable sign rather than two code paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementPolarity {
    /// Byte 1 (Up) becomes +1, byte 2 (Down) becomes -1.
    #[default]
    UpIsPositive,
    /// Byte 1 (Up) becomes -1, byte 2 (Down) becomes +1.
    UpIsNegative,
}

impl MovementPolarity {
    /// Movement intent for a decoded code. `Hello` is handled by the state
    /// machine before this is consulted and maps to 0 here.
    pub fn intent(self, code: MovementCode) -> i32 {
        let up = match self {
            Self::UpIsPositive => 1,
            Self::UpIsNegative => -1,
        };
        match code {
            MovementCode::Up => up,
            MovementCode::Down => -up,
            MovementCode::Hello | MovementCode::Stop => 0,
        }
    }
}

/// Asynchronous event from a transport link, tagged with its player slot
/// and the connect attempt that created the link. Events whose generation no
/// longer matches the slot's current attempt are stale and get dropped, so a
/// disconnect queued by an old link can never affect a fresh connection.
#[derive(Debug, Clone)]
pub struct SlotEvent {
    pub slot: usize,
    pub generation: u64,
    pub kind: LinkEvent,
}

#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// One characteristic notification, in delivery order.
    Notification(Vec<u8>),
    /// The physical link dropped, whether user-initiated or link loss.
    /// Fired at most once per connection.
    Disconnected,
}

/// User-facing status line emitted by the registry.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_states() {
        assert!(ConnectionState::Streaming.is_connected());
        assert!(ConnectionState::HandshakePending.is_connected());
        assert!(!ConnectionState::Idle.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Disconnecting.is_connected());
    }

    #[test]
    fn polarity_maps_to_single_sign() {
        let pos = MovementPolarity::UpIsPositive;
        assert_eq!(pos.intent(MovementCode::Up), 1);
        assert_eq!(pos.intent(MovementCode::Down), -1);
        assert_eq!(pos.intent(MovementCode::Stop), 0);
        assert_eq!(pos.intent(MovementCode::Hello), 0);

        let neg = MovementPolarity::UpIsNegative;
        assert_eq!(neg.intent(MovementCode::Up), -1);
        assert_eq!(neg.intent(MovementCode::Down), 1);
        assert_eq!(neg.intent(MovementCode::Stop), 0);
    }
}
