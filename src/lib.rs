//! BLE connectivity core for the Pong installation.
//!
//! Physical paddle controllers (one button set per player) advertise a
//! per-device BLE service; this crate derives those UUIDs, manages the
//! connection lifecycle of every player slot, decodes the single-byte
//! movement protocol, and exposes per-frame movement values to the game
//! loop through [`ConnectionRegistry`].

pub mod domain;
pub mod infrastructure;

pub use domain::models::{
    ConnectionState, LinkEvent, MessageSeverity, MovementCode, MovementPolarity, SlotEvent,
    StatusMessage,
};
pub use domain::roster::PlayerRoster;
pub use domain::settings::{LogSettings, Settings, SettingsService};
pub use infrastructure::bluetooth::backend::BtleplugTransport;
pub use infrastructure::bluetooth::protocol::{self, ProtocolError};
pub use infrastructure::bluetooth::registry::{ConnectionRegistry, RegistryConfig};
pub use infrastructure::bluetooth::transport::{BleLink, BleTransport, TransportError};
pub use infrastructure::logging;
