//! Bluetooth Module
//!
//! Controller connectivity for the Pong installation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ConnectionRegistry                      │
//! │   (single owner of all slots - public API for the game)  │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐
//! │   Slot    │  │ Transport  │  │ Protocol │
//! │           │  │            │  │          │
//! │ - State   │  │ - btleplug │  │ - UUIDs  │
//! │   machine │  │   backend  │  │ - Wire   │
//! │ - Tickets │  │ - Mock     │  │   codes  │
//! └───────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - UUID derivation and the single-byte movement protocol
//! - [`transport`] - Backend-agnostic transport traits
//! - [`backend`] - btleplug implementation of the transport
//! - [`slot`] - Per-player connection state machine
//! - [`registry`] - Facade the game loop talks to

pub mod backend;
#[cfg(test)]
pub mod mock;
pub mod protocol;
pub mod registry;
pub mod slot;
pub mod transport;

pub use registry::{ConnectionRegistry, RegistryConfig};
