//! Pong Controller Protocol
//!
//! UUID derivation and the single-byte movement protocol shared by every
//! paddle controller.
//!
//! Each physical device advertises a service whose UUID differs from the
//! base prefix only in the final byte, so up to [`MAX_DEVICE_NUMBER`]
//! controllers can be addressed without a manual pairing table:
//!
//! ```text
//! service        19b10010-e8f2-537e-4f6c-d104768a12XX
//! characteristic 19b10011-e8f2-537e-4f6c-d104768a12XX
//! XX = 0x0d + device number   (device 1 -> 0e, device 25 -> 26)
//! ```
//!
//! Wire protocol (peripheral -> host, one byte per notification):
//!
//! | Byte  | Meaning                   |
//! |-------|---------------------------|
//! | 1     | Up                        |
//! | 2     | Down                      |
//! | 3     | Hello / handshake request |
//! | other | Stop (neutral)            |
//!
//! The host answers a Hello by writing [`HELLO_ACK`] back on the same
//! characteristic.

use crate::domain::models::MovementCode;
use thiserror::Error;
use uuid::Uuid;

/// Base service UUID; the low byte is replaced per device.
const SERVICE_UUID_BASE: u128 = 0x19b10010_e8f2_537e_4f6c_d104768a1200;
/// Base movement characteristic UUID; the low byte is replaced per device.
const CHARACTERISTIC_UUID_BASE: u128 = 0x19b10011_e8f2_537e_4f6c_d104768a1200;

/// Device 1 gets suffix 0x0e.
const DEVICE_SUFFIX_OFFSET: u8 = 0x0d;

/// Highest device number the suffix scheme is provisioned for.
pub const MAX_DEVICE_NUMBER: u8 = 25;

/// Byte written back to the device to acknowledge a Hello.
pub const HELLO_ACK: u8 = 3;

/// Diagnostic flash/buzz pattern: alternating movement codes ending on stop.
pub const IDENTIFY_SEQUENCE: [u8; 5] = [1, 2, 1, 2, 0];

/// Spacing between identify writes, in milliseconds.
pub const IDENTIFY_STEP_DELAY_MS: u64 = 100;

/// Delay before the hello acknowledgment write; issuing it straight from the
/// notification path races the peripheral's own GATT activity.
pub const HANDSHAKE_ACK_DELAY_MS: u64 = 100;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("device number {0} is outside the supported range 1-{MAX_DEVICE_NUMBER}")]
    InvalidDeviceIndex(u8),
}

fn derive_uuid(base: u128, device_number: u8) -> Result<Uuid, ProtocolError> {
    if device_number == 0 || device_number > MAX_DEVICE_NUMBER {
        return Err(ProtocolError::InvalidDeviceIndex(device_number));
    }
    Ok(Uuid::from_u128(
        base | u128::from(DEVICE_SUFFIX_OFFSET + device_number),
    ))
}

/// Service UUID advertised by the given device number.
pub fn derive_service_uuid(device_number: u8) -> Result<Uuid, ProtocolError> {
    derive_uuid(SERVICE_UUID_BASE, device_number)
}

/// Movement characteristic UUID of the given device number.
pub fn derive_characteristic_uuid(device_number: u8) -> Result<Uuid, ProtocolError> {
    derive_uuid(CHARACTERISTIC_UUID_BASE, device_number)
}

/// Decode one notification byte. Unknown values are neutral, not errors;
/// controllers send 0 for "released" and firmware variants have used other
/// spare values.
pub fn decode(byte: u8) -> MovementCode {
    match byte {
        1 => MovementCode::Up,
        2 => MovementCode::Down,
        3 => MovementCode::Hello,
        _ => MovementCode::Stop,
    }
}
