//! Protocol module - Defines the Z21 LAN wire protocol
//!
//! Every telegram has the same shape:
//! - 1 byte total length (including the length byte itself)
//! - 1 byte 0x00
//! - 1 byte header (the command group)
//! - 1 byte 0x00
//! - Variable length payload, optionally closed by an XOR checksum
//!
//! Several telegrams may be packed back to back into one UDP datagram.

mod address;
mod codec;
mod command;
mod decode;
mod message;

pub use address::*;
pub use codec::*;
pub use command::*;
pub use decode::*;
pub use message::*;

/// Default UDP port of the command station
pub const DEFAULT_PORT: u16 = 21105;

/// Smallest telegram the station can send: length, 0x00, header, 0x00
pub const MIN_TELEGRAM_LEN: usize = 4;

/// Highest speed step in 128-step mode
pub const MAX_SPEED_STEP: u8 = 127;

/// Command group bytes (telegram[2])
pub mod group {
    pub const SERIAL_NUMBER: u8 = 0x10;
    pub const LAN_CODE: u8 = 0x18;
    pub const HARDWARE_INFO: u8 = 0x1A;
    pub const LOGOFF: u8 = 0x30;
    pub const XBUS: u8 = 0x40;
    pub const BROADCAST_FLAGS: u8 = 0x50;
    pub const SYSTEMSTATE_DATACHANGED: u8 = 0x84;
    pub const SYSTEMSTATE_GETDATA: u8 = 0x85;
}

/// X-Bus headers (telegram[4]) inside the [`group::XBUS`] group
pub mod xheader {
    pub const GET: u8 = 0x21;
    pub const TRACK_POWER: u8 = 0x61;
    pub const STATUS_CHANGED: u8 = 0x62;
    pub const VERSION: u8 = 0x63;
    pub const SET_STOP: u8 = 0x80;
    pub const BC_STOPPED: u8 = 0x81;
    pub const GET_LOCO_INFO: u8 = 0xE3;
    pub const SET_LOCO: u8 = 0xE4;
    pub const LOCO_INFO: u8 = 0xEF;
    pub const GET_FIRMWARE_VERSION: u8 = 0xF1;
    pub const FIRMWARE_VERSION: u8 = 0xF3;
}

/// Broadcast categories requested on logon: driving/switching and system state
pub const BROADCAST_FLAGS: u32 = 0x0000_0001 | 0x0001_0000;

/// XOR of all bytes in `bytes`
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Render bytes as upper-case hex pairs separated by spaces
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
