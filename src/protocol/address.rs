//! Address codec
//!
//! Decoder addresses are 14 bit values carried as two bytes. Addresses from
//! 128 upwards carry the two high bits of the MSB set.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest address representable on the wire
pub const MAX_ADDRESS: u16 = 0x3FFF;

/// Addresses at or above this value get the 0xC0 marker in the MSB
const LONG_ADDRESS_START: u16 = 128;

/// Errors for values that do not fit the wire format
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Address {0} out of range (max: {})", MAX_ADDRESS)]
    AddressOutOfRange(u16),

    #[error("Speed step {0} out of range (max: {})", super::MAX_SPEED_STEP)]
    SpeedOutOfRange(u8),

    #[error("Function index {0} out of range (max: {})", super::MAX_FUNCTION_INDEX)]
    FunctionIndexOutOfRange(u8),
}

pub type ValueResult<T> = Result<T, ValueError>;

/// Encode an address into its (MSB, LSB) wire form
pub fn encode_address(value: u16) -> ValueResult<(u8, u8)> {
    if value > MAX_ADDRESS {
        return Err(ValueError::AddressOutOfRange(value));
    }
    Ok(wire_bytes(value))
}

fn wire_bytes(value: u16) -> (u8, u8) {
    let mut msb = (value >> 8) as u8;
    if value >= LONG_ADDRESS_START {
        msb |= 0xC0;
    }
    (msb, (value & 0xFF) as u8)
}

/// Decode an address from its (MSB, LSB) wire form
pub fn decode_address(msb: u8, lsb: u8) -> u16 {
    (u16::from(msb & 0x3F) << 8) | u16::from(lsb)
}

/// Address of a locomotive decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct LocoAddress(u16);

impl LocoAddress {
    pub fn new(value: u16) -> ValueResult<Self> {
        encode_address(value)?;
        Ok(Self(value))
    }

    /// Build from the two wire bytes; always in range
    pub fn from_bytes(msb: u8, lsb: u8) -> Self {
        Self(decode_address(msb, lsb))
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// Wire form as (MSB, LSB)
    pub fn to_bytes(&self) -> (u8, u8) {
        wire_bytes(self.0)
    }
}

impl TryFrom<u16> for LocoAddress {
    type Error = ValueError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LocoAddress> for u16 {
    fn from(address: LocoAddress) -> Self {
        address.0
    }
}

impl fmt::Display for LocoAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_address_has_no_marker() {
        assert_eq!(encode_address(3).unwrap(), (0x00, 0x03));
        assert_eq!(encode_address(127).unwrap(), (0x00, 0x7F));
    }

    #[test]
    fn test_long_address_sets_high_bits() {
        assert_eq!(encode_address(128).unwrap(), (0xC0, 0x80));
        assert_eq!(encode_address(1234).unwrap(), (0xC4, 0xD2));
        assert_eq!(encode_address(MAX_ADDRESS).unwrap(), (0xFF, 0xFF));
    }

    #[test]
    fn test_decode_masks_marker_bits() {
        assert_eq!(decode_address(0xC4, 0xD2), 1234);
        assert_eq!(decode_address(0x00, 0x03), 3);
    }

    #[test]
    fn test_full_range_roundtrip() {
        for value in 0..=MAX_ADDRESS {
            let (msb, lsb) = encode_address(value).unwrap();
            assert_eq!(decode_address(msb, lsb), value);
        }
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert_eq!(
            encode_address(MAX_ADDRESS + 1),
            Err(ValueError::AddressOutOfRange(MAX_ADDRESS + 1))
        );
        assert!(LocoAddress::new(20000).is_err());
    }

    #[test]
    fn test_loco_address_bytes_match_codec() {
        let address = LocoAddress::new(9999).unwrap();
        assert_eq!(address.to_bytes(), encode_address(9999).unwrap());
        assert_eq!(LocoAddress::from_bytes(0xE7, 0x0F), address);
        assert_eq!(address.to_string(), "9999");
        assert_eq!(LocoAddress::new(7).unwrap().to_string(), "007");
    }
}
