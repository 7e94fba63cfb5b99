//! Outbound command telegrams
//!
//! Every command encodes to `[length][0x00][group][0x00][payload...]`.
//! Checksummed commands close with the XOR of the payload bytes that follow
//! the header.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use super::{group, xheader, xor_checksum, FunctionCommand, LocoAddress, LocoDrive, BROADCAST_FLAGS};

/// Length of one loco drive or loco function telegram
pub const LOCO_COMMAND_LEN: usize = 10;

/// Speed-step format byte for 128 speed steps
const SPEED_STEPS_128: u8 = 0x13;

/// Sub-command byte selecting SET LOCO FUNCTION
const SET_LOCO_FUNCTION: u8 = 0xF8;

/// Sub-command byte of GET LOCO INFO
const GET_LOCO_INFO_DB0: u8 = 0xF0;

/// Commands understood by the command station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetStatus,
    GetVersion,
    GetFirmwareVersion,
    GetHardwareInfo,
    GetSerialNumber,
    GetLanCode,
    /// Subscribe to the broadcast categories in [`BROADCAST_FLAGS`]
    LogOn,
    LogOff,
    GetLocoInfo(LocoAddress),
    SetLocoDrive(LocoDrive),
    SetLocoFunction(FunctionCommand),
    SetStop,
    SetTrackPowerOn,
    SetTrackPowerOff,
    SystemStateGetData,
}

impl Command {
    /// Total telegram length in bytes
    pub fn encoded_len(&self) -> usize {
        match self {
            Command::GetHardwareInfo
            | Command::GetSerialNumber
            | Command::GetLanCode
            | Command::LogOff
            | Command::SystemStateGetData => 4,
            Command::SetStop => 6,
            Command::GetStatus
            | Command::GetVersion
            | Command::GetFirmwareVersion
            | Command::SetTrackPowerOn
            | Command::SetTrackPowerOff => 7,
            Command::LogOn => 8,
            Command::GetLocoInfo(_) => 9,
            Command::SetLocoDrive(_) | Command::SetLocoFunction(_) => LOCO_COMMAND_LEN,
        }
    }

    fn group(&self) -> u8 {
        match self {
            Command::GetHardwareInfo => group::HARDWARE_INFO,
            Command::GetSerialNumber => group::SERIAL_NUMBER,
            Command::GetLanCode => group::LAN_CODE,
            Command::LogOn => group::BROADCAST_FLAGS,
            Command::LogOff => group::LOGOFF,
            Command::SystemStateGetData => group::SYSTEMSTATE_GETDATA,
            _ => group::XBUS,
        }
    }

    /// Append the encoded telegram to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.reserve(self.encoded_len());

        buf.put_u8(self.encoded_len() as u8);
        buf.put_u8(0x00);
        buf.put_u8(self.group());
        buf.put_u8(0x00);

        match self {
            Command::GetHardwareInfo
            | Command::GetSerialNumber
            | Command::GetLanCode
            | Command::LogOff
            | Command::SystemStateGetData => {}
            Command::GetStatus => {
                buf.put_slice(&[xheader::GET, 0x24]);
                put_checksum(buf, start);
            }
            Command::GetVersion => {
                // The station expects 0x00 here, not the XOR of the payload.
                buf.put_slice(&[xheader::GET, 0x21, 0x00]);
            }
            Command::GetFirmwareVersion => {
                buf.put_slice(&[xheader::GET_FIRMWARE_VERSION, 0x0A, 0xFB]);
            }
            Command::LogOn => {
                buf.put_u32_le(BROADCAST_FLAGS);
            }
            Command::GetLocoInfo(address) => {
                let (msb, lsb) = address.to_bytes();
                buf.put_slice(&[xheader::GET_LOCO_INFO, GET_LOCO_INFO_DB0, msb, lsb]);
                put_checksum(buf, start);
            }
            Command::SetLocoDrive(drive) => {
                let (msb, lsb) = drive.address.to_bytes();
                buf.put_slice(&[xheader::SET_LOCO, SPEED_STEPS_128, msb, lsb, drive.speed_byte()]);
                put_checksum(buf, start);
            }
            Command::SetLocoFunction(function) => {
                let (msb, lsb) = function.address.to_bytes();
                buf.put_slice(&[
                    xheader::SET_LOCO,
                    SET_LOCO_FUNCTION,
                    msb,
                    lsb,
                    function.function_byte(),
                ]);
                put_checksum(buf, start);
            }
            Command::SetStop => {
                buf.put_slice(&[xheader::SET_STOP, 0x80]);
            }
            Command::SetTrackPowerOn => {
                buf.put_slice(&[xheader::GET, 0x81, 0xA0]);
            }
            Command::SetTrackPowerOff => {
                buf.put_slice(&[xheader::GET, 0x80, 0xA1]);
            }
        }

        debug_assert_eq!(buf.len() - start, self.encoded_len());
    }

    /// Encode into a standalone datagram
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// XOR everything after the 4 byte header of the telegram starting at `start`
fn put_checksum(buf: &mut BytesMut, start: usize) {
    let checksum = xor_checksum(&buf[start + 4..]);
    buf.put_u8(checksum);
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::GetStatus => write!(f, "GET STATUS"),
            Command::GetVersion => write!(f, "GET VERSION"),
            Command::GetFirmwareVersion => write!(f, "GET FIRMWARE VERSION"),
            Command::GetHardwareInfo => write!(f, "GET HWINFO"),
            Command::GetSerialNumber => write!(f, "GET SERIAL NUMBER"),
            Command::GetLanCode => write!(f, "GET LAN CODE"),
            Command::LogOn => write!(f, "SET BROADCASTFLAGS"),
            Command::LogOff => write!(f, "LOGOFF"),
            Command::GetLocoInfo(address) => write!(f, "GET LOCO INFO #{}", address),
            Command::SetLocoDrive(drive) => write!(
                f,
                "SET LOCO DRIVE #{} speed {} {:?}",
                drive.address,
                drive.speed(),
                drive.direction
            ),
            Command::SetLocoFunction(function) => write!(
                f,
                "SET LOCO FUNCTION #{} F{} {}",
                function.address,
                function.index(),
                function.mode
            ),
            Command::SetStop => write!(f, "SET STOP"),
            Command::SetTrackPowerOn => write!(f, "SET TRACK POWER ON"),
            Command::SetTrackPowerOff => write!(f, "SET TRACK POWER OFF"),
            Command::SystemStateGetData => write!(f, "SYSTEMSTATE GETDATA"),
        }
    }
}

/// Pack several loco drive units into one datagram, each keeping its checksum
pub fn encode_drive_batch(drives: &[LocoDrive]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LOCO_COMMAND_LEN * drives.len());
    for drive in drives {
        Command::SetLocoDrive(*drive).encode(&mut buf);
    }
    buf.freeze()
}

/// Pack several loco function units into one datagram, each keeping its checksum
pub fn encode_function_batch(functions: &[FunctionCommand]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LOCO_COMMAND_LEN * functions.len());
    for function in functions {
        Command::SetLocoFunction(*function).encode(&mut buf);
    }
    buf.freeze()
}
