//! Inbound telegram decoding
//!
//! Dispatch runs on the header byte (telegram[2]); X-Bus telegrams dispatch
//! further on telegram[4] and, for some headers, on telegram[5]. Telegrams
//! that are well formed but unknown decode to `None`.

use thiserror::Error;

use super::{
    group, hex_dump, xheader, Direction, FirmwareVersion, FunctionState, HardwareInfo,
    HardwareType, LanCode, LocoAddress, LocoInfo, StationFlags, StationVariant, SystemState,
    TrackPowerState, VersionInfo, Z21Event,
};

/// Number of function bytes a LOCO INFO telegram can carry
const LOCO_FUNCTION_BYTES: usize = 4;

/// Offset of the first function byte in LOCO INFO
const LOCO_FUNCTION_OFFSET: usize = 9;

/// Bit positions of F0..F4 in the first function byte
const FIRST_FUNCTION_BITS: [u8; 5] = [4, 0, 1, 2, 3];

/// Decode errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Telegram too short for {what}: needs byte {index}, length is {length}")]
    Truncated {
        what: &'static str,
        index: usize,
        length: usize,
    },
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Bounds-checked view over one telegram
struct Reader<'a> {
    telegram: &'a [u8],
    what: &'static str,
}

impl<'a> Reader<'a> {
    fn new(telegram: &'a [u8], what: &'static str) -> Self {
        Self { telegram, what }
    }

    fn u8(&self, index: usize) -> DecodeResult<u8> {
        self.telegram
            .get(index)
            .copied()
            .ok_or(DecodeError::Truncated {
                what: self.what,
                index,
                length: self.telegram.len(),
            })
    }

    fn u16_be(&self, index: usize) -> DecodeResult<u16> {
        Ok(u16::from_be_bytes([self.u8(index)?, self.u8(index + 1)?]))
    }

    fn u32_le(&self, index: usize) -> DecodeResult<u32> {
        Ok(u32::from_le_bytes([
            self.u8(index)?,
            self.u8(index + 1)?,
            self.u8(index + 2)?,
            self.u8(index + 3)?,
        ]))
    }
}

/// Decode one framed telegram
///
/// Returns `Ok(None)` for telegrams this client does not handle.
pub fn decode_telegram(telegram: &[u8]) -> DecodeResult<Option<Z21Event>> {
    let header = Reader::new(telegram, "header").u8(2)?;

    match header {
        group::HARDWARE_INFO => decode_hardware_info(telegram).map(Some),
        group::SERIAL_NUMBER => {
            let serial = Reader::new(telegram, "serial number").u32_le(4)?;
            tracing::debug!("GET SERIAL NUMBER {} [{}]", serial, hex_dump(telegram));
            Ok(Some(Z21Event::SerialNumber(serial)))
        }
        group::LAN_CODE => decode_lan_code(telegram),
        group::XBUS => decode_xbus(telegram),
        group::SYSTEMSTATE_DATACHANGED => decode_system_state(telegram).map(Some),
        _ => {
            tracing::debug!("Unknown telegram [{}]", hex_dump(telegram));
            Ok(None)
        }
    }
}

fn decode_hardware_info(telegram: &[u8]) -> DecodeResult<Z21Event> {
    let reader = Reader::new(telegram, "hardware info");
    let hardware_type = HardwareType::from_code(reader.u32_le(4)?);
    let firmware = reader.u32_le(8)?;
    tracing::debug!("GET HWINFO {:?} [{}]", hardware_type, hex_dump(telegram));

    Ok(Z21Event::HardwareInfo(HardwareInfo {
        hardware_type,
        firmware,
    }))
}

fn decode_lan_code(telegram: &[u8]) -> DecodeResult<Option<Z21Event>> {
    let raw = Reader::new(telegram, "lan code").u8(4)?;

    match LanCode::from_byte(raw) {
        Some(code) if code.is_locked() => {
            tracing::warn!("GET LAN CODE {:?} [{}]", code, hex_dump(telegram));
            Ok(Some(Z21Event::LanCode(code)))
        }
        Some(code) => {
            tracing::info!("GET LAN CODE {:?} [{}]", code, hex_dump(telegram));
            Ok(Some(Z21Event::LanCode(code)))
        }
        None => {
            tracing::warn!("Invalid LAN code {:#04x} [{}]", raw, hex_dump(telegram));
            Ok(None)
        }
    }
}

fn decode_xbus(telegram: &[u8]) -> DecodeResult<Option<Z21Event>> {
    let reader = Reader::new(telegram, "x-bus header");

    match reader.u8(4)? {
        xheader::TRACK_POWER => {
            let state = match reader.u8(5)? {
                0x00 => TrackPowerState::Off,
                0x01 => TrackPowerState::On,
                0x02 => TrackPowerState::ProgrammingMode,
                0x08 => TrackPowerState::ShortCircuit,
                _ => {
                    tracing::debug!("Unknown X-Bus telegram, header 0x61 [{}]", hex_dump(telegram));
                    return Ok(None);
                }
            };
            tracing::debug!("TRACK POWER {:?} [{}]", state, hex_dump(telegram));
            Ok(Some(Z21Event::TrackPowerChanged(state)))
        }
        xheader::STATUS_CHANGED => {
            let status = Reader::new(telegram, "status changed").u8(6)?;
            let state = TrackPowerState::from_status(status);
            tracing::debug!(
                "STATUS CHANGED {:?} (status {:#04x}) [{}]",
                state,
                status,
                hex_dump(telegram)
            );
            Ok(Some(Z21Event::StatusChanged(state)))
        }
        xheader::VERSION => match reader.u8(5)? {
            xheader::GET => {
                let reader = Reader::new(telegram, "version");
                let info = VersionInfo {
                    xbus_version: reader.u8(6)?,
                    variant: StationVariant::from_id(reader.u8(7)?),
                };
                tracing::debug!("GET VERSION {:?} [{}]", info, hex_dump(telegram));
                Ok(Some(Z21Event::Version(info)))
            }
            _ => {
                tracing::debug!("Unknown X-Bus telegram, header 0x63 [{}]", hex_dump(telegram));
                Ok(None)
            }
        },
        xheader::BC_STOPPED => {
            tracing::debug!("BC STOPPED [{}]", hex_dump(telegram));
            Ok(Some(Z21Event::Stopped))
        }
        xheader::LOCO_INFO => decode_loco_info(telegram).map(|info| Some(Z21Event::LocoInfo(info))),
        xheader::FIRMWARE_VERSION => match reader.u8(5)? {
            0x0A => {
                let reader = Reader::new(telegram, "firmware version");
                let version = FirmwareVersion::from_bytes(reader.u8(6)?, reader.u8(7)?);
                tracing::debug!("GET FIRMWARE VERSION {} [{}]", version, hex_dump(telegram));
                Ok(Some(Z21Event::FirmwareVersion(version)))
            }
            _ => {
                tracing::debug!("Unknown X-Bus telegram, header 0xF3 [{}]", hex_dump(telegram));
                Ok(None)
            }
        },
        _ => {
            tracing::debug!("Unknown X-Bus telegram [{}]", hex_dump(telegram));
            Ok(None)
        }
    }
}

/// Decode LOCO INFO.
///
/// The first function byte carries F0 in bit 4 followed by F1..F4 in bits
/// 0..3; every further byte carries eight functions in bit order from F5 up.
pub fn decode_loco_info(telegram: &[u8]) -> DecodeResult<LocoInfo> {
    let reader = Reader::new(telegram, "loco info");

    let address = LocoAddress::from_bytes(reader.u8(5)?, reader.u8(6)?);
    let in_use = reader.u8(7)? & 0x08 != 0;
    let drive = reader.u8(8)?;

    let mut functions = Vec::new();
    let last = telegram
        .len()
        .min(LOCO_FUNCTION_OFFSET + LOCO_FUNCTION_BYTES);
    let mut next_index = FIRST_FUNCTION_BITS.len() as u8;

    for offset in LOCO_FUNCTION_OFFSET..last {
        let bits = telegram[offset];
        if offset == LOCO_FUNCTION_OFFSET {
            for (index, bit) in FIRST_FUNCTION_BITS.iter().enumerate() {
                functions.push(FunctionState {
                    index: index as u8,
                    on: bits & (1u8 << *bit) != 0,
                });
            }
        } else {
            for bit in 0..8u8 {
                functions.push(FunctionState {
                    index: next_index,
                    on: bits & (1u8 << bit) != 0,
                });
                next_index += 1;
            }
        }
    }

    let info = LocoInfo {
        address,
        speed: drive & 0x7F,
        direction: Direction::from_bit(drive & 0x80 != 0),
        in_use,
        functions,
    };

    tracing::debug!(
        "LOCO INFO #{} speed {} {:?} [{}]",
        info.address,
        info.speed,
        info.direction,
        hex_dump(telegram)
    );
    Ok(info)
}

/// Decode SYSTEMSTATE DATACHANGED; all fields are big-endian
pub fn decode_system_state(telegram: &[u8]) -> DecodeResult<Z21Event> {
    let reader = Reader::new(telegram, "system state");

    let state = SystemState {
        main_current: reader.u16_be(4)?,
        prog_current: reader.u16_be(6)?,
        filtered_main_current: reader.u16_be(8)?,
        temperature: reader.u16_be(10)?,
        supply_voltage: reader.u16_be(12)?,
        vcc_voltage: reader.u16_be(14)?,
        flags: StationFlags::from_bits(reader.u8(16)?, reader.u8(17)?),
    };

    tracing::debug!("SYSTEMSTATE DATACHANGED [{}]", hex_dump(telegram));
    Ok(Z21Event::SystemStateChanged(state))
}
