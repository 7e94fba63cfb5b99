//! Protocol message definitions
//!
//! Domain values carried by Z21 telegrams and the events raised when the
//! station reports them.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{LocoAddress, ValueError, ValueResult, MAX_SPEED_STEP};

/// Highest function index a function command can address
pub const MAX_FUNCTION_INDEX: u8 = 31;

/// Driving direction, carried in the high bit of the speed byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Reverse,
    Forward,
}

impl Direction {
    pub fn from_bit(set: bool) -> Self {
        if set {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, Direction::Forward)
    }
}

/// State of a single loco function as reported by the station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionState {
    pub index: u8,
    pub on: bool,
}

/// Decoded LOCO INFO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocoInfo {
    pub address: LocoAddress,
    /// Speed step 0-127
    pub speed: u8,
    pub direction: Direction,
    /// Loco is controlled by another handset
    pub in_use: bool,
    /// Function states in decode order
    pub functions: Vec<FunctionState>,
}

impl LocoInfo {
    /// Look up a function state by index
    pub fn function(&self, index: u8) -> Option<bool> {
        self.functions
            .iter()
            .find(|f| f.index == index)
            .map(|f| f.on)
    }
}

/// Drive request for one loco (128 speed steps)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocoDrive {
    pub address: LocoAddress,
    speed: u8,
    pub direction: Direction,
}

impl LocoDrive {
    pub fn new(address: LocoAddress, speed: u8, direction: Direction) -> ValueResult<Self> {
        if speed > MAX_SPEED_STEP {
            return Err(ValueError::SpeedOutOfRange(speed));
        }
        Ok(Self {
            address,
            speed,
            direction,
        })
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Speed byte with the direction bit OR'd in
    pub fn speed_byte(&self) -> u8 {
        if self.direction.is_forward() {
            self.speed | 0x80
        } else {
            self.speed
        }
    }
}

/// How a function command changes the function output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToggleMode {
    Off,
    On,
    Toggle,
}

impl ToggleMode {
    /// Bits OR'd into the function byte
    pub fn bits(&self) -> u8 {
        match self {
            ToggleMode::Off => 0x00,
            ToggleMode::On => 0x40,
            ToggleMode::Toggle => 0x80,
        }
    }
}

impl fmt::Display for ToggleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToggleMode::Off => "off",
            ToggleMode::On => "on",
            ToggleMode::Toggle => "toggle",
        };
        f.write_str(name)
    }
}

/// Switch a single function of a loco
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCommand {
    pub address: LocoAddress,
    index: u8,
    pub mode: ToggleMode,
}

impl FunctionCommand {
    pub fn new(address: LocoAddress, index: u8, mode: ToggleMode) -> ValueResult<Self> {
        if index > MAX_FUNCTION_INDEX {
            return Err(ValueError::FunctionIndexOutOfRange(index));
        }
        Ok(Self {
            address,
            index,
            mode,
        })
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    /// Function index with the toggle mode bits packed in
    pub fn function_byte(&self) -> u8 {
        self.index | self.mode.bits()
    }
}

/// Track power as derived from station status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackPowerState {
    On,
    Off,
    ShortCircuit,
    ProgrammingMode,
}

/// Central state bits of the first status byte
pub mod central_state {
    pub const EMERGENCY_STOP: u8 = 0x01;
    pub const TRACK_VOLTAGE_OFF: u8 = 0x02;
    pub const SHORT_CIRCUIT: u8 = 0x04;
    pub const PROGRAMMING_MODE_ACTIVE: u8 = 0x20;
}

/// Extended central state bits of the second status byte
pub mod central_state_ex {
    pub const HIGH_TEMPERATURE: u8 = 0x01;
    pub const POWER_LOST: u8 = 0x02;
    pub const SHORT_CIRCUIT_EXTERNAL: u8 = 0x04;
    pub const SHORT_CIRCUIT_INTERNAL: u8 = 0x08;
}

impl TrackPowerState {
    /// Derive from a central state byte.
    ///
    /// Emergency stop and track voltage off win over a short circuit, which
    /// in turn wins over programming mode.
    pub fn from_status(status: u8) -> Self {
        let emergency_stop = status & central_state::EMERGENCY_STOP != 0;
        let voltage_off = status & central_state::TRACK_VOLTAGE_OFF != 0;
        let short_circuit = status & central_state::SHORT_CIRCUIT != 0;
        let programming = status & central_state::PROGRAMMING_MODE_ACTIVE != 0;

        if emergency_stop || voltage_off {
            TrackPowerState::Off
        } else if short_circuit {
            TrackPowerState::ShortCircuit
        } else if programming {
            TrackPowerState::ProgrammingMode
        } else {
            TrackPowerState::On
        }
    }
}

/// Flags carried in the two status bytes of a system state telegram
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationFlags {
    pub emergency_stop: bool,
    pub track_voltage_off: bool,
    pub short_circuit: bool,
    pub programming_mode_active: bool,
    pub high_temperature: bool,
    pub power_lost: bool,
    pub short_circuit_external: bool,
    pub short_circuit_internal: bool,
}

impl StationFlags {
    pub fn from_bits(state: u8, state_ex: u8) -> Self {
        Self {
            emergency_stop: state & central_state::EMERGENCY_STOP != 0,
            track_voltage_off: state & central_state::TRACK_VOLTAGE_OFF != 0,
            short_circuit: state & central_state::SHORT_CIRCUIT != 0,
            programming_mode_active: state & central_state::PROGRAMMING_MODE_ACTIVE != 0,
            high_temperature: state_ex & central_state_ex::HIGH_TEMPERATURE != 0,
            power_lost: state_ex & central_state_ex::POWER_LOST != 0,
            short_circuit_external: state_ex & central_state_ex::SHORT_CIRCUIT_EXTERNAL != 0,
            short_circuit_internal: state_ex & central_state_ex::SHORT_CIRCUIT_INTERNAL != 0,
        }
    }
}

/// Snapshot from SYSTEMSTATE DATACHANGED, rebuilt on every telegram
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub main_current: u16,
    pub prog_current: u16,
    pub filtered_main_current: u16,
    pub temperature: u16,
    pub supply_voltage: u16,
    pub vcc_voltage: u16,
    pub flags: StationFlags,
}

/// Hardware variants reported by HWINFO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareType {
    Z21Old,
    Z21New,
    SmartRail,
    Z21Small,
    Unknown,
}

impl HardwareType {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x0000_0200 => HardwareType::Z21Old,
            0x0000_0201 => HardwareType::Z21New,
            0x0000_0202 => HardwareType::SmartRail,
            0x0000_0203 => HardwareType::Z21Small,
            _ => HardwareType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub hardware_type: HardwareType,
    pub firmware: u32,
}

/// Feature lock state reported by GET CODE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanCode {
    NoLock,
    StartLocked,
    StartUnlocked,
}

impl LanCode {
    pub fn from_byte(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(LanCode::NoLock),
            0x01 => Some(LanCode::StartLocked),
            0x02 => Some(LanCode::StartUnlocked),
            _ => None,
        }
    }

    /// The station only runs with a limited feature set
    pub fn is_locked(&self) -> bool {
        matches!(self, LanCode::StartLocked)
    }
}

/// Command station family reported by GET VERSION
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationVariant {
    None,
    Z21,
    SmallZ21,
    Other,
}

impl StationVariant {
    pub fn from_id(id: u8) -> Self {
        match id {
            0x00 => StationVariant::None,
            0x12 => StationVariant::Z21,
            0x13 => StationVariant::SmallZ21,
            _ => StationVariant::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// X-Bus protocol version byte, as transmitted
    pub xbus_version: u8,
    pub variant: StationVariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    /// The minor byte carries two decimal digits as hex nibbles (0x23 is minor 23)
    pub fn from_bytes(major: u8, minor: u8) -> Self {
        Self {
            major,
            minor: (minor >> 4) * 10 + (minor & 0x0F),
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// Reachability of the station, as seen by the liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reachability {
    Unreachable,
    Reachable,
}

/// Everything the client reports to its subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Z21Event {
    HardwareInfo(HardwareInfo),
    SerialNumber(u32),
    LanCode(LanCode),
    LocoInfo(LocoInfo),
    Version(VersionInfo),
    FirmwareVersion(FirmwareVersion),
    TrackPowerChanged(TrackPowerState),
    StatusChanged(TrackPowerState),
    SystemStateChanged(SystemState),
    Stopped,
    /// Raw datagram as received, before framing
    RawReceived(Vec<u8>),
    ReachabilityChanged(Reachability),
}

impl Z21Event {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Z21Event::HardwareInfo(_) => "hardware-info",
            Z21Event::SerialNumber(_) => "serial-number",
            Z21Event::LanCode(_) => "lan-code",
            Z21Event::LocoInfo(_) => "loco-info",
            Z21Event::Version(_) => "version",
            Z21Event::FirmwareVersion(_) => "firmware-version",
            Z21Event::TrackPowerChanged(_) => "track-power",
            Z21Event::StatusChanged(_) => "status-changed",
            Z21Event::SystemStateChanged(_) => "system-state",
            Z21Event::Stopped => "stopped",
            Z21Event::RawReceived(_) => "raw",
            Z21Event::ReachabilityChanged(_) => "reachability",
        }
    }
}
