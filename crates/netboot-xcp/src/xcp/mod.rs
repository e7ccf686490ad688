//! XCP master protocol layer
//!
//! Implements the subset of XCP on Ethernet needed to reprogram a bootloader:
//! session setup, memory transfer address, erase, program and reset.

mod error;
mod error_code;
mod master;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::XcpError;
pub use error_code::XcpErrorCode;
pub use master::XcpMaster;

/// Packet identifiers
pub mod pid {
    /// Positive response
    pub const RESPONSE: u8 = 0xFF;
    /// Error packet, followed by an error code
    pub const ERROR: u8 = 0xFE;
}

/// XCP command codes
pub mod command_code {
    pub const CONNECT: u8 = 0xFF;
    pub const DISCONNECT: u8 = 0xFE;
    pub const SET_MTA: u8 = 0xF6;
    pub const UPLOAD: u8 = 0xF5;
    pub const PROGRAM_START: u8 = 0xD2;
    pub const PROGRAM_CLEAR: u8 = 0xD1;
    pub const PROGRAM: u8 = 0xD0;
    pub const PROGRAM_RESET: u8 = 0xCF;
    pub const PROGRAM_MAX: u8 = 0xC9;
}

/// Commands issued by [`XcpMaster`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    SetMta,
    Upload,
    ProgramStart,
    ProgramClear,
    Program,
    ProgramReset,
    ProgramMax,
}

impl Command {
    pub fn code(self) -> u8 {
        match self {
            Self::Connect => command_code::CONNECT,
            Self::SetMta => command_code::SET_MTA,
            Self::Upload => command_code::UPLOAD,
            Self::ProgramStart => command_code::PROGRAM_START,
            Self::ProgramClear => command_code::PROGRAM_CLEAR,
            Self::Program => command_code::PROGRAM,
            Self::ProgramReset => command_code::PROGRAM_RESET,
            Self::ProgramMax => command_code::PROGRAM_MAX,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::SetMta => "SET_MTA",
            Self::Upload => "UPLOAD",
            Self::ProgramStart => "PROGRAM_START",
            Self::ProgramClear => "PROGRAM_CLEAR",
            Self::Program => "PROGRAM",
            Self::ProgramReset => "PROGRAM_RESET",
            Self::ProgramMax => "PROGRAM_MAX",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}

/// Byte order of multi-byte values, as announced by the slave on CONNECT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little endian
    Intel,
    /// Big endian
    Motorola,
}

impl ByteOrder {
    /// Decode from the COMM_MODE_BASIC byte of a CONNECT response
    pub fn from_comm_mode(comm_mode: u8) -> Self {
        if comm_mode & 0x01 == 0 {
            Self::Intel
        } else {
            Self::Motorola
        }
    }

    /// BYTE_ORDER bit of COMM_MODE_BASIC, as a slave announces it
    pub fn comm_mode(self) -> u8 {
        match self {
            Self::Intel => 0x00,
            Self::Motorola => 0x01,
        }
    }

    pub fn encode_u16(self, value: u16) -> [u8; 2] {
        match self {
            Self::Intel => value.to_le_bytes(),
            Self::Motorola => value.to_be_bytes(),
        }
    }

    pub fn encode_u32(self, value: u32) -> [u8; 4] {
        match self {
            Self::Intel => value.to_le_bytes(),
            Self::Motorola => value.to_be_bytes(),
        }
    }

    pub fn decode_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Self::Intel => u16::from_le_bytes(bytes),
            Self::Motorola => u16::from_be_bytes(bytes),
        }
    }

    pub fn decode_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Self::Intel => u32::from_le_bytes(bytes),
            Self::Motorola => u32::from_be_bytes(bytes),
        }
    }
}

/// Parameters negotiated with the slave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveInfo {
    pub byte_order: ByteOrder,
    /// Largest command packet the slave accepts
    pub max_cto: u8,
    /// Largest command packet in programming mode, updated by PROGRAM_START
    pub max_prog_cto: u8,
    /// Largest data packet the slave sends
    pub max_dto: u16,
}

fn default_connect_ms() -> u64 {
    20
}

fn default_standard_ms() -> u64 {
    1000
}

fn default_program_start_ms() -> u64 {
    2000
}

fn default_erase_ms() -> u64 {
    10000
}

fn default_program_ms() -> u64 {
    1000
}

/// Per-command response timeouts in milliseconds.
///
/// The transport adds its receive floor on top of each value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XcpTimeouts {
    /// CONNECT
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,
    /// SET_MTA and UPLOAD (T1)
    #[serde(default = "default_standard_ms")]
    pub standard_ms: u64,
    /// PROGRAM_START (T3)
    #[serde(default = "default_program_start_ms")]
    pub program_start_ms: u64,
    /// PROGRAM_CLEAR (T4)
    #[serde(default = "default_erase_ms")]
    pub erase_ms: u64,
    /// PROGRAM, PROGRAM_MAX and PROGRAM_RESET (T5)
    #[serde(default = "default_program_ms")]
    pub program_ms: u64,
}

impl Default for XcpTimeouts {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            standard_ms: default_standard_ms(),
            program_start_ms: default_program_start_ms(),
            erase_ms: default_erase_ms(),
            program_ms: default_program_ms(),
        }
    }
}

impl XcpTimeouts {
    pub fn for_command(&self, command: Command) -> Duration {
        let ms = match command {
            Command::Connect => self.connect_ms,
            Command::SetMta | Command::Upload => self.standard_ms,
            Command::ProgramStart => self.program_start_ms,
            Command::ProgramClear => self.erase_ms,
            Command::Program | Command::ProgramMax | Command::ProgramReset => self.program_ms,
        };
        Duration::from_millis(ms)
    }
}
