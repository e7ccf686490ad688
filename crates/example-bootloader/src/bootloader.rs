//! Simulated XCP slave
//!
//! Implements the bootloader side of the commands netboot sends. Commands
//! other than CONNECT are ignored until a master has connected, the same
//! way a real slave stays silent.

use std::path::Path;

use netboot_xcp::xcp::{command_code, pid};
use netboot_xcp::{ByteOrder, XcpErrorCode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::flash::{FlashError, FlashMemory};

/// Complete bootloader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootloaderConfig {
    /// Report Motorola (big endian) byte order instead of Intel
    pub motorola: bool,
    /// Largest command packet accepted outside a programming session
    pub max_cto: u8,
    /// Largest command packet accepted during a programming session
    pub max_prog_cto: u8,
    /// Largest response packet
    pub max_dto: u16,
    pub flash_base: u32,
    pub flash_size: u32,
    /// Number of CONNECT requests to ignore, as if the device were still
    /// running its application
    pub silent_connects: u32,
    /// Answer PROGRAM_CLEAR with an error packet
    pub reject_erase: bool,
}

impl Default for BootloaderConfig {
    fn default() -> Self {
        Self {
            motorola: false,
            max_cto: 64,
            max_prog_cto: 64,
            max_dto: 64,
            flash_base: 0x0800_0000,
            flash_size: 256 * 1024,
            silent_connects: 0,
            reject_erase: false,
        }
    }
}

impl BootloaderConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn byte_order(&self) -> ByteOrder {
        if self.motorola {
            ByteOrder::Motorola
        } else {
            ByteOrder::Intel
        }
    }
}

/// What the connection should do with a processed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Send this packet
    Respond(Vec<u8>),
    /// Send nothing
    Silent,
    /// Send this packet, then drop the connection as the device restarts
    RespondAndReset(Vec<u8>),
}

#[derive(Debug)]
struct State {
    connected: bool,
    programming: bool,
    mta: u32,
    silent_connects_left: u32,
    resets: u32,
    erased: Vec<(u32, u32)>,
    memory: FlashMemory,
}

/// Bootloader with its flash memory, shared between connections
#[derive(Debug)]
pub struct SimulatedBootloader {
    config: BootloaderConfig,
    state: Mutex<State>,
}

fn positive_response(data: &[u8]) -> Vec<u8> {
    let mut response = Vec::with_capacity(1 + data.len());
    response.push(pid::RESPONSE);
    response.extend_from_slice(data);
    response
}

fn error_response(code: XcpErrorCode) -> Vec<u8> {
    vec![pid::ERROR, u8::from(code)]
}

fn flash_error(err: FlashError) -> Vec<u8> {
    warn!(error = %err, "Flash access rejected");
    error_response(XcpErrorCode::OutOfRange)
}

impl SimulatedBootloader {
    pub fn new(config: BootloaderConfig) -> Self {
        let state = State {
            connected: false,
            programming: false,
            mta: 0,
            silent_connects_left: config.silent_connects,
            resets: 0,
            erased: Vec::new(),
            memory: FlashMemory::new(config.flash_base, config.flash_size),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &BootloaderConfig {
        &self.config
    }

    /// Number of PROGRAM_RESET requests served
    pub fn reset_count(&self) -> u32 {
        self.state.lock().resets
    }

    /// (start, length) of every accepted PROGRAM_CLEAR
    pub fn erased_ranges(&self) -> Vec<(u32, u32)> {
        self.state.lock().erased.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Copy of flash contents
    pub fn read_memory(&self, start: u32, len: usize) -> Result<Vec<u8>, FlashError> {
        self.state.lock().memory.read(start, len).map(<[u8]>::to_vec)
    }

    /// Address and bytes of the programmed span
    pub fn programmed(&self) -> Option<(u32, Vec<u8>)> {
        let state = self.state.lock();
        state.memory.written().map(|(low, bytes)| (low, bytes.to_vec()))
    }

    /// Process an XCP request and decide on the reply
    pub fn process_request(&self, request: &[u8]) -> Reply {
        let Some(&code) = request.first() else {
            return Reply::Respond(error_response(XcpErrorCode::CmdSyntax));
        };

        let mut state = self.state.lock();

        if code == command_code::CONNECT {
            return self.handle_connect(&mut state);
        }
        if !state.connected {
            debug!(command = format!("0x{:02X}", code), "Ignoring request while not connected");
            return Reply::Silent;
        }

        let response = match code {
            command_code::DISCONNECT => {
                state.connected = false;
                state.programming = false;
                positive_response(&[])
            }
            command_code::SET_MTA => self.handle_set_mta(&mut state, request),
            command_code::UPLOAD => self.handle_upload(&mut state, request),
            command_code::PROGRAM_START => {
                state.programming = true;
                info!("Programming session started");
                positive_response(&[0x00, 0x00, self.config.max_prog_cto, 0x00, 0x00, 0x00])
            }
            command_code::PROGRAM_CLEAR => self.handle_program_clear(&mut state, request),
            command_code::PROGRAM => self.handle_program(&mut state, request),
            command_code::PROGRAM_MAX => self.handle_program_max(&mut state, request),
            command_code::PROGRAM_RESET => {
                state.connected = false;
                state.programming = false;
                state.resets += 1;
                info!(resets = state.resets, "Software reset requested");
                return Reply::RespondAndReset(positive_response(&[]));
            }
            other => {
                debug!(command = format!("0x{:02X}", other), "Unsupported command");
                error_response(XcpErrorCode::CmdUnknown)
            }
        };
        Reply::Respond(response)
    }

    fn handle_connect(&self, state: &mut State) -> Reply {
        if state.silent_connects_left > 0 {
            state.silent_connects_left -= 1;
            debug!(left = state.silent_connects_left, "Ignoring CONNECT");
            return Reply::Silent;
        }

        state.connected = true;
        state.programming = false;
        info!("Master connected");

        let byte_order = self.config.byte_order();
        let max_dto = byte_order.encode_u16(self.config.max_dto);
        // RESOURCE: programming available
        let resource = 0x10;
        Reply::Respond(positive_response(&[
            resource,
            byte_order.comm_mode(),
            self.config.max_cto,
            max_dto[0],
            max_dto[1],
            0x01,
            0x01,
        ]))
    }

    fn handle_set_mta(&self, state: &mut State, request: &[u8]) -> Vec<u8> {
        let Some(address) = request.get(4..8) else {
            return error_response(XcpErrorCode::CmdSyntax);
        };
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(address);
        state.mta = self.config.byte_order().decode_u32(bytes);
        debug!(mta = format!("0x{:08X}", state.mta), "SET_MTA");
        positive_response(&[])
    }

    fn handle_upload(&self, state: &mut State, request: &[u8]) -> Vec<u8> {
        let Some(&count) = request.get(1) else {
            return error_response(XcpErrorCode::CmdSyntax);
        };
        if usize::from(count) + 1 > usize::from(self.config.max_dto) {
            return error_response(XcpErrorCode::OutOfRange);
        }

        match state.memory.read(state.mta, usize::from(count)) {
            Ok(bytes) => {
                let response = positive_response(bytes);
                state.mta = state.mta.wrapping_add(u32::from(count));
                response
            }
            Err(e) => flash_error(e),
        }
    }

    fn handle_program_clear(&self, state: &mut State, request: &[u8]) -> Vec<u8> {
        if !state.programming {
            return error_response(XcpErrorCode::Sequence);
        }
        let Some(range) = request.get(4..8) else {
            return error_response(XcpErrorCode::CmdSyntax);
        };
        if self.config.reject_erase {
            warn!("Rejecting PROGRAM_CLEAR");
            return error_response(XcpErrorCode::AccessLocked);
        }

        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(range);
        let length = self.config.byte_order().decode_u32(bytes);
        let start = state.mta;

        match state.memory.erase(start, length) {
            Ok(()) => {
                info!(start = format!("0x{:08X}", start), length, "Erased flash");
                state.erased.push((start, length));
                positive_response(&[])
            }
            Err(e) => flash_error(e),
        }
    }

    fn handle_program(&self, state: &mut State, request: &[u8]) -> Vec<u8> {
        if !state.programming {
            return error_response(XcpErrorCode::Sequence);
        }
        let Some(&count) = request.get(1) else {
            return error_response(XcpErrorCode::CmdSyntax);
        };

        // Zero length ends the programming session
        if count == 0 {
            state.programming = false;
            info!("Programming session finished");
            return positive_response(&[]);
        }

        if usize::from(count) + 2 > usize::from(self.config.max_prog_cto) {
            return error_response(XcpErrorCode::OutOfRange);
        }
        let Some(data) = request.get(2..2 + usize::from(count)) else {
            return error_response(XcpErrorCode::CmdSyntax);
        };
        self.write(state, data)
    }

    fn handle_program_max(&self, state: &mut State, request: &[u8]) -> Vec<u8> {
        if !state.programming {
            return error_response(XcpErrorCode::Sequence);
        }
        let data = &request[1..];
        if data.len() != usize::from(self.config.max_prog_cto) - 1 {
            return error_response(XcpErrorCode::CmdSyntax);
        }
        self.write(state, data)
    }

    fn write(&self, state: &mut State, data: &[u8]) -> Vec<u8> {
        let start = state.mta;
        match state.memory.program(start, data) {
            Ok(()) => {
                state.mta = start.wrapping_add(data.len() as u32);
                positive_response(&[])
            }
            Err(e) => flash_error(e),
        }
    }
}
