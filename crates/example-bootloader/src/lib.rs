//! example-bootloader - XCP Bootloader Simulator Library
//!
//! Provides a simulated microcontroller bootloader for testing netboot
//! without hardware.
//!
//! # Modules
//!
//! - [`flash`] - Flash memory model (erase, program, read back)
//! - [`bootloader`] - XCP slave command handling
//! - [`server`] - TCP listener speaking the length-prefixed packet format

pub mod bootloader;
pub mod flash;
pub mod server;

pub use bootloader::{BootloaderConfig, Reply, SimulatedBootloader};
pub use flash::{FlashError, FlashMemory};
pub use server::BootloaderServer;
