//! netboot-srec - Firmware image sources
//!
//! The updater reads firmware through the [`ImageSource`] and
//! [`FirmwareImage`] traits. [`SrecordSource`] implements them for Motorola
//! S-record files.

mod error;
mod image;
pub mod srecord;

pub use error::ImageError;
pub use image::{DataRecord, FirmwareImage, ImageSource, UpdatePlan};
pub use srecord::{SrecordImage, SrecordSource};
