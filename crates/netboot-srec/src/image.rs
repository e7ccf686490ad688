//! Image source traits and the data they produce

use std::fmt;
use std::path::Path;

use crate::ImageError;

/// Address range and size of an image, derived before any device interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatePlan {
    pub address_low: u32,
    pub address_high: u32,
    pub total_bytes: u32,
}

impl UpdatePlan {
    /// Erase region as `(start, length)`.
    ///
    /// Covers the whole bounding range regardless of gaps between records.
    /// The length is `high - low`, matching what OpenBLT bootloaders expect.
    pub fn erase_range(&self) -> (u32, u32) {
        (self.address_low, self.address_high - self.address_low)
    }
}

impl fmt::Display for UpdatePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:08x}..=0x{:08x} ({} bytes)",
            self.address_low, self.address_high, self.total_bytes
        )
    }
}

/// One contiguous run of program data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    pub address: u32,
    pub data: Vec<u8>,
}

impl DataRecord {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Opens firmware images of one format
pub trait ImageSource: Send + Sync {
    type Image: FirmwareImage;

    /// Cheap format check; `false` when the file is missing or not in this format
    fn validate(&self, path: &Path) -> bool;

    fn open(&self, path: &Path) -> Result<Self::Image, ImageError>;
}

/// An opened firmware image
pub trait FirmwareImage: Send {
    /// Scan all records and summarise them. Leaves the image positioned at the first record.
    fn parse(&mut self) -> Result<UpdatePlan, ImageError>;

    /// Next data record in file order, `None` at the end
    fn next_record(&mut self) -> Result<Option<DataRecord>, ImageError>;

    /// Release the underlying file. Calling it again has no effect.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erase_range() {
        let plan = UpdatePlan {
            address_low: 0x1000,
            address_high: 0x3000,
            total_bytes: 4096,
        };
        assert_eq!(plan.erase_range(), (0x1000, 0x2000));
    }

    #[test]
    fn test_plan_display() {
        let plan = UpdatePlan {
            address_low: 0x0800_0000,
            address_high: 0x0800_00ff,
            total_bytes: 256,
        };
        assert_eq!(plan.to_string(), "0x08000000..=0x080000ff (256 bytes)");
    }
}
