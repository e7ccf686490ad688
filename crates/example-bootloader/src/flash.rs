//! Flash memory model

use thiserror::Error;

/// Value of an erased flash byte
pub const ERASED: u8 = 0xFF;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlashError {
    #[error("Range 0x{start:08X} + {len} is outside flash 0x{base:08X} + {size}")]
    OutOfRange {
        start: u32,
        len: usize,
        base: u32,
        size: usize,
    },
}

/// Contiguous flash region starting at `base`
#[derive(Debug, Clone)]
pub struct FlashMemory {
    base: u32,
    data: Vec<u8>,
    /// Lowest and one-past-highest address written since the last erase-all
    written: Option<(u32, u32)>,
}

impl FlashMemory {
    pub fn new(base: u32, size: u32) -> Self {
        Self {
            base,
            data: vec![ERASED; size as usize],
            written: None,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn range(&self, start: u32, len: usize) -> Result<std::ops::Range<usize>, FlashError> {
        let out_of_range = || FlashError::OutOfRange {
            start,
            len,
            base: self.base,
            size: self.data.len(),
        };

        let offset = start.checked_sub(self.base).ok_or_else(out_of_range)? as usize;
        let end = offset.checked_add(len).ok_or_else(out_of_range)?;
        if end > self.data.len() {
            return Err(out_of_range());
        }
        Ok(offset..end)
    }

    pub fn erase(&mut self, start: u32, len: u32) -> Result<(), FlashError> {
        let range = self.range(start, len as usize)?;
        self.data[range].fill(ERASED);
        Ok(())
    }

    pub fn program(&mut self, start: u32, bytes: &[u8]) -> Result<(), FlashError> {
        let range = self.range(start, bytes.len())?;
        self.data[range].copy_from_slice(bytes);

        let end = start + bytes.len() as u32;
        self.written = Some(match self.written {
            Some((low, high)) => (low.min(start), high.max(end)),
            None => (start, end),
        });
        Ok(())
    }

    pub fn read(&self, start: u32, len: usize) -> Result<&[u8], FlashError> {
        let range = self.range(start, len)?;
        Ok(&self.data[range])
    }

    /// Address and contents of the span touched by programming, if any
    pub fn written(&self) -> Option<(u32, &[u8])> {
        let (low, high) = self.written?;
        let range = self.range(low, (high - low) as usize).ok()?;
        Some((low, &self.data[range]))
    }
}
