//! XCP error codes carried in error packets

use std::fmt;

/// Error code following the 0xFE packet identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XcpErrorCode {
    CmdSynch,
    CmdBusy,
    DaqActive,
    PgmActive,
    CmdUnknown,
    CmdSyntax,
    OutOfRange,
    WriteProtected,
    AccessDenied,
    AccessLocked,
    PageNotValid,
    ModeNotValid,
    SegmentNotValid,
    Sequence,
    DaqConfig,
    MemoryOverflow,
    Generic,
    Verify,
    Unknown(u8),
}

impl From<u8> for XcpErrorCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::CmdSynch,
            0x10 => Self::CmdBusy,
            0x11 => Self::DaqActive,
            0x12 => Self::PgmActive,
            0x20 => Self::CmdUnknown,
            0x21 => Self::CmdSyntax,
            0x22 => Self::OutOfRange,
            0x23 => Self::WriteProtected,
            0x24 => Self::AccessDenied,
            0x25 => Self::AccessLocked,
            0x26 => Self::PageNotValid,
            0x27 => Self::ModeNotValid,
            0x28 => Self::SegmentNotValid,
            0x29 => Self::Sequence,
            0x2A => Self::DaqConfig,
            0x30 => Self::MemoryOverflow,
            0x31 => Self::Generic,
            0x32 => Self::Verify,
            other => Self::Unknown(other),
        }
    }
}

impl From<XcpErrorCode> for u8 {
    fn from(code: XcpErrorCode) -> Self {
        match code {
            XcpErrorCode::CmdSynch => 0x00,
            XcpErrorCode::CmdBusy => 0x10,
            XcpErrorCode::DaqActive => 0x11,
            XcpErrorCode::PgmActive => 0x12,
            XcpErrorCode::CmdUnknown => 0x20,
            XcpErrorCode::CmdSyntax => 0x21,
            XcpErrorCode::OutOfRange => 0x22,
            XcpErrorCode::WriteProtected => 0x23,
            XcpErrorCode::AccessDenied => 0x24,
            XcpErrorCode::AccessLocked => 0x25,
            XcpErrorCode::PageNotValid => 0x26,
            XcpErrorCode::ModeNotValid => 0x27,
            XcpErrorCode::SegmentNotValid => 0x28,
            XcpErrorCode::Sequence => 0x29,
            XcpErrorCode::DaqConfig => 0x2A,
            XcpErrorCode::MemoryOverflow => 0x30,
            XcpErrorCode::Generic => 0x31,
            XcpErrorCode::Verify => 0x32,
            XcpErrorCode::Unknown(v) => v,
        }
    }
}

impl fmt::UpperHex for XcpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: u8 = (*self).into();
        fmt::UpperHex::fmt(&value, f)
    }
}

impl fmt::Display for XcpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desc = match self {
            Self::CmdSynch => "Command processor synchronization",
            Self::CmdBusy => "Command was not executed, slave busy",
            Self::DaqActive => "Command rejected because DAQ is running",
            Self::PgmActive => "Command rejected because PGM is running",
            Self::CmdUnknown => "Unknown command or not implemented",
            Self::CmdSyntax => "Command syntax invalid",
            Self::OutOfRange => "Command syntax valid but out of range",
            Self::WriteProtected => "Memory location is write protected",
            Self::AccessDenied => "Memory location is not accessible",
            Self::AccessLocked => "Access denied, seed and key required",
            Self::PageNotValid => "Selected page not available",
            Self::ModeNotValid => "Selected page mode not available",
            Self::SegmentNotValid => "Selected segment not valid",
            Self::Sequence => "Sequence error",
            Self::DaqConfig => "DAQ configuration not valid",
            Self::MemoryOverflow => "Memory overflow error",
            Self::Generic => "Generic error",
            Self::Verify => "Verification of programmed data failed",
            Self::Unknown(_) => "Unknown error code",
        };
        write!(f, "{}", desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        assert_eq!(XcpErrorCode::from(0x22), XcpErrorCode::OutOfRange);
        assert_eq!(XcpErrorCode::from(0x77), XcpErrorCode::Unknown(0x77));
        assert_eq!(u8::from(XcpErrorCode::Verify), 0x32);
        assert_eq!(u8::from(XcpErrorCode::Unknown(0x77)), 0x77);
    }

    #[test]
    fn test_formatting() {
        let code = XcpErrorCode::AccessLocked;
        assert_eq!(format!("0x{:02X}", code), "0x25");
        assert_eq!(code.to_string(), "Access denied, seed and key required");
    }
}
