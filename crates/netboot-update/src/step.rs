//! Update steps

use std::fmt;

/// Steps of an update session, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    ValidateImage,
    OpenImage,
    ParseImage,
    OpenTransport,
    ConnectDevice,
    StartSession,
    Erase,
    ProgramLoop,
    StopSession,
    ResetAndDisconnect,
    CloseAll,
    Done,
}

impl Step {
    /// The eleven working steps, without the terminal `Done`
    pub const SEQUENCE: [Step; 11] = [
        Step::ValidateImage,
        Step::OpenImage,
        Step::ParseImage,
        Step::OpenTransport,
        Step::ConnectDevice,
        Step::StartSession,
        Step::Erase,
        Step::ProgramLoop,
        Step::StopSession,
        Step::ResetAndDisconnect,
        Step::CloseAll,
    ];

    pub fn next(self) -> Option<Step> {
        match self {
            Self::ValidateImage => Some(Self::OpenImage),
            Self::OpenImage => Some(Self::ParseImage),
            Self::ParseImage => Some(Self::OpenTransport),
            Self::OpenTransport => Some(Self::ConnectDevice),
            Self::ConnectDevice => Some(Self::StartSession),
            Self::StartSession => Some(Self::Erase),
            Self::Erase => Some(Self::ProgramLoop),
            Self::ProgramLoop => Some(Self::StopSession),
            Self::StopSession => Some(Self::ResetAndDisconnect),
            Self::ResetAndDisconnect => Some(Self::CloseAll),
            Self::CloseAll => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// The device has answered CONNECT by the time this step runs
    pub fn is_device_session(self) -> bool {
        (Self::StartSession..=Self::ResetAndDisconnect).contains(&self)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ValidateImage => "validate image",
            Self::OpenImage => "open image",
            Self::ParseImage => "parse image",
            Self::OpenTransport => "open transport",
            Self::ConnectDevice => "connect to bootloader",
            Self::StartSession => "start programming session",
            Self::Erase => "erase memory",
            Self::ProgramLoop => "program data",
            Self::StopSession => "finish programming session",
            Self::ResetAndDisconnect => "reset device",
            Self::CloseAll => "close connection",
            Self::Done => "done",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_matches_next() {
        for pair in Step::SEQUENCE.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
        }
        assert_eq!(Step::CloseAll.next(), Some(Step::Done));
        assert_eq!(Step::Done.next(), None);
    }

    #[test]
    fn test_device_session_steps() {
        assert!(!Step::ConnectDevice.is_device_session());
        assert!(Step::StartSession.is_device_session());
        assert!(Step::ResetAndDisconnect.is_device_session());
        assert!(!Step::CloseAll.is_device_session());
    }
}
