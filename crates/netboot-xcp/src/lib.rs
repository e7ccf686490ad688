//! netboot-xcp - XCP packet transport and master commands
//!
//! This crate talks to an XCP-style bootloader over a byte stream. Every
//! packet travels as a one-byte length followed by that many payload bytes,
//! and the protocol above it is strictly request/response.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  XcpMaster                   │
//! │  CONNECT, SET_MTA, PROGRAM_*, UPLOAD, ...    │
//! │  byte order + CTO/DTO negotiation            │
//! └──────────────────────┬───────────────────────┘
//!                        │ exchange(request, timeout)
//! ┌──────────────────────┴───────────────────────┐
//! │               PacketTransport                │
//! │  [len][payload] framing, deadline-bounded    │
//! │  partial reads, connection-loss detection    │
//! │  (StreamTransport over TCP, MockDevice)      │
//! └──────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod transport;
pub mod xcp;

pub use clock::{Deadline, RX_TIMEOUT_FLOOR};
pub use transport::{
    ConnectionTarget, PacketBuffer, PacketTransport, TcpConnector, TransportConnector,
    TransportError, TransportState,
};
pub use xcp::{ByteOrder, Command, SlaveInfo, XcpError, XcpErrorCode, XcpMaster, XcpTimeouts};
