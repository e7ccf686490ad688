//! Packet transport layer
//!
//! A transport carries one XCP packet per frame, where a frame is a single
//! length byte followed by that many payload bytes. Exchanges are strictly
//! sequential: send one request, wait for exactly one response or give up
//! at the deadline.

mod adapter;
mod error;
pub mod framing;
pub mod mock;
mod stream;
mod tcp;

pub use adapter::{
    ConnectionTarget, PacketBuffer, PacketTransport, TransportConnector, TransportState,
    MASTER_RX_MAX_DATA, MASTER_TX_MAX_DATA, MAX_PACKET_DATA,
};
pub use error::TransportError;
pub use stream::StreamTransport;
pub use tcp::{TcpConnector, DEFAULT_CONNECT_TIMEOUT};
