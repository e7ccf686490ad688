//! Transport traits and the shared response buffer

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use super::TransportError;

/// Largest payload the master sends in one packet
pub const MASTER_TX_MAX_DATA: usize = 255;
/// Largest payload the master accepts in one packet
pub const MASTER_RX_MAX_DATA: usize = 255;

/// Capacity of a [`PacketBuffer`]
pub const MAX_PACKET_DATA: usize = if MASTER_TX_MAX_DATA > MASTER_RX_MAX_DATA {
    MASTER_TX_MAX_DATA + 1
} else {
    MASTER_RX_MAX_DATA + 1
};

/// Host and port of the target device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
}

impl ConnectionTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Lifecycle of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Unconnected,
    Connected,
    Closed,
}

/// Fixed-capacity buffer holding the most recent response packet.
///
/// A transport owns exactly one of these and overwrites it on every
/// exchange, so the contents are only valid until the next exchange.
#[derive(Clone)]
pub struct PacketBuffer {
    len: u8,
    data: [u8; MAX_PACKET_DATA],
}

impl PacketBuffer {
    pub const fn new() -> Self {
        Self {
            len: 0,
            data: [0; MAX_PACKET_DATA],
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Packet identifier, the first payload byte
    pub fn pid(&self) -> Option<u8> {
        self.as_bytes().first().copied()
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.as_bytes().get(index).copied()
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Resize to `len` bytes and hand out the payload area for filling
    pub(crate) fn resize(&mut self, len: u8) -> &mut [u8] {
        self.len = len;
        &mut self.data[..usize::from(len)]
    }

    /// Replace the contents, truncating to the largest frame payload
    pub(crate) fn fill_from(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(MASTER_RX_MAX_DATA);
        self.resize(len as u8).copy_from_slice(&bytes[..len]);
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("len", &self.len)
            .field("data", &hex::encode(self.as_bytes()))
            .finish()
    }
}

impl PartialEq for PacketBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for PacketBuffer {}

/// Request/response packet transport
///
/// Implementations frame each request, wait for a single response frame and
/// store it in their own [`PacketBuffer`]. The returned reference borrows the
/// transport, so a response must be consumed before the next exchange.
#[async_trait]
pub trait PacketTransport: Send {
    /// Current lifecycle state
    fn state(&self) -> TransportState;

    /// Send `request` and wait up to `timeout` plus the receive floor for the reply
    async fn exchange<'a>(
        &'a mut self,
        request: &[u8],
        timeout: Duration,
    ) -> Result<&'a PacketBuffer, TransportError>;

    /// Release the connection. Calling it again has no effect.
    async fn close(&mut self);
}

/// Opens transports to a target device
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> Result<Box<dyn PacketTransport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_capacity() {
        assert_eq!(MAX_PACKET_DATA, 256);
        let buffer = PacketBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.pid(), None);
    }

    #[test]
    fn test_buffer_fill() {
        let mut buffer = PacketBuffer::new();
        buffer.fill_from(&[0xFF, 0x00, 0x10]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.pid(), Some(0xFF));
        assert_eq!(buffer.get(2), Some(0x10));
        assert_eq!(buffer.get(3), None);

        buffer.clear();
        assert_eq!(buffer.as_bytes(), &[] as &[u8]);
    }

    #[test]
    fn test_buffer_fill_truncates() {
        let mut buffer = PacketBuffer::new();
        buffer.fill_from(&[0xAA; 300]);
        assert_eq!(buffer.len(), 255);
    }

    #[test]
    fn test_target_display() {
        assert_eq!(
            ConnectionTarget::new("192.168.178.23", 1000).to_string(),
            "192.168.178.23:1000"
        );
        assert_eq!(ConnectionTarget::new("::1", 1000).to_string(), "[::1]:1000");
    }
}
