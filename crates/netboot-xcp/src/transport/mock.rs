//! Scripted in-memory device for testing

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    ConnectionTarget, PacketBuffer, PacketTransport, TransportConnector, TransportError,
    TransportState,
};
use crate::clock::RX_TIMEOUT_FLOOR;

/// What the mock device does with a matching request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Answer with these payload bytes
    Respond(Vec<u8>),
    /// Stay silent until the deadline passes
    Timeout,
    /// Fail the write, closing the transport
    SendError,
    /// Close the connection instead of answering
    Disconnect,
}

#[derive(Debug)]
struct Rule {
    prefix: Vec<u8>,
    reply: MockReply,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct DeviceState {
    rules: Vec<Rule>,
    requests: Vec<Vec<u8>>,
    connect_failures: usize,
    connects: usize,
    closes: usize,
}

/// Shared handle to a simulated bootloader.
///
/// Cloned handles see the same rules and the same request log, so a test can
/// hand a connector to the code under test and inspect the traffic afterwards.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always reply to requests starting with `prefix` this way
    pub fn on(&self, prefix: &[u8], reply: MockReply) -> &Self {
        self.push_rule(prefix, reply, None)
    }

    /// Reply this way to the next `times` requests starting with `prefix`
    pub fn on_times(&self, prefix: &[u8], reply: MockReply, times: usize) -> &Self {
        self.push_rule(prefix, reply, Some(times))
    }

    /// Refuse the next `count` connection attempts
    pub fn fail_connects(&self, count: usize) -> &Self {
        self.state.lock().connect_failures = count;
        self
    }

    fn push_rule(&self, prefix: &[u8], reply: MockReply, remaining: Option<usize>) -> &Self {
        self.state.lock().rules.push(Rule {
            prefix: prefix.to_vec(),
            reply,
            remaining,
        });
        self
    }

    /// A connected transport talking to this device
    pub fn transport(&self) -> MockTransport {
        MockTransport {
            device: self.clone(),
            state: TransportState::Connected,
            response: PacketBuffer::new(),
        }
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            device: self.clone(),
        }
    }

    /// Every request payload received so far, in order
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.state.lock().requests.clone()
    }

    /// Requests whose first byte is `command`
    pub fn requests_for(&self, command: u8) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|request| request.first() == Some(&command))
            .cloned()
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    fn reply_to(&self, request: &[u8]) -> MockReply {
        let mut state = self.state.lock();
        state.requests.push(request.to_vec());

        let rule = state.rules.iter_mut().find(|rule| {
            request.starts_with(&rule.prefix) && rule.remaining.map_or(true, |left| left > 0)
        });

        match rule {
            Some(rule) => {
                if let Some(left) = rule.remaining.as_mut() {
                    *left -= 1;
                }
                rule.reply.clone()
            }
            None => MockReply::Respond(default_response(request)),
        }
    }
}

/// Positive responses of a healthy Intel-order slave with an 8 byte CTO
fn default_response(request: &[u8]) -> Vec<u8> {
    match request.first() {
        // CONNECT: comm mode Intel, MAX_CTO 8, MAX_DTO 8
        Some(0xFF) => vec![0xFF, 0x00, 0x00, 0x08, 0x08, 0x00],
        // PROGRAM_START: max program CTO 8
        Some(0xD2) => vec![0xFF, 0x00, 0x00, 0x08],
        // UPLOAD: echo a fill pattern of the requested size
        Some(0xF5) => {
            let count = request.get(1).copied().unwrap_or(0);
            let mut response = vec![0xFF];
            response.extend((0..count).map(|i| i.wrapping_mul(3)));
            response
        }
        _ => vec![0xFF],
    }
}

/// In-memory [`PacketTransport`] backed by a [`MockDevice`]
pub struct MockTransport {
    device: MockDevice,
    state: TransportState,
    response: PacketBuffer,
}

#[async_trait]
impl PacketTransport for MockTransport {
    fn state(&self) -> TransportState {
        self.state
    }

    async fn exchange<'a>(
        &'a mut self,
        request: &[u8],
        timeout: Duration,
    ) -> Result<&'a PacketBuffer, TransportError> {
        if self.state != TransportState::Connected {
            return Err(TransportError::NotConnected);
        }

        self.response.clear();
        match self.device.reply_to(request) {
            MockReply::Respond(bytes) => {
                self.response.fill_from(&bytes);
                Ok(&self.response)
            }
            MockReply::Timeout => {
                let waited = timeout + RX_TIMEOUT_FLOOR;
                tokio::time::sleep(waited).await;
                Err(TransportError::ReceiveTimeout {
                    timeout_ms: waited.as_millis() as u64,
                })
            }
            MockReply::SendError => {
                self.state = TransportState::Closed;
                Err(TransportError::SendFailed("Broken pipe".to_string()))
            }
            MockReply::Disconnect => {
                self.state = TransportState::Closed;
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    async fn close(&mut self) {
        self.device.state.lock().closes += 1;
        self.state = TransportState::Closed;
    }
}

/// [`TransportConnector`] handing out [`MockTransport`]s
#[derive(Debug, Clone)]
pub struct MockConnector {
    device: MockDevice,
}

#[async_trait]
impl TransportConnector for MockConnector {
    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> Result<Box<dyn PacketTransport>, TransportError> {
        {
            let mut state = self.device.state.lock();
            state.connects += 1;
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(TransportError::ConnectionFailed(format!(
                    "{}: Connection refused",
                    target
                )));
            }
        }
        Ok(Box::new(self.device.transport()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_default_responses() {
        let device = MockDevice::new();
        let mut transport = device.transport();

        let response = transport.exchange(&[0xFF, 0x00], TIMEOUT).await.unwrap();
        assert_eq!(response.as_bytes(), &[0xFF, 0x00, 0x00, 0x08, 0x08, 0x00]);

        let response = transport.exchange(&[0xF5, 0x02], TIMEOUT).await.unwrap();
        assert_eq!(response.as_bytes(), &[0xFF, 0x00, 0x03]);

        let response = transport.exchange(&[0xCF], TIMEOUT).await.unwrap();
        assert_eq!(response.as_bytes(), &[0xFF]);

        assert_eq!(device.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rule_with_limited_uses() {
        let device = MockDevice::new();
        device.on_times(&[0xFF], MockReply::Timeout, 2);
        let mut transport = device.transport();

        for _ in 0..2 {
            let result = transport.exchange(&[0xFF, 0x00], TIMEOUT).await;
            assert_eq!(result.unwrap_err(), TransportError::ReceiveTimeout { timeout_ms: 120 });
        }
        assert!(transport.exchange(&[0xFF, 0x00], TIMEOUT).await.is_ok());
        assert_eq!(device.requests_for(0xFF).len(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_closes_transport() {
        let device = MockDevice::new();
        device.on(&[0xD1], MockReply::Disconnect);
        let mut transport = device.transport();

        let result = transport.exchange(&[0xD1, 0, 0, 0, 0, 1, 0, 0], TIMEOUT).await;
        assert_eq!(result.unwrap_err(), TransportError::ConnectionClosed);
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_connector_failures() {
        let device = MockDevice::new();
        device.fail_connects(1);
        let connector = device.connector();
        let target = ConnectionTarget::new("mock", 1000);

        assert!(connector.connect(&target).await.is_err());
        let mut transport = connector.connect(&target).await.unwrap();
        transport.close().await;
        transport.close().await;

        assert_eq!(device.connect_count(), 2);
        assert_eq!(device.close_count(), 2);
    }
}
