//! TCP connector

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::{ConnectionTarget, PacketTransport, StreamTransport, TransportConnector, TransportError};

/// Default time allowed for establishing the TCP connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens [`StreamTransport`]s over TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> Result<Box<dyn PacketTransport>, TransportError> {
        info!(%target, "Connecting to device");

        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((target.host.as_str(), target.port)),
        )
        .await
        .map_err(|_| {
            TransportError::ConnectionFailed(format!(
                "{} did not accept the connection within {} ms",
                target,
                self.connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", target, e)))?;

        // Packets are tiny and latency-bound
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to disable Nagle's algorithm");
        }

        let transport = StreamTransport::new(stream, target.to_string());
        info!(peer = transport.peer(), "Connected");
        Ok(Box::new(transport))
    }
}
