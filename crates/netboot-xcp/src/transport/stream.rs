//! Packet transport over any async byte stream

use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use super::framing::{encode_frame, FrameDecoder};
use super::{PacketBuffer, PacketTransport, TransportError, TransportState, MAX_PACKET_DATA};
use crate::clock::{Deadline, RX_TIMEOUT_FLOOR};

/// Frames packets over a byte stream such as a `TcpStream`.
///
/// Any fatal I/O condition drops the stream and moves the transport to
/// [`TransportState::Closed`]; later exchanges fail fast.
pub struct StreamTransport<S> {
    stream: Option<S>,
    state: TransportState,
    peer: String,
    response: PacketBuffer,
    /// Bytes still owed by a frame whose receive timed out part way
    pending_discard: usize,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already connected stream
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream: Some(stream),
            state: TransportState::Connected,
            peer: peer.into(),
            response: PacketBuffer::new(),
            pending_discard: 0,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn fail(&mut self, error: TransportError) -> TransportError {
        warn!(peer = %self.peer, %error, "Transport failed, closing");
        self.stream = None;
        self.state = TransportState::Closed;
        error
    }

    /// Discard bytes left over from an earlier exchange that timed out mid-frame
    fn drain_stale(&mut self) -> Result<(), TransportError> {
        let mut scratch = [0u8; MAX_PACKET_DATA];

        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Err(TransportError::NotConnected);
            };

            match stream.read(&mut scratch).now_or_never() {
                None => return Ok(()),
                Some(Ok(0)) => return Err(self.fail(TransportError::ConnectionClosed)),
                Some(Ok(n)) => {
                    self.pending_discard = self.pending_discard.saturating_sub(n);
                    warn!(
                        peer = %self.peer,
                        data = %hex::encode(&scratch[..n]),
                        "Drained stale bytes"
                    );
                }
                Some(Err(e)) => {
                    return Err(self.fail(TransportError::ReceiveFailed(e.to_string())))
                }
            }
        }
    }

    async fn send_frame(&mut self, request: &[u8]) -> Result<(), TransportError> {
        let frame = encode_frame(request)?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        let sent = match stream.write_all(&frame).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => {
                trace!(peer = %self.peer, frame = %hex::encode(&frame), "Frame sent");
                Ok(())
            }
            Err(e) => Err(self.fail(TransportError::SendFailed(e.to_string()))),
        }
    }

    /// One read bounded by `deadline`, `None` once the deadline has passed
    async fn read_before(
        &mut self,
        buf: &mut [u8],
        deadline: Deadline,
    ) -> Result<Option<usize>, TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        let read = tokio::time::timeout_at(deadline.instant(), stream.read(buf)).await;
        match read {
            Err(_) => Ok(None),
            Ok(Ok(0)) => Err(self.fail(TransportError::ConnectionClosed)),
            Ok(Ok(n)) => Ok(Some(n)),
            Ok(Err(e)) => Err(self.fail(TransportError::ReceiveFailed(e.to_string()))),
        }
    }

    async fn receive_frame(&mut self, timeout: Duration) -> Result<(), TransportError> {
        let deadline = Deadline::for_response(timeout);
        let timed_out = || TransportError::ReceiveTimeout {
            timeout_ms: (timeout + RX_TIMEOUT_FLOOR).as_millis() as u64,
        };
        let mut scratch = [0u8; MAX_PACKET_DATA];

        // The tail of a late frame must not be mistaken for a length byte
        while self.pending_discard > 0 {
            let want = self.pending_discard.min(scratch.len());
            let Some(n) = self.read_before(&mut scratch[..want], deadline).await? else {
                return Err(timed_out());
            };
            self.pending_discard -= n;
            debug!(
                peer = %self.peer,
                data = %hex::encode(&scratch[..n]),
                left_ms = deadline.remaining().as_millis() as u64,
                "Discarded tail of late frame"
            );
        }

        let mut decoder = FrameDecoder::new();
        while !decoder.is_complete() {
            // Read at most what the frame still needs so trailing bytes stay on the stream
            let want = decoder.needed();
            match self.read_before(&mut scratch[..want], deadline).await? {
                Some(n) => {
                    decoder.feed(&scratch[..n], &mut self.response);
                }
                None => {
                    if decoder.has_started() {
                        self.pending_discard = decoder.needed();
                        debug!(
                            peer = %self.peer,
                            missing = self.pending_discard,
                            "Frame incomplete at deadline"
                        );
                    }
                    self.response.clear();
                    return Err(timed_out());
                }
            }
        }

        trace!(
            peer = %self.peer,
            data = %hex::encode(self.response.as_bytes()),
            "Frame received"
        );
        Ok(())
    }
}

#[async_trait]
impl<S> PacketTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
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
        self.drain_stale()?;
        self.send_frame(request).await?;
        self.receive_frame(timeout).await?;

        Ok(&self.response)
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(peer = %self.peer, error = %e, "Shutdown after close failed");
            }
            debug!(peer = %self.peer, "Transport closed");
        }
        self.state = TransportState::Closed;
    }
}
