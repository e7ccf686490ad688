//! TCP front end for the simulated bootloader

use std::net::SocketAddr;
use std::sync::Arc;

use netboot_xcp::transport::framing::{encode_frame, FrameDecoder, MAX_FRAME_PAYLOAD};
use netboot_xcp::PacketBuffer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bootloader::{Reply, SimulatedBootloader};

/// Serves one [`SimulatedBootloader`] to any number of sequential masters
pub struct BootloaderServer {
    listener: TcpListener,
    bootloader: Arc<SimulatedBootloader>,
}

impl BootloaderServer {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        bootloader: Arc<SimulatedBootloader>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            bootloader,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn bootloader(&self) -> Arc<SimulatedBootloader> {
        self.bootloader.clone()
    }

    /// Accept connections until the listener fails
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            info!(%peer, "Master connected over TCP");

            if let Err(e) = serve(stream, &self.bootloader).await {
                warn!(%peer, error = %e, "Connection ended with error");
            }
            info!(%peer, "Connection closed");
        }
    }

    /// Run the accept loop on a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!(error = %e, "Bootloader server stopped");
            }
        })
    }
}

/// Read one frame into `packet`, `false` once the peer has closed the connection
async fn read_frame(stream: &mut TcpStream, packet: &mut PacketBuffer) -> std::io::Result<bool> {
    let mut decoder = FrameDecoder::new();
    let mut scratch = [0u8; MAX_FRAME_PAYLOAD];

    while !decoder.is_complete() {
        let n = stream.read(&mut scratch[..decoder.needed()]).await?;
        if n == 0 {
            if decoder.has_started() {
                debug!("Peer closed connection mid-frame");
            }
            return Ok(false);
        }
        decoder.feed(&scratch[..n], packet);
    }
    Ok(true)
}

async fn serve(mut stream: TcpStream, bootloader: &SimulatedBootloader) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let mut packet = PacketBuffer::new();

    while read_frame(&mut stream, &mut packet).await? {
        let request = packet.as_bytes();
        debug!(request = %hex::encode(request), "Received XCP request");

        let (response, reset) = match bootloader.process_request(request) {
            Reply::Respond(response) => (response, false),
            Reply::RespondAndReset(response) => (response, true),
            Reply::Silent => continue,
        };

        debug!(response = %hex::encode(&response), "Sending XCP response");
        let frame = encode_frame(&response)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        stream.write_all(&frame).await?;
        stream.flush().await?;

        if reset {
            info!("Device restarting, dropping connection");
            stream.shutdown().await?;
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BootloaderConfig;
    use pretty_assertions::assert_eq;

    async fn start(config: BootloaderConfig) -> (SocketAddr, Arc<SimulatedBootloader>) {
        let bootloader = Arc::new(SimulatedBootloader::new(config));
        let server = BootloaderServer::bind("127.0.0.1:0", bootloader.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        server.spawn();
        (addr, bootloader)
    }

    async fn exchange(stream: &mut TcpStream, request: &[u8]) -> Vec<u8> {
        stream.write_all(&encode_frame(request).unwrap()).await.unwrap();
        let len = stream.read_u8().await.unwrap();
        let mut response = vec![0u8; usize::from(len)];
        stream.read_exact(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_framed_exchange() {
        let (addr, bootloader) = start(BootloaderConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let response = exchange(&mut stream, &[0xFF, 0x00]).await;
        assert_eq!(response[0], 0xFF);
        assert!(bootloader.is_connected());
    }

    #[tokio::test]
    async fn test_split_request() {
        let (addr, _) = start(BootloaderConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(&[0x02]).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        stream.write_all(&[0xFF, 0x00]).await.unwrap();

        let len = stream.read_u8().await.unwrap();
        assert_eq!(len, 8);
    }

    #[tokio::test]
    async fn test_reset_closes_connection() {
        let (addr, bootloader) = start(BootloaderConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        exchange(&mut stream, &[0xFF, 0x00]).await;
        assert_eq!(exchange(&mut stream, &[0xCF]).await, vec![0xFF]);

        let mut rest = Vec::new();
        let n = stream.read_to_end(&mut rest).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(bootloader.reset_count(), 1);
    }

    #[tokio::test]
    async fn test_next_master_after_disconnect() {
        let (addr, _) = start(BootloaderConfig::default()).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        exchange(&mut first, &[0xFF, 0x00]).await;
        drop(first);

        let mut second = TcpStream::connect(addr).await.unwrap();
        assert_eq!(exchange(&mut second, &[0xFF, 0x00]).await[0], 0xFF);
    }
}
