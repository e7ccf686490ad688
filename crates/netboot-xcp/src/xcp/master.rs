//! XCP master command layer

use tracing::{debug, info};

use super::{command_code, pid, ByteOrder, Command, SlaveInfo, XcpError, XcpErrorCode, XcpTimeouts};
use crate::transport::{
    PacketBuffer, PacketTransport, TransportError, TransportState, MASTER_RX_MAX_DATA,
};

/// Issues XCP commands over a [`PacketTransport`].
///
/// Every command is a single request/response exchange. Multi-packet
/// operations (erase, program, read) set the memory transfer address first
/// and then split the data according to the sizes negotiated on CONNECT and
/// PROGRAM_START.
pub struct XcpMaster {
    transport: Box<dyn PacketTransport>,
    timeouts: XcpTimeouts,
    slave: Option<SlaveInfo>,
}

impl XcpMaster {
    pub fn new(transport: Box<dyn PacketTransport>, timeouts: XcpTimeouts) -> Self {
        Self {
            transport,
            timeouts,
            slave: None,
        }
    }

    /// Parameters from the last successful CONNECT
    pub fn slave_info(&self) -> Option<SlaveInfo> {
        self.slave
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    /// Close the underlying transport
    pub async fn close(&mut self) {
        self.slave = None;
        self.transport.close().await;
    }

    fn slave(&self) -> Result<SlaveInfo, XcpError> {
        self.slave.ok_or(XcpError::NotConnected)
    }

    /// Send one command and require a positive response
    async fn command(
        &mut self,
        command: Command,
        request: &[u8],
    ) -> Result<&PacketBuffer, XcpError> {
        let timeout = self.timeouts.for_command(command);
        debug!(%command, request = %hex::encode(request), "XCP request");

        let response = self.transport.exchange(request, timeout).await?;
        debug!(%command, response = %hex::encode(response.as_bytes()), "XCP response");

        check_positive(command, response)?;
        Ok(response)
    }

    /// CONNECT in normal mode and record the slave's byte order and packet sizes
    pub async fn connect(&mut self) -> Result<SlaveInfo, XcpError> {
        let request = [command_code::CONNECT, 0x00];
        let response = self.command(Command::Connect, &request).await?;

        let bytes = response.as_bytes();
        if bytes.len() < 6 {
            return Err(XcpError::InvalidResponse(format!(
                "CONNECT response has {} bytes, expected at least 6",
                bytes.len()
            )));
        }

        let byte_order = ByteOrder::from_comm_mode(bytes[2]);
        let max_cto = bytes[3];
        let max_dto = byte_order.decode_u16([bytes[4], bytes[5]]);

        if max_cto < 2 {
            return Err(XcpError::InvalidResponse(format!(
                "slave reports MAX_CTO of {}",
                max_cto
            )));
        }
        if usize::from(max_dto) > MASTER_RX_MAX_DATA || max_dto < 2 {
            return Err(XcpError::InvalidResponse(format!(
                "slave reports MAX_DTO of {}, supported range is 2..={}",
                max_dto, MASTER_RX_MAX_DATA
            )));
        }

        let info = SlaveInfo {
            byte_order,
            max_cto,
            max_prog_cto: max_cto,
            max_dto,
        };
        info!(?byte_order, max_cto, max_dto, "Connected to XCP slave");
        self.slave = Some(info);
        Ok(info)
    }

    /// Set the memory transfer address for the following transfer
    pub async fn set_mta(&mut self, address: u32) -> Result<(), XcpError> {
        let info = self.slave()?;
        let mut request = [command_code::SET_MTA, 0x00, 0x00, 0x00, 0, 0, 0, 0];
        request[4..].copy_from_slice(&info.byte_order.encode_u32(address));

        self.command(Command::SetMta, &request).await?;
        Ok(())
    }

    /// PROGRAM_START, which may change the programming packet size
    pub async fn start_programming_session(&mut self) -> Result<(), XcpError> {
        let mut info = self.slave()?;
        let response = self
            .command(Command::ProgramStart, &[command_code::PROGRAM_START])
            .await?;

        let max_prog_cto = response.get(3).ok_or_else(|| {
            XcpError::InvalidResponse(format!(
                "PROGRAM_START response has {} bytes, expected at least 4",
                response.len()
            ))
        })?;
        if max_prog_cto < 2 {
            return Err(XcpError::InvalidResponse(format!(
                "slave reports MAX_CTO_PGM of {}",
                max_prog_cto
            )));
        }

        info.max_prog_cto = max_prog_cto;
        self.slave = Some(info);
        debug!(max_prog_cto, "Programming session started");
        Ok(())
    }

    /// Erase `length` bytes of non-volatile memory starting at `address`
    pub async fn clear_memory(&mut self, address: u32, length: u32) -> Result<(), XcpError> {
        let info = self.slave()?;
        self.set_mta(address).await?;

        let mut request = [command_code::PROGRAM_CLEAR, 0x00, 0x00, 0x00, 0, 0, 0, 0];
        request[4..].copy_from_slice(&info.byte_order.encode_u32(length));

        self.command(Command::ProgramClear, &request).await?;
        Ok(())
    }

    /// Program `data` starting at `address`.
    ///
    /// The first packet carries the remainder of the length modulo the
    /// largest PROGRAM payload, so every later packet is a full PROGRAM_MAX.
    pub async fn program_data(&mut self, address: u32, data: &[u8]) -> Result<(), XcpError> {
        let info = self.slave()?;
        self.set_mta(address).await?;

        let max_payload = usize::from(info.max_prog_cto) - 1;
        let mut remaining = data;

        while !remaining.is_empty() {
            let count = match remaining.len() % max_payload {
                0 => max_payload,
                partial => partial,
            };
            let (chunk, rest) = remaining.split_at(count);

            if count < max_payload {
                self.program(chunk).await?;
            } else {
                self.program_max(chunk).await?;
            }
            remaining = rest;
        }

        Ok(())
    }

    async fn program(&mut self, chunk: &[u8]) -> Result<(), XcpError> {
        let mut request = Vec::with_capacity(chunk.len() + 2);
        request.push(command_code::PROGRAM);
        request.push(chunk.len() as u8);
        request.extend_from_slice(chunk);

        self.command(Command::Program, &request).await?;
        Ok(())
    }

    async fn program_max(&mut self, chunk: &[u8]) -> Result<(), XcpError> {
        let mut request = Vec::with_capacity(chunk.len() + 1);
        request.push(command_code::PROGRAM_MAX);
        request.extend_from_slice(chunk);

        self.command(Command::ProgramMax, &request).await?;
        Ok(())
    }

    /// Read `length` bytes starting at `address` with UPLOAD
    pub async fn read_data(&mut self, address: u32, length: usize) -> Result<Vec<u8>, XcpError> {
        let info = self.slave()?;
        self.set_mta(address).await?;

        let max_payload = usize::from(info.max_dto) - 1;
        let mut data = Vec::with_capacity(length);

        while data.len() < length {
            let left = length - data.len();
            let count = match left % max_payload {
                0 => max_payload,
                partial => partial,
            };

            let response = self
                .command(Command::Upload, &[command_code::UPLOAD, count as u8])
                .await?;
            let payload = response.as_bytes().get(1..=count).ok_or_else(|| {
                XcpError::InvalidResponse(format!(
                    "UPLOAD of {} bytes answered with {} bytes",
                    count,
                    response.len().saturating_sub(1)
                ))
            })?;
            data.extend_from_slice(payload);
        }

        Ok(data)
    }

    /// End the programming session with a zero-length PROGRAM
    pub async fn stop_programming_session(&mut self) -> Result<(), XcpError> {
        self.slave()?;
        self.command(Command::Program, &[command_code::PROGRAM, 0x00])
            .await?;
        Ok(())
    }

    /// PROGRAM_RESET, which also ends the XCP session.
    ///
    /// The slave restarts into the new firmware and may never answer, so a
    /// missing response or a dropped connection counts as success.
    pub async fn reset_and_disconnect(&mut self) -> Result<(), XcpError> {
        let command = Command::ProgramReset;
        let timeout = self.timeouts.for_command(command);
        debug!(%command, "XCP request");

        let outcome = match self
            .transport
            .exchange(&[command_code::PROGRAM_RESET], timeout)
            .await
        {
            Ok(response) => check_positive(command, response),
            Err(TransportError::ReceiveTimeout { .. }) | Err(TransportError::ConnectionClosed) => {
                debug!("No response to PROGRAM_RESET, slave is restarting");
                Ok(())
            }
            Err(e) => Err(e.into()),
        };

        self.slave = None;
        outcome
    }
}

fn check_positive(command: Command, response: &PacketBuffer) -> Result<(), XcpError> {
    match response.pid() {
        Some(pid::RESPONSE) => Ok(()),
        Some(pid::ERROR) => Err(XcpError::Rejected {
            command,
            error_code: response.get(1).map(XcpErrorCode::from),
        }),
        other => {
            debug!(%command, pid = ?other, "Response is not a positive acknowledgement");
            Err(XcpError::Rejected {
                command,
                error_code: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockDevice, MockReply};
    use pretty_assertions::assert_eq;

    fn master(device: &MockDevice) -> XcpMaster {
        XcpMaster::new(Box::new(device.transport()), XcpTimeouts::default())
    }

    async fn connected(device: &MockDevice) -> XcpMaster {
        let mut master = master(device);
        master.connect().await.unwrap();
        master
    }

    #[tokio::test]
    async fn test_connect_intel() {
        let device = MockDevice::new();
        device.on(&[0xFF], MockReply::Respond(vec![0xFF, 0x00, 0x00, 0x20, 0x40, 0x00]));
        let mut master = master(&device);

        let info = master.connect().await.unwrap();

        assert_eq!(
            info,
            SlaveInfo {
                byte_order: ByteOrder::Intel,
                max_cto: 0x20,
                max_prog_cto: 0x20,
                max_dto: 0x40,
            }
        );
        assert_eq!(device.requests(), vec![vec![0xFF, 0x00]]);
    }

    #[tokio::test]
    async fn test_connect_motorola() {
        let device = MockDevice::new();
        device.on(&[0xFF], MockReply::Respond(vec![0xFF, 0x00, 0x01, 0x08, 0x00, 0x10]));
        let mut master = master(&device);

        let info = master.connect().await.unwrap();
        assert_eq!(info.byte_order, ByteOrder::Motorola);
        assert_eq!(info.max_dto, 0x10);

        master.set_mta(0x0800_4000).await.unwrap();
        assert_eq!(
            device.requests_for(0xF6),
            vec![vec![0xF6, 0x00, 0x00, 0x00, 0x08, 0x00, 0x40, 0x00]]
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_oversized_dto() {
        let device = MockDevice::new();
        device.on(&[0xFF], MockReply::Respond(vec![0xFF, 0x00, 0x00, 0x08, 0x00, 0x01]));
        let mut master = master(&device);

        let err = master.connect().await.unwrap_err();
        assert!(matches!(err, XcpError::InvalidResponse(_)));
        assert_eq!(master.slave_info(), None);
    }

    #[tokio::test]
    async fn test_connect_short_response() {
        let device = MockDevice::new();
        device.on(&[0xFF], MockReply::Respond(vec![0xFF, 0x00]));
        let mut master = master(&device);

        assert!(matches!(
            master.connect().await.unwrap_err(),
            XcpError::InvalidResponse(_)
        ));
    }

    #[tokio::test]
    async fn test_error_packet_is_rejected() {
        let device = MockDevice::new();
        device.on(&[0xD2], MockReply::Respond(vec![0xFE, 0x25]));
        let mut master = connected(&device).await;

        let err = master.start_programming_session().await.unwrap_err();
        assert_eq!(
            err,
            XcpError::Rejected {
                command: Command::ProgramStart,
                error_code: Some(XcpErrorCode::AccessLocked),
            }
        );
    }

    #[tokio::test]
    async fn test_commands_require_connect() {
        let device = MockDevice::new();
        let mut master = master(&device);

        assert_eq!(master.set_mta(0).await.unwrap_err(), XcpError::NotConnected);
        assert_eq!(
            master.program_data(0, &[1, 2, 3]).await.unwrap_err(),
            XcpError::NotConnected
        );
        assert!(device.requests().is_empty());
    }

    #[tokio::test]
    async fn test_program_start_updates_max_prog_cto() {
        let device = MockDevice::new();
        device.on(&[0xD2], MockReply::Respond(vec![0xFF, 0x00, 0x00, 0x10]));
        let mut master = connected(&device).await;

        master.start_programming_session().await.unwrap();
        assert_eq!(master.slave_info().unwrap().max_prog_cto, 0x10);
    }

    #[tokio::test]
    async fn test_clear_memory() {
        let device = MockDevice::new();
        let mut master = connected(&device).await;

        master.clear_memory(0x0800_0000, 0x1234).await.unwrap();

        assert_eq!(
            device.requests()[1..],
            [
                vec![0xF6, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08],
                vec![0xD1, 0x00, 0x00, 0x00, 0x34, 0x12, 0x00, 0x00],
            ]
        );
    }

    #[tokio::test]
    async fn test_program_data_segmentation() {
        // max_prog_cto 8 => 7 data bytes per PROGRAM_MAX
        let device = MockDevice::new();
        let mut master = connected(&device).await;
        master.start_programming_session().await.unwrap();

        let data: Vec<u8> = (0..17).collect();
        master.program_data(0x100, &data).await.unwrap();

        let requests = device.requests();
        assert_eq!(
            requests[2..],
            [
                vec![0xF6, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00],
                vec![0xD0, 0x03, 0, 1, 2],
                vec![0xC9, 3, 4, 5, 6, 7, 8, 9],
                vec![0xC9, 10, 11, 12, 13, 14, 15, 16],
            ]
        );
    }

    #[tokio::test]
    async fn test_program_data_exact_multiple() {
        let device = MockDevice::new();
        let mut master = connected(&device).await;

        master.program_data(0, &[0xAA; 14]).await.unwrap();

        assert!(device.requests_for(0xD0).is_empty());
        assert_eq!(device.requests_for(0xC9).len(), 2);
    }

    #[tokio::test]
    async fn test_program_data_stops_on_rejection() {
        let device = MockDevice::new();
        device.on(&[0xC9], MockReply::Respond(vec![0xFE, 0x23]));
        let mut master = connected(&device).await;

        let err = master.program_data(0, &[0x55; 21]).await.unwrap_err();
        assert!(matches!(err, XcpError::Rejected { command: Command::ProgramMax, .. }));
        assert_eq!(device.requests_for(0xC9).len(), 1);
    }

    #[tokio::test]
    async fn test_read_data() {
        // max_dto 8 => 7 bytes per UPLOAD
        let device = MockDevice::new();
        let mut master = connected(&device).await;

        let data = master.read_data(0x2000, 10).await.unwrap();

        assert_eq!(data, vec![0, 3, 6, 0, 3, 6, 9, 12, 15, 18]);
        assert_eq!(device.requests_for(0xF5), vec![vec![0xF5, 3], vec![0xF5, 7]]);
    }

    #[tokio::test]
    async fn test_read_data_short_upload() {
        let device = MockDevice::new();
        device.on(&[0xF5], MockReply::Respond(vec![0xFF, 0x01]));
        let mut master = connected(&device).await;

        let err = master.read_data(0, 4).await.unwrap_err();
        assert!(matches!(err, XcpError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_stop_programming_session() {
        let device = MockDevice::new();
        let mut master = connected(&device).await;

        master.stop_programming_session().await.unwrap();
        assert_eq!(device.requests_for(0xD0), vec![vec![0xD0, 0x00]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_tolerates_silence() {
        let device = MockDevice::new();
        device.on(&[0xCF], MockReply::Timeout);
        let mut master = connected(&device).await;

        master.reset_and_disconnect().await.unwrap();
        assert_eq!(master.slave_info(), None);
    }

    #[tokio::test]
    async fn test_reset_tolerates_disconnect() {
        let device = MockDevice::new();
        device.on(&[0xCF], MockReply::Disconnect);
        let mut master = connected(&device).await;

        master.reset_and_disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_reports_send_failure() {
        let device = MockDevice::new();
        device.on(&[0xCF], MockReply::SendError);
        let mut master = connected(&device).await;

        let err = master.reset_and_disconnect().await.unwrap_err();
        assert!(matches!(err, XcpError::Transport(TransportError::SendFailed(_))));
    }

    #[tokio::test]
    async fn test_reset_reports_rejection() {
        let device = MockDevice::new();
        device.on(&[0xCF], MockReply::Respond(vec![0xFE, 0x31]));
        let mut master = connected(&device).await;

        let err = master.reset_and_disconnect().await.unwrap_err();
        assert!(matches!(err, XcpError::Rejected { command: Command::ProgramReset, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_surfaces() {
        let device = MockDevice::new();
        device.on(&[0xFF], MockReply::Timeout);
        let mut master = master(&device);

        let err = master.connect().await.unwrap_err();
        assert!(err.is_no_response());
    }
}
