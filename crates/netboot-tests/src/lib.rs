//! End-to-end test harness for netboot
//!
//! Every test starts an in-process [`example_bootloader`] server on a
//! loopback port and runs the real updater against it over TCP, so no
//! hardware or external processes are needed.
//!
//! ```bash
//! cargo test -p netboot-tests
//! ```
//!
//! # Test Structure
//!
//! - `update_e2e_test.rs` - Successful updates and device variants
//! - `failure_e2e_test.rs` - Failing steps and cleanup

use std::io::BufWriter;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use example_bootloader::{BootloaderConfig, BootloaderServer, SimulatedBootloader};
use netboot_srec::srecord::SrecordWriter;
use netboot_srec::SrecordSource;
use netboot_update::{
    ProgressReporter, Step, UpdateConfig, UpdateError, UpdateFailure, UpdateSummary, Updater,
};
use netboot_xcp::{ConnectionTarget, TcpConnector};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;

/// Simulated device listening on loopback
pub struct TestDevice {
    pub bootloader: Arc<SimulatedBootloader>,
    pub addr: SocketAddr,
    server: JoinHandle<()>,
}

impl TestDevice {
    pub async fn start(config: BootloaderConfig) -> Self {
        let bootloader = Arc::new(SimulatedBootloader::new(config));
        let server = BootloaderServer::bind("127.0.0.1:0", bootloader.clone())
            .await
            .expect("bind loopback listener");
        let addr = server.local_addr().expect("listener address");

        Self {
            bootloader,
            addr,
            server: server.spawn(),
        }
    }

    pub fn target(&self) -> ConnectionTarget {
        ConnectionTarget::new(self.addr.ip().to_string(), self.addr.port())
    }

    /// Updater wired to this device, recording into `log`
    pub fn updater(&self, log: &EventLog) -> Updater<SrecordSource> {
        Updater::new(
            SrecordSource,
            TcpConnector::default(),
            UpdateConfig::new(self.target()),
        )
        .with_reporter(log.clone())
    }
}

impl Drop for TestDevice {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Write `records` as an S-record file
pub fn firmware(records: &[(u32, Vec<u8>)]) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".srec")
        .tempfile()
        .expect("create firmware file");

    let mut writer = SrecordWriter::new(BufWriter::new(file.reopen().expect("reopen")), 32);
    writer.write_header("netboot-tests").expect("write header");
    for (address, data) in records {
        writer.write_data(*address, data).expect("write data");
    }
    let start = records.first().map_or(0, |(address, _)| *address);
    writer.finish(start).expect("finish image");

    file
}

/// Deterministic test data
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StepStarted(Step),
    StepSucceeded(Step),
    StepFailed(Step),
    WaitingForDevice,
    Finished { success: bool },
}

/// Shared reporter that records every event
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
    progress: Arc<Mutex<Vec<u32>>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Bytes done after each programmed record
    pub fn progress(&self) -> Vec<u32> {
        self.progress.lock().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }
}

impl ProgressReporter for EventLog {
    fn step_started(&mut self, step: Step) {
        self.events.lock().push(Event::StepStarted(step));
    }

    fn step_succeeded(&mut self, step: Step) {
        self.events.lock().push(Event::StepSucceeded(step));
    }

    fn step_failed(&mut self, step: Step, _error: &UpdateError) {
        self.events.lock().push(Event::StepFailed(step));
    }

    fn waiting_for_device(&mut self) {
        self.events.lock().push(Event::WaitingForDevice);
    }

    fn record_programmed(&mut self, done_bytes: u32, _total_bytes: u32) {
        self.progress.lock().push(done_bytes);
    }

    fn finished(&mut self, result: &Result<UpdateSummary, UpdateFailure>) {
        self.events.lock().push(Event::Finished {
            success: result.is_ok(),
        });
    }
}

/// Run one update of `path` against `device`
pub async fn run_update(
    device: &TestDevice,
    path: &Path,
) -> (Result<UpdateSummary, UpdateFailure>, EventLog) {
    let log = EventLog::default();
    let result = device.updater(&log).run(path).await;
    (result, log)
}
