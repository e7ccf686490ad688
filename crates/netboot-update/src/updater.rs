//! Update orchestrator

use std::path::Path;

use netboot_srec::{FirmwareImage, ImageError, ImageSource, UpdatePlan};
use netboot_xcp::clock;
use netboot_xcp::{TransportConnector, TransportState, XcpError, XcpMaster};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::{NullReporter, ProgressReporter, Step, UpdateConfig, UpdateError, UpdateFailure};

/// Outcome of a successful update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    pub plan: UpdatePlan,
    pub records_programmed: usize,
    pub bytes_programmed: u32,
    /// CONNECT attempts until the bootloader answered
    pub connect_attempts: u32,
}

/// Runs firmware update sessions against one target
pub struct Updater<S: ImageSource> {
    source: S,
    connector: Box<dyn TransportConnector>,
    reporter: Box<dyn ProgressReporter>,
    config: UpdateConfig,
}

impl<S: ImageSource> Updater<S> {
    pub fn new(
        source: S,
        connector: impl TransportConnector + 'static,
        config: UpdateConfig,
    ) -> Self {
        Self {
            source,
            connector: Box::new(connector),
            reporter: Box::new(NullReporter),
            config,
        }
    }

    pub fn with_reporter(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Update the device with the firmware at `firmware`.
    ///
    /// Whatever happens, every resource that was opened is closed exactly
    /// once before this returns.
    pub async fn run(&mut self, firmware: &Path) -> Result<UpdateSummary, UpdateFailure> {
        self.reporter.started(firmware, &self.config.target);
        info!(
            firmware = %firmware.display(),
            target = %self.config.target,
            "Starting firmware update"
        );

        let result = self.execute(firmware).await;

        match &result {
            Ok(summary) => info!(
                bytes = summary.bytes_programmed,
                records = summary.records_programmed,
                "Firmware update complete"
            ),
            Err(failure) => warn!(
                step = ?failure.step,
                error = %failure.error,
                "Firmware update failed"
            ),
        }
        self.reporter.finished(&result);
        result
    }

    fn begin(&mut self, step: Step) {
        debug!(?step, "Step started");
        self.reporter.step_started(step);
    }

    fn succeed(&mut self, step: Step) {
        self.reporter.step_succeeded(step);
    }

    fn fail(&mut self, step: Step, error: UpdateError) -> UpdateFailure {
        debug!(?step, %error, "Step failed");
        self.reporter.step_failed(step, &error);
        UpdateFailure { step, error }
    }

    async fn execute(&mut self, firmware: &Path) -> Result<UpdateSummary, UpdateFailure> {
        self.begin(Step::ValidateImage);
        if !self.source.validate(firmware) {
            let error = ImageError::Invalid(firmware.display().to_string());
            return Err(self.fail(Step::ValidateImage, error.into()));
        }
        self.succeed(Step::ValidateImage);

        self.begin(Step::OpenImage);
        let mut image = match self.source.open(firmware) {
            Ok(image) => image,
            Err(e) => return Err(self.fail(Step::OpenImage, e.into())),
        };
        self.succeed(Step::OpenImage);

        let mut master = None;
        let result = self.session(&mut image, &mut master).await;

        match result {
            Ok(summary) => {
                self.begin(Step::CloseAll);
                if let Some(mut master) = master {
                    master.close().await;
                }
                image.close();
                self.succeed(Step::CloseAll);
                Ok(summary)
            }
            Err(failure) => {
                self.cleanup(failure.step, master, &mut image).await;
                Err(failure)
            }
        }
    }

    /// Steps from ParseImage through ResetAndDisconnect.
    ///
    /// The master is parked in `slot` as soon as the transport is open so
    /// the caller can close it on every path.
    async fn session(
        &mut self,
        image: &mut S::Image,
        slot: &mut Option<XcpMaster>,
    ) -> Result<UpdateSummary, UpdateFailure> {
        self.begin(Step::ParseImage);
        let plan = match image.parse() {
            Ok(plan) => plan,
            Err(e) => return Err(self.fail(Step::ParseImage, e.into())),
        };
        self.succeed(Step::ParseImage);
        info!(%plan, "Parsed firmware image");
        self.reporter.plan(&plan);

        self.begin(Step::OpenTransport);
        let transport = match self.connector.connect(&self.config.target).await {
            Ok(transport) => transport,
            Err(e) => return Err(self.fail(Step::OpenTransport, e.into())),
        };
        let master = slot.insert(XcpMaster::new(transport, self.config.timeouts));
        self.succeed(Step::OpenTransport);

        let connect_attempts = self.connect_device(master).await?;

        self.begin(Step::StartSession);
        if let Err(e) = master.start_programming_session().await {
            return Err(self.fail(Step::StartSession, e.into()));
        }
        self.succeed(Step::StartSession);

        self.begin(Step::Erase);
        let (start, length) = plan.erase_range();
        info!(start, length, "Erasing memory");
        if let Err(e) = master.clear_memory(start, length).await {
            return Err(self.fail(Step::Erase, e.into()));
        }
        self.succeed(Step::Erase);

        self.begin(Step::ProgramLoop);
        let mut records_programmed = 0;
        let mut bytes_programmed = 0u32;
        loop {
            let record = match image.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => return Err(self.fail(Step::ProgramLoop, e.into())),
            };

            trace!(address = record.address, len = record.len(), "Programming record");
            if let Err(e) = master.program_data(record.address, &record.data).await {
                return Err(self.fail(Step::ProgramLoop, e.into()));
            }

            records_programmed += 1;
            bytes_programmed += record.len() as u32;
            self.reporter.record_programmed(bytes_programmed, plan.total_bytes);
        }
        self.succeed(Step::ProgramLoop);

        self.begin(Step::StopSession);
        if let Err(e) = master.stop_programming_session().await {
            return Err(self.fail(Step::StopSession, e.into()));
        }
        self.succeed(Step::StopSession);

        self.begin(Step::ResetAndDisconnect);
        if let Err(e) = master.reset_and_disconnect().await {
            return Err(self.fail(Step::ResetAndDisconnect, e.into()));
        }
        self.succeed(Step::ResetAndDisconnect);

        Ok(UpdateSummary {
            plan,
            records_programmed,
            bytes_programmed,
            connect_attempts,
        })
    }

    /// Send CONNECT until the bootloader answers.
    ///
    /// Silence and rejections are retried without limit, since the operator
    /// is expected to reset the device. A broken transport is not retried.
    async fn connect_device(&mut self, master: &mut XcpMaster) -> Result<u32, UpdateFailure> {
        self.begin(Step::ConnectDevice);
        let delay = self.config.connect_retry_delay();
        let mut attempts = 0u32;
        let mut waiting = false;
        let started = Instant::now();

        loop {
            attempts += 1;
            match master.connect().await {
                Ok(info) => {
                    debug!(
                        attempts,
                        waited_ms = clock::elapsed_ms(started),
                        ?info,
                        "Bootloader answered CONNECT"
                    );
                    break;
                }
                Err(e) if e.is_no_response() || matches!(e, XcpError::Rejected { .. }) => {
                    if !waiting {
                        info!("No answer from bootloader, waiting for device reset");
                        self.reporter.waiting_for_device();
                        waiting = true;
                    }
                    trace!(attempts, error = %e, "CONNECT unanswered, retrying");
                    clock::delay(delay).await;
                }
                Err(e) => return Err(self.fail(Step::ConnectDevice, e.into())),
            }
        }

        self.succeed(Step::ConnectDevice);
        Ok(attempts)
    }

    /// Best-effort teardown after a failed step
    async fn cleanup(&mut self, failed: Step, master: Option<XcpMaster>, image: &mut S::Image) {
        if let Some(mut master) = master {
            let device_connected = master.slave_info().is_some()
                && master.transport_state() == TransportState::Connected;

            if failed.is_device_session()
                && failed != Step::ResetAndDisconnect
                && device_connected
            {
                if let Err(e) = master.reset_and_disconnect().await {
                    warn!(error = %e, "Failed to reset device during cleanup");
                }
            }
            master.close().await;
        }
        image.close();
        debug!(?failed, "Cleanup finished");
    }
}
