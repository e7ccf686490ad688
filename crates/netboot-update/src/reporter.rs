//! Progress reporting hooks

use std::path::Path;

use netboot_srec::UpdatePlan;
use netboot_xcp::ConnectionTarget;

use crate::{Step, UpdateError, UpdateFailure, UpdateSummary};

/// Receives progress events from an [`Updater`](crate::Updater).
///
/// All methods default to doing nothing.
pub trait ProgressReporter: Send {
    fn started(&mut self, _firmware: &Path, _target: &ConnectionTarget) {}

    fn step_started(&mut self, _step: Step) {}

    fn step_succeeded(&mut self, _step: Step) {}

    fn step_failed(&mut self, _step: Step, _error: &UpdateError) {}

    /// The image has been parsed
    fn plan(&mut self, _plan: &UpdatePlan) {}

    /// The first CONNECT went unanswered; the updater keeps retrying
    fn waiting_for_device(&mut self) {}

    fn record_programmed(&mut self, _done_bytes: u32, _total_bytes: u32) {}

    /// Called exactly once per run
    fn finished(&mut self, _result: &Result<UpdateSummary, UpdateFailure>) {}
}

/// Ignores all events
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {}
