//! Console output for netboot

use std::io::{self, Write};
use std::path::Path;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use netboot_srec::UpdatePlan;
use netboot_update::{ProgressReporter, Step, UpdateError, UpdateFailure, UpdateSummary};
use netboot_xcp::ConnectionTarget;

/// Context for output rendering
pub struct OutputContext {
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { quiet }
    }

    /// Print the program banner (unless in quiet mode)
    pub fn banner(&self) {
        if !self.quiet {
            println!("{}", banner());
        }
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }
}

pub fn banner() -> String {
    let rule = "-".repeat(73);
    format!(
        "{rule}\nnetboot version {}. Performs firmware updates over TCP/IP\n\
         for microcontrollers that run an XCP bootloader.\n{rule}",
        env!("CARGO_PKG_VERSION")
    )
}

/// Prints the update transcript as the updater reports progress.
///
/// Each step prints its label without a newline and completes the line with
/// `OK` or `ERROR`, so a hanging step is visible while it runs. While data
/// is programmed an optional progress bar is drawn on stderr instead.
pub struct ConsoleReporter<W: Write> {
    out: W,
    quiet: bool,
    show_progress: bool,
    firmware: String,
    target: String,
    plan: Option<UpdatePlan>,
    bar: Option<ProgressBar>,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout(quiet: bool) -> Self {
        Self::new(io::stdout(), quiet, !quiet)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, quiet: bool, show_progress: bool) -> Self {
        Self {
            out,
            quiet,
            show_progress,
            firmware: String::new(),
            target: String::new(),
            plan: None,
            bar: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if self.quiet {
            return;
        }
        // Console output is best effort; a closed stdout must not abort the update
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn label(&self, step: Step) -> Option<String> {
        let label = match step {
            Step::ValidateImage => {
                format!("Checking formatting of S-record file \"{}\"...", self.firmware)
            }
            Step::OpenImage => format!("Opening S-record file \"{}\"...", self.firmware),
            Step::ParseImage => format!("Parsing S-record file \"{}\"...", self.firmware),
            Step::OpenTransport => format!("Connecting to {}...", self.target),
            Step::ConnectDevice => "Connecting to bootloader...".to_string(),
            Step::StartSession => "Initializing programming session...".to_string(),
            Step::Erase => match &self.plan {
                Some(plan) => format!(
                    "Erasing {} bytes starting at 0x{:08x}...",
                    plan.total_bytes, plan.address_low
                ),
                None => "Erasing memory...".to_string(),
            },
            Step::ProgramLoop => "Programming data. Please wait...".to_string(),
            Step::StopSession => "Finishing programming session...".to_string(),
            Step::ResetAndDisconnect => "Performing software reset...".to_string(),
            Step::CloseAll | Step::Done => return None,
        };
        Some(label)
    }

    fn start_progress(&mut self, label: String) {
        let total = self.plan.as_ref().map_or(0, |plan| plan.total_bytes);
        let bar = ProgressBar::new(u64::from(total));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar.set_message(label);
        self.bar = Some(bar);
    }

    /// Finish the current step's line with `marker`
    fn complete(&mut self, step: Step, marker: &str) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
            if let Some(label) = self.label(step) {
                self.emit(&label);
            }
        }
        self.emit(&format!("{marker}\n"));
    }
}

impl<W: Write + Send> ProgressReporter for ConsoleReporter<W> {
    fn started(&mut self, firmware: &Path, target: &ConnectionTarget) {
        self.firmware = firmware.display().to_string();
        self.target = target.host.clone();
        self.emit(&format!(
            "Starting firmware update for \"{}\" using {}\n",
            self.firmware, target
        ));
    }

    fn step_started(&mut self, step: Step) {
        let Some(label) = self.label(step) else {
            return;
        };
        if step == Step::ProgramLoop && self.show_progress && !self.quiet {
            self.start_progress(label);
        } else {
            self.emit(&label);
        }
    }

    fn step_succeeded(&mut self, step: Step) {
        if step == Step::CloseAll {
            let closed = format!(
                "Closing connection to {}\nClosed S-record file \"{}\"\n",
                self.target, self.firmware
            );
            self.emit(&closed);
            return;
        }
        self.complete(step, &"OK".green().to_string());
    }

    fn step_failed(&mut self, step: Step, _error: &UpdateError) {
        self.complete(step, &"ERROR".red().to_string());
    }

    fn plan(&mut self, plan: &UpdatePlan) {
        self.plan = Some(*plan);
        self.emit(&format!(
            "-> Lowest memory address:  0x{:08x}\n\
             -> Highest memory address: 0x{:08x}\n\
             -> Total data bytes: {}\n",
            plan.address_low, plan.address_high, plan.total_bytes
        ));
    }

    fn waiting_for_device(&mut self) {
        let text = format!("{}\nReset your microcontroller...", "TIMEOUT".yellow());
        self.emit(&text);
    }

    fn record_programmed(&mut self, done_bytes: u32, _total_bytes: u32) {
        if let Some(bar) = &self.bar {
            bar.set_position(u64::from(done_bytes));
        }
    }

    fn finished(&mut self, result: &Result<UpdateSummary, UpdateFailure>) {
        if result.is_ok() {
            let done = "Firmware successfully updated!".green().to_string();
            self.emit(&format!("{done}\n"));
        }
    }
}
