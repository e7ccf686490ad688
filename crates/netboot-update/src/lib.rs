//! netboot-update - Firmware update orchestration
//!
//! [`Updater`] drives one update session from start to finish:
//!
//! ```text
//! ValidateImage → OpenImage → ParseImage → OpenTransport → ConnectDevice (retry)
//!   → StartSession → Erase → ProgramLoop → StopSession → ResetAndDisconnect
//!   → CloseAll → Done
//! ```
//!
//! Only ConnectDevice is retried; every other step fails fast and the
//! updater goes straight to cleanup.

mod config;
mod error;
mod reporter;
mod step;
mod updater;

pub use config::{RetryConfig, UpdateConfig};
pub use error::{UpdateError, UpdateFailure};
pub use reporter::{NullReporter, ProgressReporter};
pub use step::Step;
pub use updater::{UpdateSummary, Updater};
