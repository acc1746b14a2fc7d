//! Importing an Evernote export into OneNote.
//!
//! A run reads the export twice. The first pass indexes every note so bad
//! notes and notes outside the date window are known up front; the second
//! pass transcodes the selected notes one at a time and writes them through
//! a [`crate::onenote::Destination`].

pub mod attachments;
pub mod body;
pub mod config;
pub mod driver;
pub mod errors;
pub mod failed;
pub mod progress;
pub mod transcode;

pub use config::{ImportConfig, ImportSettings};
pub use driver::{run_import, spawn_import, ImportHandle, ImportOutcome, ImportSummary};
pub use errors::{ImportError, NoteError, NoteFailure, Result};
pub use progress::{
    CancellationToken, ProgressObserver, ProgressUpdate, SharedProgress, SyncStep, PROGRESS_MAX,
};
