use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::enex::{EnexError, NoteParseError};
use crate::onenote::{SectionError, SinkError};

/// Failure scoped to one note. The run skips the note and carries on.
#[derive(Error, Debug)]
pub enum NoteError {
    #[error("Parse error: {0}")]
    Parse(#[from] NoteParseError),

    #[error("Attachment {hash} cannot be decoded: {source}")]
    Base64 {
        hash: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Section(#[from] SectionError),

    #[error("Destination error: {0}")]
    Sink(#[from] SinkError),
}

/// Failure that ends the whole run.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Could not connect to OneNote: {0}")]
    Connection(#[source] SinkError),

    #[error("Error parsing the notebook \"{notebook}\" after note \"{last_title}\": {source}")]
    Stream {
        notebook: String,
        last_title: String,
        /// Copy of the fragment that was being read
        archive: Option<PathBuf>,
        #[source]
        source: EnexError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("The import worker stopped unexpectedly")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// What the user is told about a note that was not imported.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteFailure {
    /// Zero-based position of the note in the export
    pub index: usize,
    pub title: Option<String>,
    pub error: String,
    /// Copy of the raw note, when it could be written
    pub archive: Option<PathBuf>,
}

impl std::fmt::Display for NoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.title {
            Some(title) => write!(f, "Note \"{}\": {}", title, self.error)?,
            None => write!(f, "Note {}: {}", self.index + 1, self.error)?,
        }
        if let Some(archive) = &self.archive {
            write!(f, " (a copy of the note is left in {})", archive.display())?;
        }
        Ok(())
    }
}
