//! Copies of notes that could not be imported, kept for bug reports.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use uuid::Uuid;

const FAILED_NOTES_DIR: &str = "failedNotes";

#[derive(Debug, Clone)]
pub struct FailedNoteArchive {
    dir: PathBuf,
}

impl FailedNoteArchive {
    /// Archive below the run's temp directory.
    pub fn new(temp_dir: &Path) -> Self {
        Self {
            dir: temp_dir.join(FAILED_NOTES_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `xml` to a fresh `note-<uuid>.xml`. Failing to write is logged
    /// and otherwise ignored.
    pub fn store(&self, xml: &str) -> Option<PathBuf> {
        let path = self.dir.join(format!("note-{}.xml", Uuid::new_v4()));
        let written = fs::create_dir_all(&self.dir).and_then(|_| fs::write(&path, xml));
        match written {
            Ok(()) => {
                info!("Saved a copy of the note to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Could not save failed note to {}: {}", self.dir.display(), e);
                None
            }
        }
    }
}
