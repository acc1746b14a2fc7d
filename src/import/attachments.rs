//! Writing a note's resources to disk and wiring them into the page.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use regex::{NoExpand, Regex};

use super::errors::NoteError;
use crate::enex::parse::decode_base64;
use crate::enex::Attachment;
use crate::onenote::page::{file_url, inserted_file};

/// Name Evernote gives the overlay images it adds for text search.
const OCR_OVERLAY_NAME: &str = "proxy.php";

/// What happened to one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Replaced its `<en-media>` reference with an `<img>`
    Inline,
    /// Added as an inserted file
    Attached,
    /// Silently left out
    Dropped,
}

/// Files written for one note. They are deleted when this is dropped.
#[derive(Debug, Default)]
pub struct MaterializedFiles {
    paths: Vec<PathBuf>,
}

impl MaterializedFiles {
    fn push(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for MaterializedFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = fs::remove_file(path) {
                warn!("Failed to remove temp file {}: {}", path.display(), e);
            }
        }
    }
}

/// A note body with its attachments resolved.
#[derive(Debug)]
pub struct ResolvedAttachments {
    pub body: String,
    /// `InsertedFile` directives for the page
    pub directives: String,
    pub dispositions: Vec<Disposition>,
    /// Keep alive until the page has been written
    pub files: MaterializedFiles,
}

fn inline_reference_res(hash: &str) -> Result<[Regex; 2], regex::Error> {
    let hash = regex::escape(hash);
    Ok([
        Regex::new(&format!(r#"(?i)<en-media\b[^>]*?hash="{}"[^>]*/>"#, hash))?,
        Regex::new(&format!(
            r#"(?i)<en-media\b[^>]*?hash="{}"[^>]*></en-media>"#,
            hash
        ))?,
    ])
}

/// Write every attachment to `temp_dir` (named by hash) and rewrite `body`
/// to reference them.
pub fn resolve_attachments(
    body: &str,
    attachments: &[Attachment],
    temp_dir: &Path,
) -> Result<ResolvedAttachments, NoteError> {
    let mut resolved = ResolvedAttachments {
        body: body.to_string(),
        directives: String::new(),
        dispositions: Vec::with_capacity(attachments.len()),
        files: MaterializedFiles::default(),
    };
    if attachments.is_empty() {
        return Ok(resolved);
    }

    fs::create_dir_all(temp_dir)?;

    for attachment in attachments {
        let bytes = decode_base64(&attachment.base64_data).map_err(|source| NoteError::Base64 {
            hash: attachment.hash.clone(),
            source,
        })?;
        let path = temp_dir.join(&attachment.hash);
        resolved.files.push(path.clone());
        fs::write(&path, &bytes)?;

        let disposition = resolve_one(&mut resolved, attachment, &path);
        debug!(
            "Attachment {} ({}): {:?}",
            attachment.hash,
            attachment.content_type.as_deref().unwrap_or("unknown type"),
            disposition
        );
        resolved.dispositions.push(disposition);
    }

    Ok(resolved)
}

fn resolve_one(resolved: &mut ResolvedAttachments, attachment: &Attachment, path: &Path) -> Disposition {
    if attachment.is_image() {
        match inline_reference_res(&attachment.hash) {
            Ok(patterns) => {
                for re in &patterns {
                    if re.is_match(&resolved.body) {
                        let img = format!(r#"<img src="{}"/>"#, file_url(path));
                        resolved.body = re.replace_all(&resolved.body, NoExpand(&img)).into_owned();
                        return Disposition::Inline;
                    }
                }
            }
            Err(e) => warn!("Cannot match references to {}: {}", attachment.hash, e),
        }
    }

    match attachment.file_name.as_deref() {
        Some(OCR_OVERLAY_NAME) if attachment.is_image() => Disposition::Dropped,
        Some(name) => {
            resolved.directives.push_str(&inserted_file(path, name));
            Disposition::Attached
        }
        None => {
            resolved.directives.push_str(&inserted_file(path, &attachment.hash));
            Disposition::Attached
        }
    }
}
