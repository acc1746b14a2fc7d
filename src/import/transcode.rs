//! One note, from raw fragment to pages: parse, resolve attachments,
//! transform the body, pick sections, write.

use std::path::Path;

use chrono::{DateTime, Utc};

use super::attachments::{resolve_attachments, MaterializedFiles};
use super::body::{finalize_body, transform_body};
use super::errors::NoteError;
use crate::enex::{parse_note, Note, ParseOptions};
use crate::onenote::{Destination, OneNoteSink, PageContent};

/// A note ready to be written out. Its attachment files stay on disk until
/// this is dropped.
#[derive(Debug)]
pub struct PreparedPage {
    pub title: String,
    pub date: DateTime<Utc>,
    pub tags: Vec<String>,
    pub source_url: Option<String>,
    /// Final HTML body
    pub body: String,
    /// `InsertedFile` directives
    pub attachments: String,
    files: MaterializedFiles,
}

impl PreparedPage {
    pub fn content(&self) -> PageContent<'_> {
        PageContent {
            title: &self.title,
            date: self.date,
            body: &self.body,
            attachments: &self.attachments,
            source_url: self.source_url.as_deref(),
        }
    }

    pub fn files(&self) -> &MaterializedFiles {
        &self.files
    }
}

/// Materialize a parsed note's attachments in `temp_dir` and build its body.
pub fn prepare_note(note: Note, temp_dir: &Path) -> Result<PreparedPage, NoteError> {
    let resolved = resolve_attachments(&note.content, &note.attachments, temp_dir)?;
    let body = finalize_body(&transform_body(&resolved.body), note.date);

    Ok(PreparedPage {
        title: note.title,
        date: note.date,
        tags: note.tags,
        source_url: note.source_url,
        body,
        attachments: resolved.directives,
        files: resolved.files,
    })
}

/// Parse and prepare a raw `<note>` fragment.
pub fn transcode_fragment(
    raw: &str,
    options: ParseOptions,
    temp_dir: &Path,
) -> Result<PreparedPage, NoteError> {
    let note = parse_note(raw, options)?;
    prepare_note(note, temp_dir)
}

/// Write `page` to every section it belongs to. Returns the new page ids.
pub fn emit_page<S: OneNoteSink>(
    destination: &mut Destination<S>,
    page: &PreparedPage,
) -> Result<Vec<String>, NoteError> {
    let sections = destination.sections_for(&page.tags)?;
    let content = page.content();

    let mut page_ids = Vec::with_capacity(sections.len());
    for section_id in &sections {
        page_ids.push(destination.write_page(section_id, &content)?);
    }
    Ok(page_ids)
}
