use std::io::BufRead;
use std::path::Path;

use super::models::{unset_date, EnexPreview, NotePreview};
use super::parse::{parse_note, ParseOptions};
use super::reader::{open_export, EnexError, NoteFragments};

/// Number of notes listed in a preview
const PREVIEW_LIMIT: usize = 10;

/// Summarize an export without importing anything.
pub fn preview_enex(enex_path: &Path) -> Result<EnexPreview, EnexError> {
    let fragments = open_export(enex_path)?;

    let suggested_name = enex_path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "Imported from Evernote".to_string());

    preview_fragments(fragments, suggested_name)
}

fn preview_fragments<R: BufRead>(
    fragments: NoteFragments<R>,
    suggested_name: String,
) -> Result<EnexPreview, EnexError> {
    let mut note_count = 0;
    let mut resource_count = 0;
    let mut preview_notes = Vec::new();
    let mut warnings = Vec::new();

    for fragment in fragments {
        let fragment = fragment?;
        note_count += 1;

        let note = match parse_note(&fragment.xml, ParseOptions::default()) {
            Ok(note) => note,
            Err(e) => {
                warnings.push(format!(
                    "Note {} (\"{}\") cannot be read: {}",
                    fragment.index + 1,
                    e.title().unwrap_or("untitled"),
                    e
                ));
                continue;
            }
        };

        resource_count += note.attachments.len();

        if preview_notes.len() < PREVIEW_LIMIT {
            preview_notes.push(NotePreview {
                title: note.title.clone(),
                tags: note.tags.clone(),
                has_attachments: !note.attachments.is_empty(),
                created: (note.date != unset_date()).then(|| note.date.to_rfc3339()),
            });
        }
    }

    if note_count == 0 {
        warnings.push("No notes found in ENEX file".to_string());
    }

    Ok(EnexPreview {
        note_count,
        resource_count,
        notes: preview_notes,
        suggested_name,
        warnings,
    })
}
