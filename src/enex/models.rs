use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// A note parsed out of one `<note>` fragment of an export.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// MIME- and entity-decoded title
    pub title: String,
    /// Raw body markup (still wrapped in `<en-note>`), entity-decoded
    pub content: String,
    /// Tags in document order
    pub tags: Vec<String>,
    /// Creation time, or modification time when the caller asked for it.
    /// [`unset_date`] when the export carries neither.
    pub date: DateTime<Utc>,
    /// Origin of a web clip; local files and Evernote cache links are dropped
    pub source_url: Option<String>,
    /// Embedded resources in document order
    pub attachments: Vec<Attachment>,
}

impl Note {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: String::new(),
            tags: Vec::new(),
            date: unset_date(),
            source_url: None,
            attachments: Vec::new(),
        }
    }
}

/// One `<resource>` of a note.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Base64 payload as found in `<data>`; consumed when the resource is written out
    pub base64_data: String,
    /// Lowercase hex MD5 of the decoded payload
    pub hash: String,
    /// Decoded, filename-safe and XML-escaped `<file-name>`
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|mime| mime.contains("image"))
    }
}

/// Value a note's date keeps when the export has no parsable timestamp.
pub fn unset_date() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Preview metadata for an Evernote export
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnexPreview {
    /// Number of notes found
    pub note_count: usize,
    /// Number of resources/attachments
    pub resource_count: usize,
    /// Sample notes for preview (first 10)
    pub notes: Vec<NotePreview>,
    /// Suggested notebook name
    pub suggested_name: String,
    /// Warnings during preview
    pub warnings: Vec<String>,
}

/// Preview info for a single note
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePreview {
    pub title: String,
    pub tags: Vec<String>,
    pub has_attachments: bool,
    /// Created date (if available)
    pub created: Option<String>,
}
