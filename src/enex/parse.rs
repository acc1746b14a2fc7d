//! Parsing a single sanitized `<note>` fragment into a [`Note`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use super::decode::{decode_field, decode_html, escape_xml};
use super::models::{Attachment, Note};
use super::reader::push_raw;
use super::sanitize::{guess_title, sanitize_note_xml, strip_invalid_filename_chars};

/// Per-run switches that change how a note is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Let `<updated>` replace `<created>` as the note's date
    pub use_modified_date: bool,
}

#[derive(Error, Debug)]
pub enum NoteParseError {
    #[error("XML error: {message}")]
    Xml {
        title: Option<String>,
        message: String,
    },

    #[error("resource {index} of note \"{title}\" is not valid base64: {source}")]
    Resource {
        title: String,
        index: usize,
        #[source]
        source: base64::DecodeError,
    },
}

impl NoteParseError {
    /// Title of the note, when it could be recovered.
    pub fn title(&self) -> Option<&str> {
        match self {
            NoteParseError::Xml { title, .. } => title.as_deref(),
            NoteParseError::Resource { title, .. } => Some(title),
        }
    }
}

/// Parse Evernote date format (YYYYMMDDTHHmmssZ)
pub fn parse_evernote_date(date_str: &str) -> Option<DateTime<Utc>> {
    // Format: 20231231T235959Z
    let clean = date_str.trim();
    if clean.len() < 15 {
        return None;
    }

    let without_z = clean.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(without_z, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Sanitize and parse one raw `<note>` fragment.
pub fn parse_note(raw: &str, options: ParseOptions) -> Result<Note, NoteParseError> {
    let xml = sanitize_note_xml(raw);
    let fields = read_fields(&xml).map_err(|message| NoteParseError::Xml {
        title: guess_title(&xml).map(|t| decode_html(&t)),
        message,
    })?;
    fields.into_note(options)
}

/// Decode a resource payload; ENEX wraps base64 across lines.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(compact)
}

/// Lowercase hex MD5 of a resource's decoded bytes.
pub fn resource_hash(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Element values collected from a fragment before they become a [`Note`].
#[derive(Debug, Default)]
struct NoteFields {
    title: Option<String>,
    content: Option<String>,
    tags: Vec<String>,
    created: Option<String>,
    updated: Option<String>,
    source_urls: Vec<String>,
    /// `<data>` of each `<resource>`, in order
    resource_data: Vec<String>,
    /// Every `<file-name>` in the fragment, in order
    file_names: Vec<String>,
    /// Every `<mime>` in the fragment, in order
    mimes: Vec<String>,
}

impl NoteFields {
    fn into_note(self, options: ParseOptions) -> Result<Note, NoteParseError> {
        let mut note = Note::new(decode_field(self.title.as_deref().unwrap_or_default()));
        note.content = decode_field(self.content.as_deref().unwrap_or_default());
        note.tags = self.tags.iter().map(|t| decode_html(t)).collect();

        if let Some(created) = self.created.as_deref().and_then(parse_evernote_date) {
            note.date = created;
        }
        if options.use_modified_date {
            if let Some(updated) = self.updated.as_deref().and_then(parse_evernote_date) {
                note.date = updated;
            }
        }

        note.source_url = self
            .source_urls
            .into_iter()
            .filter(|url| !url.starts_with("file://") && !url.starts_with("en-cache://"))
            .filter(|url| !url.is_empty())
            .last();

        // <file-name> and <mime> are matched to resources by position only:
        // the n-th resource takes the n-th <file-name> and the n-th <mime>.
        for (index, data) in self.resource_data.into_iter().enumerate() {
            let bytes = decode_base64(&data).map_err(|source| NoteParseError::Resource {
                title: note.title.clone(),
                index,
                source,
            })?;

            let file_name = self
                .file_names
                .get(index)
                .map(|raw| escape_xml(&strip_invalid_filename_chars(&decode_field(raw))))
                .filter(|name| !name.is_empty());
            let content_type = self
                .mimes
                .get(index)
                .map(|raw| decode_html(raw))
                .filter(|mime| !mime.is_empty());

            note.attachments.push(Attachment {
                base64_data: data,
                hash: resource_hash(&bytes),
                file_name,
                content_type,
            });
        }

        Ok(note)
    }
}

/// Walk the fragment's events and pick out the fields a note needs.
fn read_fields(xml: &str) -> Result<NoteFields, String> {
    let mut reader = Reader::from_str(xml);
    let mut fields = NoteFields::default();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut first_child_seen = false;
    // Depth of the open <content> element, while inside it
    let mut content_depth: Option<usize> = None;
    let mut content = String::new();
    let mut note_closed = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("at byte {}: {}", reader.buffer_position(), e))?;

        if let Some(depth) = content_depth {
            match &event {
                Event::End(_) if stack.len() == depth => {
                    stack.pop();
                    fields.content = Some(std::mem::take(&mut content));
                    content_depth = None;
                }
                Event::Start(_) => {
                    stack.push(String::new());
                    push_raw(&mut content, &event);
                }
                Event::End(_) => {
                    stack.pop();
                    push_raw(&mut content, &event);
                }
                Event::CData(e) => content.push_str(&String::from_utf8_lossy(e)),
                Event::Eof => return Err("unexpected end of note inside <content>".to_string()),
                other => push_raw(&mut content, other),
            }
            continue;
        }

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                stack.push(name);
                text.clear();
                if stack.len() == 2 && stack[1] == "content" {
                    content_depth = Some(stack.len());
                    content.clear();
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if stack.is_empty() {
                    return Err(format!("unexpected empty root element <{}>", name));
                }
                close_element(&mut fields, &stack, &name, String::new(), &mut first_child_seen);
            }
            Event::Text(e) => {
                let unescaped = e.unescape().map_err(|err| err.to_string())?;
                text.push_str(&unescaped);
            }
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::End(_) => {
                let Some(name) = stack.pop() else {
                    return Err("closing tag without an open element".to_string());
                };
                if stack.is_empty() {
                    if name != "note" {
                        return Err(format!("expected <note> root, found <{}>", name));
                    }
                    note_closed = true;
                } else {
                    let value = std::mem::take(&mut text);
                    close_element(&mut fields, &stack, &name, value, &mut first_child_seen);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !note_closed {
        return Err("note element is not closed".to_string());
    }
    Ok(fields)
}

/// Record the value of an element that just closed. `parents` is the stack of
/// open elements around it, outermost first.
fn close_element(
    fields: &mut NoteFields,
    parents: &[String],
    name: &str,
    value: String,
    first_child_seen: &mut bool,
) {
    if parents.len() == 1 && !*first_child_seen {
        *first_child_seen = true;
        fields.title = Some(value.clone());
    }

    match name {
        "content" if parents.len() == 1 => fields.content = Some(value),
        "tag" => fields.tags.push(value),
        "created" if fields.created.is_none() => fields.created = Some(value.trim().to_string()),
        "updated" if fields.updated.is_none() => fields.updated = Some(value.trim().to_string()),
        "source-url" => fields.source_urls.push(value.trim().to_string()),
        "data" if parents.last().map(String::as_str) == Some("resource") => {
            fields.resource_data.push(value)
        }
        "file-name" => fields.file_names.push(value),
        "mime" => fields.mimes.push(value),
        _ => {}
    }
}
