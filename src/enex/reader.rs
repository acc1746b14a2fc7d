//! Streaming access to the `<note>` elements of an export.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Failure of the export stream itself, above the level of a single note.
#[derive(Error, Debug)]
pub enum EnexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error at byte {position}: {message}")]
    Xml { position: u64, message: String },
}

/// The raw text of one `<note>` element, exactly as it appears in the export.
#[derive(Debug, Clone)]
pub struct NoteFragment {
    /// Zero-based position of the note in the export
    pub index: usize,
    pub xml: String,
    /// Bytes of the export consumed once this note was read
    pub position: u64,
}

/// Iterator over the `<note>` fragments of an export, in document order.
///
/// Only one fragment is held in memory at a time. After a stream error the
/// iterator yields that error once and then ends.
pub struct NoteFragments<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    next_index: usize,
    done: bool,
    /// Partial text of the note being read when the stream failed
    partial: String,
}

/// Open an export file for streaming.
pub fn open_export(path: &Path) -> Result<NoteFragments<BufReader<File>>, EnexError> {
    let file = File::open(path)?;
    Ok(NoteFragments::new(BufReader::new(file)))
}

impl<R: BufRead> NoteFragments<R> {
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        let config = reader.config_mut();
        config.trim_text(false);
        // An unescaped '<' in a title shows up as a bogus start tag; matching
        // end names here would turn one bad note into a stream failure.
        config.check_end_names = false;

        Self {
            reader,
            buf: Vec::new(),
            next_index: 0,
            done: false,
            partial: String::new(),
        }
    }

    /// Bytes of the underlying stream consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Whatever was read of the note in progress when the stream failed.
    pub fn partial_fragment(&self) -> &str {
        &self.partial
    }

    fn read_fragment(&mut self) -> Result<Option<NoteFragment>, EnexError> {
        // Seek to the next <note>
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) if is_note(e.name().as_ref()) => {
                    self.partial.clear();
                    self.partial.push('<');
                    self.partial.push_str(&String::from_utf8_lossy(&e));
                    self.partial.push('>');
                    break;
                }
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => {}
                Err(e) => return Err(xml_error(self.reader.buffer_position() as u64, e)),
            }
        }

        // Copy events back out until the matching </note>
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => return Err(xml_error(self.reader.buffer_position() as u64, e)),
            };
            match event {
                Event::End(e) if is_note(e.name().as_ref()) => {
                    self.partial.push_str("</");
                    self.partial.push_str(&String::from_utf8_lossy(&e));
                    self.partial.push('>');
                    break;
                }
                Event::Eof => {
                    return Err(EnexError::Xml {
                        position: self.reader.buffer_position() as u64,
                        message: "unexpected end of file inside <note>".to_string(),
                    })
                }
                other => push_raw(&mut self.partial, &other),
            }
        }

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(NoteFragment {
            index,
            xml: std::mem::take(&mut self.partial),
            position: self.bytes_read(),
        }))
    }
}

impl<R: BufRead> Iterator for NoteFragments<R> {
    type Item = Result<NoteFragment, EnexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_fragment() {
            Ok(Some(fragment)) => Some(Ok(fragment)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn xml_error(position: u64, err: impl std::fmt::Display) -> EnexError {
    EnexError::Xml {
        position,
        message: err.to_string(),
    }
}

fn is_note(name: &[u8]) -> bool {
    name.eq_ignore_ascii_case(b"note")
}

/// Append the source text of an event, undoing what the reader stripped.
pub(crate) fn push_raw(out: &mut String, event: &Event<'_>) {
    match event {
        Event::Start(e) => {
            out.push('<');
            out.push_str(&String::from_utf8_lossy(e));
            out.push('>');
        }
        Event::End(e) => {
            out.push_str("</");
            out.push_str(&String::from_utf8_lossy(e));
            out.push('>');
        }
        Event::Empty(e) => {
            out.push('<');
            out.push_str(&String::from_utf8_lossy(e));
            out.push_str("/>");
        }
        Event::Text(e) => out.push_str(&String::from_utf8_lossy(e)),
        Event::CData(e) => {
            out.push_str("<![CDATA[");
            out.push_str(&String::from_utf8_lossy(e));
            out.push_str("]]>");
        }
        Event::Comment(e) => {
            out.push_str("<!--");
            out.push_str(&String::from_utf8_lossy(e));
            out.push_str("-->");
        }
        _ => {}
    }
}
