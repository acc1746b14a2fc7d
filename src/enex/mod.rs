//! Reading Evernote `.enex` exports.
//!
//! An export is streamed one `<note>` fragment at a time ([`reader`]), each
//! fragment is repaired ([`sanitize`]) and parsed into a [`Note`] ([`parse`]).

pub mod decode;
pub mod models;
pub mod parse;
pub mod preview;
pub mod reader;
pub mod sanitize;

pub use models::{unset_date, Attachment, EnexPreview, Note, NotePreview};
pub use parse::{parse_note, NoteParseError, ParseOptions};
pub use preview::preview_enex;
pub use reader::{open_export, EnexError, NoteFragment, NoteFragments};
