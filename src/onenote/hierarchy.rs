//! Rendering hierarchy documents as a flat, indented listing.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::enex::decode::encode_html;

/// Namespace of OneNote 2013 hierarchy and page documents.
pub const ONENOTE_NS: &str = "http://schemas.microsoft.com/office/onenote/2013/onenote";

/// Id shown for the section that is the import's own root location.
pub const UNFILED_NOTES_ID: &str = "UnfiledNotes";

fn is_listed(kind: &[u8]) -> bool {
    matches!(kind, b"Notebook" | b"SectionGroup" | b"Section" | b"Page")
}

fn has_listed_children(kind: &[u8]) -> bool {
    matches!(kind, b"Notebooks" | b"Notebook" | b"SectionGroup" | b"Section")
}

/// One line per notebook, section group, section and page: `level kind id name`.
///
/// Children of the `Notebooks` root stay on level 0. A section whose `path`
/// equals `root_path` is shown with the id [`UNFILED_NOTES_ID`]. Names are
/// HTML-encoded.
pub fn hierarchy_listing(xml: &str, root_path: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    // (level of children, whether children are listed) per open element
    let mut stack: Vec<(usize, bool)> = Vec::new();
    let mut lines: Vec<String> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let (level, visible) = stack.last().copied().unwrap_or((0, true));
                let kind = e.local_name();
                if visible && is_listed(kind.as_ref()) {
                    lines.push(listing_line(&e, level, root_path)?);
                }
                let child_level = if kind.as_ref() == b"Notebooks" {
                    level
                } else {
                    level + 1
                };
                stack.push((child_level, visible && has_listed_children(kind.as_ref())));
            }
            Event::Empty(e) => {
                let (level, visible) = stack.last().copied().unwrap_or((0, true));
                if visible && is_listed(e.local_name().as_ref()) {
                    lines.push(listing_line(&e, level, root_path)?);
                }
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(lines.join("\n"))
}

fn listing_line(e: &BytesStart<'_>, level: usize, root_path: &str) -> Result<String, quick_xml::Error> {
    let kind = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
    let mut id = String::new();
    let mut name = String::new();
    let mut path = None;

    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"ID" => id = attr.unescape_value()?.into_owned(),
            b"name" => name = attr.unescape_value()?.into_owned(),
            b"path" => path = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }

    if kind == "Section" && path.as_deref() == Some(root_path) {
        id = UNFILED_NOTES_ID.to_string();
    }

    Ok(format!("{} {} {} {}", level, kind, id, encode_html(&name)))
}
