//! The OneNote side of an import: the sink contract, a directory-backed sink,
//! page documents and the mapping of notes to sections.

pub mod destination;
pub mod file_sink;
pub mod hierarchy;
pub mod page;
pub mod sink;

pub use destination::{normalize_section_name, Destination, SectionError, FALLBACK_SECTION};
pub use file_sink::FileSink;
pub use hierarchy::hierarchy_listing;
pub use page::{page_xml, PageContent};
pub use sink::{
    CreateFileType, HierarchyScope, OneNoteSink, SinkError, SinkResult, SpecialLocation, XmlSchema,
};
