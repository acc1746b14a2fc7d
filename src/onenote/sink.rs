//! The contract a destination notebook store has to satisfy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    /// The destination application cannot be reached at all
    #[error("Cannot connect to destination: {0}")]
    Connection(String),

    /// The destination rejected an operation
    #[error("Destination error: {0}")]
    Automation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Well-known locations the destination can resolve without a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialLocation {
    /// Folder new notebooks are created in
    DefaultNotebookFolder,
    /// Catch-all section for pages without a home
    UnfiledNotesSection,
}

/// What `open_hierarchy` creates when the path does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFileType {
    /// Open only; a missing path is an error
    None,
    Notebook,
    Section,
}

/// How deep `get_hierarchy` descends below its start node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HierarchyScope {
    Notebooks,
    Sections,
    Pages,
}

/// Schema version of page documents handed to `update_page_content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlSchema {
    Xs2013,
}

/// A single-connection notebook store.
///
/// Calls are blocking and must not be issued concurrently; the import owns its
/// sink exclusively for the whole run.
pub trait OneNoteSink {
    /// Resolve a special location to a filesystem-style path.
    fn special_location(&mut self, location: SpecialLocation) -> SinkResult<String>;

    /// Open the container at `path`, creating it as `create` says. Returns its id.
    fn open_hierarchy(&mut self, path: &str, create: CreateFileType) -> SinkResult<String>;

    /// Hierarchy document below `start_id`, or below the root for an empty id.
    fn get_hierarchy(&mut self, start_id: &str, scope: HierarchyScope) -> SinkResult<String>;

    /// Create an empty page in a section. Returns the page id.
    fn create_new_page(&mut self, section_id: &str) -> SinkResult<String>;

    /// Replace the whole content of a page.
    fn update_page_content(&mut self, page_id: &str, xml: &str, schema: XmlSchema)
        -> SinkResult<()>;

    /// Commit pending changes below a node.
    fn sync_hierarchy(&mut self, id: &str) -> SinkResult<()>;
}
