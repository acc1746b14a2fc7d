//! Where imported notes land: the import's notebook and its per-tag sections.

use std::collections::HashMap;
use std::path::Path;

use log::{debug, warn};
use thiserror::Error;

use super::hierarchy::hierarchy_listing;
use super::page::{page_xml, PageContent};
use super::sink::{
    CreateFileType, HierarchyScope, OneNoteSink, SinkError, SinkResult, SpecialLocation, XmlSchema,
};

/// Section for notes without tags.
pub const FALLBACK_SECTION: &str = "not specified";

/// Characters OneNote does not allow in section names.
const SECTION_NAME_STRIP: &[char] = &['?', '*', '/', '\\', ':', '<', '>', '|', '&', '#', '%'];

#[derive(Error, Debug)]
#[error("section \"{name}\" is unavailable: {source}")]
pub struct SectionError {
    pub name: String,
    #[source]
    pub source: SinkError,
}

/// Make a tag usable as a section name.
pub fn normalize_section_name(name: &str) -> String {
    name.chars()
        .filter(|c| !SECTION_NAME_STRIP.contains(c))
        .map(|c| if c == '"' { '\'' } else { c })
        .collect()
}

fn join_path(parent: &str, child: &str) -> String {
    Path::new(parent).join(child).to_string_lossy().to_string()
}

/// Debug listing of a hierarchy document. An unreadable document is only
/// logged.
fn log_hierarchy(xml: &str, root_path: &str, heading: &str) {
    match hierarchy_listing(xml, root_path) {
        Ok(listing) => debug!("{}\n{}", heading, listing),
        Err(e) => warn!("Unreadable hierarchy below {}: {}", root_path, e),
    }
}

/// The open import notebook. Owns the sink for the whole run; the connection
/// is released when the destination is dropped.
pub struct Destination<S: OneNoteSink> {
    sink: S,
    notebook_path: String,
    root_id: String,
    /// Everything goes to the catch-all section
    use_unfiled: bool,
    /// Normalized section name -> section id, for this run only
    sections: HashMap<String, String>,
}

impl<S: OneNoteSink> Destination<S> {
    /// Open or create the notebook `notebook_name` in the default notebook
    /// folder, falling back to the unfiled notes section.
    pub fn open(mut sink: S, notebook_name: &str) -> SinkResult<Self> {
        let (notebook_path, root_id, use_unfiled) = match Self::open_notebook(&mut sink, notebook_name) {
            Ok((path, id)) => (path, id, false),
            Err(e) => {
                warn!(
                    "Cannot create notebook \"{}\" ({}), importing into unfiled notes",
                    notebook_name, e
                );
                let (path, id) = Self::open_unfiled(&mut sink)?;
                (path, id, true)
            }
        };

        debug!("Import root {} ({})", notebook_path, root_id);
        Ok(Self {
            sink,
            notebook_path,
            root_id,
            use_unfiled,
            sections: HashMap::new(),
        })
    }

    fn open_notebook(sink: &mut S, notebook_name: &str) -> SinkResult<(String, String)> {
        if notebook_name.trim().is_empty() {
            return Err(SinkError::Automation("empty notebook name".to_string()));
        }
        let hierarchy = sink.get_hierarchy("", HierarchyScope::Notebooks)?;
        let folder = sink.special_location(SpecialLocation::DefaultNotebookFolder)?;
        let path = join_path(&folder, notebook_name);

        let id = sink.open_hierarchy(&path, CreateFileType::Notebook)?;
        sink.get_hierarchy(&id, HierarchyScope::Pages)?;
        log_hierarchy(&hierarchy, &path, "Notebooks:");
        Ok((path, id))
    }

    fn open_unfiled(sink: &mut S) -> SinkResult<(String, String)> {
        sink.get_hierarchy("", HierarchyScope::Pages)?;
        let path = sink.special_location(SpecialLocation::UnfiledNotesSection)?;
        let id = sink.open_hierarchy(&path, CreateFileType::None)?;
        sink.get_hierarchy(&id, HierarchyScope::Pages)?;
        Ok((path, id))
    }

    pub fn notebook_path(&self) -> &str {
        &self.notebook_path
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn uses_unfiled_section(&self) -> bool {
        self.use_unfiled
    }

    /// Id of the section `name` below the notebook, creating it on first use.
    pub fn section_id(&mut self, name: &str) -> Result<String, SectionError> {
        let name = normalize_section_name(name);
        if let Some(id) = self.sections.get(&name) {
            return Ok(id.clone());
        }

        let id = self.open_section(&name).map_err(|source| SectionError {
            name: name.clone(),
            source,
        })?;
        self.sections.insert(name, id.clone());
        Ok(id)
    }

    fn open_section(&mut self, name: &str) -> SinkResult<String> {
        let hierarchy = self.sink.get_hierarchy("", HierarchyScope::Notebooks)?;
        let path = join_path(&self.notebook_path, &format!("{}.one", name));
        let id = self.sink.open_hierarchy(&path, CreateFileType::Section)?;
        self.sink.get_hierarchy(&id, HierarchyScope::Sections)?;
        log_hierarchy(&hierarchy, &self.notebook_path, name);
        Ok(id)
    }

    /// Sections a note with `tags` is written to: one per tag, or the
    /// fallback section. All of them are resolved before any page is created.
    pub fn sections_for(&mut self, tags: &[String]) -> Result<Vec<String>, SectionError> {
        if self.use_unfiled {
            return Ok(vec![self.root_id.clone()]);
        }
        if tags.is_empty() {
            return Ok(vec![self.section_id(FALLBACK_SECTION)?]);
        }
        tags.iter().map(|tag| self.section_id(tag)).collect()
    }

    /// Create a page in `section_id`, fill it and commit it.
    pub fn write_page(&mut self, section_id: &str, content: &PageContent<'_>) -> SinkResult<String> {
        let page_id = self.sink.create_new_page(section_id)?;
        let xml = page_xml(&page_id, content);
        self.sink
            .update_page_content(&page_id, &xml, XmlSchema::Xs2013)?;
        self.sink.sync_hierarchy(&page_id)?;
        Ok(page_id)
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
