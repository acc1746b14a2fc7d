//! A destination that keeps notebooks in a plain directory tree.
//!
//! Layout below the root:
//!
//! ```text
//! <root>/
//!   Unfiled Notes.one/            catch-all section
//!   <notebook>/
//!     <section>.one/
//!       <page-uuid>.xml           page document
//!       <page-uuid>_files/        files the page links to
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{debug, info};
use regex::{Captures, Regex};
use uuid::Uuid;

use super::hierarchy::ONENOTE_NS;
use super::page::file_url;
use super::sink::{
    CreateFileType, HierarchyScope, OneNoteSink, SinkError, SinkResult, SpecialLocation, XmlSchema,
};
use crate::enex::decode::{decode_html, escape_xml};

const UNFILED_SECTION: &str = "Unfiled Notes.one";
const SECTION_EXTENSION: &str = "one";

fn path_source_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"pathSource="([^"]*)""#).expect("pathSource regex"))
}

fn file_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"src="file://([^"]*)""#).expect("file src regex"))
}

fn page_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<one:Title\b.*?<!\[CDATA\[(.*?)\]\]>").expect("page title regex")
    })
}

fn page_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<one:Page\b[^>]*?\sdateTime="([^"]*)""#).expect("page date regex"))
}

pub struct FileSink {
    root: PathBuf,
    /// Container id -> directory
    containers: HashMap<String, PathBuf>,
    /// Page id -> page document
    pages: HashMap<String, PathBuf>,
}

impl FileSink {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn connect(root: impl Into<PathBuf>) -> SinkResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(UNFILED_SECTION))
            .map_err(|e| SinkError::Connection(format!("{}: {}", root.display(), e)))?;
        info!("Using notebook store at {}", root.display());

        Ok(Self {
            root,
            containers: HashMap::new(),
            pages: HashMap::new(),
        })
    }

    /// Get the default store directory
    pub fn default_root() -> Option<PathBuf> {
        dirs::document_dir().map(|p| p.join("OneNote Notebooks"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_section(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == SECTION_EXTENSION)
    }

    /// Containers keep the same id across runs.
    fn container_id(path: &Path) -> String {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes());
        format!("{{{}}}{{1}}{{B0}}", uuid.to_string().to_uppercase())
    }

    fn page_id(uuid: Uuid) -> String {
        format!("{{{}}}{{1}}{{E1}}", uuid.to_string().to_uppercase())
    }

    fn register_container(&mut self, path: &Path) -> String {
        let id = Self::container_id(path);
        self.containers.insert(id.clone(), path.to_path_buf());
        id
    }

    fn container_path(&self, id: &str) -> SinkResult<PathBuf> {
        self.containers
            .get(id)
            .cloned()
            .ok_or_else(|| SinkError::NotFound(format!("container {}", id)))
    }

    fn sorted_children(dir: &Path) -> SinkResult<Vec<PathBuf>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(dir)? {
            children.push(entry?.path());
        }
        children.sort();
        Ok(children)
    }

    fn name_of(path: &Path) -> String {
        let name = if Self::is_section(path) {
            path.file_stem()
        } else {
            path.file_name()
        };
        name.map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
    }

    fn open_tag(kind: &str, name: &str, id: &str, path: &Path, xmlns: bool) -> String {
        let ns = if xmlns {
            format!(r#" xmlns:one="{}""#, ONENOTE_NS)
        } else {
            String::new()
        };
        format!(
            r#"<one:{}{} name="{}" ID="{}" path="{}">"#,
            kind,
            ns,
            escape_xml(name),
            id,
            escape_xml(&path.to_string_lossy())
        )
    }

    fn write_notebook(
        &mut self,
        out: &mut String,
        path: &Path,
        kind: &str,
        scope: HierarchyScope,
        xmlns: bool,
    ) -> SinkResult<()> {
        let id = self.register_container(path);
        out.push_str(&Self::open_tag(kind, &Self::name_of(path), &id, path, xmlns));

        if scope >= HierarchyScope::Sections {
            for child in Self::sorted_children(path)? {
                if !child.is_dir() {
                    continue;
                }
                if Self::is_section(&child) {
                    self.write_section(out, &child, scope, false)?;
                } else {
                    self.write_notebook(out, &child, "SectionGroup", scope, false)?;
                }
            }
        }

        out.push_str(&format!("</one:{}>", kind));
        Ok(())
    }

    fn write_section(
        &mut self,
        out: &mut String,
        path: &Path,
        scope: HierarchyScope,
        xmlns: bool,
    ) -> SinkResult<()> {
        let id = self.register_container(path);
        out.push_str(&Self::open_tag("Section", &Self::name_of(path), &id, path, xmlns));

        if scope == HierarchyScope::Pages {
            for child in Self::sorted_children(path)? {
                if child.is_file() {
                    self.write_page(out, &child)?;
                }
            }
        }

        out.push_str("</one:Section>");
        Ok(())
    }

    fn write_page(&mut self, out: &mut String, path: &Path) -> SinkResult<()> {
        let Some(uuid) = path
            .file_stem()
            .and_then(|stem| Uuid::parse_str(&stem.to_string_lossy()).ok())
        else {
            return Ok(());
        };
        let id = Self::page_id(uuid);
        self.pages.insert(id.clone(), path.to_path_buf());

        let document = fs::read_to_string(path)?;
        let title = page_title_re()
            .captures(&document)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();
        let date = page_date_re()
            .captures(&document)
            .map(|caps| format!(r#" dateTime="{}""#, &caps[1]))
            .unwrap_or_default();

        // The stored title is already escaped for XML
        out.push_str(&format!(r#"<one:Page ID="{}" name="{}"{}/>"#, id, title, date));
        Ok(())
    }

    /// Copy every local file the page links to into `files_dir` and point the
    /// links at the copies.
    fn localize_links(&self, xml: &str, files_dir: &Path) -> SinkResult<String> {
        let mut copied: HashMap<String, String> = HashMap::new();
        let mut seen = HashSet::new();

        let sources = path_source_re()
            .captures_iter(xml)
            .chain(file_src_re().captures_iter(xml))
            .map(|caps| caps[1].to_string());
        for raw in sources {
            if !seen.insert(raw.clone()) {
                continue;
            }
            let source = PathBuf::from(local_path(&decode_html(&raw)));
            if !source.is_file() {
                continue;
            }
            let Some(file_name) = source.file_name() else {
                continue;
            };
            fs::create_dir_all(files_dir)?;
            let target = files_dir.join(file_name);
            fs::copy(&source, &target)?;
            debug!("Copied {} to {}", source.display(), target.display());
            copied.insert(raw, target.to_string_lossy().to_string());
        }

        if copied.is_empty() {
            return Ok(xml.to_string());
        }

        let xml = path_source_re().replace_all(xml, |caps: &Captures<'_>| match copied.get(&caps[1]) {
            Some(target) => format!(r#"pathSource="{}""#, escape_xml(target)),
            None => caps[0].to_string(),
        });
        let xml = file_src_re().replace_all(&xml, |caps: &Captures<'_>| match copied.get(&caps[1]) {
            Some(target) => format!(r#"src="{}""#, file_url(Path::new(target))),
            None => caps[0].to_string(),
        });
        Ok(xml.into_owned())
    }
}

/// Filesystem path of the part of a `file://` URL after the scheme.
fn local_path(url_path: &str) -> &str {
    // file:///C:/dir -> C:/dir
    let bytes = url_path.as_bytes();
    if bytes.len() > 2 && bytes[0] == b'/' && bytes[2] == b':' {
        &url_path[1..]
    } else {
        url_path
    }
}

impl OneNoteSink for FileSink {
    fn special_location(&mut self, location: SpecialLocation) -> SinkResult<String> {
        let path = match location {
            SpecialLocation::DefaultNotebookFolder => self.root.clone(),
            SpecialLocation::UnfiledNotesSection => self.root.join(UNFILED_SECTION),
        };
        Ok(path.to_string_lossy().to_string())
    }

    fn open_hierarchy(&mut self, path: &str, create: CreateFileType) -> SinkResult<String> {
        let path = PathBuf::from(path);
        if !path.starts_with(&self.root) {
            return Err(SinkError::Automation(format!(
                "{} is outside the notebook store",
                path.display()
            )));
        }

        if path.exists() {
            if !path.is_dir() {
                return Err(SinkError::Automation(format!(
                    "{} is not a notebook or section",
                    path.display()
                )));
            }
            return Ok(self.register_container(&path));
        }

        match create {
            CreateFileType::None => {
                return Err(SinkError::NotFound(path.display().to_string()));
            }
            CreateFileType::Notebook => {
                debug!("Creating notebook {}", path.display());
            }
            CreateFileType::Section => {
                if !Self::is_section(&path) {
                    return Err(SinkError::Automation(format!(
                        "section path {} must end in .{}",
                        path.display(),
                        SECTION_EXTENSION
                    )));
                }
                debug!("Creating section {}", path.display());
            }
        }
        fs::create_dir_all(&path)?;
        Ok(self.register_container(&path))
    }

    fn get_hierarchy(&mut self, start_id: &str, scope: HierarchyScope) -> SinkResult<String> {
        let mut out = String::from(r#"<?xml version="1.0"?>"#);

        if start_id.is_empty() {
            out.push_str(&format!(r#"<one:Notebooks xmlns:one="{}">"#, ONENOTE_NS));
            let root = self.root.clone();
            for child in Self::sorted_children(&root)? {
                if !child.is_dir() {
                    continue;
                }
                if Self::is_section(&child) {
                    if scope >= HierarchyScope::Sections {
                        self.write_section(&mut out, &child, scope, false)?;
                    }
                } else {
                    self.write_notebook(&mut out, &child, "Notebook", scope, false)?;
                }
            }
            out.push_str("</one:Notebooks>");
            return Ok(out);
        }

        let path = self.container_path(start_id)?;
        if Self::is_section(&path) {
            self.write_section(&mut out, &path, scope, true)?;
        } else {
            self.write_notebook(&mut out, &path, "Notebook", scope, true)?;
        }
        Ok(out)
    }

    fn create_new_page(&mut self, section_id: &str) -> SinkResult<String> {
        let section = self.container_path(section_id)?;
        if !Self::is_section(&section) {
            return Err(SinkError::Automation(format!(
                "{} is not a section",
                section.display()
            )));
        }

        let uuid = Uuid::new_v4();
        let id = Self::page_id(uuid);
        let path = section.join(format!("{}.xml", uuid));
        fs::write(
            &path,
            format!(
                r#"<?xml version="1.0"?><one:Page xmlns:one="{}" ID="{}"/>"#,
                ONENOTE_NS, id
            ),
        )?;

        self.pages.insert(id.clone(), path);
        Ok(id)
    }

    fn update_page_content(
        &mut self,
        page_id: &str,
        xml: &str,
        _schema: XmlSchema,
    ) -> SinkResult<()> {
        let path = self
            .pages
            .get(page_id)
            .cloned()
            .ok_or_else(|| SinkError::NotFound(format!("page {}", page_id)))?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let files_dir = path.with_file_name(format!("{}_files", stem));

        let document = self.localize_links(xml, &files_dir)?;
        fs::write(&path, document)?;
        Ok(())
    }

    fn sync_hierarchy(&mut self, id: &str) -> SinkResult<()> {
        if !self.containers.contains_key(id) && !self.pages.contains_key(id) {
            return Err(SinkError::NotFound(id.to_string()));
        }
        // Writes are already on disk
        debug!("Synced {}", id);
        Ok(())
    }
}
