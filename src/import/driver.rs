//! Running a whole import: two passes over the export, one note at a time.

use std::fs;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;

use super::config::ImportSettings;
use super::errors::{ImportError, NoteError, NoteFailure, Result};
use super::failed::FailedNoteArchive;
use super::progress::{
    CancellationToken, ProgressObserver, ProgressTracker, ProgressUpdate, SharedProgress,
};
use super::transcode::{emit_page, transcode_fragment};
use crate::enex::{open_export, parse_note, EnexError, NoteFragment, NoteFragments, ParseOptions};
use crate::onenote::{Destination, OneNoteSink, SinkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportOutcome {
    Finished,
    Cancelled,
}

/// What a run did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub outcome: ImportOutcome,
    pub notebook: String,
    /// Notes went to the catch-all section
    pub used_unfiled_section: bool,
    pub notes_seen: usize,
    pub imported: usize,
    pub pages_created: usize,
    pub skipped_by_date: usize,
    pub failures: Vec<NoteFailure>,
}

impl ImportSummary {
    fn new(notebook: &str, used_unfiled_section: bool) -> Self {
        Self {
            outcome: ImportOutcome::Finished,
            notebook: notebook.to_string(),
            used_unfiled_section,
            notes_seen: 0,
            imported: 0,
            pages_created: 0,
            skipped_by_date: 0,
            failures: Vec::new(),
        }
    }
}

/// First-pass record of one note.
struct IndexEntry {
    title: Option<String>,
    date: Option<DateTime<Utc>>,
    /// Raw fragment and error text of a note that does not parse
    failed: Option<(String, String)>,
}

/// Everything a pass needs besides the export.
struct Run<'a, 'o, S: OneNoteSink> {
    settings: &'a ImportSettings,
    cancel: &'a CancellationToken,
    progress: ProgressTracker<'o>,
    destination: Destination<S>,
    archive: FailedNoteArchive,
    summary: ImportSummary,
}

/// Import `enex_path` into the sink returned by `connect`.
///
/// The sink is created, used and dropped on the calling thread. Per-note
/// failures end up in the summary; only connection and export-level failures
/// are returned as errors.
pub fn run_import<S, C>(
    enex_path: &Path,
    settings: &ImportSettings,
    connect: C,
    observer: &mut dyn ProgressObserver,
    cancel: &CancellationToken,
) -> Result<ImportSummary>
where
    S: OneNoteSink,
    C: FnOnce() -> SinkResult<S>,
{
    let mut progress = ProgressTracker::new(observer);
    progress.complete("Connecting to OneNote");

    let sink = connect().map_err(|e| {
        error!("Could not connect to OneNote: {}", e);
        ImportError::Connection(e)
    })?;
    // Opening only fails once the unfiled section is out of reach as well
    let destination = Destination::open(sink, &settings.notebook_name).map_err(|e| {
        error!(
            "Neither notebook \"{}\" nor the unfiled section can be opened: {}",
            settings.notebook_name, e
        );
        ImportError::Connection(e)
    })?;

    info!(
        "Importing {} into notebook \"{}\"",
        enex_path.display(),
        settings.notebook_name
    );

    let summary = ImportSummary::new(&settings.notebook_name, destination.uses_unfiled_section());
    let mut run = Run {
        settings,
        cancel,
        progress,
        destination,
        archive: FailedNoteArchive::new(&settings.temp_dir),
        summary,
    };
    run.execute(enex_path)?;

    let Run {
        mut progress,
        destination,
        summary,
        ..
    } = run;
    // Release the connection before reporting the end of the run
    drop(destination);

    match summary.outcome {
        ImportOutcome::Finished => {
            info!(
                "Imported {} of {} notes ({} pages, {} skipped by date, {} failed)",
                summary.imported,
                summary.notes_seen,
                summary.pages_created,
                summary.skipped_by_date,
                summary.failures.len()
            );
            progress.finish("Finished");
        }
        ImportOutcome::Cancelled => {
            warn!("Import cancelled after {} notes", summary.imported);
            progress.finish("Operation cancelled");
        }
    }
    Ok(summary)
}

impl<S: OneNoteSink> Run<'_, '_, S> {
    fn execute(&mut self, enex_path: &Path) -> Result<()> {
        let total_bytes = fs::metadata(enex_path)?.len();

        let entries = self.extract_notes(enex_path, total_bytes)?;
        if self.cancelled() {
            return Ok(());
        }

        self.report_parse_failures(&entries);
        let selected = self.calculate_what_to_do(&entries);
        self.import_notes(enex_path, &entries, &selected)
    }

    fn cancelled(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            self.summary.outcome = ImportOutcome::Cancelled;
            return true;
        }
        false
    }

    fn open(&self, enex_path: &Path) -> Result<NoteFragments<BufReader<File>>> {
        open_export(enex_path).map_err(|source| ImportError::Stream {
            notebook: self.settings.notebook_name.clone(),
            last_title: String::new(),
            archive: None,
            source,
        })
    }

    fn stream_failure<R: BufRead>(
        &self,
        fragments: &NoteFragments<R>,
        last_title: &str,
        source: EnexError,
    ) -> ImportError {
        let partial = fragments.partial_fragment();
        let archive = if partial.is_empty() {
            None
        } else {
            self.archive.store(partial)
        };
        error!(
            "Error parsing the notebook \"{}\" after note \"{}\": {}",
            self.settings.notebook_name, last_title, source
        );
        ImportError::Stream {
            notebook: self.settings.notebook_name.clone(),
            last_title: last_title.to_string(),
            archive,
            source,
        }
    }

    /// Pass one: read every note once and remember its title and date.
    fn extract_notes(&mut self, enex_path: &Path, total_bytes: u64) -> Result<Vec<IndexEntry>> {
        let options = self.settings.parse_options();
        let mut fragments = self.open(enex_path)?;
        let mut entries = Vec::new();
        let mut last_title = String::new();

        while let Some(next) = fragments.next() {
            if self.cancelled() {
                break;
            }
            let fragment = match next {
                Ok(fragment) => fragment,
                Err(source) => return Err(self.stream_failure(&fragments, &last_title, source)),
            };

            let entry = match parse_note(&fragment.xml, options) {
                Ok(note) => {
                    last_title = note.title.clone();
                    IndexEntry {
                        title: Some(note.title),
                        date: Some(note.date),
                        failed: None,
                    }
                }
                Err(e) => IndexEntry {
                    title: e.title().map(str::to_string),
                    date: None,
                    failed: Some((fragment.xml, e.to_string())),
                },
            };
            entries.push(entry);

            self.progress.report(
                format!("Extracting notes ({})", entries.len()),
                fragment.position,
                total_bytes,
            );
        }

        self.summary.notes_seen = entries.len();
        self.progress.complete("Parsing notes from Evernote");
        Ok(entries)
    }

    /// Archive and report every note that does not parse, once.
    fn report_parse_failures(&mut self, entries: &[IndexEntry]) {
        let failed: Vec<(usize, &IndexEntry)> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.failed.is_some())
            .collect();
        let total = failed.len() as u64;

        for (done, (index, entry)) in failed.into_iter().enumerate() {
            if let Some((xml, message)) = &entry.failed {
                self.record_failure(index, entry.title.clone(), message.clone(), xml);
            }
            self.progress
                .report("Parsing notes from Evernote", done as u64 + 1, total);
        }
        self.progress.complete("Calculating what to import");
    }

    /// Decide which notes to import; returns one flag per note.
    fn calculate_what_to_do(&mut self, entries: &[IndexEntry]) -> Vec<bool> {
        let cutoff = self.settings.cutoff;
        let total = entries.len() as u64;
        let mut selected = Vec::with_capacity(entries.len());

        for (i, entry) in entries.iter().enumerate() {
            let import = match (entry.failed.is_some(), entry.date) {
                (true, _) => false,
                (false, Some(date)) if cutoff.is_some_and(|cutoff| date < cutoff) => {
                    self.summary.skipped_by_date += 1;
                    false
                }
                (false, _) => true,
            };
            selected.push(import);
            self.progress
                .report("Calculating what to import", i as u64 + 1, total);
        }

        self.progress.complete("Importing notes to OneNote");
        selected
    }

    /// Pass two: read the export again and import the selected notes.
    fn import_notes(
        &mut self,
        enex_path: &Path,
        entries: &[IndexEntry],
        selected: &[bool],
    ) -> Result<()> {
        let upload_count = selected.iter().filter(|s| **s).count() as u64;
        let options = self.settings.parse_options();
        let mut fragments = self.open(enex_path)?;
        let mut counter = 0u64;
        let mut last_title = String::new();

        while let Some(next) = fragments.next() {
            if self.cancelled() {
                break;
            }
            let fragment = match next {
                Ok(fragment) => fragment,
                Err(source) => return Err(self.stream_failure(&fragments, &last_title, source)),
            };
            if !selected.get(fragment.index).copied().unwrap_or(false) {
                continue;
            }

            let title = entries
                .get(fragment.index)
                .and_then(|entry| entry.title.clone())
                .unwrap_or_default();
            self.progress.report(
                format!(
                    "importing note ({} of {}) : \"{}\"",
                    counter + 1,
                    upload_count,
                    title
                ),
                counter,
                upload_count,
            );
            counter += 1;

            match self.import_note(&fragment, options) {
                Ok(pages) => {
                    info!("Imported \"{}\" ({} pages)", title, pages);
                    self.summary.imported += 1;
                    self.summary.pages_created += pages;
                }
                Err(e) => self.record_failure(
                    fragment.index,
                    Some(title.clone()),
                    e.to_string(),
                    &fragment.xml,
                ),
            }
            last_title = title;
        }

        Ok(())
    }

    fn import_note(
        &mut self,
        fragment: &NoteFragment,
        options: ParseOptions,
    ) -> std::result::Result<usize, NoteError> {
        let page = transcode_fragment(&fragment.xml, options, &self.settings.temp_dir)?;
        let page_ids = emit_page(&mut self.destination, &page)?;
        Ok(page_ids.len())
    }

    fn record_failure(&mut self, index: usize, title: Option<String>, error: String, xml: &str) {
        let archive = self.archive.store(xml);
        let failure = NoteFailure {
            index,
            title,
            error,
            archive,
        };
        warn!("{}", failure);
        self.progress.note_failed(&failure);
        self.summary.failures.push(failure);
    }
}

/// An import running on its own thread.
pub struct ImportHandle {
    cancel: CancellationToken,
    progress: SharedProgress,
    worker: JoinHandle<Result<ImportSummary>>,
}

impl ImportHandle {
    /// Ask the worker to stop after the current note.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn latest_progress(&self) -> Option<ProgressUpdate> {
        self.progress.latest()
    }

    /// Failures reported since the last call.
    pub fn take_failures(&self) -> Vec<NoteFailure> {
        self.progress.take_failures()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the run to end.
    pub fn join(self) -> Result<ImportSummary> {
        self.worker
            .join()
            .unwrap_or_else(|_| Err(ImportError::WorkerPanicked))
    }
}

/// Start an import on a dedicated worker thread. The sink is created on that
/// thread by `connect` and never leaves it.
pub fn spawn_import<S, C>(
    enex_path: PathBuf,
    settings: ImportSettings,
    connect: C,
) -> std::io::Result<ImportHandle>
where
    S: OneNoteSink + 'static,
    C: FnOnce() -> SinkResult<S> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let progress = SharedProgress::default();

    let worker_cancel = cancel.clone();
    let mut worker_progress = progress.clone();
    let worker = std::thread::Builder::new()
        .name("enex-import".to_string())
        .spawn(move || {
            run_import(
                &enex_path,
                &settings,
                connect,
                &mut worker_progress,
                &worker_cancel,
            )
        })?;

    Ok(ImportHandle {
        cancel,
        progress,
        worker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    use crate::import::progress::SyncStep;
    use crate::onenote::{
        CreateFileType, HierarchyScope, SinkError, SpecialLocation, XmlSchema, FALLBACK_SECTION,
    };

    const NOTEBOOK_FOLDER: &str = "/onenote";
    const UNFILED: &str = "/onenote/Unfiled Notes.one";

    #[derive(Debug, Clone)]
    struct RecordedPage {
        section_path: String,
        xml: String,
    }

    #[derive(Default)]
    struct Recorded {
        /// container id -> path
        containers: Vec<(String, String)>,
        pages: Vec<RecordedPage>,
        synced: usize,
    }

    /// In-memory sink that remembers every page written to it.
    #[derive(Clone, Default)]
    struct RecordingSink {
        state: Arc<Mutex<Recorded>>,
        refuse_notebooks: bool,
        /// Opening without create (the unfiled section) fails
        refuse_unfiled: bool,
        /// Pages containing this text are rejected
        reject: Option<String>,
    }

    impl RecordingSink {
        fn pages(&self) -> Vec<RecordedPage> {
            self.state.lock().unwrap().pages.clone()
        }

        fn page_titled(&self, title: &str) -> Vec<RecordedPage> {
            let needle = format!("<one:T><![CDATA[{}]]></one:T>", title);
            self.pages()
                .into_iter()
                .filter(|p| p.xml.contains(&needle))
                .collect()
        }
    }

    impl OneNoteSink for RecordingSink {
        fn special_location(&mut self, location: SpecialLocation) -> SinkResult<String> {
            Ok(match location {
                SpecialLocation::DefaultNotebookFolder => NOTEBOOK_FOLDER.to_string(),
                SpecialLocation::UnfiledNotesSection => UNFILED.to_string(),
            })
        }

        fn open_hierarchy(&mut self, path: &str, create: CreateFileType) -> SinkResult<String> {
            if self.refuse_notebooks && create == CreateFileType::Notebook {
                return Err(SinkError::Automation("notebook exists".to_string()));
            }
            if self.refuse_unfiled && create == CreateFileType::None {
                return Err(SinkError::NotFound(path.to_string()));
            }
            let id = format!("{{{}}}", path);
            let mut state = self.state.lock().unwrap();
            if !state.containers.iter().any(|(known, _)| *known == id) {
                state.containers.push((id.clone(), path.to_string()));
            }
            Ok(id)
        }

        fn get_hierarchy(&mut self, _start_id: &str, _scope: HierarchyScope) -> SinkResult<String> {
            Ok(r#"<one:Notebooks xmlns:one="http://schemas.microsoft.com/office/onenote/2013/onenote"/>"#.to_string())
        }

        fn create_new_page(&mut self, section_id: &str) -> SinkResult<String> {
            let mut state = self.state.lock().unwrap();
            let section_path = state
                .containers
                .iter()
                .find(|(id, _)| id == section_id)
                .map(|(_, path)| path.clone())
                .ok_or_else(|| SinkError::NotFound(section_id.to_string()))?;
            state.pages.push(RecordedPage {
                section_path,
                xml: String::new(),
            });
            Ok(format!("page-{}", state.pages.len() - 1))
        }

        fn update_page_content(
            &mut self,
            page_id: &str,
            xml: &str,
            _schema: XmlSchema,
        ) -> SinkResult<()> {
            if let Some(reject) = &self.reject {
                if xml.contains(reject.as_str()) {
                    return Err(SinkError::Automation("page rejected".to_string()));
                }
            }
            let index: usize = page_id
                .trim_start_matches("page-")
                .parse()
                .map_err(|_| SinkError::NotFound(page_id.to_string()))?;
            let mut state = self.state.lock().unwrap();
            state.pages[index].xml = xml.to_string();
            Ok(())
        }

        fn sync_hierarchy(&mut self, _id: &str) -> SinkResult<()> {
            self.state.lock().unwrap().synced += 1;
            Ok(())
        }
    }

    struct Fixture {
        temp: TempDir,
        export: PathBuf,
        settings: ImportSettings,
    }

    fn fixture(notes: &[&str]) -> Fixture {
        let temp = TempDir::new().unwrap();
        let export = temp.path().join("export.enex");
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE en-export SYSTEM \"http://xml.evernote.com/pub/evernote-export3.dtd\">\n<en-export export-date=\"20210101T000000Z\" application=\"Evernote\" version=\"10\">\n",
        );
        for note in notes {
            xml.push_str(note);
            xml.push('\n');
        }
        xml.push_str("</en-export>\n");
        fs::write(&export, xml).unwrap();

        let settings = ImportSettings {
            notebook_name: "Evernote".to_string(),
            cutoff: None,
            use_modified_date: false,
            temp_dir: temp.path().join("ev2on"),
        };
        Fixture {
            temp,
            export,
            settings,
        }
    }

    fn note(title: &str, body: &str, extra: &str) -> String {
        format!(
            "<note><title>{}</title><content><![CDATA[<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE en-note SYSTEM \"http://xml.evernote.com/pub/enml2.dtd\">\n<en-note>{}</en-note>]]></content><created>20200101T120000Z</created>{}</note>",
            title, body, extra
        )
    }

    fn run(fixture: &Fixture, sink: &RecordingSink) -> Result<ImportSummary> {
        let sink = sink.clone();
        let mut updates = Vec::new();
        let mut observer = |u: ProgressUpdate| updates.push(u);
        run_import(
            &fixture.export,
            &fixture.settings,
            move || Ok(sink),
            &mut observer,
            &CancellationToken::new(),
        )
    }

    fn failed_notes(fixture: &Fixture) -> Vec<PathBuf> {
        let dir = fixture.settings.temp_dir.join("failedNotes");
        match fs::read_dir(&dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_single_note_goes_to_fallback_section() {
        let fixture = fixture(&[&note("Hello", "Hi", "")]);
        let sink = RecordingSink::default();

        let summary = run(&fixture, &sink).unwrap();

        assert_eq!(summary.outcome, ImportOutcome::Finished);
        assert_eq!(summary.notes_seen, 1);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.pages_created, 1);
        assert!(summary.failures.is_empty());

        let pages = sink.pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(
            pages[0].section_path,
            format!("{}/Evernote/{}.one", NOTEBOOK_FOLDER, FALLBACK_SECTION)
        );
        assert!(pages[0].xml.contains("<one:T><![CDATA[Hello]]></one:T>"));
        assert!(pages[0]
            .xml
            .contains("<one:Data><![CDATA[<!DOCTYPE html><head></head><body>Hi</body>]]></one:Data>"));
        assert!(pages[0].xml.contains(r#"dateTime="2020-01-01T12:00:00Z""#));
        assert_eq!(sink.state.lock().unwrap().synced, 1);
    }

    #[test]
    fn test_one_page_per_tag() {
        let fixture = fixture(&[&note("Tagged", "Same", "<tag>work</tag><tag>home</tag>")]);
        let sink = RecordingSink::default();

        let summary = run(&fixture, &sink).unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.pages_created, 2);

        let pages = sink.pages();
        let sections: Vec<&str> = pages.iter().map(|p| p.section_path.as_str()).collect();
        assert_eq!(
            sections,
            vec!["/onenote/Evernote/work.one", "/onenote/Evernote/home.one"]
        );
        let body = "<body>Same</body>";
        assert!(pages.iter().all(|p| p.xml.contains(body)));
    }

    #[test]
    fn test_unescaped_ampersand_in_title() {
        let fixture = fixture(&[&note("Tom & Jerry", "x", "")]);
        let sink = RecordingSink::default();

        let summary = run(&fixture, &sink).unwrap();
        assert!(summary.failures.is_empty());
        assert_eq!(sink.page_titled("Tom &amp; Jerry").len(), 1);
    }

    #[test]
    fn test_bad_note_is_archived_and_skipped() {
        let fixture = fixture(&[
            &note("First", "1", ""),
            "<note><title>Broken</title><content><div></content></note>",
            &note("Third", "3", ""),
        ]);
        let sink = RecordingSink::default();

        let summary = run(&fixture, &sink).unwrap();

        assert_eq!(summary.notes_seen, 3);
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].title.as_deref(), Some("Broken"));
        assert_eq!(summary.failures[0].index, 1);

        let archived = failed_notes(&fixture);
        assert_eq!(archived.len(), 1);
        assert_eq!(summary.failures[0].archive.as_ref(), Some(&archived[0]));
        assert!(fs::read_to_string(&archived[0]).unwrap().contains("Broken"));

        assert_eq!(sink.page_titled("First").len(), 1);
        assert_eq!(sink.page_titled("Third").len(), 1);
        assert!(sink.page_titled("Broken").is_empty());
    }

    #[test]
    fn test_notes_before_cutoff_are_skipped() {
        let mut fixture = fixture(&[
            "<note><title>Old</title><content><![CDATA[<en-note>o</en-note>]]></content><created>20190101T000000Z</created></note>",
            "<note><title>New</title><content><![CDATA[<en-note>n</en-note>]]></content><created>20210101T000000Z</created></note>",
            "<note><title>Undated</title><content><![CDATA[<en-note>u</en-note>]]></content></note>",
        ]);
        fixture.settings.cutoff = Some(Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap());
        let sink = RecordingSink::default();

        let summary = run(&fixture, &sink).unwrap();

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped_by_date, 2);
        assert_eq!(sink.page_titled("New").len(), 1);
        assert!(sink.page_titled("Old").is_empty());
    }

    #[test]
    fn test_modified_date_decides_cutoff() {
        let mut fixture = fixture(&[
            "<note><title>Edited</title><content><![CDATA[<en-note>e</en-note>]]></content><created>20190101T000000Z</created><updated>20210101T000000Z</updated></note>",
        ]);
        fixture.settings.cutoff = Some(Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap());
        fixture.settings.use_modified_date = true;
        let sink = RecordingSink::default();

        let summary = run(&fixture, &sink).unwrap();
        assert_eq!(summary.imported, 1);
        assert!(sink.pages()[0].xml.contains(r#"dateTime="2021-01-01T00:00:00Z""#));
    }

    #[test]
    fn test_attachments() {
        // "hello" as an inline image, "world" as a PDF, "!" as an OCR overlay
        let extra = concat!(
            "<resource><data>aGVsbG8=</data><mime>image/png</mime><resource-attributes><file-name>photo.png</file-name></resource-attributes></resource>",
            "<resource><data>d29ybGQ=</data><mime>application/pdf</mime><resource-attributes><file-name>doc.pdf</file-name></resource-attributes></resource>",
            "<resource><data>IQ==</data><mime>image/png</mime><resource-attributes><file-name>proxy.php</file-name></resource-attributes></resource>",
        );
        let body = r#"<div>see</div><en-media hash="5d41402abc4b2a76b9719d911017c592" type="image/png"/>"#;
        let fixture = fixture(&[&note("Files", body, extra)]);
        let sink = RecordingSink::default();

        let summary = run(&fixture, &sink).unwrap();
        assert_eq!(summary.imported, 1);

        let xml = &sink.pages()[0].xml;
        assert!(xml.contains("<img src=\"file://"));
        assert!(xml.contains("5d41402abc4b2a76b9719d911017c592\"/></body>"));
        assert!(xml.contains(r#"preferredName="doc.pdf""#));
        assert!(!xml.contains("photo.png"));
        assert!(!xml.contains("proxy.php"));
        assert_eq!(xml.matches("<one:InsertedFile").count(), 1);

        // Temp copies are gone once the page is written
        let temp = &fixture.settings.temp_dir;
        assert!(!temp.join("5d41402abc4b2a76b9719d911017c592").exists());
        assert!(!temp.join("7d793037a0760186574b0282f2f435e7").exists());
    }

    #[test]
    fn test_source_url_block() {
        let extra = "<note-attributes><source-url>https://example.com/a</source-url></note-attributes>";
        let fixture = fixture(&[&note("Clip", "c", extra)]);
        let sink = RecordingSink::default();

        run(&fixture, &sink).unwrap();
        assert!(sink.pages()[0]
            .xml
            .contains(r#"From &lt;<a href="https://example.com/a">https://example.com/a</a>&gt; "#));
    }

    #[test]
    fn test_rejected_page_is_archived() {
        let fixture = fixture(&[&note("Keep", "k", ""), &note("Reject me", "r", "")]);
        let sink = RecordingSink {
            reject: Some("Reject me".to_string()),
            ..RecordingSink::default()
        };

        let summary = run(&fixture, &sink).unwrap();

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].title.as_deref(), Some("Reject me"));
        assert!(summary.failures[0].error.contains("page rejected"));
        assert_eq!(failed_notes(&fixture).len(), 1);
    }

    #[test]
    fn test_unfiled_fallback() {
        let fixture = fixture(&[&note("Tagged", "t", "<tag>a</tag><tag>b</tag>")]);
        let sink = RecordingSink {
            refuse_notebooks: true,
            ..RecordingSink::default()
        };

        let summary = run(&fixture, &sink).unwrap();

        assert!(summary.used_unfiled_section);
        assert_eq!(summary.pages_created, 1);
        assert_eq!(sink.pages()[0].section_path, UNFILED);
    }

    #[test]
    fn test_connection_failure_is_fatal() {
        let fixture = fixture(&[&note("Hello", "Hi", "")]);
        let mut observer = |_: ProgressUpdate| {};
        let result = run_import(
            &fixture.export,
            &fixture.settings,
            || -> SinkResult<RecordingSink> {
                Err(SinkError::Connection("not installed".to_string()))
            },
            &mut observer,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(ImportError::Connection(_))));
    }

    #[test]
    fn test_no_notebook_and_no_unfiled_section_is_a_connection_failure() {
        let fixture = fixture(&[&note("Hello", "Hi", "")]);
        let sink = RecordingSink {
            refuse_notebooks: true,
            refuse_unfiled: true,
            ..RecordingSink::default()
        };

        let result = run(&fixture, &sink);

        assert!(matches!(result, Err(ImportError::Connection(SinkError::NotFound(_)))));
        assert!(sink.pages().is_empty());
        assert!(failed_notes(&fixture).is_empty());
    }

    #[test]
    fn test_truncated_export_is_a_stream_failure() {
        let fixture = fixture(&[]);
        fs::write(
            &fixture.export,
            "<en-export><note><title>Fine</title><content><![CDATA[<en-note/>]]></content></note><note><title>Cut",
        )
        .unwrap();
        let sink = RecordingSink::default();

        let err = run(&fixture, &sink).unwrap_err();
        match err {
            ImportError::Stream {
                notebook,
                last_title,
                archive,
                ..
            } => {
                assert_eq!(notebook, "Evernote");
                assert_eq!(last_title, "Fine");
                assert!(archive.is_some_and(|path| path.exists()));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(sink.pages().is_empty());
    }

    #[test]
    fn test_cancel_before_start() {
        let fixture = fixture(&[&note("Hello", "Hi", "")]);
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut last = None;
        let mut observer = |u: ProgressUpdate| last = Some(u);
        let moved = sink.clone();
        let summary = run_import(
            &fixture.export,
            &fixture.settings,
            move || Ok(moved),
            &mut observer,
            &cancel,
        )
        .unwrap();

        assert_eq!(summary.outcome, ImportOutcome::Cancelled);
        assert!(sink.pages().is_empty());
        let last = last.unwrap();
        assert_eq!(last.step, SyncStep::Finished);
        assert_eq!(last.message, "Operation cancelled");
    }

    #[test]
    fn test_cancel_during_import_finishes_current_note() {
        let fixture = fixture(&[&note("One", "1", ""), &note("Two", "2", ""), &note("Three", "3", "")]);
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let mut observer = |u: ProgressUpdate| {
            if u.message.starts_with("importing note") {
                trigger.cancel();
            }
        };
        let moved = sink.clone();
        let summary = run_import(
            &fixture.export,
            &fixture.settings,
            move || Ok(moved),
            &mut observer,
            &cancel,
        )
        .unwrap();

        assert_eq!(summary.outcome, ImportOutcome::Cancelled);
        assert_eq!(summary.imported, 1);
        assert_eq!(sink.page_titled("One").len(), 1);
    }

    #[test]
    fn test_progress_messages_and_steps() {
        let fixture = fixture(&[&note("Alpha", "a", ""), &note("Beta", "b", "")]);
        let sink = RecordingSink::default();

        let mut updates: Vec<ProgressUpdate> = Vec::new();
        let mut observer = |u: ProgressUpdate| updates.push(u);
        let moved = sink.clone();
        run_import(
            &fixture.export,
            &fixture.settings,
            move || Ok(moved),
            &mut observer,
            &CancellationToken::new(),
        )
        .unwrap();

        let messages: Vec<&str> = updates.iter().map(|u| u.message.as_str()).collect();
        assert!(messages.contains(&"importing note (1 of 2) : \"Alpha\""));
        assert!(messages.contains(&"importing note (2 of 2) : \"Beta\""));

        // Neither steps nor values go backwards and the run ends at full scale
        assert!(updates.windows(2).all(|w| w[0].step <= w[1].step));
        assert!(updates.windows(2).all(|w| w[0].value <= w[1].value));
        let last = updates.last().unwrap();
        assert_eq!(last.step, SyncStep::Finished);
        assert_eq!(last.value, crate::import::progress::PROGRESS_MAX);
        assert!(updates
            .iter()
            .filter(|u| u.step == SyncStep::ImportNotes)
            .all(|u| u.value >= 35_000));
    }

    #[test]
    fn test_spawned_import() {
        let fixture = fixture(&[&note("Threaded", "t", "")]);
        let sink = RecordingSink::default();
        let moved = sink.clone();

        let handle = spawn_import(
            fixture.export.clone(),
            fixture.settings.clone(),
            move || Ok(moved),
        )
        .unwrap();
        let summary = handle.join().unwrap();

        assert_eq!(summary.imported, 1);
        assert_eq!(sink.page_titled("Threaded").len(), 1);
        assert!(fixture.temp.path().exists());
    }
}
