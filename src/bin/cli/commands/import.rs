use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use enex2one_lib::import::{spawn_import, ImportConfig, ImportOutcome, ImportSummary};
use enex2one_lib::onenote::FileSink;

use crate::OutputFormat;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Settings given on the command line.
pub struct Overrides {
    pub notebook: Option<String>,
    pub since: Option<String>,
    pub modified_date: bool,
    pub output: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut ImportConfig) {
        if self.notebook.is_some() {
            config.notebook_name = self.notebook;
        }
        if self.since.is_some() {
            config.cutoff_date = self.since;
        }
        if self.modified_date {
            config.use_modified_date = true;
        }
        if self.output.is_some() {
            config.output_dir = self.output;
        }
        if self.temp_dir.is_some() {
            config.temp_dir = self.temp_dir;
        }
    }
}

pub fn run(
    file: &Path,
    config_path: Option<&Path>,
    overrides: Overrides,
    format: &OutputFormat,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ImportConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ImportConfig::default(),
    };
    overrides.apply(&mut config);

    let settings = config.settings_for(file)?;
    let output_dir = config.output_dir()?;

    let handle = spawn_import(file.to_path_buf(), settings, move || {
        FileSink::connect(output_dir)
    })
    .context("Failed to start the import")?;

    let mut last_value = None;
    while !handle.is_finished() {
        std::thread::sleep(POLL_INTERVAL);
        if let Some(update) = handle.latest_progress() {
            if last_value != Some(update.value) {
                log::info!("[{:>3}%] {}", update.value / 1000, update.message);
                last_value = Some(update.value);
            }
        }
    }

    let summary = handle
        .join()
        .with_context(|| format!("Import of {} failed", file.display()))?;
    print_summary(&summary, format)
}

fn print_summary(summary: &ImportSummary, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
        OutputFormat::Plain => {
            let outcome = match summary.outcome {
                ImportOutcome::Finished => "Finished",
                ImportOutcome::Cancelled => "Cancelled",
            };
            println!("{}: notebook \"{}\"", outcome, summary.notebook);
            if summary.used_unfiled_section {
                println!("  (notebook unavailable, notes went to Unfiled Notes)");
            }
            println!("  notes found:     {}", summary.notes_seen);
            println!("  imported:        {}", summary.imported);
            println!("  pages created:   {}", summary.pages_created);
            println!("  skipped by date: {}", summary.skipped_by_date);
            println!("  failed:          {}", summary.failures.len());
            for failure in &summary.failures {
                println!("    {}", failure);
            }
        }
    }
    Ok(())
}
