use std::path::Path;

use anyhow::{Context, Result};
use enex2one_lib::enex::preview_enex;

use crate::OutputFormat;

pub fn run(file: &Path, format: &OutputFormat) -> Result<()> {
    let preview = preview_enex(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        OutputFormat::Plain => {
            println!("Notebook:  {}", preview.suggested_name);
            println!("Notes:     {}", preview.note_count);
            println!("Resources: {}", preview.resource_count);

            if !preview.notes.is_empty() {
                println!();
                let title_w = preview
                    .notes
                    .iter()
                    .map(|n| n.title.chars().count())
                    .max()
                    .unwrap_or(5)
                    .clamp(5, 40);
                println!("{:<title_w$} {:<20} {:<5} Tags", "Title", "Created", "Files");
                println!(
                    "{} {} {} {}",
                    "\u{2500}".repeat(title_w),
                    "\u{2500}".repeat(20),
                    "\u{2500}".repeat(5),
                    "\u{2500}".repeat(20)
                );
                for note in &preview.notes {
                    let title: String = if note.title.chars().count() > title_w {
                        let cut: String = note.title.chars().take(title_w - 3).collect();
                        format!("{}...", cut)
                    } else {
                        note.title.clone()
                    };
                    println!(
                        "{:<title_w$} {:<20} {:<5} {}",
                        title,
                        note.created.as_deref().unwrap_or("-"),
                        if note.has_attachments { "yes" } else { "" },
                        note.tags.join(", ")
                    );
                }
            }

            for warning in &preview.warnings {
                eprintln!("warning: {}", warning);
            }
        }
    }

    Ok(())
}
