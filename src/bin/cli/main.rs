mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "enex2one", about = "Import Evernote exports into OneNote", version)]
struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Import an .enex export into a notebook
    Import {
        /// Path to the .enex file
        file: PathBuf,
        /// Target notebook (defaults to the file name)
        #[arg(long)]
        notebook: Option<String>,
        /// Only import notes dated on or after this (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        since: Option<String>,
        /// Date notes by their last modification instead of creation
        #[arg(long)]
        modified_date: bool,
        /// Notebook store directory
        #[arg(long)]
        output: Option<PathBuf>,
        /// Scratch directory for attachments and failed notes
        #[arg(long)]
        temp_dir: Option<PathBuf>,
        /// TOML file with import settings; flags take precedence
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Summarize an .enex export without importing it
    Preview {
        /// Path to the .enex file
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Import {
            file,
            notebook,
            since,
            modified_date,
            output,
            temp_dir,
            config,
        } => {
            let overrides = commands::import::Overrides {
                notebook,
                since,
                modified_date,
                output,
                temp_dir,
            };
            commands::import::run(&file, config.as_deref(), overrides, &cli.format)?;
        }
        Command::Preview { file } => {
            commands::preview::run(&file, &cli.format)?;
        }
    }

    Ok(())
}
