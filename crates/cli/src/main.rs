mod commands;
mod features;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pixfolio_core::Library;
use tracing_subscriber::EnvFilter;

/// pixfolio: personal image folders with visual search
#[derive(Parser)]
#[command(name = "pixfolio", version, about)]
struct Cli {
    /// Path to the catalog database
    #[arg(long, default_value_t = default_catalog_path())]
    catalog: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage folders: list, add, or remove
    Folders {
        #[command(subcommand)]
        action: Option<FoldersAction>,
    },
    /// List one page of a folder, newest first
    Ls {
        /// Folder id or name
        folder: String,
        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: usize,
    },
    /// Import image files or directories into a folder
    Import {
        /// Folder id or name
        folder: String,
        /// Files or directories to import
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Find images in a folder that look like a reference image
    Search {
        /// Folder id or name (ignored with --like)
        #[arg(required_unless_present = "like")]
        folder: Option<String>,
        /// Reference image file
        #[arg(long, conflicts_with = "like", required_unless_present = "like")]
        image: Option<PathBuf>,
        /// Id of an image already in the catalog
        #[arg(long)]
        like: Option<String>,
        /// Minimum similarity in [0, 1] (exclusive), defaults to the configured threshold
        #[arg(long)]
        threshold: Option<f32>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove one image from the catalog
    Rm {
        /// Image id
        id: String,
    },
    /// Write an image's original bytes to a file
    Export {
        /// Image id
        id: String,
        /// Output file
        out: PathBuf,
    },
    /// Show or change catalog settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum FoldersAction {
    /// List folders with image counts
    List,
    /// Create a folder
    Add {
        /// Display name
        name: String,
    },
    /// Delete a folder and every image in it
    Rm {
        /// Folder id or name
        folder: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current settings
    Show,
    /// Change a setting (search_threshold, page_size)
    Set { key: String, value: String },
}

fn default_catalog_path() -> String {
    dirs_path().to_string_lossy().to_string()
}

fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".pixfolio").join("catalog.db")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let catalog_path = PathBuf::from(&cli.catalog);
    let mut library = Library::open(&catalog_path)?;

    match cli.command {
        Commands::Folders { action } => match action {
            None | Some(FoldersAction::List) => commands::folders::list(&library)?,
            Some(FoldersAction::Add { name }) => commands::folders::add(&library, &name)?,
            Some(FoldersAction::Rm { folder }) => commands::folders::rm(&mut library, &folder)?,
        },
        Commands::Ls { folder, page } => commands::images::ls(&library, &folder, page)?,
        Commands::Import { folder, paths } => commands::import::run(&library, &folder, &paths)?,
        Commands::Search {
            folder,
            image,
            like,
            threshold,
            json,
        } => {
            let query = match (like, image) {
                (Some(id), _) => commands::search::Query::Like(id),
                (None, Some(path)) => commands::search::Query::Image {
                    folder: folder.unwrap_or_default(),
                    path,
                },
                (None, None) => anyhow::bail!("either --image or --like is required"),
            };
            commands::search::run(&library, query, threshold, json)?
        }
        Commands::Rm { id } => commands::images::rm(&library, &id)?,
        Commands::Export { id, out } => commands::images::export(&library, &id, &out)?,
        Commands::Config { action } => match action {
            None | Some(ConfigAction::Show) => commands::config::show(&library)?,
            Some(ConfigAction::Set { key, value }) => commands::config::set(&library, &key, &value)?,
        },
    }

    Ok(())
}
