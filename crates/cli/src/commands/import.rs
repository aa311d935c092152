use std::path::{Path, PathBuf};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use pixfolio_core::extract::{Extractors, ImageInput};
use pixfolio_core::ingest::{CancelFlag, ImportProgress};
use pixfolio_core::Library;
use tracing::warn;
use walkdir::WalkDir;

use super::resolve_folder;
use crate::features::{default_model, is_supported_image, load_input};

pub fn run(library: &Library, key: &str, paths: &[PathBuf]) -> Result<()> {
    let folder = resolve_folder(library, key)?;
    let files = collect_image_files(paths);
    if files.is_empty() {
        println!("No image files found.");
        return Ok(());
    }

    let model = default_model();

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let summary = library.import(
        &folder.id,
        files.iter().filter_map(|path| read_upload(path)),
        Extractors::new(&model),
        &CancelFlag::new(),
        Some(&mut |progress| match progress {
            ImportProgress::Start { total } => {
                pb.set_length(total.unwrap_or(files.len()) as u64);
                pb.set_message(format!("Importing into {}...", folder.name));
            }
            ImportProgress::Imported { name, .. } => {
                pb.inc(1);
                pb.set_message(name);
            }
            ImportProgress::Failed { name, reason } => {
                pb.inc(1);
                pb.println(format!("  skipped {name}: {reason}"));
            }
            ImportProgress::Cancelled { processed } => {
                pb.println(format!("  cancelled after {processed} images"));
            }
            ImportProgress::Complete { imported, failed } => {
                pb.finish_with_message(format!("{imported} imported, {failed} skipped"));
            }
        }),
    )?;

    let unreadable = files.len() - summary.imported.len() - summary.failed.len();
    if unreadable > 0 && !summary.cancelled {
        println!("{unreadable} files could not be read.");
    }
    println!("Import complete.");
    Ok(())
}

fn read_upload(path: &Path) -> Option<ImageInput> {
    match load_input(path) {
        Ok(input) => Some(input),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot read image file");
            None
        }
    }
}

/// Expand directories recursively and keep supported image files, sorted by path.
fn collect_image_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = paths
        .iter()
        .flat_map(|root| {
            WalkDir::new(root)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
        })
        .filter(|p| is_supported_image(p))
        .collect();
    files.sort();
    files.dedup();
    files
}
