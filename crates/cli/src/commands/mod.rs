pub mod config;
pub mod folders;
pub mod images;
pub mod import;
pub mod search;

use anyhow::{bail, Result};
use pixfolio_core::domain::Folder;
use pixfolio_core::Library;

/// Look a folder up by id, then by exact name.
pub fn resolve_folder(library: &Library, key: &str) -> Result<Folder> {
    if let Some(folder) = library.catalog().get_folder(key)? {
        return Ok(folder);
    }
    let mut matches: Vec<Folder> = library
        .folders()?
        .into_iter()
        .filter(|f| f.name == key)
        .collect();
    match matches.len() {
        0 => bail!("no folder with id or name `{key}`"),
        1 => Ok(matches.remove(0)),
        n => bail!("{n} folders are named `{key}`; use the folder id instead"),
    }
}

pub fn format_timestamp(millis: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(millis) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}
