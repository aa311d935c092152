use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};
use pixfolio_core::domain::FolderSummary;
use pixfolio_core::Library;

use super::{format_timestamp, resolve_folder};

pub fn list(library: &Library) -> Result<()> {
    let summaries = library.folder_summaries()?;

    if summaries.is_empty() {
        println!("No folders yet. Create one with `pixfolio folders add <name>`.");
        return Ok(());
    }

    println!("{}", folders_table(&summaries));
    let images: usize = summaries.iter().map(|s| s.image_count).sum();
    println!("  {} folders, {} images", summaries.len(), images);
    Ok(())
}

fn folders_table(summaries: &[FolderSummary]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name"),
        Cell::new("Images"),
        Cell::new("Created"),
        Cell::new("Id"),
    ]);
    for summary in summaries {
        table.add_row(vec![
            Cell::new(&summary.folder.name),
            Cell::new(summary.image_count).set_alignment(CellAlignment::Right),
            Cell::new(format_timestamp(summary.folder.created_at)),
            Cell::new(&summary.folder.id),
        ]);
    }
    table
}

pub fn add(library: &Library, name: &str) -> Result<()> {
    let folder = library.create_folder(name)?;
    println!("Created folder: {} ({})", folder.name, folder.id);
    Ok(())
}

pub fn rm(library: &mut Library, key: &str) -> Result<()> {
    let folder = resolve_folder(library, key)?;
    let removed = library.delete_folder(&folder.id)?;
    println!("Removed folder: {} ({} images removed)", folder.name, removed);
    Ok(())
}
