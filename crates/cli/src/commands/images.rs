use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use pixfolio_core::domain::FolderPage;
use pixfolio_core::Library;

use super::{format_timestamp, resolve_folder};

pub fn ls(library: &Library, key: &str, page: usize) -> Result<()> {
    let folder = resolve_folder(library, key)?;
    let listing = library.page(&folder.id, page)?;

    println!();
    println!("  {}", folder.name);
    println!("  {}", "-".repeat(folder.name.chars().count()));
    if listing.images.is_empty() {
        println!("  (no images on this page)");
    } else {
        println!("{}", page_table(&listing));
    }
    println!("  {}", page_footer(&listing));
    println!();
    Ok(())
}

fn page_table(listing: &FolderPage) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name"),
        Cell::new("Size"),
        Cell::new("Added"),
        Cell::new("Id"),
    ]);
    for image in &listing.images {
        table.add_row(vec![
            Cell::new(&image.name),
            Cell::new(format!("{}x{}", image.width, image.height)),
            Cell::new(format_timestamp(image.created_at)),
            Cell::new(&image.id),
        ]);
    }
    table
}

fn page_footer(listing: &FolderPage) -> String {
    let mut footer = format!(
        "page {}/{} ({} images)",
        listing.page + 1,
        listing.total_pages.max(1),
        listing.total_images
    );
    if listing.has_previous() {
        footer.push_str(&format!("  prev: --page {}", listing.page - 1));
    }
    if listing.has_next() {
        footer.push_str(&format!("  next: --page {}", listing.page + 1));
    }
    footer
}

pub fn rm(library: &Library, id: &str) -> Result<()> {
    if library.delete_image(id)? {
        println!("Removed image {id}");
    } else {
        println!("No image with id {id}");
    }
    Ok(())
}

pub fn export(library: &Library, id: &str, out: &Path) -> Result<()> {
    let image = library.image(id)?;
    let (mime, bytes) = image
        .payload_bytes()
        .with_context(|| format!("image {id} has an unreadable payload"))?;
    std::fs::write(out, &bytes).with_context(|| format!("writing {}", out.display()))?;
    println!("Wrote {} ({}, {} bytes) to {}", image.name, mime, bytes.len(), out.display());
    Ok(())
}
