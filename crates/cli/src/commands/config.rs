use anyhow::{bail, Context, Result};
use pixfolio_core::Library;

pub fn show(library: &Library) -> Result<()> {
    println!("search_threshold = {}", library.search_threshold()?);
    println!("page_size        = {}", library.page_size()?);
    Ok(())
}

pub fn set(library: &Library, key: &str, value: &str) -> Result<()> {
    match key {
        "search_threshold" => {
            let threshold: f32 = value
                .parse()
                .with_context(|| format!("`{value}` is not a number"))?;
            library.set_search_threshold(threshold)?;
        }
        "page_size" => {
            let size: usize = value
                .parse()
                .with_context(|| format!("`{value}` is not a positive integer"))?;
            library.set_page_size(size)?;
        }
        other => bail!("unknown setting `{other}` (expected search_threshold or page_size)"),
    }
    println!("{key} = {value}");
    Ok(())
}
