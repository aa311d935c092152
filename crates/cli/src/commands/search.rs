use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};
use pixfolio_core::domain::SearchResult;
use pixfolio_core::Library;
use serde_json::json;

use super::resolve_folder;
use crate::features::{default_model, load_input};

pub enum Query {
    /// Search a folder with an image file from disk.
    Image { folder: String, path: PathBuf },
    /// Search the folder of a stored image with that image's embedding.
    Like(String),
}

pub fn run(library: &Library, query: Query, threshold: Option<f32>, as_json: bool) -> Result<()> {
    let results = match query {
        Query::Image { folder, path } => {
            let folder = resolve_folder(library, &folder)?;
            let input = load_input(&path)?;
            let model = default_model();
            library.search_image(&folder.id, &input, &model, threshold)?
        }
        Query::Like(id) => library.search_like(&id, threshold)?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&results_json(&results))?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No similar images found.");
        return Ok(());
    }
    println!("{}", results_table(&results));
    println!("  {} matches", results.len());
    Ok(())
}

/// Results without payloads; the data URIs are too large for a terminal.
fn results_json(results: &[SearchResult]) -> serde_json::Value {
    results
        .iter()
        .map(|r| {
            json!({
                "id": r.record.id,
                "folder_id": r.record.folder_id,
                "name": r.record.name,
                "width": r.record.width,
                "height": r.record.height,
                "created_at": r.record.created_at,
                "score": r.score,
            })
        })
        .collect()
}

fn results_table(results: &[SearchResult]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Score"), Cell::new("Name"), Cell::new("Id")]);
    for result in results {
        table.add_row(vec![
            Cell::new(format!("{:.3}", result.score)).set_alignment(CellAlignment::Right),
            Cell::new(&result.record.name),
            Cell::new(&result.record.id),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixfolio_core::domain::ImageRecord;

    fn result(id: &str, score: f32) -> SearchResult {
        SearchResult {
            record: ImageRecord {
                id: id.to_string(),
                folder_id: "f".to_string(),
                name: format!("{id}.jpg"),
                payload: "data:image/jpeg;base64,AAAA".to_string(),
                embedding: vec![1.0],
                faces: Vec::new(),
                created_at: 5,
                width: 2,
                height: 3,
            },
            score,
        }
    }

    #[test]
    fn test_results_json_omits_payload() {
        let value = results_json(&[result("a", 0.75), result("b", 0.5)]);
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], "a");
        assert_eq!(items[0]["score"], 0.75);
        assert!(items[0].get("payload").is_none());
        assert!(items[0].get("embedding").is_none());
    }

    #[test]
    fn test_results_table_formats_score() {
        let rendered = results_table(&[result("a", 0.8)]).to_string();
        assert!(rendered.contains("0.800"));
        assert!(rendered.contains("a.jpg"));
    }
}
