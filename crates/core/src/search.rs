use rayon::prelude::*;
use tracing::debug;

use crate::catalog::Catalog;
use crate::domain::{ImageRecord, SearchResult};
use crate::error::Result;
use crate::similarity::{best_match, cosine_similarity};

/// Scores at or below this are not considered a match.
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.5;

/// Score every candidate, keep those strictly above `threshold`, best first.
/// Scores of 0 or below never match, whatever the threshold.
///
/// Scoring runs in parallel but results keep candidate order before the stable
/// sort, so equal scores come back in the order the candidates were given.
pub fn rank<F>(candidates: Vec<ImageRecord>, threshold: f32, scorer: F) -> Vec<SearchResult>
where
    F: Fn(&ImageRecord) -> f32 + Sync,
{
    let scores: Vec<f32> = candidates.par_iter().map(&scorer).collect();

    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .zip(scores)
        .filter(|(_, score)| *score > threshold && *score > 0.0)
        .map(|(record, score)| SearchResult { record, score })
        .collect();
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results
}

/// Rank a folder's images by cosine similarity of their embedding to `query`.
///
/// Images whose embedding has a different dimensionality score 0 and fall below
/// any non-negative threshold.
pub fn visual_search(
    catalog: &Catalog,
    folder_id: &str,
    query: &[f32],
    threshold: f32,
) -> Result<Vec<SearchResult>> {
    let candidates = catalog.get_all_in_folder(folder_id)?;
    let total = candidates.len();
    let results = rank(candidates, threshold, |image| {
        cosine_similarity(&image.embedding, query)
    });
    debug!(folder = folder_id, candidates = total, matches = results.len(), threshold, "visual search");
    Ok(results)
}

/// Rank a folder's images by their best face match against any of `query_faces`.
/// Images without faces, and queries without faces, never match.
pub fn face_search(
    catalog: &Catalog,
    folder_id: &str,
    query_faces: &[Vec<f32>],
    threshold: f32,
) -> Result<Vec<SearchResult>> {
    if query_faces.is_empty() {
        return Ok(Vec::new());
    }
    let candidates = catalog.get_all_in_folder(folder_id)?;
    let total = candidates.len();
    let results = rank(candidates, threshold, |image| {
        best_match(query_faces, &image.faces)
    });
    debug!(folder = folder_id, candidates = total, matches = results.len(), threshold, "face search");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(folder_id: &str, id: &str, embedding: Vec<f32>) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            folder_id: folder_id.to_string(),
            name: format!("{id}.png"),
            payload: String::new(),
            embedding,
            faces: Vec::new(),
            created_at: 0,
            width: 1,
            height: 1,
        }
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.record.id.as_str()).collect()
    }

    /// Against query [1, 0, 0, 0] these score exactly 0.9, 0.6, 0.4 and 0.5.
    fn known_candidates(folder_id: &str) -> Vec<ImageRecord> {
        vec![
            image(folder_id, "s09", vec![9.0, 3.0, 3.0, 1.0]),
            image(folder_id, "s06", vec![3.0, 4.0, 0.0, 0.0]),
            image(folder_id, "s04", vec![2.0, 4.0, 2.0, 1.0]),
            image(folder_id, "s05", vec![1.0, 1.0, 1.0, 1.0]),
        ]
    }

    const QUERY: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

    #[test]
    fn test_rank_threshold_is_strict() {
        let results = rank(known_candidates("f"), 0.5, |c| cosine_similarity(&c.embedding, &QUERY));
        assert_eq!(ids(&results), vec!["s09", "s06"]);
        assert!((results[0].score - 0.9).abs() < 1e-6);
        assert!((results[1].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_rank_lower_threshold_keeps_more() {
        let results = rank(known_candidates("f"), 0.0, |c| cosine_similarity(&c.embedding, &QUERY));
        assert_eq!(ids(&results), vec!["s09", "s06", "s05", "s04"]);
    }

    #[test]
    fn test_rank_ties_keep_input_order() {
        let candidates = vec![
            image("f", "first", vec![1.0, 0.0]),
            image("f", "lower", vec![1.0, 1.0]),
            image("f", "second", vec![2.0, 0.0]),
            image("f", "third", vec![0.5, 0.0]),
        ];
        let results = rank(candidates, 0.5, |c| cosine_similarity(&c.embedding, &[1.0, 0.0]));
        assert_eq!(ids(&results), vec!["first", "second", "third", "lower"]);
    }

    #[test]
    fn test_rank_negative_threshold_still_drops_zero_scores() {
        let candidates = vec![
            image("f", "wrong-dims", vec![1.0, 0.0, 0.0]),
            image("f", "zero", vec![0.0, 0.0]),
            image("f", "opposite", vec![-1.0, 0.0]),
            image("f", "hit", vec![1.0, 0.0]),
        ];
        let results = rank(candidates, -1.0, |c| cosine_similarity(&c.embedding, &[1.0, 0.0]));
        assert_eq!(ids(&results), vec!["hit"]);
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank(Vec::new(), 0.5, |_| 1.0).is_empty());
    }

    #[test]
    fn test_visual_search_over_catalog() {
        let catalog = Catalog::open_in_memory().unwrap();
        let folder = catalog.create_folder("Trip").unwrap();
        for img in known_candidates(&folder.id) {
            catalog.save_image(&img).unwrap();
        }

        let results = visual_search(&catalog, &folder.id, &QUERY, DEFAULT_SEARCH_THRESHOLD).unwrap();
        assert_eq!(ids(&results), vec!["s09", "s06"]);
        assert_eq!(results[0].record.name, "s09.png");
    }

    #[test]
    fn test_visual_search_empty_folder() {
        let catalog = Catalog::open_in_memory().unwrap();
        let folder = catalog.create_folder("Empty").unwrap();
        assert!(visual_search(&catalog, &folder.id, &QUERY, 0.5).unwrap().is_empty());
        assert!(visual_search(&catalog, "missing", &QUERY, 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_visual_search_skips_mismatched_dimensions() {
        let catalog = Catalog::open_in_memory().unwrap();
        let folder = catalog.create_folder("Mixed").unwrap();
        catalog.save_image(&image(&folder.id, "old-model", vec![1.0, 0.0])).unwrap();
        catalog.save_image(&image(&folder.id, "empty", Vec::new())).unwrap();
        catalog.save_image(&image(&folder.id, "match", vec![2.0, 0.0, 0.0, 0.0])).unwrap();

        let results = visual_search(&catalog, &folder.id, &QUERY, 0.5).unwrap();
        assert_eq!(ids(&results), vec!["match"]);
        assert_eq!(results[0].score, 1.0);
    }

    #[test]
    fn test_visual_search_is_reproducible() {
        let catalog = Catalog::open_in_memory().unwrap();
        let folder = catalog.create_folder("Same").unwrap();
        for i in 0..20 {
            catalog
                .save_image(&image(&folder.id, &format!("img{i:02}"), vec![1.0, (i % 3) as f32]))
                .unwrap();
        }
        let first = visual_search(&catalog, &folder.id, &[1.0, 0.0], 0.1).unwrap();
        for _ in 0..5 {
            assert_eq!(visual_search(&catalog, &folder.id, &[1.0, 0.0], 0.1).unwrap(), first);
        }
    }

    #[test]
    fn test_face_search() {
        let catalog = Catalog::open_in_memory().unwrap();
        let folder = catalog.create_folder("People").unwrap();

        let mut alice = image(&folder.id, "alice", vec![1.0]);
        alice.faces = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let mut landscape = image(&folder.id, "landscape", vec![1.0]);
        landscape.faces = Vec::new();
        let mut bob = image(&folder.id, "bob", vec![1.0]);
        bob.faces = vec![vec![3.0, 4.0]];
        for img in [&alice, &landscape, &bob] {
            catalog.save_image(img).unwrap();
        }

        let results = face_search(&catalog, &folder.id, &[vec![1.0, 0.0]], 0.5).unwrap();
        assert_eq!(ids(&results), vec!["alice", "bob"]);
        assert_eq!(results[0].score, 1.0);

        assert!(face_search(&catalog, &folder.id, &[], 0.0).unwrap().is_empty());
    }
}
