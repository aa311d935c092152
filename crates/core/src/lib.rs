pub mod catalog;
pub mod domain;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod payload;
pub mod search;
pub mod similarity;

use std::path::Path;

use catalog::Catalog;
use domain::*;
use error::{Error, Result};
use extract::{Extractors, FaceFeatureExtractor, FeatureExtractor, ImageInput};
use ingest::{CancelFlag, ImportProgress, ImportSummary};

pub use search::DEFAULT_SEARCH_THRESHOLD;

/// Images per page when no `page_size` setting is stored.
pub const DEFAULT_PAGE_SIZE: usize = 20;

const SEARCH_THRESHOLD_KEY: &str = "search_threshold";
const PAGE_SIZE_KEY: &str = "page_size";

/// The main entry point for the pixfolio library.
pub struct Library {
    catalog: Catalog,
}

impl Library {
    /// Open or create a library at the given catalog path.
    pub fn open(catalog_path: &Path) -> Result<Self> {
        let catalog = Catalog::open(catalog_path)?;
        Ok(Self { catalog })
    }

    /// Open an in-memory library (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            catalog: Catalog::open_in_memory()?,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // ── Folders ──────────────────────────────────────────────────────

    /// Create a folder. The name is trimmed and must not be empty.
    pub fn create_folder(&self, name: &str) -> Result<Folder> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::EmptyFolderName);
        }
        self.catalog.create_folder(name)
    }

    /// All folders, newest first.
    pub fn folders(&self) -> Result<Vec<Folder>> {
        let mut folders = self.catalog.list_folders()?;
        folders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(folders)
    }

    /// All folders with image counts, newest first.
    pub fn folder_summaries(&self) -> Result<Vec<FolderSummary>> {
        let mut summaries = self.catalog.folder_summaries()?;
        summaries.sort_by(|a, b| {
            b.folder
                .created_at
                .cmp(&a.folder.created_at)
                .then_with(|| a.folder.id.cmp(&b.folder.id))
        });
        Ok(summaries)
    }

    pub fn folder(&self, id: &str) -> Result<Folder> {
        self.catalog
            .get_folder(id)?
            .ok_or_else(|| Error::FolderNotFound(id.to_string()))
    }

    /// Delete a folder and all its images. Returns the number of images removed.
    pub fn delete_folder(&mut self, id: &str) -> Result<usize> {
        self.catalog.delete_folder(id)
    }

    // ── Images ───────────────────────────────────────────────────────

    pub fn image(&self, id: &str) -> Result<ImageRecord> {
        self.catalog
            .get_image(id)?
            .ok_or_else(|| Error::ImageNotFound(id.to_string()))
    }

    /// Delete one image. Returns false if it did not exist.
    pub fn delete_image(&self, id: &str) -> Result<bool> {
        self.catalog.delete_image(id)
    }

    pub fn count_in_folder(&self, folder_id: &str) -> Result<usize> {
        self.catalog.count_in_folder(folder_id)
    }

    /// Raw `limit`/`offset` access to a folder, newest first.
    pub fn images_page(&self, folder_id: &str, limit: usize, offset: usize) -> Result<Vec<ImageRecord>> {
        self.catalog.get_page(folder_id, limit, offset)
    }

    /// Every image of a folder, unordered.
    pub fn all_in_folder(&self, folder_id: &str) -> Result<Vec<ImageRecord>> {
        self.catalog.get_all_in_folder(folder_id)
    }

    /// Zero-based page `page` of a folder using the configured page size.
    /// Pages past the end are empty, not an error.
    pub fn page(&self, folder_id: &str, page: usize) -> Result<FolderPage> {
        let page_size = self.page_size()?;
        let total_images = self.catalog.count_in_folder(folder_id)?;
        let images = self
            .catalog
            .get_page(folder_id, page_size, page.saturating_mul(page_size))?;
        Ok(FolderPage {
            folder_id: folder_id.to_string(),
            page,
            page_size,
            total_images,
            total_pages: page_count(total_images, page_size),
            images,
        })
    }

    /// Embed and store uploads into a folder, one image at a time.
    /// See [`ingest::import_batch`] for failure handling.
    pub fn import<I>(
        &self,
        folder_id: &str,
        inputs: I,
        extractors: Extractors<'_>,
        cancel: &CancelFlag,
        progress_cb: Option<&mut dyn FnMut(ImportProgress)>,
    ) -> Result<ImportSummary>
    where
        I: IntoIterator<Item = ImageInput>,
    {
        ingest::import_batch(&self.catalog, folder_id, inputs, extractors, cancel, progress_cb)
    }

    // ── Search ───────────────────────────────────────────────────────

    /// Rank a folder's images against a query embedding.
    /// `threshold` defaults to the configured search threshold.
    pub fn search(&self, folder_id: &str, query: &[f32], threshold: Option<f32>) -> Result<Vec<SearchResult>> {
        let threshold = self.resolve_threshold(threshold)?;
        search::visual_search(&self.catalog, folder_id, query, threshold)
    }

    /// Embed a reference image, then search the folder with it.
    /// A generator failure here is returned to the caller.
    pub fn search_image(
        &self,
        folder_id: &str,
        image: &ImageInput,
        extractor: &dyn FeatureExtractor,
        threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        let query = extractor.extract_features(image)?;
        self.search(folder_id, &query, threshold)
    }

    /// Find images in the same folder that look like an already-stored image.
    /// The image itself is left out of the results.
    pub fn search_like(&self, image_id: &str, threshold: Option<f32>) -> Result<Vec<SearchResult>> {
        let reference = self.image(image_id)?;
        let mut results = self.search(&reference.folder_id, &reference.embedding, threshold)?;
        results.retain(|r| r.record.id != reference.id);
        Ok(results)
    }

    /// Rank a folder's images by face similarity to the faces found in `image`.
    pub fn search_faces(
        &self,
        folder_id: &str,
        image: &ImageInput,
        extractor: &dyn FaceFeatureExtractor,
        threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        let threshold = self.resolve_threshold(threshold)?;
        let faces = extractor.extract_face_features(image)?;
        search::face_search(&self.catalog, folder_id, &faces, threshold)
    }

    fn resolve_threshold(&self, threshold: Option<f32>) -> Result<f32> {
        match threshold {
            Some(t) => validate_threshold(t),
            None => self.search_threshold(),
        }
    }

    // ── Settings ─────────────────────────────────────────────────────

    pub fn search_threshold(&self) -> Result<f32> {
        match self.catalog.get_config(SEARCH_THRESHOLD_KEY)? {
            None => Ok(DEFAULT_SEARCH_THRESHOLD),
            Some(raw) => raw
                .parse::<f32>()
                .map_err(|_| invalid_setting(SEARCH_THRESHOLD_KEY, &raw))
                .and_then(validate_threshold),
        }
    }

    pub fn set_search_threshold(&self, threshold: f32) -> Result<()> {
        let threshold = validate_threshold(threshold)?;
        self.catalog
            .set_config(SEARCH_THRESHOLD_KEY, &threshold.to_string())
    }

    pub fn page_size(&self) -> Result<usize> {
        match self.catalog.get_config(PAGE_SIZE_KEY)? {
            None => Ok(DEFAULT_PAGE_SIZE),
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(invalid_setting(PAGE_SIZE_KEY, &raw)),
            },
        }
    }

    pub fn set_page_size(&self, page_size: usize) -> Result<()> {
        if page_size == 0 {
            return Err(invalid_setting(PAGE_SIZE_KEY, "0"));
        }
        self.catalog.set_config(PAGE_SIZE_KEY, &page_size.to_string())
    }
}

/// Thresholds live in [0, 1]; a score of 0 or below is never a match.
fn validate_threshold(threshold: f32) -> Result<f32> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(invalid_setting(SEARCH_THRESHOLD_KEY, &threshold.to_string()))
    }
}

fn invalid_setting(key: &str, value: &str) -> Error {
    Error::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    }
}
