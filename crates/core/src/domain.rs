use serde::{Deserialize, Serialize};

use crate::payload;

/// A user-named container of images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// A stored image together with its feature vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub folder_id: String,
    /// Original filename, display only.
    pub name: String,
    /// Self-contained encoded image (`data:<mime>;base64,...`).
    pub payload: String,
    pub embedding: Vec<f32>,
    /// Face-region embeddings; empty when no faces were detected or no face generator ran.
    #[serde(default)]
    pub faces: Vec<Vec<f32>>,
    /// Unix milliseconds; pagination sort key.
    pub created_at: i64,
    pub width: u32,
    pub height: u32,
}

impl ImageRecord {
    /// Decode the payload back into `(mime, bytes)`. None if it is not a base64 data URI.
    pub fn payload_bytes(&self) -> Option<(String, Vec<u8>)> {
        payload::decode_data_uri(&self.payload)
    }
}

/// An image ranked against a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub record: ImageRecord,
    pub score: f32,
}

/// A folder with the number of images it holds, read in one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderSummary {
    pub folder: Folder,
    pub image_count: usize,
}

/// One page of a folder, newest images first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderPage {
    pub folder_id: String,
    /// Zero-based page index.
    pub page: usize,
    pub page_size: usize,
    pub total_images: usize,
    pub total_pages: usize,
    pub images: Vec<ImageRecord>,
}

impl FolderPage {
    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }
}

/// Number of pages needed to show `total` items `page_size` at a time.
pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}
