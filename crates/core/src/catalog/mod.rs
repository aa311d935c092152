pub mod schema;

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};

use crate::domain::*;
use crate::error::{Error, Result};

const IMAGE_COLUMNS: &str =
    "id, folder_id, name, payload, embedding, faces, created_at, width, height";

/// SQLite-backed store for folders and image records.
///
/// Each handle owns one connection. Several handles may be opened on the same file
/// (one per thread); WAL mode lets readers proceed while a writer commits.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open or create a catalog at the given path with WAL mode.
    /// Pending schema migrations are applied before the handle is returned.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        debug!(path = %path.display(), "opened catalog");
        Ok(Self { conn })
    }

    /// Open an in-memory catalog (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    // ── Folders ──────────────────────────────────────────────────────

    /// Create a folder with a fresh id and the current time.
    pub fn create_folder(&self, name: &str) -> Result<Folder> {
        let folder = Folder {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        self.insert_folder(&folder)?;
        Ok(folder)
    }

    /// Persist a fully-formed folder (upsert keyed by id).
    pub fn insert_folder(&self, folder: &Folder) -> Result<()> {
        self.conn.execute(
            "INSERT INTO folders (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, created_at = excluded.created_at",
            params![folder.id, folder.name, folder.created_at],
        )?;
        Ok(())
    }

    /// All folders, in no particular order.
    pub fn list_folders(&self) -> Result<Vec<Folder>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM folders")?;
        let folders = stmt
            .query_map([], folder_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(folders)
    }

    pub fn get_folder(&self, id: &str) -> Result<Option<Folder>> {
        let folder = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM folders WHERE id = ?1",
                params![id],
                folder_from_row,
            )
            .optional()?;
        Ok(folder)
    }

    /// Every folder with its image count, read in a single statement so each
    /// summary is consistent with concurrent cascading deletes.
    pub fn folder_summaries(&self) -> Result<Vec<FolderSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT f.id, f.name, f.created_at,
                    (SELECT COUNT(*) FROM images i WHERE i.folder_id = f.id)
             FROM folders f",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(FolderSummary {
                    folder: folder_from_row(row)?,
                    image_count: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    /// Delete a folder and every image it contains as one transaction.
    /// Returns the number of images removed. Unknown ids are a no-op.
    pub fn delete_folder(&mut self, id: &str) -> Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let images = tx.execute("DELETE FROM images WHERE folder_id = ?1", params![id])?;
        let folders = tx.execute("DELETE FROM folders WHERE id = ?1", params![id])?;
        tx.commit()?;

        if folders > 0 || images > 0 {
            info!(folder = id, images, "deleted folder");
        }
        Ok(images)
    }

    // ── Images ───────────────────────────────────────────────────────

    /// Persist a fully-formed image record (upsert keyed by id).
    pub fn save_image(&self, image: &ImageRecord) -> Result<()> {
        let faces = if image.faces.is_empty() {
            None
        } else {
            Some(encode_faces(&image.faces))
        };
        self.conn.execute(
            "INSERT INTO images (id, folder_id, name, payload, embedding, faces, created_at, width, height)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                folder_id = excluded.folder_id, name = excluded.name, payload = excluded.payload,
                embedding = excluded.embedding, faces = excluded.faces,
                created_at = excluded.created_at, width = excluded.width, height = excluded.height",
            params![
                image.id,
                image.folder_id,
                image.name,
                image.payload,
                encode_vector(&image.embedding),
                faces,
                image.created_at,
                image.width,
                image.height,
            ],
        )?;
        Ok(())
    }

    /// Persist an image only if its folder exists at the moment of the write.
    ///
    /// The existence check and the insert are one statement, so a concurrent
    /// `delete_folder` either removes this image too or makes the insert fail
    /// with [`Error::FolderNotFound`].
    pub fn insert_image_into_folder(&self, image: &ImageRecord) -> Result<()> {
        let faces = if image.faces.is_empty() {
            None
        } else {
            Some(encode_faces(&image.faces))
        };
        let written = self.conn.execute(
            "INSERT INTO images (id, folder_id, name, payload, embedding, faces, created_at, width, height)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
             WHERE EXISTS (SELECT 1 FROM folders WHERE id = ?2)
             ON CONFLICT(id) DO UPDATE SET
                folder_id = excluded.folder_id, name = excluded.name, payload = excluded.payload,
                embedding = excluded.embedding, faces = excluded.faces,
                created_at = excluded.created_at, width = excluded.width, height = excluded.height",
            params![
                image.id,
                image.folder_id,
                image.name,
                image.payload,
                encode_vector(&image.embedding),
                faces,
                image.created_at,
                image.width,
                image.height,
            ],
        )?;
        if written == 0 {
            return Err(Error::FolderNotFound(image.folder_id.clone()));
        }
        Ok(())
    }

    pub fn get_image(&self, id: &str) -> Result<Option<ImageRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?1"),
                params![id],
                RawImage::from_row,
            )
            .optional()?;
        raw.map(RawImage::into_record).transpose()
    }

    /// Remove one image. Returns false if no such image existed.
    pub fn delete_image(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM images WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    pub fn count_in_folder(&self, folder_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM images WHERE folder_id = ?1",
            params![folder_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Up to `limit` images of a folder, newest first, skipping the first `offset`.
    ///
    /// Walks `idx_images_folder_created` backwards from the end of the folder's
    /// range; equal timestamps are ordered by descending id. Each call re-seeks, so
    /// writes between calls can shift later pages.
    pub fn get_page(&self, folder_id: &str, limit: usize, offset: usize) -> Result<Vec<ImageRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images INDEXED BY idx_images_folder_created
             WHERE folder_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
            .query_map(params![folder_id, limit, offset], RawImage::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(folder = folder_id, limit, offset, returned = rows.len(), "read page");
        rows.into_iter().map(RawImage::into_record).collect()
    }

    /// Every image in a folder, in no particular order.
    pub fn get_all_in_folder(&self, folder_id: &str) -> Result<Vec<ImageRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE folder_id = ?1"
        ))?;
        let rows = stmt
            .query_map(params![folder_id], RawImage::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawImage::into_record).collect()
    }

    // ── Config ───────────────────────────────────────────────────

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

/// An `images` row with its vectors still encoded.
struct RawImage {
    id: String,
    folder_id: String,
    name: String,
    payload: String,
    embedding: Vec<u8>,
    faces: Option<Vec<u8>>,
    created_at: i64,
    width: u32,
    height: u32,
}

impl RawImage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            folder_id: row.get(1)?,
            name: row.get(2)?,
            payload: row.get(3)?,
            embedding: row.get(4)?,
            faces: row.get(5)?,
            created_at: row.get(6)?,
            width: row.get(7)?,
            height: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<ImageRecord> {
        let embedding = decode_vector(&self.embedding).ok_or_else(|| Error::CorruptRecord {
            id: self.id.clone(),
            reason: format!("embedding blob of {} bytes", self.embedding.len()),
        })?;
        let faces = match self.faces {
            None => Vec::new(),
            Some(ref blob) => decode_faces(blob).ok_or_else(|| Error::CorruptRecord {
                id: self.id.clone(),
                reason: format!("faces blob of {} bytes", blob.len()),
            })?,
        };
        Ok(ImageRecord {
            id: self.id,
            folder_id: self.folder_id,
            name: self.name,
            payload: self.payload,
            embedding,
            faces,
            created_at: self.created_at,
            width: self.width,
            height: self.height,
        })
    }
}

/// Little-endian `f32`s, back to back.
fn encode_vector(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Each face: `u32` dimension (little-endian) followed by that many `f32`s.
fn encode_faces(faces: &[Vec<f32>]) -> Vec<u8> {
    let mut out = Vec::new();
    for face in faces {
        out.extend_from_slice(&(face.len() as u32).to_le_bytes());
        out.extend_from_slice(&encode_vector(face));
    }
    out
}

fn decode_faces(mut bytes: &[u8]) -> Option<Vec<Vec<f32>>> {
    let mut faces = Vec::new();
    while !bytes.is_empty() {
        let header: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        let end = (u32::from_le_bytes(header) as usize).checked_mul(4)?.checked_add(4)?;
        faces.push(decode_vector(bytes.get(4..end)?)?);
        bytes = &bytes[end..];
    }
    Some(faces)
}
