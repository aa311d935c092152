#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog schema version {db} is newer than supported version {code}")]
    SchemaTooNew { db: u32, code: u32 },

    #[error("corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("folder name must not be empty")]
    EmptyFolderName,

    #[error("invalid value for setting `{key}`: {value}")]
    InvalidSetting { key: String, value: String },

    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("failed to extract features from {name}: {message}")]
    Inference { name: String, message: String },
}

impl Error {
    /// True for faults of the underlying store (I/O, SQLite, schema mismatch, undecodable rows).
    pub fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Io(_) | Error::SchemaTooNew { .. } | Error::CorruptRecord { .. }
        )
    }

    /// True for failures raised by an embedding generator.
    pub fn is_generator_failure(&self) -> bool {
        matches!(self, Error::ModelUnavailable(_) | Error::Inference { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
