use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::domain::ImageRecord;
use crate::error::{Error, Result};
use crate::extract::{Extractors, ImageInput};
use crate::payload::encode_data_uri;

/// Progress events for a batch import.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportProgress {
    /// Starting the batch. `total` is known when the input iterator reports an exact size.
    Start { total: Option<usize> },
    /// An image was embedded and stored.
    Imported { id: String, name: String },
    /// An image was skipped because its embedding could not be produced.
    Failed { name: String, reason: String },
    /// The batch stopped early at the caller's request.
    Cancelled { processed: usize },
    /// The batch finished (or was cancelled).
    Complete { imported: usize, failed: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportFailure {
    pub name: String,
    pub reason: String,
}

/// Outcome of a batch import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    /// Ids of stored images, in upload order.
    pub imported: Vec<String>,
    pub failed: Vec<ImportFailure>,
    pub cancelled: bool,
}

/// Cooperative stop request for a running batch; checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Embed and store a batch of uploads into an existing folder, one at a time.
///
/// Generator failures skip the item and the batch continues. Storage faults
/// abort the batch; images stored before the fault remain stored. If the folder
/// is deleted mid-batch the batch stops with [`Error::FolderNotFound`].
pub fn import_batch<I>(
    catalog: &Catalog,
    folder_id: &str,
    inputs: I,
    extractors: Extractors<'_>,
    cancel: &CancelFlag,
    mut progress_cb: Option<&mut dyn FnMut(ImportProgress)>,
) -> Result<ImportSummary>
where
    I: IntoIterator<Item = ImageInput>,
{
    if catalog.get_folder(folder_id)?.is_none() {
        return Err(Error::FolderNotFound(folder_id.to_string()));
    }

    let inputs = inputs.into_iter();
    let total = match inputs.size_hint() {
        (lower, Some(upper)) if lower == upper => Some(upper),
        _ => None,
    };
    if let Some(ref mut cb) = progress_cb {
        cb(ImportProgress::Start { total });
    }

    let mut summary = ImportSummary::default();
    let mut clock = BatchClock::default();

    for input in inputs {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            if let Some(ref mut cb) = progress_cb {
                cb(ImportProgress::Cancelled {
                    processed: summary.imported.len() + summary.failed.len(),
                });
            }
            break;
        }

        let record = match build_record(folder_id, &input, extractors, clock.next()) {
            Ok(record) => record,
            Err(err) => {
                warn!(name = %input.name, error = %err, "skipping image");
                let failure = ImportFailure {
                    name: input.name,
                    reason: err.to_string(),
                };
                if let Some(ref mut cb) = progress_cb {
                    cb(ImportProgress::Failed {
                        name: failure.name.clone(),
                        reason: failure.reason.clone(),
                    });
                }
                summary.failed.push(failure);
                continue;
            }
        };

        catalog.insert_image_into_folder(&record)?;

        if let Some(ref mut cb) = progress_cb {
            cb(ImportProgress::Imported {
                id: record.id.clone(),
                name: record.name.clone(),
            });
        }
        summary.imported.push(record.id);
    }

    if let Some(ref mut cb) = progress_cb {
        cb(ImportProgress::Complete {
            imported: summary.imported.len(),
            failed: summary.failed.len(),
        });
    }
    info!(
        folder = folder_id,
        imported = summary.imported.len(),
        failed = summary.failed.len(),
        cancelled = summary.cancelled,
        "import finished"
    );
    Ok(summary)
}

fn build_record(
    folder_id: &str,
    input: &ImageInput,
    extractors: Extractors<'_>,
    created_at: i64,
) -> Result<ImageRecord> {
    let embedding = extractors.features.extract_features(input)?;
    let faces = match extractors.faces {
        Some(faces) => faces.extract_face_features(input)?,
        None => Vec::new(),
    };

    Ok(ImageRecord {
        id: uuid::Uuid::new_v4().to_string(),
        folder_id: folder_id.to_string(),
        name: input.name.clone(),
        payload: encode_data_uri(&input.mime, &input.bytes),
        embedding,
        faces,
        created_at,
        width: input.width,
        height: input.height,
    })
}

/// Wall-clock milliseconds, bumped so that no two items of a batch share a timestamp.
#[derive(Default)]
struct BatchClock {
    last: Option<i64>,
}

impl BatchClock {
    fn next(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let ts = match self.last {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last = Some(ts);
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FaceFeatureExtractor, FeatureExtractor};

    /// Embeds an image as its first byte; fails on inputs named `*.bad`.
    struct FirstByte;

    impl FeatureExtractor for FirstByte {
        fn extract_features(&self, image: &ImageInput) -> Result<Vec<f32>> {
            if image.name.ends_with(".bad") {
                return Err(Error::Inference {
                    name: image.name.clone(),
                    message: "cannot decode".to_string(),
                });
            }
            Ok(vec![image.bytes.first().copied().unwrap_or(0) as f32, 1.0])
        }
    }

    struct OneFacePerByte;

    impl FaceFeatureExtractor for OneFacePerByte {
        fn extract_face_features(&self, image: &ImageInput) -> Result<Vec<Vec<f32>>> {
            Ok(image.bytes.iter().map(|&b| vec![b as f32]).collect())
        }
    }

    fn input(name: &str, bytes: &[u8]) -> ImageInput {
        ImageInput {
            name: name.to_string(),
            mime: "image/png".to_string(),
            bytes: bytes.to_vec(),
            width: 10,
            height: 20,
        }
    }

    #[test]
    fn test_import_stores_records() {
        let catalog = Catalog::open_in_memory().unwrap();
        let folder = catalog.create_folder("Trip").unwrap();
        let summary = import_batch(
            &catalog,
            &folder.id,
            vec![input("a.png", &[3]), input("b.png", &[5])],
            Extractors::new(&FirstByte),
            &CancelFlag::new(),
            None,
        )
        .unwrap();

        assert_eq!(summary.imported.len(), 2);
        assert!(summary.failed.is_empty());
        assert!(!summary.cancelled);

        let a = catalog.get_image(&summary.imported[0]).unwrap().unwrap();
        assert_eq!(a.name, "a.png");
        assert_eq!(a.folder_id, folder.id);
        assert_eq!(a.embedding, vec![3.0, 1.0]);
        assert!(a.faces.is_empty());
        assert_eq!((a.width, a.height), (10, 20));
        assert_eq!(a.payload_bytes(), Some(("image/png".to_string(), vec![3])));

        let b = catalog.get_image(&summary.imported[1]).unwrap().unwrap();
        assert!(b.created_at > a.created_at);
    }

    #[test]
    fn test_import_with_faces() {
        let catalog = Catalog::open_in_memory().unwrap();
        let folder = catalog.create_folder("People").unwrap();
        let summary = import_batch(
            &catalog,
            &folder.id,
            vec![input("group.png", &[1, 2]), input("empty.png", &[])],
            Extractors::new(&FirstByte).with_faces(&OneFacePerByte),
            &CancelFlag::new(),
            None,
        )
        .unwrap();

        let group = catalog.get_image(&summary.imported[0]).unwrap().unwrap();
        assert_eq!(group.faces, vec![vec![1.0], vec![2.0]]);
        let empty = catalog.get_image(&summary.imported[1]).unwrap().unwrap();
        assert!(empty.faces.is_empty());
    }

    #[test]
    fn test_import_failure_does_not_abort_batch() {
        let catalog = Catalog::open_in_memory().unwrap();
        let folder = catalog.create_folder("Trip").unwrap();
        let mut events = Vec::new();
        let summary = import_batch(
            &catalog,
            &folder.id,
            vec![input("a.png", &[1]), input("broken.bad", &[2]), input("c.png", &[3])],
            Extractors::new(&FirstByte),
            &CancelFlag::new(),
            Some(&mut |e| events.push(e)),
        )
        .unwrap();

        assert_eq!(summary.imported.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].name, "broken.bad");
        assert!(summary.failed[0].reason.contains("cannot decode"));
        assert_eq!(catalog.count_in_folder(&folder.id).unwrap(), 2);

        assert_eq!(events.first(), Some(&ImportProgress::Start { total: Some(3) }));
        assert!(matches!(events[2], ImportProgress::Failed { ref name, .. } if name == "broken.bad"));
        assert_eq!(
            events.last(),
            Some(&ImportProgress::Complete { imported: 2, failed: 1 })
        );
    }

    #[test]
    fn test_import_into_missing_folder() {
        let catalog = Catalog::open_in_memory().unwrap();
        let err = import_batch(
            &catalog,
            "missing",
            vec![input("a.png", &[1])],
            Extractors::new(&FirstByte),
            &CancelFlag::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::FolderNotFound(ref id) if id == "missing"));
    }

    #[test]
    fn test_cancel_between_items() {
        let catalog = Catalog::open_in_memory().unwrap();
        let folder = catalog.create_folder("Trip").unwrap();
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let mut events = Vec::new();

        let summary = import_batch(
            &catalog,
            &folder.id,
            vec![input("a.png", &[1]), input("b.png", &[2]), input("c.png", &[3])],
            Extractors::new(&FirstByte),
            &cancel,
            Some(&mut |e| {
                if matches!(e, ImportProgress::Imported { .. }) {
                    trigger.cancel();
                }
                events.push(e);
            }),
        )
        .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.imported.len(), 1);
        assert_eq!(catalog.count_in_folder(&folder.id).unwrap(), 1);
        assert!(events.contains(&ImportProgress::Cancelled { processed: 1 }));
    }

    #[test]
    fn test_start_total_unknown_for_lazy_inputs() {
        let catalog = Catalog::open_in_memory().unwrap();
        let folder = catalog.create_folder("Trip").unwrap();
        let mut events = Vec::new();
        import_batch(
            &catalog,
            &folder.id,
            (0u8..4).map(|i| input(&format!("{i}.png"), &[i])).filter(|i| i.bytes[0] % 2 == 0),
            Extractors::new(&FirstByte),
            &CancelFlag::new(),
            Some(&mut |e| events.push(e)),
        )
        .unwrap();
        assert_eq!(events[0], ImportProgress::Start { total: None });
        assert_eq!(catalog.count_in_folder(&folder.id).unwrap(), 2);
    }

    #[test]
    fn test_batch_clock_strictly_increases() {
        let mut clock = BatchClock::default();
        let stamps: Vec<i64> = (0..1000).map(|_| clock.next()).collect();
        assert!(stamps.windows(2).all(|w| w[1] > w[0]));
    }
}
