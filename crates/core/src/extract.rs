use once_cell::sync::OnceCell;
use tracing::info;

use crate::error::{Error, Result};

/// An uploaded image as handed over by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    /// Original filename.
    pub name: String,
    pub mime: String,
    /// Encoded file contents (JPEG, PNG, ...). Never decoded by the core.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Produces one embedding per image.
pub trait FeatureExtractor {
    fn extract_features(&self, image: &ImageInput) -> Result<Vec<f32>>;
}

/// Produces one embedding per detected face. No faces is a valid, empty result.
pub trait FaceFeatureExtractor {
    fn extract_face_features(&self, image: &ImageInput) -> Result<Vec<Vec<f32>>>;
}

/// The generators used by an import batch.
#[derive(Clone, Copy)]
pub struct Extractors<'a> {
    pub features: &'a dyn FeatureExtractor,
    pub faces: Option<&'a dyn FaceFeatureExtractor>,
}

impl<'a> Extractors<'a> {
    pub fn new(features: &'a dyn FeatureExtractor) -> Self {
        Self {
            features,
            faces: None,
        }
    }

    pub fn with_faces(mut self, faces: &'a dyn FaceFeatureExtractor) -> Self {
        self.faces = Some(faces);
        self
    }
}

type Loader<M> = Box<dyn Fn() -> Result<M> + Send + Sync>;

/// A model loaded on first use and shared by every later call.
///
/// A failed load is reported as [`Error::ModelUnavailable`] and attempted again
/// on the next call; a successful load is never repeated.
pub struct ModelHandle<M> {
    model: OnceCell<M>,
    loader: Loader<M>,
}

impl<M> ModelHandle<M> {
    pub fn new(loader: impl Fn() -> Result<M> + Send + Sync + 'static) -> Self {
        Self {
            model: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    /// Wrap an already-loaded model.
    pub fn loaded(model: M) -> Self {
        Self {
            model: OnceCell::with_value(model),
            loader: Box::new(|| Err(Error::ModelUnavailable("no loader configured".to_string()))),
        }
    }

    pub fn get(&self) -> Result<&M> {
        self.model.get_or_try_init(|| {
            info!("loading embedding model");
            (self.loader)().map_err(|e| match e {
                Error::ModelUnavailable(_) => e,
                other => Error::ModelUnavailable(other.to_string()),
            })
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }
}

impl<M: FeatureExtractor> FeatureExtractor for ModelHandle<M> {
    fn extract_features(&self, image: &ImageInput) -> Result<Vec<f32>> {
        self.get()?.extract_features(image)
    }
}

impl<M: FaceFeatureExtractor> FaceFeatureExtractor for ModelHandle<M> {
    fn extract_face_features(&self, image: &ImageInput) -> Result<Vec<Vec<f32>>> {
        self.get()?.extract_face_features(image)
    }
}
