// Embedding model access. The model library is opaque to this crate: it is
// reached only through `ModelFormat::{load, save}`, and its errors are
// handed back to the caller untouched.

use ahash::AHashMap;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array2, ArrayView1};
use parking_lot::RwLock;
use pipestore_core::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Load/save capability of an external embedding-model library
pub trait ModelFormat: Send + Sync {
    type Model: Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    fn load(&self, path: &Path) -> Result<Self::Model, Self::Error>;

    fn save(&self, model: &Self::Model, path: &Path) -> Result<(), Self::Error>;
}

/// Failure to load a model: either resolving its path, or the library itself.
#[derive(Debug)]
pub enum ModelLoadError<E> {
    /// Missing setting or missing model file
    Resolve(pipestore_core::Error),
    /// Error returned by the model library, unchanged
    Library(E),
}

impl<E: fmt::Display> fmt::Display for ModelLoadError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelLoadError::Resolve(e) => fmt::Display::fmt(e, f),
            ModelLoadError::Library(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ModelLoadError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelLoadError::Resolve(e) => e.source(),
            ModelLoadError::Library(e) => e.source(),
        }
    }
}

impl<E> From<pipestore_core::Error> for ModelLoadError<E> {
    fn from(e: pipestore_core::Error) -> Self {
        ModelLoadError::Resolve(e)
    }
}

/// Resolve `embed.output_data_directory / embed.w2v_embedding.f_db` and load it.
pub fn load_model<F: ModelFormat>(
    config: &PipelineConfig,
    format: &F,
) -> Result<F::Model, ModelLoadError<F::Error>> {
    let path = config.w2v_model_path()?;
    load_model_at(&path, format)
}

fn load_model_at<F: ModelFormat>(path: &Path, format: &F) -> Result<F::Model, ModelLoadError<F::Error>> {
    if !path.exists() {
        return Err(ModelLoadError::Resolve(pipestore_core::Error::PathNotFound(
            path.to_path_buf(),
        )));
    }
    debug!("Loading embedding model from {:?}", path);
    format.load(path).map_err(ModelLoadError::Library)
}

/// Loads models once per path and shares them read-only.
pub struct ModelAccessor<F: ModelFormat> {
    format: F,
    cache: RwLock<AHashMap<PathBuf, Arc<F::Model>>>,
}

impl<F: ModelFormat> ModelAccessor<F> {
    pub fn new(format: F) -> Self {
        Self {
            format,
            cache: RwLock::new(AHashMap::new()),
        }
    }

    #[inline]
    pub fn format(&self) -> &F {
        &self.format
    }

    pub fn get(&self, config: &PipelineConfig) -> Result<Arc<F::Model>, ModelLoadError<F::Error>> {
        let path = config.w2v_model_path()?;
        self.get_path(&path)
    }

    pub fn get_path(&self, path: &Path) -> Result<Arc<F::Model>, ModelLoadError<F::Error>> {
        if let Some(model) = self.cache.read().get(path) {
            return Ok(model.clone());
        }

        let model = Arc::new(load_model_at(path, &self.format)?);
        let mut cache = self.cache.write();
        // keep whichever copy landed first so every caller shares one instance
        let entry = cache.entry(path.to_path_buf()).or_insert(model);
        Ok(entry.clone())
    }

    /// Drop a cached model so the next `get` reloads it from disk.
    pub fn evict(&self, path: &Path) -> bool {
        self.cache.write().remove(path).is_some()
    }

    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}

/// Errors from the bundled word-vector file format
#[derive(Debug, thiserror::Error)]
pub enum WordVectorsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Vocabulary of {vocab} words does not match {rows} vector rows")]
    Shape { vocab: usize, rows: usize },
}

#[derive(Serialize, Deserialize)]
struct WordVectorsFile {
    vocab: Vec<String>,
    dim: usize,
    data: Vec<f32>,
}

/// A trained word embedding: one vector per vocabulary word
#[derive(Debug, Clone)]
pub struct WordVectors {
    vocab: Vec<String>,
    index: AHashMap<String, usize>,
    vectors: Array2<f32>,
}

impl WordVectors {
    pub fn new(vocab: Vec<String>, vectors: Array2<f32>) -> Result<Self, WordVectorsError> {
        if vocab.len() != vectors.nrows() {
            return Err(WordVectorsError::Shape {
                vocab: vocab.len(),
                rows: vectors.nrows(),
            });
        }
        let index = vocab
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();
        Ok(Self {
            vocab,
            index,
            vectors,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vocab.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vocab.is_empty()
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    #[inline]
    pub fn vocab(&self) -> &[String] {
        &self.vocab
    }

    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }

    pub fn get(&self, word: &str) -> Option<ArrayView1<'_, f32>> {
        self.index.get(word).map(|&i| self.vectors.row(i))
    }

    #[inline]
    pub fn vectors(&self) -> &Array2<f32> {
        &self.vectors
    }
}

/// Gzip-compressed bincode storage for [`WordVectors`]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeModelFormat;

impl ModelFormat for BincodeModelFormat {
    type Model = WordVectors;
    type Error = WordVectorsError;

    fn load(&self, path: &Path) -> Result<WordVectors, WordVectorsError> {
        let decoder = GzDecoder::new(BufReader::new(File::open(path)?));
        let file: WordVectorsFile =
            bincode::deserialize_from(decoder).map_err(|e| WordVectorsError::Decode(e.to_string()))?;

        let rows = if file.dim == 0 { 0 } else { file.data.len() / file.dim };
        let vectors = Array2::from_shape_vec((rows, file.dim), file.data)
            .map_err(|e| WordVectorsError::Decode(e.to_string()))?;
        WordVectors::new(file.vocab, vectors)
    }

    fn save(&self, model: &WordVectors, path: &Path) -> Result<(), WordVectorsError> {
        let file = WordVectorsFile {
            vocab: model.vocab.clone(),
            dim: model.dim(),
            data: model.vectors.iter().copied().collect(),
        };
        let mut encoder = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
        bincode::serialize_into(&mut encoder, &file)
            .map_err(|e| WordVectorsError::Decode(e.to_string()))?;
        encoder.finish()?;
        info!("Saved {} word vectors (dim {}) to {:?}", model.len(), model.dim(), path);
        Ok(())
    }
}
