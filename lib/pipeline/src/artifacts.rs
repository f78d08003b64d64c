use crate::assembler::{AssembleOptions, DocumentVectors, VectorAssembler, FULL_VECTORS, REDUCED_VECTORS};
use crate::model::{self, ModelFormat, ModelLoadError};
use ndarray::{Array1, Array2};
use pipestore_core::refs::{RefId, REF_COLUMN};
use pipestore_core::{
    Dataset, Element, Error, KeyedRowTable, PipelineConfig, Result, SettingsProvider,
};
use pipestore_ingest::KeyedTableLoader;
use pipestore_storage::{read_datasets, ArtifactStore, Compression, Group};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Glob matched against the import directory
pub const IMPORT_PATTERN: &str = "*.csv";

/// Named accessors for the artifacts each pipeline stage reads and writes.
///
/// Every path is resolved from the injected [`PipelineConfig`]; nothing is
/// read from process-wide state.
#[derive(Debug, Clone)]
pub struct PipelineArtifacts {
    config: PipelineConfig,
}

impl PipelineArtifacts {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn from_settings<S: SettingsProvider + ?Sized>(settings: &S) -> Result<Self> {
        Ok(Self::new(settings.load()?))
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Score methods present in the score store
    pub fn get_score_methods(&self) -> Result<Vec<String>> {
        VectorAssembler::from_config(&self.config)?.score_methods()
    }

    /// Open the score store for writing shards of `score_method`.
    pub fn score_writer(&self, score_method: &str) -> Result<ScoreWriter> {
        let store = ArtifactStore::open(self.config.score_db_path()?)?;
        store.ensure_group(score_method)?;
        Ok(ScoreWriter {
            store,
            method: score_method.to_string(),
            compression: Compression::default(),
        })
    }

    /// Datasets from the metacluster centroid store; empty `names` reads all.
    pub fn load_metacluster_data(&self, names: &[&str]) -> Result<BTreeMap<String, Dataset>> {
        let path = self.config.centroids_path()?;
        debug!("Loading metacluster data from {:?}", path);
        read_datasets(path, names)
    }

    /// Every dataset in the postprocessing dispersion store
    pub fn load_dispersion_data(&self) -> Result<BTreeMap<String, Dataset>> {
        let path = self.config.dispersion_path()?;
        debug!("Loading dispersion data from {:?}", path);
        read_datasets(path, &[])
    }

    /// Imported documents with `_ref` plus `extra_columns`, ordered by `_ref`.
    pub fn load_import_data(&self, extra_columns: &[&str]) -> Result<KeyedRowTable> {
        let loader = KeyedTableLoader::from_config(&self.config)?;
        loader.load(IMPORT_PATTERN, self.config.import_data_directory()?, extra_columns)
    }

    /// Assembled `V` (or `VX`) vectors of `score_method`, read as `T`.
    pub fn load_document_vectors<T: Element>(
        &self,
        score_method: &str,
        use_reduced: bool,
    ) -> Result<DocumentVectors<T>> {
        let options = AssembleOptions {
            use_reduced,
            ..AssembleOptions::default()
        };
        VectorAssembler::from_config(&self.config)?.assemble(score_method, options)
    }

    pub fn load_model<F: ModelFormat>(&self, format: &F) -> std::result::Result<F::Model, ModelLoadError<F::Error>> {
        model::load_model(&self.config, format)
    }
}

/// Write access to one score method's group in the score store
#[derive(Debug)]
pub struct ScoreWriter {
    store: ArtifactStore,
    method: String,
    compression: Compression,
}

impl ScoreWriter {
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[inline]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn group(&self) -> Result<Group<'_>> {
        self.store.group(&self.method)
    }

    /// Write (or fully replace) one shard's `_ref`, `V` and optional `VX`.
    pub fn write_shard<T: Element>(
        &self,
        shard: &str,
        refs: &[RefId],
        vectors: Array2<T>,
        reduced: Option<Array2<T>>,
    ) -> Result<()> {
        let check = |key: &str, rows: usize| {
            if rows != refs.len() {
                return Err(Error::ShapeMismatch(format!(
                    "{}/{}: {} has {} rows but _ref has {} entries",
                    self.method,
                    shard,
                    key,
                    rows,
                    refs.len()
                )));
            }
            Ok(())
        };
        check(FULL_VECTORS, vectors.nrows())?;
        if let Some(vx) = &reduced {
            check(REDUCED_VECTORS, vx.nrows())?;
        }

        let group = self.group()?.ensure_group(shard)?;
        group.write_dataset(REF_COLUMN, &Dataset::from(Array1::from(refs.to_vec())), self.compression)?;
        group.write_dataset(FULL_VECTORS, &Dataset::from(vectors), self.compression)?;
        match reduced {
            Some(vx) => group.write_dataset(REDUCED_VECTORS, &Dataset::from(vx), self.compression)?,
            None => {
                // a rerun without VX must not leave the previous run's rows behind
                group.delete_dataset(REDUCED_VECTORS)?;
            }
        }

        info!("Wrote {} rows to shard {}", refs.len(), group.name());
        Ok(())
    }
}
