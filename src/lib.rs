//! # pipestore
//!
//! Artifact layer for multi-stage document-embedding pipelines.
//!
//! Stages (import, parse, embed, score, cluster, postprocess) hand their
//! output to each other through pipestore:
//!
//! - a grouped artifact store for dense arrays, with atomic overwrite
//! - a loader that merges many keyed CSV files into one `_ref`-ordered table
//! - an assembler that stitches shard-parallel score output back together
//! - a model accessor behind an opaque load/save capability
//!
//! Every document carries an integer `_ref`; all ordering and joining is
//! done on it.
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! pipestore --config config.json groups data_score/document_scores.h5
//! pipestore --config config.json assemble unique --reduced
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use pipestore::prelude::*;
//! use ndarray::arr2;
//!
//! let artifacts = PipelineArtifacts::from_settings(&JsonFileSettings::new("config.json")).unwrap();
//!
//! // Each worker writes its own shard
//! let writer = artifacts.score_writer("unique").unwrap();
//! writer.write_shard("worker-0", &[3, 1], arr2(&[[0.3f32, 0.1], [0.1, 0.9]]), None).unwrap();
//!
//! // Readers get one matrix ordered by _ref
//! let docs = artifacts.load_document_vectors::<f32>("unique", false).unwrap();
//! assert_eq!(docs.refs.to_vec(), vec![1, 3]);
//! ```
//!
//! ## Crate Structure
//!
//! - `pipestore-core` - Error, refs, datasets, keyed tables, config
//! - `pipestore-storage` - Grouped artifact store and dataset codec
//! - `pipestore-ingest` - File discovery and keyed CSV loading
//! - `pipestore-pipeline` - Vector assembly, model access, stage artifacts

// Re-export core types
pub use pipestore_core::{
    Dataset, Dtype, Element, Error, JsonFileSettings, KeyedRowTable, Parallelism, PipelineConfig,
    RefId, Result, Row, SettingsProvider, StaticSettings, REF_COLUMN,
};

// Re-export storage
pub use pipestore_storage::{read_datasets, AccessMode, ArtifactStore, Compression, Group};

// Re-export ingest
pub use pipestore_ingest::{grab_files, KeyedTableLoader};

// Re-export pipeline
pub use pipestore_pipeline::{
    load_model, read_shard, stack_shards, AssembleOptions, BincodeModelFormat, DocumentVectors,
    ModelAccessor, ModelFormat, ModelLoadError, PipelineArtifacts, ScoreWriter, ShardVectors,
    VectorAssembler, WordVectors, FULL_VECTORS, REDUCED_VECTORS,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ArtifactStore, AssembleOptions, Compression, Dataset, DocumentVectors, Error, Group,
        JsonFileSettings, KeyedRowTable, KeyedTableLoader, ModelFormat, Parallelism,
        PipelineArtifacts, PipelineConfig, RefId, Result, SettingsProvider, StaticSettings,
        VectorAssembler, REF_COLUMN,
    };
}
