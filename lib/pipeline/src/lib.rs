//! # pipestore Pipeline
//!
//! Stage-level accessors built on the artifact store and the CSV loader:
//!
//! - [`VectorAssembler`] - merges per-worker score shards into one
//!   `_ref`-ordered matrix
//! - [`ModelFormat`] / [`ModelAccessor`] - embedding model loading behind
//!   an opaque library capability
//! - [`PipelineArtifacts`] - named loaders for every stage output, resolved
//!   from a [`PipelineConfig`](pipestore_core::PipelineConfig)
//!
//! ```rust,no_run
//! use pipestore_core::JsonFileSettings;
//! use pipestore_pipeline::PipelineArtifacts;
//!
//! let artifacts = PipelineArtifacts::from_settings(&JsonFileSettings::new("config.json")).unwrap();
//! for method in artifacts.get_score_methods().unwrap() {
//!     let docs = artifacts.load_document_vectors::<f32>(&method, false).unwrap();
//!     println!("{}: {} documents, dim {}", method, docs.len(), docs.dim());
//! }
//! ```

pub mod artifacts;
pub mod assembler;
pub mod model;

pub use artifacts::{PipelineArtifacts, ScoreWriter, IMPORT_PATTERN};
pub use assembler::{
    read_shard, stack_shards, AssembleOptions, DocumentVectors, ShardVectors, VectorAssembler,
    FULL_VECTORS, REDUCED_VECTORS,
};
pub use model::{
    load_model, BincodeModelFormat, ModelAccessor, ModelFormat, ModelLoadError, WordVectors,
    WordVectorsError,
};
