//! # pipestore Core
//!
//! Core types for the pipestore artifact layer.
//!
//! This crate provides the data model shared by every pipeline stage:
//!
//! - [`RefId`] - Per-document reference id (`_ref`), the sole join/sort key
//! - [`Dataset`] - Dense n-dimensional array of `i64`, `f32` or `f64`
//! - [`KeyedRowTable`] - Rows ordered by `_ref`, with `_ref` kept as a column
//! - [`PipelineConfig`] - Per-stage settings behind a [`SettingsProvider`]
//! - [`Parallelism`] - Serial / all-cores / fixed-pool fan-out
//!
//! ## Example
//!
//! ```rust
//! use pipestore_core::{KeyedRowTable, RowChunk};
//!
//! let chunks = vec![
//!     RowChunk { refs: vec![3, 1], columns: vec![vec!["c".into(), "a".into()]] },
//!     RowChunk { refs: vec![2], columns: vec![vec!["b".into()]] },
//! ];
//! let table = KeyedRowTable::from_chunks(vec!["title".into()], chunks).unwrap();
//! assert_eq!(table.refs(), &[1, 2, 3]);
//! assert_eq!(table.get(2).unwrap().get("title"), Some("b"));
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod parallel;
pub mod refs;
pub mod table;

pub use config::{
    EmbedConfig, ImportDataConfig, JsonFileSettings, MetaclusterConfig, PipelineConfig,
    PostprocessingConfig, ScoreConfig, SettingsProvider, StaticSettings, W2vEmbeddingConfig,
    DISPERSION_FILE,
};
pub use dataset::{Dataset, Dtype, Element};
pub use error::{Error, Result};
pub use parallel::Parallelism;
pub use refs::{RefId, REF_COLUMN};
pub use table::{KeyedRowTable, Row, RowChunk};
