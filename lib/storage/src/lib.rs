//! # pipestore Storage
//!
//! Grouped artifact store: a directory of named groups, each holding named
//! dense datasets. Datasets are written gzip-compressed with a SHA-256
//! checksum and replaced atomically, so re-running a stage overwrites its
//! previous output instead of appending to it.
//!
//! ```rust,no_run
//! use ndarray::arr1;
//! use pipestore_storage::{read_datasets, ArtifactStore};
//!
//! {
//!     let store = ArtifactStore::open("data_score/document_scores.h5").unwrap();
//!     let shard = store.ensure_group("tfidf").unwrap().ensure_group("worker-0").unwrap();
//!     shard.write("_ref", arr1(&[4i64, 2, 9])).unwrap();
//! }
//!
//! let everything = read_datasets("data_clustering/centroids.h5", &[]).unwrap();
//! ```

pub mod codec;
pub mod store;

pub use codec::{Compression, DatasetHeader};
pub use store::{read_datasets, AccessMode, ArtifactStore, Group, StoreManifest, MANIFEST_FILE};
