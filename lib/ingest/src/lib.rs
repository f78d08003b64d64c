//! # pipestore Ingest
//!
//! Parallel ingestion of many small keyed CSV files into one
//! [`KeyedRowTable`](pipestore_core::KeyedRowTable) ordered by `_ref`.
//!
//! Files are read independently (serially, on all cores, or on a fixed
//! pool), concatenated in path order and stable-sorted by `_ref`, so the
//! result depends only on the set of files and the requested columns.
//!
//! ```rust,no_run
//! use pipestore_core::Parallelism;
//! use pipestore_ingest::KeyedTableLoader;
//!
//! let loader = KeyedTableLoader::new(Parallelism::AllCores);
//! let table = loader.load("*.csv", "data_import", &["title", "abstract"]).unwrap();
//! for row in table.rows().take(3) {
//!     println!("{} {:?}", row.ref_id(), row.get("title"));
//! }
//! ```

pub mod files;
pub mod loader;

pub use files::grab_files;
pub use loader::{read_keyed_csv, KeyedTableLoader};
