use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis, Ix1, Ix2};
use pipestore_core::refs::{self, RefId, REF_COLUMN};
use pipestore_core::{Element, Error, Parallelism, PipelineConfig, Result};
use pipestore_storage::{ArtifactStore, Group};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Full-dimension document vectors inside a shard
pub const FULL_VECTORS: &str = "V";
/// Reduced-dimension document vectors inside a shard
pub const REDUCED_VECTORS: &str = "VX";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Read `VX` instead of `V`
    pub use_reduced: bool,
    /// Fail with `DuplicateRef` instead of keeping every duplicate row
    pub strict_unique_refs: bool,
}

impl AssembleOptions {
    pub fn reduced() -> Self {
        Self {
            use_reduced: true,
            ..Self::default()
        }
    }

    #[inline]
    pub fn vector_key(&self) -> &'static str {
        if self.use_reduced {
            REDUCED_VECTORS
        } else {
            FULL_VECTORS
        }
    }
}

/// One shard's aligned `_ref` array and vector rows
#[derive(Debug, Clone, PartialEq)]
pub struct ShardVectors<T> {
    pub shard: String,
    pub refs: Array1<RefId>,
    pub vectors: Array2<T>,
}

/// Document vectors from every shard, row-aligned with `refs` ascending
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentVectors<T = f32> {
    pub refs: Array1<RefId>,
    pub vectors: Array2<T>,
}

impl<T> DocumentVectors<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    /// Vector row for `ref_id`; with duplicates the last row wins.
    pub fn get(&self, ref_id: RefId) -> Option<ArrayView1<'_, T>> {
        let refs = self.refs.as_slice()?;
        let end = refs.partition_point(|&r| r <= ref_id);
        (end > 0 && refs[end - 1] == ref_id).then(|| self.vectors.row(end - 1))
    }
}

/// Read one shard's `_ref` and vector datasets, checking they align.
pub fn read_shard<T: Element>(group: &Group<'_>, shard: &str, vector_key: &str) -> Result<ShardVectors<T>> {
    let shard_group = group.group(shard)?;

    let refs = shard_group.read::<RefId>(REF_COLUMN)?;
    let ref_shape = refs.shape().to_vec();
    let refs = refs.into_dimensionality::<Ix1>().map_err(|_| {
        Error::ShapeMismatch(format!(
            "{}: _ref must be 1-D, got shape {:?}",
            shard_group.name(),
            ref_shape
        ))
    })?;

    let vectors = shard_group.read::<T>(vector_key)?;
    let vec_shape = vectors.shape().to_vec();
    let vectors = vectors.into_dimensionality::<Ix2>().map_err(|_| {
        Error::ShapeMismatch(format!(
            "{}: {} must be 2-D, got shape {:?}",
            shard_group.name(),
            vector_key,
            vec_shape
        ))
    })?;

    if vectors.nrows() != refs.len() {
        return Err(Error::ShapeMismatch(format!(
            "{}: {} has {} rows but _ref has {} entries",
            shard_group.name(),
            vector_key,
            vectors.nrows(),
            refs.len()
        )));
    }

    debug!("Read shard {} ({} rows)", shard_group.name(), refs.len());
    Ok(ShardVectors {
        shard: shard.to_string(),
        refs,
        vectors,
    })
}

/// Stack shards in the given order, then stable-sort rows by `_ref`.
///
/// An empty shard list is a `ShapeMismatch`: there is no vector width to
/// give the result.
pub fn stack_shards<T: Element>(shards: &[ShardVectors<T>], strict_unique_refs: bool) -> Result<DocumentVectors<T>> {
    if shards.is_empty() {
        return Err(Error::ShapeMismatch("no shards to stack".to_string()));
    }

    let ref_views: Vec<ArrayView1<'_, RefId>> = shards.iter().map(|s| s.refs.view()).collect();
    let refs = concatenate(Axis(0), &ref_views)
        .map_err(|e| Error::ShapeMismatch(format!("stacking _ref: {}", e)))?;

    let vec_views: Vec<ArrayView2<'_, T>> = shards.iter().map(|s| s.vectors.view()).collect();
    let vectors = concatenate(Axis(0), &vec_views).map_err(|e| {
        let widths: Vec<usize> = shards.iter().map(|s| s.vectors.ncols()).collect();
        Error::ShapeMismatch(format!("vector widths differ across shards {:?}: {}", widths, e))
    })?;

    if vectors.nrows() != refs.len() {
        return Err(Error::ShapeMismatch(format!(
            "stacked vectors have {} rows but {} refs",
            vectors.nrows(),
            refs.len()
        )));
    }

    let flat_refs = refs.to_vec();
    let perm = refs::sort_permutation(&flat_refs);
    let sorted_refs: Vec<RefId> = perm.iter().map(|&i| flat_refs[i]).collect();

    let dups = refs::duplicates_in_sorted(&sorted_refs);
    if let Some(&first) = dups.first() {
        if strict_unique_refs {
            return Err(Error::DuplicateRef(first));
        }
        warn!("{} duplicate _ref values across shards (first: {})", dups.len(), first);
    }

    Ok(DocumentVectors {
        refs: Array1::from_vec(sorted_refs),
        vectors: vectors.select(Axis(0), &perm),
    })
}

/// Merges shard-parallel score output into one globally ordered table.
///
/// A score store holds one group per score method; below it every worker
/// writes its own shard group with `_ref` plus `V` (and optionally `VX`).
/// Shards are listed first, then read in parallel, then stacked and
/// sorted by `_ref`.
#[derive(Debug, Clone)]
pub struct VectorAssembler {
    store_path: PathBuf,
    parallelism: Parallelism,
}

impl VectorAssembler {
    pub fn new<P: AsRef<Path>>(store_path: P, parallelism: Parallelism) -> Self {
        Self {
            store_path: store_path.as_ref().to_path_buf(),
            parallelism,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(config.score_db_path()?, config.parallelism()?))
    }

    #[inline]
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Score methods (top-level groups) present in the store
    pub fn score_methods(&self) -> Result<Vec<String>> {
        ArtifactStore::open_read_only(&self.store_path)?.list_groups()
    }

    fn method_group<'s>(&self, store: &'s ArtifactStore, score_method: &str) -> Result<Group<'s>> {
        if !store.has_group(score_method) {
            return Err(Error::UnknownScoreMethod {
                method: score_method.to_string(),
                path: self.store_path.clone(),
            });
        }
        store.group(score_method)
    }

    /// Shard identifiers under `score_method`, in name order.
    pub fn list_shards(&self, score_method: &str) -> Result<Vec<String>> {
        let store = ArtifactStore::open_read_only(&self.store_path)?;
        self.method_group(&store, score_method)?.list_groups()
    }

    pub fn assemble<T: Element>(&self, score_method: &str, options: AssembleOptions) -> Result<DocumentVectors<T>> {
        let store = ArtifactStore::open_read_only(&self.store_path)?;
        let group = self.method_group(&store, score_method)?;

        let shards = group.list_groups()?;
        if shards.is_empty() {
            return Err(Error::NoShards {
                method: score_method.to_string(),
                path: self.store_path.clone(),
            });
        }
        let vector_key = options.vector_key();
        let parts = self
            .parallelism
            .try_map(&shards, |shard| read_shard::<T>(&group, shard, vector_key))?;

        let assembled = stack_shards(&parts, options.strict_unique_refs)?;
        info!(
            "Assembled {} {} vectors (dim {}) from {} shards of '{}'",
            assembled.len(),
            vector_key,
            assembled.dim(),
            shards.len(),
            score_method
        );
        Ok(assembled)
    }
}
