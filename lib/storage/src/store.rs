use crate::codec::{self, Compression, DatasetHeader, DATASET_EXT};
use chrono::{DateTime, Utc};
use ndarray::ArrayD;
use pipestore_core::{Dataset, Element, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Manifest file marking a directory as an artifact store
pub const MANIFEST_FILE: &str = "pipestore.json";

const FORMAT_TAG: &str = "pipestore";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    pub format: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

impl StoreManifest {
    fn new() -> Self {
        Self {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains(&['/', '\\', '\0'][..]) {
        "name contains a path separator"
    } else if name.starts_with('.') {
        "name starts with '.'"
    } else if name == MANIFEST_FILE {
        "name is reserved"
    } else {
        return Ok(());
    };
    Err(Error::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

fn dataset_file_name(name: &str) -> String {
    format!("{}.{}", name, DATASET_EXT)
}

/// A persistent container of named groups of named datasets.
///
/// On disk a store is a directory holding [`MANIFEST_FILE`]; groups are
/// subdirectories and datasets are codec files. Dataset writes replace the
/// previous file atomically, so a reader sees either the old or the new
/// array, never a partial one.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    mode: AccessMode,
    manifest: StoreManifest,
}

impl ArtifactStore {
    /// Open for read-write, creating an empty store if `path` does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        let fresh = if root.exists() {
            root.is_dir() && !Self::has_visible_entries(&root)?
        } else {
            fs::create_dir_all(&root)
                .map_err(|e| Error::storage_unavailable(&root, e))?;
            true
        };

        let manifest = if fresh {
            let manifest = StoreManifest::new();
            Self::write_manifest(&root, &manifest)?;
            debug!("Created artifact store at {:?}", root);
            manifest
        } else {
            Self::read_manifest(&root)?
        };

        Ok(Self {
            root,
            mode: AccessMode::ReadWrite,
            manifest,
        })
    }

    /// Open an existing store without write access.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.exists() {
            return Err(Error::PathNotFound(root));
        }
        let manifest = Self::read_manifest(&root)?;
        Ok(Self {
            root,
            mode: AccessMode::ReadOnly,
            manifest,
        })
    }

    /// Whether `path` holds anything besides hidden entries.
    ///
    /// A concurrent `open` of the same fresh path leaves only a hidden
    /// atomic-write temp file behind until its manifest lands; groups and
    /// datasets can only appear after a manifest exists.
    fn has_visible_entries(path: &Path) -> Result<bool> {
        for entry in fs::read_dir(path).map_err(|e| Error::storage_unavailable(path, e))? {
            let entry = entry.map_err(|e| Error::storage_unavailable(path, e))?;
            if !entry.file_name().to_string_lossy().starts_with('.') {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn write_manifest(root: &Path, manifest: &StoreManifest) -> Result<()> {
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        atomicwrites::AtomicFile::new(
            root.join(MANIFEST_FILE),
            atomicwrites::OverwriteBehavior::AllowOverwrite,
        )
        .write(|f| f.write_all(&json))
        .map_err(|e| match e {
            atomicwrites::Error::Internal(e) | atomicwrites::Error::User(e) => {
                Error::storage_unavailable(root, e)
            }
        })
    }

    fn read_manifest(root: &Path) -> Result<StoreManifest> {
        if !root.is_dir() {
            return Err(Error::storage_unavailable(root, "not a directory"));
        }
        let path = root.join(MANIFEST_FILE);
        let contents = fs::read(&path)
            .map_err(|e| Error::storage_unavailable(root, format!("manifest: {}", e)))?;
        let manifest: StoreManifest = serde_json::from_slice(&contents)
            .map_err(|e| Error::storage_unavailable(root, format!("manifest: {}", e)))?;

        if manifest.format != FORMAT_TAG {
            return Err(Error::storage_unavailable(
                root,
                format!("unknown format '{}'", manifest.format),
            ));
        }
        if manifest.version != FORMAT_VERSION {
            return Err(Error::storage_unavailable(
                root,
                format!("unsupported version {}", manifest.version),
            ));
        }
        Ok(manifest)
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.manifest.created_at
    }

    /// The top-level group
    pub fn root(&self) -> Group<'_> {
        Group {
            store: self,
            dir: self.root.clone(),
            name: "/".to_string(),
        }
    }

    pub fn ensure_group(&self, name: &str) -> Result<Group<'_>> {
        self.root().ensure_group(name)
    }

    pub fn group(&self, name: &str) -> Result<Group<'_>> {
        self.root().group(name)
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.root().has_group(name)
    }

    pub fn list_groups(&self) -> Result<Vec<String>> {
        self.root().list_groups()
    }

    pub fn list_datasets(&self) -> Result<Vec<String>> {
        self.root().list_datasets()
    }

    pub fn write_dataset(&self, name: &str, dataset: &Dataset, compression: Compression) -> Result<()> {
        self.root().write_dataset(name, dataset, compression)
    }

    pub fn read_dataset(&self, name: &str) -> Result<Dataset> {
        self.root().read_dataset(name)
    }

    pub fn read_datasets(&self, names: &[&str]) -> Result<BTreeMap<String, Dataset>> {
        self.root().read_datasets(names)
    }

    fn check_writable(&self) -> Result<()> {
        match self.mode {
            AccessMode::ReadWrite => Ok(()),
            AccessMode::ReadOnly => Err(Error::ReadOnly(self.root.clone())),
        }
    }
}

/// A group inside an open store; borrowed from the store, so it cannot
/// outlive the handle that opened it.
#[derive(Debug, Clone)]
pub struct Group<'s> {
    store: &'s ArtifactStore,
    dir: PathBuf,
    name: String,
}

impl<'s> Group<'s> {
    /// Full group path, e.g. `/tfidf/worker-3`
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn store(&self) -> &'s ArtifactStore {
        self.store
    }

    fn child(&self, name: &str, dir: PathBuf) -> Group<'s> {
        let full = if self.name == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", self.name, name)
        };
        Group {
            store: self.store,
            dir,
            name: full,
        }
    }

    fn dataset_path(&self, name: &str) -> PathBuf {
        self.dir.join(dataset_file_name(name))
    }

    pub fn has_group(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.dir.join(name).is_dir()
    }

    pub fn has_dataset(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.dataset_path(name).is_file()
    }

    /// Return the subgroup, creating it if absent.
    pub fn ensure_group(&self, name: &str) -> Result<Group<'s>> {
        validate_name(name)?;
        if name.ends_with(&format!(".{}", DATASET_EXT)) {
            return Err(Error::InvalidName {
                name: name.to_string(),
                reason: format!("group names may not end in .{}", DATASET_EXT),
            });
        }

        let dir = self.dir.join(name);
        if dir.is_dir() {
            return Ok(self.child(name, dir));
        }
        if self.has_dataset(name) {
            return Err(Error::InvalidName {
                name: name.to_string(),
                reason: format!("a dataset named '{}' exists in {}", name, self.name),
            });
        }

        self.store.check_writable()?;
        fs::create_dir(&dir).or_else(|e| {
            // another writer may have created it between the check and here
            if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() {
                Ok(())
            } else {
                Err(e)
            }
        })?;
        debug!("Created group {}/{}", self.name.trim_end_matches('/'), name);
        Ok(self.child(name, dir))
    }

    /// Return an existing subgroup.
    pub fn group(&self, name: &str) -> Result<Group<'s>> {
        validate_name(name)?;
        let dir = self.dir.join(name);
        if !dir.is_dir() {
            return Err(Error::GroupNotFound(self.child(name, dir).name));
        }
        Ok(self.child(name, dir))
    }

    fn list_entries(&self, want_dirs: bool) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with('.') || file_name == MANIFEST_FILE {
                continue;
            }
            let file_type = entry.file_type()?;
            if want_dirs && file_type.is_dir() {
                names.push(file_name.to_string());
            } else if !want_dirs && file_type.is_file() {
                if let Some(stem) = file_name.strip_suffix(&format!(".{}", DATASET_EXT)) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Subgroup names, sorted
    pub fn list_groups(&self) -> Result<Vec<String>> {
        self.list_entries(true)
    }

    /// Dataset names, sorted
    pub fn list_datasets(&self) -> Result<Vec<String>> {
        self.list_entries(false)
    }

    /// Write `dataset` under `name`, replacing any existing dataset of that name.
    pub fn write_dataset(&self, name: &str, dataset: &Dataset, compression: Compression) -> Result<()> {
        self.store.check_writable()?;
        validate_name(name)?;
        if self.dir.join(name).is_dir() {
            return Err(Error::InvalidName {
                name: name.to_string(),
                reason: format!("a group named '{}' exists in {}", name, self.name),
            });
        }

        let path = self.dataset_path(name);
        if path.exists() {
            debug!("Replacing dataset {} in {}", name, self.name);
        }
        codec::write(&path, dataset, compression)?;
        debug!(
            "Wrote dataset {} {:?} {} to {}",
            name,
            dataset.shape(),
            dataset.dtype(),
            self.name
        );
        Ok(())
    }

    /// Write with the default (gzip) compression.
    pub fn write(&self, name: &str, dataset: impl Into<Dataset>) -> Result<()> {
        self.write_dataset(name, &dataset.into(), Compression::default())
    }

    /// Remove a dataset; returns whether it existed.
    pub fn delete_dataset(&self, name: &str) -> Result<bool> {
        self.store.check_writable()?;
        validate_name(name)?;
        let path = self.dataset_path(name);
        if path.is_file() {
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn require_dataset(&self, name: &str) -> Result<PathBuf> {
        let path = self.dataset_path(name);
        if validate_name(name).is_err() || !path.is_file() {
            return Err(Error::DatasetNotFound {
                name: name.to_string(),
                path: self.dir.clone(),
            });
        }
        Ok(path)
    }

    /// Dtype and shape of a dataset without reading its payload.
    pub fn dataset_info(&self, name: &str) -> Result<DatasetHeader> {
        codec::read_header(&self.require_dataset(name)?)
    }

    pub fn read_dataset(&self, name: &str) -> Result<Dataset> {
        codec::read(&self.require_dataset(name)?)
    }

    /// Read a dataset as a typed array.
    pub fn read<T: Element>(&self, name: &str) -> Result<ArrayD<T>> {
        self.read_dataset(name)?.into_array(name)
    }

    /// Read several datasets; an empty `names` reads every dataset in the group.
    ///
    /// All names are checked before any payload is read, so a missing name
    /// fails the call without partial work.
    pub fn read_datasets(&self, names: &[&str]) -> Result<BTreeMap<String, Dataset>> {
        let names: Vec<String> = if names.is_empty() {
            self.list_datasets()?
        } else {
            names.iter().map(|s| s.to_string()).collect()
        };

        let paths = names
            .iter()
            .map(|name| self.require_dataset(name))
            .collect::<Result<Vec<_>>>()?;

        let mut out = BTreeMap::new();
        for (name, path) in names.into_iter().zip(paths) {
            out.insert(name, codec::read(&path)?);
        }
        Ok(out)
    }
}

/// Open the store at `path` read-only and read top-level datasets.
///
/// An empty `names` reads every top-level dataset.
pub fn read_datasets<P: AsRef<Path>>(path: P, names: &[&str]) -> Result<BTreeMap<String, Dataset>> {
    let store = ArtifactStore::open_read_only(path)?;
    store.read_datasets(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array2};

    #[test]
    fn test_open_creates_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scores.h5");

        let store = ArtifactStore::open(&path).unwrap();
        assert_eq!(store.mode(), AccessMode::ReadWrite);
        assert!(path.join(MANIFEST_FILE).is_file());
        assert!(store.list_groups().unwrap().is_empty());
        drop(store);

        let reopened = ArtifactStore::open(&path).unwrap();
        assert!(reopened.list_datasets().unwrap().is_empty());
    }

    #[test]
    fn test_open_ignores_hidden_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.h5");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join(".atomicwriteXYZ"), b"partial").unwrap();

        let store = ArtifactStore::open(&path).unwrap();
        assert!(path.join(MANIFEST_FILE).is_file());
        assert!(store.list_datasets().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_open_of_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let writers = 8;

        for round in 0..50 {
            let path = dir.path().join(format!("scores-{}.h5", round));
            let barrier = std::sync::Barrier::new(writers);

            std::thread::scope(|s| {
                let handles: Vec<_> = (0..writers)
                    .map(|i| {
                        let (path, barrier) = (&path, &barrier);
                        s.spawn(move || -> Result<()> {
                            barrier.wait();
                            let store = ArtifactStore::open(path)?;
                            let _shard = store.ensure_group(&format!("worker-{}", i))?;
                            Ok(())
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap().unwrap();
                }
            });

            let store = ArtifactStore::open_read_only(&path).unwrap();
            assert_eq!(store.list_groups().unwrap().len(), writers);
        }
    }

    #[test]
    fn test_open_rejects_foreign_paths() {
        let dir = tempfile::tempdir().unwrap();

        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "hello").unwrap();
        assert!(matches!(ArtifactStore::open(&file), Err(Error::StorageUnavailable { .. })));

        let foreign = dir.path().join("foreign");
        std::fs::create_dir(&foreign).unwrap();
        std::fs::write(foreign.join("data.bin"), [1u8, 2, 3]).unwrap();
        assert!(matches!(ArtifactStore::open(&foreign), Err(Error::StorageUnavailable { .. })));

        let wrong_tag = dir.path().join("wrong");
        std::fs::create_dir(&wrong_tag).unwrap();
        std::fs::write(
            wrong_tag.join(MANIFEST_FILE),
            r#"{"format":"other","version":1,"created_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(ArtifactStore::open(&wrong_tag), Err(Error::StorageUnavailable { .. })));
    }

    #[test]
    fn test_open_read_only_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = ArtifactStore::open_read_only(dir.path().join("absent.h5"));
        assert!(matches!(result, Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_ensure_group_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("db")).unwrap();

        let g1 = store.ensure_group("tfidf").unwrap();
        g1.write("x", arr1(&[1i64])).unwrap();
        let g2 = store.ensure_group("tfidf").unwrap();
        assert_eq!(g2.name(), "/tfidf");
        assert_eq!(g2.list_datasets().unwrap(), vec!["x".to_string()]);

        let shard = g2.ensure_group("worker-0").unwrap();
        assert_eq!(shard.name(), "/tfidf/worker-0");
        assert_eq!(store.list_groups().unwrap(), vec!["tfidf".to_string()]);
        assert_eq!(g1.list_groups().unwrap(), vec!["worker-0".to_string()]);
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("db")).unwrap();
        let group = store.ensure_group("g").unwrap();

        group.write("D", arr2(&[[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0]])).unwrap();
        group.write("D", arr1(&[9i64, 8])).unwrap();

        let back = group.read::<i64>("D").unwrap();
        assert_eq!(back.shape(), &[2]);
        assert_eq!(back.as_slice().unwrap(), &[9, 8]);
        assert_eq!(group.list_datasets().unwrap(), vec!["D".to_string()]);
        assert!(matches!(group.read::<f64>("D"), Err(Error::DtypeMismatch { .. })));
    }

    #[test]
    fn test_read_datasets_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("centroids.h5");
        {
            let store = ArtifactStore::open(&path).unwrap();
            store
                .write_dataset("centroids", &Dataset::from(Array2::<f32>::zeros((3, 4))), Compression::default())
                .unwrap();
            store
                .write_dataset("labels", &Dataset::from(arr1(&[0i64, 1, 2])), Compression::None)
                .unwrap();
            store.ensure_group("meta").unwrap();
        }

        let all = read_datasets(&path, &[]).unwrap();
        assert_eq!(all.keys().cloned().collect::<Vec<_>>(), vec!["centroids", "labels"]);
        assert_eq!(all["centroids"].shape(), &[3, 4]);

        let some = read_datasets(&path, &["labels"]).unwrap();
        assert_eq!(some.len(), 1);

        match read_datasets(&path, &["labels", "missing"]) {
            Err(Error::DatasetNotFound { name, .. }) => assert_eq!(name, "missing"),
            other => panic!("expected DatasetNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        ArtifactStore::open(&path).unwrap().ensure_group("exists").unwrap();

        let store = ArtifactStore::open_read_only(&path).unwrap();
        assert!(store.ensure_group("exists").is_ok());
        assert!(matches!(store.ensure_group("new"), Err(Error::ReadOnly(_))));
        assert!(matches!(
            store.write_dataset("x", &Dataset::from(arr1(&[1i64])), Compression::None),
            Err(Error::ReadOnly(_))
        ));
    }

    #[test]
    fn test_name_validation_and_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("db")).unwrap();

        for bad in ["", "a/b", ".hidden", MANIFEST_FILE] {
            assert!(matches!(store.ensure_group(bad), Err(Error::InvalidName { .. })), "{}", bad);
        }
        assert!(matches!(store.ensure_group("x.ds"), Err(Error::InvalidName { .. })));

        store.ensure_group("g").unwrap();
        let clash = store.write_dataset("g", &Dataset::from(arr1(&[1i64])), Compression::None);
        assert!(matches!(clash, Err(Error::InvalidName { .. })));

        store
            .write_dataset("d", &Dataset::from(arr1(&[1i64])), Compression::None)
            .unwrap();
        assert!(matches!(store.ensure_group("d"), Err(Error::InvalidName { .. })));
        assert!(matches!(store.group("nope"), Err(Error::GroupNotFound(_))));
    }

    #[test]
    fn test_dataset_info_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("db")).unwrap();
        let g = store.ensure_group("g").unwrap();
        g.write("VX", Array2::<f32>::zeros((5, 2))).unwrap();

        let info = g.dataset_info("VX").unwrap();
        assert_eq!(info.shape, vec![5, 2]);
        assert_eq!(info.rows(), 5);

        assert!(g.delete_dataset("VX").unwrap());
        assert!(!g.delete_dataset("VX").unwrap());
        assert!(matches!(g.dataset_info("VX"), Err(Error::DatasetNotFound { .. })));
    }
}
