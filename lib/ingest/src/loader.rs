use crate::files::grab_files;
use pipestore_core::refs::{self, REF_COLUMN};
use pipestore_core::{Error, KeyedRowTable, Parallelism, PipelineConfig, Result, RowChunk};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

fn csv_error(path: &Path, e: csv::Error) -> Error {
    match e.into_kind() {
        csv::ErrorKind::Io(err) => Error::Io(err),
        kind => Error::Serialization(format!("{}: {:?}", path.display(), kind)),
    }
}

/// Read `_ref` plus `payload_columns` from one CSV file with a header row.
///
/// Fails with `SchemaMismatch` if `_ref` or any requested column is absent.
pub fn read_keyed_csv(path: &Path, payload_columns: &[String]) -> Result<RowChunk> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let actual: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let position = |name: &str| actual.iter().position(|h| h == name);
    let ref_idx = position(REF_COLUMN);
    let col_idx: Option<Vec<usize>> = payload_columns.iter().map(|c| position(c.as_str())).collect();

    let (ref_idx, col_idx) = match (ref_idx, col_idx) {
        (Some(r), Some(c)) => (r, c),
        _ => {
            let mut requested = vec![REF_COLUMN.to_string()];
            requested.extend(payload_columns.iter().cloned());
            return Err(Error::SchemaMismatch {
                path: path.to_path_buf(),
                requested,
                actual,
            });
        }
    };

    let mut chunk = RowChunk::new(payload_columns.len());
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let raw = record.get(ref_idx).unwrap_or("");
        let ref_id = refs::parse_ref(raw).ok_or_else(|| Error::InvalidRef {
            path: path.to_path_buf(),
            value: raw.to_string(),
        })?;
        chunk.refs.push(ref_id);
        for (dst, &idx) in chunk.columns.iter_mut().zip(&col_idx) {
            dst.push(record.get(idx).unwrap_or("").to_string());
        }
    }

    debug!("Read {} rows from {:?}", chunk.len(), path);
    Ok(chunk)
}

/// Loads many keyed CSV shards into one table ordered by `_ref`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyedTableLoader {
    parallelism: Parallelism,
}

impl KeyedTableLoader {
    pub fn new(parallelism: Parallelism) -> Self {
        Self { parallelism }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(config.parallelism()?))
    }

    #[inline]
    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    /// Load every file in `directory` matching `pattern`.
    pub fn load<P: AsRef<Path>>(
        &self,
        pattern: &str,
        directory: P,
        columns: &[&str],
    ) -> Result<KeyedRowTable> {
        let directory = directory.as_ref();
        let files = grab_files(pattern, directory)?;
        if files.is_empty() {
            return Err(Error::NoInputFiles {
                pattern: pattern.to_string(),
                directory: directory.to_path_buf(),
            });
        }
        self.load_files(&files, columns)
    }

    /// Load an explicit file list. The list order does not affect the result.
    pub fn load_files(&self, files: &[PathBuf], columns: &[&str]) -> Result<KeyedRowTable> {
        let mut payload_columns: Vec<String> = Vec::with_capacity(columns.len());
        for &c in columns {
            if c != REF_COLUMN && !payload_columns.iter().any(|p| p == c) {
                payload_columns.push(c.to_string());
            }
        }

        // fixed concatenation order keeps duplicate refs reproducible
        let mut files = files.to_vec();
        files.sort();

        let chunks = self
            .parallelism
            .try_map(&files, |path| read_keyed_csv(path, &payload_columns))?;

        let table = KeyedRowTable::from_chunks(payload_columns, chunks)?;

        let dups = refs::duplicates_in_sorted(table.refs());
        if !dups.is_empty() {
            warn!(
                "{} duplicate _ref values across input files (first: {})",
                dups.len(),
                dups[0]
            );
        }
        info!("Loaded {} rows from {} files", table.len(), files.len());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use std::num::NonZeroUsize;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.csv", "_ref,title,year\n3,gamma,2003\n1,alpha,2001\n");
        write(dir.path(), "b.csv", "title,_ref,year\nbeta,2,2002\n");
        write(dir.path(), "c.csv", "_ref,year,title,extra\n4,2004,delta,x\n");
        dir
    }

    #[test]
    fn test_load_orders_by_ref() {
        let dir = fixture();
        let table = KeyedTableLoader::default()
            .load("*.csv", dir.path(), &["title"])
            .unwrap();

        assert_eq!(table.refs(), &[1, 2, 3, 4]);
        assert_eq!(table.columns(), &["title".to_string(), "_ref".to_string()]);
        assert_eq!(table.column("title").unwrap(), &["alpha", "beta", "gamma", "delta"]);
        assert_eq!(table.column_as::<i64>("_ref").unwrap(), vec![1, 2, 3, 4]);
        assert!(table.column("year").is_none());
    }

    #[test]
    fn test_order_and_parallelism_independence() {
        let dir = fixture();
        let files = grab_files("*.csv", dir.path()).unwrap();
        let baseline = KeyedTableLoader::default()
            .load_files(&files, &["year", "title"])
            .unwrap();

        let modes = [
            Parallelism::Serial,
            Parallelism::AllCores,
            Parallelism::Workers(NonZeroUsize::new(2).unwrap()),
        ];
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for mode in modes {
            let mut shuffled = files.clone();
            shuffled.shuffle(&mut rng);
            let table = KeyedTableLoader::new(mode)
                .load_files(&shuffled, &["year", "title"])
                .unwrap();
            assert_eq!(table.refs(), baseline.refs());
            assert_eq!(table.column("title"), baseline.column("title"));
            assert_eq!(table.column("year"), baseline.column("year"));
        }
    }

    #[test]
    fn test_missing_column_is_schema_mismatch() {
        let dir = fixture();
        let result = KeyedTableLoader::default().load("*.csv", dir.path(), &["title", "abstract"]);
        match result {
            Err(Error::SchemaMismatch { requested, actual, .. }) => {
                assert_eq!(requested, vec!["_ref", "title", "abstract"]);
                assert!(actual.contains(&"title".to_string()));
            }
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_ref_column() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "x.csv", "id,title\n1,a\n");
        let result = KeyedTableLoader::default().load("*.csv", dir.path(), &[]);
        assert!(matches!(result, Err(Error::SchemaMismatch { .. })));
    }

    #[test]
    fn test_duplicate_refs_kept() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.csv", "_ref,v\n7,first\n1,x\n");
        write(dir.path(), "b.csv", "_ref,v\n7,second\n");

        let table = KeyedTableLoader::new(Parallelism::AllCores)
            .load("*.csv", dir.path(), &["v"])
            .unwrap();
        assert_eq!(table.refs(), &[1, 7, 7]);
        assert_eq!(table.column("v").unwrap(), &["x", "first", "second"]);
        assert_eq!(table.get(7).unwrap().get("v"), Some("second"));
    }

    #[test]
    fn test_invalid_ref_and_empty_inputs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            KeyedTableLoader::default().load("*.csv", dir.path(), &[]),
            Err(Error::NoInputFiles { .. })
        ));

        write(dir.path(), "bad.csv", "_ref\nabc\n");
        assert!(matches!(
            KeyedTableLoader::default().load("*.csv", dir.path(), &[]),
            Err(Error::InvalidRef { .. })
        ));
    }

    #[test]
    fn test_ref_requested_explicitly_is_not_duplicated() {
        let dir = fixture();
        let table = KeyedTableLoader::default()
            .load("*.csv", dir.path(), &["_ref", "title", "title"])
            .unwrap();
        assert_eq!(table.columns(), &["title".to_string(), "_ref".to_string()]);
    }

    #[test]
    fn test_header_only_file_contributes_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.csv", "_ref,v\n2,b\n");
        write(dir.path(), "empty.csv", "_ref,v\n");
        let table = KeyedTableLoader::default().load("*.csv", dir.path(), &["v"]).unwrap();
        assert_eq!(table.refs(), &[2]);
    }
}
