use pipestore_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Files in `directory` whose names match the glob `pattern`, sorted by path.
///
/// Matching is non-recursive unless the pattern itself contains `**`.
pub fn grab_files<P: AsRef<Path>>(pattern: &str, directory: P) -> Result<Vec<PathBuf>> {
    let directory = directory.as_ref();
    if !directory.is_dir() {
        return Err(Error::PathNotFound(directory.to_path_buf()));
    }
    let dir = directory.to_str().ok_or_else(|| {
        Error::InvalidConfig(format!("non UTF-8 directory {:?}", directory))
    })?;

    let full = format!("{}/{}", glob::Pattern::escape(dir), pattern);
    let entries = glob::glob(&full)
        .map_err(|e| Error::InvalidConfig(format!("bad pattern '{}': {}", pattern, e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::Io(e.into_error()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grab_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.csv", "a.csv", "notes.txt"] {
            std::fs::write(dir.path().join(name), "_ref\n1\n").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.csv")).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.csv"), "_ref\n1\n").unwrap();

        let files = grab_files("*.csv", dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn test_grab_files_escapes_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("run[1]");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("x.csv"), "_ref\n1\n").unwrap();

        assert_eq!(grab_files("*.csv", &dir).unwrap().len(), 1);
    }

    #[test]
    fn test_grab_files_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let result = grab_files("*.csv", root.path().join("absent"));
        assert!(matches!(result, Err(Error::PathNotFound(_))));
    }
}
