//! User-selected input files.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the bytes of an [`InputFile`] live.
#[derive(Debug, Clone)]
pub enum ByteSource {
    /// Read from disk on demand.
    Path(PathBuf),
    /// Already in memory.
    Bytes(Vec<u8>),
}

/// A selected file: a display name, a size and a lazily readable byte source.
#[derive(Debug, Clone)]
pub struct InputFile {
    name: String,
    size: u64,
    source: ByteSource,
}

impl InputFile {
    /// Reference a file on disk. Only metadata is read here.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = fs::metadata(path)
            .with_context(|| format!("cannot open input file {}", path.display()))?;
        if !meta.is_file() {
            anyhow::bail!("{} is not a regular file", path.display());
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(InputFile {
            name,
            size: meta.len(),
            source: ByteSource::Path(path.to_path_buf()),
        })
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        InputFile {
            name: name.into(),
            size: bytes.len() as u64,
            source: ByteSource::Bytes(bytes),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source(&self) -> &ByteSource {
        &self.source
    }

    /// Read the whole file into a buffer.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            ByteSource::Path(path) => fs::read(path),
            ByteSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Collect paths into input files, keeping the given order.
pub fn collect_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<InputFile>> {
    paths.iter().map(InputFile::from_path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_bytes() {
        let file = InputFile::from_bytes("a.png", vec![1, 2, 3]);
        assert_eq!(file.name(), "a.png");
        assert_eq!(file.size(), 3);
        assert_eq!(file.read().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_from_path_reads_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::File::create(&path).unwrap().write_all(b"hello").unwrap();

        let file = InputFile::from_path(&path).unwrap();
        assert_eq!(file.name(), "notes.txt");
        assert_eq!(file.size(), 5);

        fs::write(&path, b"changed").unwrap();
        assert_eq!(file.read().unwrap(), b"changed");
    }

    #[test]
    fn test_from_path_missing() {
        assert!(InputFile::from_path("/definitely/not/here.pdf").is_err());
    }

    #[test]
    fn test_from_path_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(InputFile::from_path(dir.path()).is_err());
    }

    #[test]
    fn test_collect_inputs_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let b = dir.path().join("b.txt");
        let a = dir.path().join("a.txt");
        fs::write(&b, b"b").unwrap();
        fs::write(&a, b"a").unwrap();

        let files = collect_inputs(&[&b, &a]).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["b.txt", "a.txt"]);
    }
}
