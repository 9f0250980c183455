use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_ZIP: &str = "application/zip";

/// Result of an operation: bytes plus the name and type they are saved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime: &'static str,
}

/// Delivers artifacts to the user. Each artifact is handed over once.
pub trait DownloadSink {
    fn emit(&mut self, artifact: Artifact) -> io::Result<()>;
}

/// Saves artifacts as files in a directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    saved: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectorySink {
            dir: dir.into(),
            saved: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths written so far, in order.
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }
}

impl DownloadSink for DirectorySink {
    fn emit(&mut self, artifact: Artifact) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&artifact.filename);
        fs::write(&path, &artifact.bytes)?;
        info!(path = %path.display(), mime = artifact.mime, bytes = artifact.bytes.len(), "saved");
        self.saved.push(path);
        Ok(())
    }
}

/// Keeps artifacts in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: Vec<Artifact>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn take(&mut self) -> Vec<Artifact> {
        std::mem::take(&mut self.artifacts)
    }
}

impl DownloadSink for MemorySink {
    fn emit(&mut self, artifact: Artifact) -> io::Result<()> {
        self.artifacts.push(artifact);
        Ok(())
    }
}
