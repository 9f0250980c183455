//! Archive engine seam and its ZIP implementation.

use crate::error::EngineError;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

/// Creates archive builders.
pub trait ArchiveEngine {
    fn create(&self) -> Box<dyn ArchiveBuilder>;
}

/// An archive being assembled.
pub trait ArchiveBuilder {
    /// Add an entry. Returns the name actually used, which differs from
    /// `name` when an entry of that name already exists.
    fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<String, EngineError>;

    /// Serialise the archive.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, EngineError>;
}

/// ZIP archives with Deflate compression.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipEngine;

impl ArchiveEngine for ZipEngine {
    fn create(&self) -> Box<dyn ArchiveBuilder> {
        Box::new(ZipBuilder {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            names: HashSet::new(),
        })
    }
}

struct ZipBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    names: HashSet<String>,
}

impl ArchiveBuilder for ZipBuilder {
    fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<String, EngineError> {
        let name = unique_entry_name(&sanitize_entry_name(name), &self.names);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        self.writer.start_file(name.as_str(), options)?;
        self.writer.write_all(bytes)?;
        self.names.insert(name.clone());
        Ok(name)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, EngineError> {
        Ok(self.writer.finish()?.into_inner())
    }
}

/// Strip directory components so entries land at the archive root.
fn sanitize_entry_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        "file".to_string()
    } else {
        base.to_string()
    }
}

/// `name`, or `stem (n).ext` for the first free `n` starting at 2.
fn unique_entry_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    (2..)
        .map(|n| format!("{} ({}){}", stem, n, ext))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}
