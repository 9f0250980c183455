//! Runtime settings, loaded from an optional JSON file.

use crate::host::ReadinessPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides [`Settings::log_filter`].
pub const LOG_ENV: &str = "PDFTOOLS_LOG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory artifacts are saved to.
    pub output_dir: PathBuf,
    /// `tracing` filter directive, e.g. `pdftools=debug`.
    pub log_filter: String,
    pub readiness: ReadinessPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            output_dir: PathBuf::from("."),
            log_filter: "pdftools=info".to_string(),
            readiness: ReadinessPolicy::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Settings::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.log_filter, "pdftools=info");
        assert_eq!(settings.readiness.max_attempts, 10);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pdftools.json");
        fs::write(&path, r#"{"output_dir": "out", "readiness": {"max_attempts": 3}}"#).unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("out"));
        assert_eq!(settings.readiness.max_attempts, 3);
        assert_eq!(settings.readiness.interval_ms, 16);
        assert_eq!(settings.log_filter, "pdftools=info");
    }

    #[test]
    fn test_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.json"));

        let missing = dir.path().join("missing.json");
        assert!(Settings::load(Some(&missing)).is_err());
    }
}
