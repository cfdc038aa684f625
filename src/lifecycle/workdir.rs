//! Working Directory Resolution
//!
//! Members keep their status files under a working directory that may be given
//! relative to the project root. The root is found by walking up from the
//! current directory until a directory containing the marker entry (a build
//! output folder such as `target`) shows up. If the walk finds nothing within
//! `max_depth` levels, the current directory is used instead.

use std::path::{Path, PathBuf};

use crate::config::WorkdirSettings;
use crate::error::GridError;

#[derive(Debug, Clone)]
pub struct WorkingDirectoryResolver {
    marker: String,
    max_depth: usize,
    base: Option<PathBuf>,
}

impl WorkingDirectoryResolver {
    pub fn new(marker: impl Into<String>, max_depth: usize) -> Self {
        Self {
            marker: marker.into(),
            max_depth,
            base: None,
        }
    }

    pub fn from_settings(settings: &WorkdirSettings) -> Self {
        Self::new(settings.marker.clone(), settings.max_depth)
    }

    /// Anchors the upward search at `base` instead of the process directory.
    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Resolves `path` and creates it if missing.
    pub fn resolve_and_ensure(&self, path: &str) -> Result<PathBuf, GridError> {
        let dir = self.resolve(path)?;
        ensure_directory(&dir)?;
        Ok(dir)
    }

    pub fn resolve(&self, path: &str) -> Result<PathBuf, GridError> {
        let requested = Path::new(path);
        if requested.is_absolute() {
            return Ok(requested.to_path_buf());
        }

        let current = match &self.base {
            Some(base) => base.clone(),
            None => std::env::current_dir().map_err(|e| {
                GridError::Configuration(format!("cannot read current directory: {}", e))
            })?,
        };

        let root = self.find_project_root(&current).unwrap_or(current);
        Ok(root.join(requested))
    }

    fn find_project_root(&self, start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .take(self.max_depth.saturating_add(1))
            .find(|dir| dir.join(&self.marker).exists())
            .map(Path::to_path_buf)
    }
}

impl Default for WorkingDirectoryResolver {
    fn default() -> Self {
        Self::from_settings(&WorkdirSettings::default())
    }
}

/// Creates every missing segment of `dir`. Safe to call repeatedly.
pub fn ensure_directory(dir: &Path) -> Result<(), GridError> {
    if dir.is_dir() {
        return Ok(());
    }
    if let Err(e) = std::fs::create_dir_all(dir)
        && !dir.is_dir()
    {
        return Err(GridError::Configuration(format!(
            "Failed to create working directory {}: {}",
            dir.display(),
            e
        )));
    }
    tracing::debug!("Created working directory {}", dir.display());
    Ok(())
}
