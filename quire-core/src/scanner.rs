use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::site::SourceKind;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Page(SourceKind),
    Asset,
}

/// A file found under the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the source root
    pub relative: PathBuf,
    pub kind: FileKind,
}

pub struct SiteScanner {
    source_dir: PathBuf,
    excluded: Vec<PathBuf>,
}

impl SiteScanner {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            source_dir: path.as_ref().to_path_buf(),
            excluded: Vec::new(),
        }
    }

    /// Leave `path`, or everything under it, out of the scan. Paths that do
    /// not exist are ignored.
    pub fn exclude<P: AsRef<Path>>(mut self, path: P) -> Self {
        if let Ok(path) = path.as_ref().canonicalize() {
            self.excluded.push(path);
        }
        self
    }

    /// Every file under the source root, in walk order: entries sorted by
    /// file name at each level, hidden entries skipped.
    pub fn scan(&self) -> Result<Vec<SourceFile>, ScanError> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = entry.map_err(|source| ScanError::Walk {
                path: self.source_dir.clone(),
                source,
            })?;
            if !entry.file_type().is_file() || self.is_excluded(entry.path()) {
                continue;
            }

            let path = entry.into_path();
            let relative = path
                .strip_prefix(&self.source_dir)
                .map_err(|_| ScanError::InvalidPath(path.clone()))?
                .to_path_buf();
            let kind = match SourceKind::from_path(&path) {
                Some(kind) => FileKind::Page(kind),
                None => FileKind::Asset,
            };

            debug!("Discovered {:?}: {}", kind, relative.display());
            files.push(SourceFile {
                path,
                relative,
                kind,
            });
        }

        Ok(files)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.excluded.is_empty() {
            return false;
        }
        path.canonicalize()
            .map(|path| self.excluded.iter().any(|excluded| path.starts_with(excluded)))
            .unwrap_or(false)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
