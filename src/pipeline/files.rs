//! Filename enumeration over a training folder.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DatasetResult, PipelineError};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// List image files under `dir`, sorted lexicographically.
///
/// The sort keeps enumeration order stable across runs, which the split
/// selector relies on: a file's position in this list decides which split
/// it lands in.
pub fn list_images(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| PipelineError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(PipelineError::EmptyDataset(dir.to_path_buf()));
    }
    paths.sort();
    Ok(paths)
}

/// Number of image files under `dir`. Used to size epochs.
pub fn image_count(dir: &Path) -> DatasetResult<usize> {
    Ok(list_images(dir)?.len())
}

/// Lazy stream over an enumerated file list.
///
/// With `indefinite` set the stream restarts from the beginning when
/// exhausted, so a fixed-steps-per-epoch training loop can pull from it
/// forever.
pub struct FilenameStream {
    paths: Vec<PathBuf>,
    cursor: usize,
    indefinite: bool,
}

impl FilenameStream {
    pub fn new(dir: &Path, indefinite: bool) -> DatasetResult<Self> {
        Ok(FilenameStream {
            paths: list_images(dir)?,
            cursor: 0,
            indefinite,
        })
    }

    pub fn from_paths(paths: Vec<PathBuf>, indefinite: bool) -> Self {
        FilenameStream {
            paths,
            cursor: 0,
            indefinite,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Iterator for FilenameStream {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        if self.paths.is_empty() {
            return None;
        }
        if self.cursor >= self.paths.len() {
            if !self.indefinite {
                return None;
            }
            self.cursor = 0;
        }
        let item = self.paths[self.cursor].clone();
        self.cursor += 1;
        Some(item)
    }
}
