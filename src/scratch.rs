//! Per-request scratch files with guaranteed deletion.
//!
//! A [`ScratchFile`] deletes its path when dropped. Whoever owns the guard
//! decides when that happens: the input clip's guard lives in the generation
//! task, the output file's guard lives in the response body stream.

use crate::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};

const INPUT_PREFIX: &str = "chatterbox-in-";
const OUTPUT_PREFIX: &str = "chatterbox-out-";
const SUFFIX: &str = ".wav";

/// Where scratch files are created.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: PathBuf,
}

impl ScratchSpace {
    /// Scratch space rooted at `dir`, or the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` cannot be created.
    pub fn new(dir: Option<PathBuf>) -> Result<Self> {
        let dir = match dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir)?;
                dir
            }
            None => std::env::temp_dir(),
        };
        Ok(Self { dir })
    }

    /// Directory holding the scratch files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stage an uploaded reference clip.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written. Nothing is
    /// left behind on failure.
    pub fn stage_input(&self, bytes: &[u8]) -> Result<ScratchFile> {
        let file = self.create(INPUT_PREFIX)?;
        std::fs::write(file.path(), bytes)?;
        Ok(file)
    }

    /// Reserve an empty output file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn reserve_output(&self) -> Result<ScratchFile> {
        self.create(OUTPUT_PREFIX)
    }

    fn create(&self, prefix: &str) -> Result<ScratchFile> {
        let path = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(SUFFIX)
            .tempfile_in(&self.dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| e.error)?;
        Ok(ScratchFile { path })
    }
}

/// A uniquely named file that is removed on drop.
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed scratch file"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove scratch file"
            ),
        }
    }
}

impl fmt::Debug for ScratchFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScratchFile").field(&self.path).finish()
    }
}
