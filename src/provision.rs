//! Packaging model artifacts for offline deployment.
//!
//! Each repository is taken from the local hub cache when a snapshot exists,
//! otherwise fetched into that cache first. The chosen snapshot's files are
//! then copied flat into `output_dir/<model dir>`. The Chinese segmentation
//! resources are staged separately into `output_dir/pkuseg`.
//!
//! Failures here never abort a packaging run: the caller moves on to the next
//! model and reports what is missing at the end.

use crate::model::ModelType;
use crate::startup::SEGMENTER_DIR;
use hf_hub::Cache;
use hf_hub::api::sync::ApiBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;
use tracing::{info, warn};

/// Errors raised while packaging one model.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// No usable snapshot in the local cache.
    #[error("{repo_id} not found in cache: {reason}")]
    NotFound {
        /// Repository id.
        repo_id: String,
        /// What was missing.
        reason: String,
    },

    /// Fetching from the hub failed.
    #[error("download of {repo_id} failed: {message}")]
    DownloadFailed {
        /// Repository id.
        repo_id: String,
        /// Underlying error.
        message: String,
    },

    /// Copying files failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hub cache root: `HUGGINGFACE_HUB_CACHE`, else `HF_HOME/hub`, else
/// `~/.cache/huggingface/hub`.
pub fn hub_cache_root<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    if let Some(dir) = get("HUGGINGFACE_HUB_CACHE") {
        return PathBuf::from(dir);
    }
    if let Some(home) = get("HF_HOME") {
        return PathBuf::from(home).join("hub");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("huggingface")
        .join("hub")
}

/// Cache directory name for a repository: `models--org--name`.
pub fn cache_key(repo_id: &str) -> String {
    format!("models--{}", repo_id.replace('/', "--"))
}

/// Newest snapshot of `repo_id` under `cache_root`.
///
/// Newest means latest modification time; equal times resolve to the
/// greatest directory name.
///
/// # Errors
///
/// [`ProvisionError::NotFound`] when the repository, its `snapshots/`
/// directory, or any snapshot is missing.
pub fn find_snapshot(cache_root: &Path, repo_id: &str) -> Result<PathBuf, ProvisionError> {
    let not_found = |reason: String| ProvisionError::NotFound {
        repo_id: repo_id.to_owned(),
        reason,
    };

    let repo_dir = cache_root.join(cache_key(repo_id));
    if !repo_dir.is_dir() {
        return Err(not_found(format!("no cache directory {}", repo_dir.display())));
    }
    let snapshots_dir = repo_dir.join("snapshots");
    if !snapshots_dir.is_dir() {
        return Err(not_found(format!(
            "no snapshots directory {}",
            snapshots_dir.display()
        )));
    }

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(&snapshots_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let mtime = std::fs::metadata(&path)?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let newer = match &best {
            None => true,
            Some((best_time, best_path)) => {
                (mtime, path.file_name()) > (*best_time, best_path.file_name())
            }
        };
        if newer {
            best = Some((mtime, path));
        }
    }

    best.map(|(_, path)| path).ok_or_else(|| {
        not_found(format!(
            "snapshots directory {} is empty",
            snapshots_dir.display()
        ))
    })
}

/// Copy the regular files directly inside `source` into `target`.
///
/// Symlinks are followed, so blob-backed snapshot entries become real files.
/// Returns the number of files copied.
///
/// # Errors
///
/// Returns an error if `source` cannot be read or a copy fails.
pub fn copy_flat(source: &Path, target: &Path) -> Result<usize, ProvisionError> {
    std::fs::create_dir_all(target)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(source)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        info!(file = %name.to_string_lossy(), "copying");
        std::fs::copy(&path, target.join(name))?;
        copied += 1;
    }
    info!(count = copied, target = %target.display(), "copied model files");
    Ok(copied)
}

/// Recursively copy `source` into `target`, merging with existing content.
///
/// # Errors
///
/// Returns an error if any directory or file cannot be copied.
pub fn copy_tree(source: &Path, target: &Path) -> Result<usize, ProvisionError> {
    std::fs::create_dir_all(target)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(source)? {
        let path = entry?.path();
        let dest = target.join(entry_name(&path));
        if path.is_dir() {
            copied += copy_tree(&path, &dest)?;
        } else if path.is_file() {
            std::fs::copy(&path, &dest)?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn entry_name(path: &Path) -> &std::ffi::OsStr {
    path.file_name().unwrap_or(path.as_os_str())
}

/// Fetch every file of `repo_id` into `cache_root`, returning the snapshot directory.
///
/// # Errors
///
/// [`ProvisionError::DownloadFailed`] on any hub or network failure.
pub fn download_snapshot(
    cache_root: &Path,
    repo_id: &str,
    token: Option<String>,
) -> Result<PathBuf, ProvisionError> {
    let failed = |message: String| ProvisionError::DownloadFailed {
        repo_id: repo_id.to_owned(),
        message,
    };

    let cache = Cache::new(cache_root.to_path_buf());
    let api = ApiBuilder::from_cache(cache.clone())
        .with_token(token)
        .build()
        .map_err(|e| failed(format!("failed to create HF API: {e}")))?;
    let repo = api.model(repo_id.to_owned());
    let repo_info = repo
        .info()
        .map_err(|e| failed(format!("failed to get repo info: {e}")))?;

    let mut snapshot = None;
    for sibling in &repo_info.siblings {
        let filename = &sibling.rfilename;
        if let Some(path) = cache.model(repo_id.to_owned()).get(filename) {
            println!("  {repo_id}/{filename}  [cached]");
            snapshot.get_or_insert(path);
            continue;
        }

        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "  {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
        ) {
            pb.set_style(style);
        }
        pb.set_message(format!("{repo_id}/{filename}"));

        let path = repo
            .download_with_progress(filename, pb)
            .map_err(|e| failed(format!("failed to download {filename}: {e}")))?;
        snapshot.get_or_insert(path);
    }

    let by_sha = cache_root
        .join(cache_key(repo_id))
        .join("snapshots")
        .join(&repo_info.sha);
    if by_sha.is_dir() {
        return Ok(by_sha);
    }
    // Fall back to the directory of the first file, minus any subdirectory.
    snapshot
        .as_deref()
        .and_then(|p| {
            p.ancestors()
                .find(|a| a.parent().is_some_and(|pp| pp.ends_with("snapshots")))
        })
        .map(Path::to_path_buf)
        .ok_or_else(|| failed("repository has no files".to_owned()))
}

/// Result of packaging one model.
#[derive(Debug, Clone)]
pub struct PackagedModel {
    /// Variant.
    pub model_type: ModelType,
    /// Snapshot the files came from.
    pub snapshot: PathBuf,
    /// Directory the files were copied into.
    pub target: PathBuf,
    /// Number of files copied.
    pub files: usize,
    /// Whether the snapshot had to be downloaded first.
    pub downloaded: bool,
}

/// Packaging settings.
#[derive(Debug, Clone)]
pub struct Provisioner {
    /// Hub cache root.
    pub cache_root: PathBuf,
    /// Output base directory (becomes `MODELS_DIR` on the target host).
    pub output_dir: PathBuf,
    /// Hub token (`HF_TOKEN`).
    pub token: Option<String>,
    /// Fetch missing repositories from the hub.
    pub allow_download: bool,
}

impl Provisioner {
    /// Package `model_type` from `repo_id` into `output_dir/<dir_name>`.
    ///
    /// # Errors
    ///
    /// [`ProvisionError::NotFound`] when not cached and downloads are disabled,
    /// [`ProvisionError::DownloadFailed`] when the fetch fails,
    /// [`ProvisionError::Io`] when copying fails.
    pub fn package_model(
        &self,
        model_type: ModelType,
        repo_id: &str,
    ) -> Result<PackagedModel, ProvisionError> {
        let (snapshot, downloaded) = match find_snapshot(&self.cache_root, repo_id) {
            Ok(snapshot) => {
                info!(
                    model_type = %model_type,
                    snapshot = %snapshot.display(),
                    "found cached snapshot"
                );
                (snapshot, false)
            }
            Err(ProvisionError::NotFound { reason, .. }) if self.allow_download => {
                warn!(model_type = %model_type, %reason, "not cached, downloading");
                (
                    download_snapshot(&self.cache_root, repo_id, self.token.clone())?,
                    true,
                )
            }
            Err(e) => return Err(e),
        };

        let target = self.output_dir.join(model_type.dir_name());
        let files = copy_flat(&snapshot, &target)?;
        Ok(PackagedModel {
            model_type,
            snapshot,
            target,
            files,
            downloaded,
        })
    }

    /// Stage segmentation resources from `source` into `output_dir/pkuseg`.
    ///
    /// When `source` is missing and `python` is given, the interpreter is asked
    /// to fetch the resources first. Returns `None` (after a warning) when
    /// nothing could be staged.
    pub fn stage_segmenter(&self, source: &Path, python: Option<&str>) -> Option<PathBuf> {
        if !source.is_dir() {
            warn!(path = %source.display(), "segmenter resources missing");
            if let Some(python) = python {
                fetch_segmenter(python);
            }
        }
        if !source.is_dir() {
            warn!("segmenter resources unavailable; Chinese word segmentation may not work");
            return None;
        }

        let target = self.output_dir.join(SEGMENTER_DIR);
        match copy_tree(source, &target) {
            Ok(files) => {
                info!(files, target = %target.display(), "staged segmenter resources");
                Some(target)
            }
            Err(e) => {
                warn!(error = %e, "failed to stage segmenter resources");
                None
            }
        }
    }
}

/// Default segmenter resource location: `~/.pkuseg`.
pub fn default_segmenter_source() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pkuseg")
}

fn fetch_segmenter(python: &str) {
    info!(python, "asking python to fetch segmenter resources");
    let status = Command::new(python)
        .arg("-c")
        .arg("from spacy_pkuseg import pkuseg; pkuseg()")
        .status();
    match status {
        Ok(s) if s.success() => info!("segmenter resources fetched"),
        Ok(s) => warn!(status = %s, "segmenter fetch failed"),
        Err(e) => warn!(error = %e, "could not run python to fetch segmenter"),
    }
}
