//! Fetches function code archives and extracts them into invocation-scoped directories

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, warn};
use tokio::io::AsyncWriteExt;

use crate::error::{InvokeError, Result};
use crate::types::InvocationId;

const FALLBACK_ARCHIVE_NAME: &str = "code.tar.gz";

/// Working directory of one invocation.
///
/// Call [`WorkingDir::remove`] once done with it; the tree is deleted on the blocking pool. A
/// guard dropped without `remove` (e.g. a cancelled invocation) hands the deletion to the
/// blocking pool of the current runtime.
#[derive(Debug)]
pub struct WorkingDir {
    path: PathBuf,
    keep: bool,
    released: bool,
}

impl WorkingDir {
    fn new(path: PathBuf, keep: bool) -> Self {
        Self {
            path,
            keep,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the directory tree without blocking the async runtime
    pub async fn remove(mut self) {
        self.released = true;
        if self.keep {
            debug!("Keeping working directory {}", self.path.display());
            return;
        }

        let path = std::mem::take(&mut self.path);
        if let Err(e) = tokio::task::spawn_blocking(move || remove_tree(&path)).await {
            warn!("Working directory removal task failed: {e}");
        }
    }
}

impl Drop for WorkingDir {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.keep {
            debug!("Keeping working directory {}", self.path.display());
            return;
        }

        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_tree(&path));
            }
            Err(_) => remove_tree(&path),
        }
    }
}

fn remove_tree(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => debug!("Removed working directory {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove working directory {}: {e}", path.display()),
    }
}

/// Downloads code archives and unpacks them under a staging root
#[derive(Debug, Clone)]
pub struct Stager {
    client: reqwest::Client,
    staging_root: PathBuf,
    keep_workdirs: bool,
}

impl Stager {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            staging_root: staging_root.into(),
            keep_workdirs: false,
        }
    }

    /// Retain working directories after invocations instead of removing them
    #[must_use]
    pub fn keep_workdirs(mut self, keep: bool) -> Self {
        self.keep_workdirs = keep;
        self
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Working directory of an invocation; depends on the id only
    pub fn workdir_path(&self, id: &InvocationId) -> PathBuf {
        self.staging_root.join(id.as_str())
    }

    /// Download the archive at `code_url` and extract it into the invocation's working directory
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::CodeDownload`] if the archive cannot be fetched and
    /// [`InvokeError::ArchiveExtraction`] if it cannot be unpacked.
    pub async fn fetch_and_extract(&self, code_url: &str, id: &InvocationId) -> Result<WorkingDir> {
        let download_failed = |reason: String| InvokeError::CodeDownload {
            url: code_url.to_string(),
            reason,
        };

        debug!("[{id}] Downloading function code from {code_url}");

        tokio::fs::create_dir_all(&self.staging_root)
            .await
            .map_err(|e| download_failed(format!("cannot create staging root: {e}")))?;

        // Scratch space for the archive itself, gone once extraction is over
        let scratch = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(&self.staging_root)
            .map_err(|e| download_failed(format!("cannot create download directory: {e}")))?;

        let archive_name = archive_file_name(code_url);
        let archive_path = scratch.path().join(&archive_name);
        if let Err(reason) = self.download(code_url, &archive_path).await {
            let _ = tokio::task::spawn_blocking(move || scratch.close()).await;
            return Err(download_failed(reason));
        }

        let workdir = WorkingDir::new(self.workdir_path(id), self.keep_workdirs);
        let destination = workdir.path().to_path_buf();
        let top_level = top_level_dir(&archive_name).to_string();

        // The scratch directory goes away on the blocking thread too
        let extracted = tokio::task::spawn_blocking(move || {
            let extracted = extract_archive(&archive_path, &destination, &top_level);
            drop(scratch);
            extracted
        })
        .await
        .map_err(|e| InvokeError::ArchiveExtraction(format!("extraction task failed: {e}")))
        .and_then(|extracted| extracted);

        if let Err(e) = extracted {
            workdir.remove().await;
            return Err(e);
        }

        debug!("[{id}] Function code extracted into {}", workdir.path().display());
        Ok(workdir)
    }

    async fn download(&self, url: &str, destination: &Path) -> std::result::Result<(), String> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| e.to_string())?;

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| format!("cannot create {}: {e}", destination.display()))?;

        while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("cannot write {}: {e}", destination.display()))?;
        }
        file.flush().await.map_err(|e| e.to_string())?;

        Ok(())
    }
}

/// Base file name of the archive referenced by `code_url`
fn archive_file_name(code_url: &str) -> String {
    let name = match url::Url::parse(code_url) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string)),
        Err(_) => code_url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next().map(str::to_string)),
    };

    name.filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| FALLBACK_ARCHIVE_NAME.to_string())
}

/// Archive's top-level directory, i.e. the file name up to its first `.`
fn top_level_dir(archive_name: &str) -> &str {
    archive_name.split('.').next().unwrap_or(archive_name)
}

fn extraction_failed(e: impl std::fmt::Display) -> InvokeError {
    InvokeError::ArchiveExtraction(e.to_string())
}

/// Map an archive entry path to a path relative to the working directory.
///
/// Returns `None` for the top-level directory entry itself.
fn relative_entry_path(entry: &Path, top_level: &str) -> Result<Option<PathBuf>> {
    let mut relative = PathBuf::new();
    let mut leading = true;

    for component in entry.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                if !(leading && part == top_level) {
                    relative.push(part);
                }
                leading = false;
            }
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(extraction_failed(format!(
                    "entry {} escapes the working directory",
                    entry.display()
                )));
            }
        }
    }

    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}

/// Unpack a gzip-compressed tar archive into `destination`, dropping its top-level directory
fn extract_archive(archive: &Path, destination: &Path, top_level: &str) -> Result<()> {
    let file = File::open(archive).map_err(extraction_failed)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

    fs::create_dir_all(destination).map_err(extraction_failed)?;

    for entry in archive.entries().map_err(extraction_failed)? {
        let mut entry = entry.map_err(extraction_failed)?;
        let entry_path = entry.path().map_err(extraction_failed)?.into_owned();

        let Some(relative) = relative_entry_path(&entry_path, top_level)? else {
            continue;
        };
        let target = destination.join(relative);
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            fs::create_dir_all(&target).map_err(extraction_failed)?;
        } else if entry_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(extraction_failed)?;
            }
            let mode = entry.header().mode().map_err(extraction_failed)?;
            let mut out = create_file(&target, mode).map_err(extraction_failed)?;
            io::copy(&mut entry, &mut out).map_err(extraction_failed)?;
            // `out` closes here, before the next entry is read
        } else {
            debug!("Skipping archive entry {} ({entry_type:?})", entry_path.display());
        }
    }

    Ok(())
}

#[cfg(unix)]
fn create_file(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn create_file(path: &Path, _mode: u32) -> io::Result<File> {
    File::create(path)
}
