//! Input resolution: turn the caller's path-or-URL string into a local file
//! pdfium can open.
//!
//! pdfium only reads from the filesystem, so URL inputs are staged into a
//! `TempDir` whose lifetime is tied to the returned handle; dropping the
//! handle removes the download even on panic. Both paths validate the
//! `%PDF` magic before anything downstream touches the file, so a
//! mislabelled upload surfaces as a targeted error instead of a renderer
//! failure deep in the pipeline.

use crate::error::PlanVisionError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A document staged on the local filesystem.
pub enum ResolvedInput {
    /// The caller's own file; never deleted by us.
    Local(PathBuf),
    /// A download staged in a temp directory that is removed on drop.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Filesystem path of the document, however it arrived.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// True when the input names a remote document.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Stage the caller's input locally: validate a path, or download a URL.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
) -> Result<ResolvedInput, PlanVisionError> {
    if is_url(input) {
        fetch_remote(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, PlanVisionError> {
    let path = PathBuf::from(path_str);

    let mut file = std::fs::File::open(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => PlanVisionError::PermissionDenied {
            path: path.clone(),
        },
        _ => PlanVisionError::FileNotFound { path: path.clone() },
    })?;

    let mut head = [0u8; 4];
    let n = file.read(&mut head).unwrap_or(0);
    ensure_pdf_magic(&head[..n], &path)?;

    debug!("Resolved local document: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Reject anything whose first bytes are not `%PDF`. A file shorter than the
/// magic cannot be a PDF either; whatever bytes were present end up in the
/// error for diagnosis.
fn ensure_pdf_magic(head: &[u8], path: &Path) -> Result<(), PlanVisionError> {
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);

    if &magic == PDF_MAGIC {
        Ok(())
    } else {
        Err(PlanVisionError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        })
    }
}

async fn fetch_remote(url: &str, timeout_secs: u64) -> Result<ResolvedInput, PlanVisionError> {
    info!("Downloading document from: {}", url);

    let failed = |reason: String| PlanVisionError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PlanVisionError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("HTTP {status}")));
    }

    let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let staging =
        TempDir::new().map_err(|e| PlanVisionError::Internal(format!("temp dir: {e}")))?;
    let file_path = staging.path().join(remote_filename(url));

    // Validate before writing so a bad payload never reaches a file pdfium
    // would then choke on.
    ensure_pdf_magic(&body, &file_path)?;

    tokio::fs::write(&file_path, &body)
        .await
        .map_err(|e| PlanVisionError::Internal(format!("staging download: {e}")))?;

    info!("Downloaded to: {}", file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: staging,
    })
}

/// Last path segment of the URL when it looks like a filename, otherwise a
/// fixed default. Only affects the staged file's name, never its content.
fn remote_filename(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path()
                .rsplit('/')
                .next()
                .filter(|seg| seg.contains('.'))
                .map(str::to_string)
        })
        .unwrap_or_else(|| "document.pdf".into())
}
