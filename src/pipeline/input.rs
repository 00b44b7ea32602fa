//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! URLs are downloaded into a `TempDir` that lives as long as the returned
//! [`ResolvedInput`]. The format is sniffed here so extraction never has to
//! guess: `%PDF` magic bytes mean a PDF, a `.txt` extension means a
//! plain-text transcript with form-feed page breaks.

use crate::error::TocError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Transcript container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    /// UTF-8 text, pages separated by form feeds (`\x0c`).
    Text,
}

/// The resolved input: either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local { path: PathBuf, format: SourceFormat },
    /// Input was a URL; the file was downloaded to a temp directory that is
    /// kept alive until processing completes.
    Downloaded {
        path: PathBuf,
        format: SourceFormat,
        _temp_dir: TempDir,
    },
}

impl ResolvedInput {
    /// Path to the transcript regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local { path, .. } => path,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    pub fn format(&self) -> SourceFormat {
        match self {
            ResolvedInput::Local { format, .. } => *format,
            ResolvedInput::Downloaded { format, .. } => *format,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local transcript file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, TocError> {
    if input.trim().is_empty() {
        return Err(TocError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Decide the format from the first bytes and the file extension.
fn sniff_format(path: &Path, head: &[u8]) -> Option<SourceFormat> {
    if head.starts_with(b"%PDF") {
        return Some(SourceFormat::Pdf);
    }
    let is_txt = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
    if is_txt {
        Some(SourceFormat::Text)
    } else {
        None
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, TocError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(TocError::FileNotFound { path });
    }

    let mut head = [0u8; 4];
    let read = match std::fs::File::open(&path) {
        Ok(mut f) => f.read(&mut head).unwrap_or(0),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(TocError::PermissionDenied { path });
        }
        Err(_) => return Err(TocError::FileNotFound { path }),
    };

    let format =
        sniff_format(&path, &head[..read]).ok_or_else(|| TocError::UnsupportedFormat {
            path: path.clone(),
        })?;

    debug!("Resolved local transcript: {} ({:?})", path.display(), format);
    Ok(ResolvedInput::Local { path, format })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, TocError> {
    info!("Downloading transcript from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TocError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TocError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            TocError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(TocError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| TocError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| TocError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let format = sniff_format(&file_path, &bytes[..bytes.len().min(4)]).ok_or_else(|| {
        TocError::UnsupportedFormat {
            path: file_path.clone(),
        }
    })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| TocError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        format,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
