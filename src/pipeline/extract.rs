//! Raw page text extraction.
//!
//! Produces one `Option<String>` per source page, 1-indexed by position:
//! `None` marks a page with no extractable text. Nothing here interprets the
//! text; that is the normaliser's job.
//!
//! PDF text comes from pdfium's text layer. pdfium keeps thread-local state
//! and is not async-safe, so all calls run inside `spawn_blocking`.

use crate::error::TocError;
use crate::pipeline::input::SourceFormat;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Page break in plain-text transcripts.
pub const FORM_FEED: char = '\x0c';

/// Extract the raw text of every page of a transcript.
pub async fn extract_pages(
    path: &Path,
    format: SourceFormat,
    password: Option<&str>,
) -> Result<Vec<Option<String>>, TocError> {
    match format {
        SourceFormat::Text => {
            let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    TocError::UnsupportedFormat {
                        path: path.to_path_buf(),
                    }
                } else {
                    TocError::FileNotFound {
                        path: path.to_path_buf(),
                    }
                }
            })?;
            Ok(split_text_pages(&text))
        }
        SourceFormat::Pdf => {
            let path = path.to_path_buf();
            let password = password.map(|s| s.to_string());
            tokio::task::spawn_blocking(move || extract_pdf_blocking(&path, password.as_deref()))
                .await
                .map_err(|e| TocError::Internal(format!("Extraction task panicked: {}", e)))?
        }
    }
}

/// Split a plain-text transcript on form feeds.
///
/// A single trailing form feed does not create an extra page.
pub fn split_text_pages(text: &str) -> Vec<Option<String>> {
    let text = text.strip_suffix(FORM_FEED).unwrap_or(text);
    text.split(FORM_FEED)
        .map(|page| {
            if page.trim().is_empty() {
                None
            } else {
                Some(page.to_string())
            }
        })
        .collect()
}

/// Bind pdfium from `PDFIUM_LIB_PATH` when set, otherwise from the system
/// library search path.
fn bind_pdfium() -> Result<Pdfium, TocError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.is_empty() => Pdfium::bind_to_library(&p),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| TocError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn extract_pdf_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<Vec<Option<String>>, TocError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                TocError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                TocError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            TocError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut texts = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = match page.text() {
            Ok(t) => {
                let all = t.all();
                if all.trim().is_empty() {
                    None
                } else {
                    Some(all)
                }
            }
            Err(e) => {
                debug!("Page {}: text layer unavailable: {:?}", idx + 1, e);
                None
            }
        };
        texts.push(text);
    }

    Ok(texts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_feeds_split_pages() {
        let pages = split_text_pages("1 first\x0c\x0c1 third\x0c");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].as_deref(), Some("1 first"));
        assert_eq!(pages[1], None);
        assert_eq!(pages[2].as_deref(), Some("1 third"));
    }

    #[test]
    fn text_without_breaks_is_one_page() {
        let pages = split_text_pages("1 only page\n2 second line");
        assert_eq!(pages.len(), 1);
    }

    #[tokio::test]
    async fn reads_text_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depo.txt");
        std::fs::write(&path, "1 a\x0c1 b").unwrap();

        let pages = extract_pages(&path, SourceFormat::Text, None).await.unwrap();
        assert_eq!(pages.len(), 2);
    }
}
