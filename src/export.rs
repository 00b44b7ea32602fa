//! Renderings of the finished table and atomic file output.
//!
//! | Format | Extension | Shape |
//! |--------|-----------|-------|
//! | `Json` | `.json` | `[{"topic", "page_start", "line_start"}, …]` |
//! | `Markdown` | `.md` | `# Table of Contents` + `- **topic** (Page p, Line l)` |
//! | `Text` | `.txt` | `topic ··· Page p · Line l` |
//! | `Docx` | `.docx` | "Table of Contents" heading + one paragraph per topic |
//!
//! All artifacts of one run share a base name and differ only by extension.

use crate::error::TocError;
use crate::output::TocEntry;
use docx_rs::{Docx, Paragraph, Run, Style, StyleType};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// An output rendering of the table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
    Text,
    Docx,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Json,
        ExportFormat::Docx,
        ExportFormat::Markdown,
        ExportFormat::Text,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
            ExportFormat::Text => "txt",
            ExportFormat::Docx => "docx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "txt" | "text" => Ok(ExportFormat::Text),
            "docx" | "word" => Ok(ExportFormat::Docx),
            other => Err(format!(
                "unknown format '{other}' (expected json, docx, md or txt)"
            )),
        }
    }
}

/// Render the table in one format, as the bytes of the output file.
pub fn render(entries: &[TocEntry], format: ExportFormat) -> Result<Vec<u8>, TocError> {
    match format {
        ExportFormat::Json => render_json(entries).map(String::into_bytes),
        ExportFormat::Markdown => Ok(render_markdown(entries).into_bytes()),
        ExportFormat::Text => Ok(render_text(entries).into_bytes()),
        ExportFormat::Docx => render_docx(entries),
    }
}

pub fn render_json(entries: &[TocEntry]) -> Result<String, TocError> {
    let mut json = serde_json::to_string_pretty(entries)
        .map_err(|e| TocError::Internal(format!("Failed to serialise entries: {e}")))?;
    json.push('\n');
    Ok(json)
}

pub fn render_markdown(entries: &[TocEntry]) -> String {
    let mut out = String::from("# Table of Contents\n\n");
    for e in entries {
        out.push_str(&format!(
            "- **{}** (Page {}, Line {})\n",
            e.label, e.page_start, e.line_start
        ));
    }
    out
}

pub fn render_text(entries: &[TocEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{} ··· Page {} · Line {}\n", e.label, e.page_start, e.line_start))
        .collect()
}

const HEADING_STYLE: &str = "Heading1";

/// Word document: a level-1 heading, then `**topic:** Page p, Line l` per entry.
pub fn render_docx(entries: &[TocEntry]) -> Result<Vec<u8>, TocError> {
    let heading = Style::new(HEADING_STYLE, StyleType::Paragraph)
        .name("Heading 1")
        .size(32)
        .bold();

    let mut doc = Docx::new().add_style(heading).add_paragraph(
        Paragraph::new()
            .style(HEADING_STYLE)
            .add_run(Run::new().add_text("Table of Contents")),
    );
    for e in entries {
        doc = doc.add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(format!("{}: ", e.label)).bold())
                .add_run(Run::new().add_text(format!(
                    "Page {}, Line {}",
                    e.page_start, e.line_start
                ))),
        );
    }

    let mut buf = std::io::Cursor::new(Vec::new());
    doc.build()
        .pack(&mut buf)
        .map_err(|e| TocError::Internal(format!("Failed to build DOCX: {e}")))?;
    Ok(buf.into_inner())
}

/// `<base>.<ext>`, keeping any dots already in the base name.
pub fn output_path(base: &Path, format: ExportFormat) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

/// Write every requested rendering next to `base`.
///
/// Each file is written to a temp path and renamed into place, so a failed
/// run never leaves a partial artifact. Duplicate formats are written once.
pub async fn write_outputs(
    entries: &[TocEntry],
    base: &Path,
    formats: &[ExportFormat],
) -> Result<Vec<PathBuf>, TocError> {
    let mut written = Vec::with_capacity(formats.len());
    let mut seen = Vec::with_capacity(formats.len());

    for &format in formats {
        if seen.contains(&format) {
            continue;
        }
        seen.push(format);

        let path = output_path(base, format);
        let body = render(entries, format)?;
        write_atomic(&path, &body).await?;
        info!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TocError> {
    let fail = |source| TocError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);

    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    Ok(())
}
