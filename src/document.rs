//! Input documents: routing by type, text extraction and output naming.

use crate::defaults;
use crate::error::{PlainvoiceError, Result};
use crate::simplify::normalize_extracted;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::process::Command;

#[allow(clippy::expect_used)]
static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| {
    // SAFETY: hardcoded pattern, always valid
    Regex::new(r"[^a-z0-9]+").expect("hardcoded filename pattern")
});

#[allow(clippy::expect_used)]
static DOC_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    // SAFETY: hardcoded pattern, always valid
    Regex::new(r"\.(pdf|md|markdown)$").expect("hardcoded suffix pattern")
});

/// Kind of input document, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Markdown,
}

impl InputKind {
    /// # Errors
    /// Returns `UnsupportedInput` for anything but `.pdf`, `.md` and `.markdown`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Ok(InputKind::Pdf),
            Some("md" | "markdown") => Ok(InputKind::Markdown),
            _ => Err(PlainvoiceError::UnsupportedInput {
                path: path.display().to_string(),
            }),
        }
    }
}

/// Turns a file name into a directory-safe slug.
///
/// Lowercases, drops a document extension, collapses every run of characters
/// outside `[a-z0-9]` into `_` and trims underscores at both ends.
pub fn sanitize_filename(name: &str) -> String {
    let lower = name.to_lowercase();
    let stem = DOC_SUFFIX.replace(&lower, "");
    NON_ALNUM
        .replace_all(&stem, "_")
        .trim_matches('_')
        .to_string()
}

/// Where one run writes its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub dir: PathBuf,
    pub original_md: PathBuf,
    pub simplified_md: PathBuf,
    pub audio: PathBuf,
}

impl OutputPaths {
    /// Default layout `<root>/<slug>/{original,simplified}.md` and
    /// `<root>/<slug>/simplified.mp3`, with explicit overrides for the two
    /// final artifacts.
    pub fn for_input(
        input: &Path,
        output_root: &Path,
        simplified_md: Option<PathBuf>,
        audio: Option<PathBuf>,
    ) -> Self {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let slug = match sanitize_filename(&name) {
            s if s.is_empty() => "document".to_string(),
            s => s,
        };
        let dir = output_root.join(slug);

        Self {
            original_md: dir.join("original.md"),
            simplified_md: simplified_md.unwrap_or_else(|| dir.join("simplified.md")),
            audio: audio.unwrap_or_else(|| dir.join("simplified.mp3")),
            dir,
        }
    }

    /// Creates the output directory and the parents of any overridden path.
    pub async fn create_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        for path in [&self.simplified_md, &self.audio] {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

/// Runs `pdftotext` to get the text of a PDF.
#[derive(Debug, Clone)]
pub struct PdfExtractor {
    program: OsString,
}

impl PdfExtractor {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Uses `PLAINVOICE_PDFTOTEXT` when set, `pdftotext` otherwise.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var_os(defaults::PDFTOTEXT_ENV)
                .unwrap_or_else(|| OsString::from(defaults::PDFTOTEXT)),
        )
    }

    /// # Errors
    /// Returns `Extraction` if the tool cannot be run, exits non-zero or
    /// prints something other than UTF-8.
    pub async fn extract(&self, pdf: &Path) -> Result<String> {
        let extraction_err = |message: String| PlainvoiceError::Extraction {
            path: pdf.display().to_string(),
            message,
        };

        let output = Command::new(&self.program)
            .args(["-enc", "UTF-8"])
            .arg(pdf)
            .arg("-")
            .output()
            .await
            .map_err(|e| {
                extraction_err(format!(
                    "failed to run {}: {e}",
                    self.program.to_string_lossy()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(extraction_err(format!(
                "{} exited with {}: {}",
                self.program.to_string_lossy(),
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| extraction_err(format!("output is not UTF-8: {e}")))
    }
}

/// Reads the input document as text.
///
/// PDF text is normalized and saved to `paths.original_md` so the extraction
/// can be inspected. Markdown is read as-is.
///
/// # Errors
/// `UnsupportedInput` for unknown types, `Extraction` when reading fails and
/// `EmptyDocument` when no text is left.
pub async fn load_document(
    input: &Path,
    paths: &OutputPaths,
    extractor: &PdfExtractor,
) -> Result<String> {
    let kind = InputKind::from_path(input)?;
    if !input.is_file() {
        return Err(PlainvoiceError::Extraction {
            path: input.display().to_string(),
            message: "file does not exist".to_string(),
        });
    }

    let text = match kind {
        InputKind::Pdf => {
            tracing::info!(input = %input.display(), "extracting PDF text");
            let text = normalize_extracted(&extractor.extract(input).await?);
            tokio::fs::write(&paths.original_md, &text).await?;
            tracing::info!(path = %paths.original_md.display(), "saved extracted text");
            text
        }
        InputKind::Markdown => tokio::fs::read_to_string(input).await.map_err(|e| {
            PlainvoiceError::Extraction {
                path: input.display().to_string(),
                message: e.to_string(),
            }
        })?,
    };

    if text.trim().is_empty() {
        return Err(PlainvoiceError::EmptyDocument {
            path: input.display().to_string(),
        });
    }
    Ok(text)
}
