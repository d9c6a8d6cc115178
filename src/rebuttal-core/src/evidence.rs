//! Evidence documents supplied alongside a speech.

use std::fs;
use std::path::Path;

use crate::error::DebateError;

/// A named block of supporting evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceDocument {
    /// Display name, usually the file name.
    pub name: String,
    pub content: String,
}

impl EvidenceDocument {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read an evidence file. PDFs have their text extracted; anything
    /// else is read as UTF-8 text.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        let content = if is_pdf {
            tracing::debug!(%name, "Extracting text from PDF evidence");
            pdf_extract::extract_text(path)
                .map_err(|e| DebateError::Evidence(format!("{name}: unreadable PDF: {e}")))?
        } else {
            fs::read_to_string(path).map_err(|e| DebateError::Evidence(format!("{name}: {e}")))?
        };

        if content.trim().is_empty() {
            let what = if is_pdf { "PDF has no extractable text" } else { "file is empty" };
            return Err(DebateError::Evidence(format!("{name}: {what}")));
        }

        Ok(Self::new(name, content))
    }
}

/// Load every evidence file, skipping duplicates by file name.
pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<EvidenceDocument>, DebateError> {
    let mut documents: Vec<EvidenceDocument> = Vec::new();
    for path in paths {
        let document = EvidenceDocument::load(path)?;
        if documents.iter().any(|d| d.name == document.name) {
            tracing::warn!(name = %document.name, "Skipping duplicate evidence file");
            continue;
        }
        documents.push(document);
    }
    Ok(documents)
}

/// Render documents as one labelled block for a prompt.
pub fn render(documents: &[EvidenceDocument]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, d)| format!("[Evidence {} - {}]\n{}", i + 1, d.name, d.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
