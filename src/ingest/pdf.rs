//! PDF discovery and text extraction.

use super::types::{IngestError, SourceDocument};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Load every `*.pdf` directly inside `folder`, one document per page, in path then page order.
///
/// A missing folder or one without PDFs yields an empty vector. Files that fail to parse are
/// logged and skipped; pages with no extractable text are dropped.
pub async fn load_pdf_files(folder: &Path) -> Result<Vec<SourceDocument>, IngestError> {
    let paths = list_pdf_files(folder)?;
    if paths.is_empty() {
        tracing::warn!(folder = %folder.display(), "No PDF files found");
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    for path in paths {
        let pages = match extract_pages(path.clone()).await {
            Ok(pages) => pages,
            Err(error) => {
                tracing::warn!(file = %path.display(), error = %error, "Skipping unreadable PDF");
                continue;
            }
        };

        let source = path.display().to_string();
        let before = documents.len();
        for (index, text) in pages.into_iter().enumerate() {
            if !text.trim().is_empty() {
                documents.push(SourceDocument {
                    source: source.clone(),
                    page: index + 1,
                    text,
                });
            }
        }
        if documents.len() == before {
            tracing::warn!(file = %path.display(), "PDF has no extractable text");
        } else {
            tracing::debug!(
                file = %path.display(),
                pages = documents.len() - before,
                "Extracted PDF text"
            );
        }
    }

    Ok(documents)
}

/// List PDF paths directly inside `folder`, sorted by path.
pub fn list_pdf_files(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !folder.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| IngestError::Folder {
            path: folder.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

async fn extract_pages(path: PathBuf) -> Result<Vec<String>, String> {
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|error| format!("failed to read file: {error}"))?;
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|error| format!("extraction task failed: {error}"))?
        .map_err(|error| format!("PDF extraction error: {error}"))
}

/// Build a minimal Helvetica PDF with one text line per page.
#[cfg(test)]
pub(crate) fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let first_page = 4;
    let kids: Vec<String> = (0..pages.len())
        .map(|index| format!("{} 0 R", first_page + 2 * index))
        .collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (index, text) in pages.iter().enumerate() {
        let contents = first_page + 2 * index + 1;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {contents} 0 R >>"
        ));
        let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
    }
    let xref_offset = pdf.len();
    let mut trailer = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        trailer.push_str(&format!("{offset:010} 00000 n \n"));
    }
    trailer.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.extend_from_slice(trailer.as_bytes());
    pdf
}
