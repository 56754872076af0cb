//! PDF text extraction
//!
//! Thin wrapper around `pdf-extract` plus the upload-side validation that
//! keeps non-PDF content out of the ingestion pipeline. Extracted text is
//! normalized so the chunker sees clean paragraph boundaries.

use crate::error::{BotError, Result};
use regex::Regex;
use std::path::Path;

/// Extract plain text from PDF bytes, normalized for chunking
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    let raw = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| BotError::Pdf(format!("Failed to extract text: {}", e)))?;
    Ok(normalize_text(&raw))
}

/// Normalize extracted text: unify line endings, trim trailing whitespace per
/// line, and collapse runs of blank lines into a single paragraph break
fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let trimmed = unified
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    let blank_runs = Regex::new(r"\n{3,}").expect("static regex");
    blank_runs.replace_all(&trimmed, "\n\n").trim().to_string()
}

/// Validate that an uploaded filename refers to a PDF
///
/// Only PDF uploads are supported; anything else is rejected before it
/// reaches the ingestion pipeline.
pub fn validate_pdf_filename(filename: &str) -> Result<()> {
    let is_pdf = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        Ok(())
    } else {
        Err(BotError::Validation(
            "Only PDF files are supported".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pdf_filename() {
        assert!(validate_pdf_filename("manual.pdf").is_ok());
        assert!(validate_pdf_filename("MANUAL.PDF").is_ok());
        assert!(validate_pdf_filename("notes.txt").is_err());
        assert!(validate_pdf_filename("no_extension").is_err());
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let result = extract_pdf_text(b"this is not a pdf");
        assert!(matches!(result, Err(BotError::Pdf(_))));
    }

    #[test]
    fn test_normalize_collapses_blank_runs() {
        let text = "para one\r\n\r\n\r\n\r\npara two  \n\n\npara three";
        assert_eq!(
            normalize_text(text),
            "para one\n\npara two\n\npara three"
        );
    }

    #[test]
    fn test_normalize_keeps_single_paragraph_break() {
        assert_eq!(normalize_text("a\n\nb"), "a\n\nb");
        assert_eq!(normalize_text("a\nb"), "a\nb");
    }
}
