//! Payload handling: base64 → PDF bytes → temporary `.pdf` file.
//!
//! ## Why a temp file?
//!
//! pdfium requires a file-system path; it cannot read from a byte buffer.
//! [`StagedPdf`] owns a [`tempfile::NamedTempFile`], so the file is removed
//! when the guard is dropped: after a successful conversion, after a failed
//! one, and while unwinding from a panic. We validate the PDF magic bytes
//! (`%PDF`) before staging so callers get a meaningful error rather than a
//! pdfium failure.

use crate::error::JobError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Prefix some clients put in front of the payload.
const DATA_URI_PREFIX: &str = "data:application/pdf;base64,";

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Decode a base64 PDF payload.
///
/// ASCII whitespace is skipped (MIME encoders wrap lines at 76 columns) and a
/// `data:application/pdf;base64,` prefix is accepted.
pub fn decode_pdf(payload: &str) -> Result<Vec<u8>, JobError> {
    let trimmed = payload.trim();
    let body = trimmed.strip_prefix(DATA_URI_PREFIX).unwrap_or(trimmed);
    let compact: Vec<u8> = body
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    let bytes = STANDARD
        .decode(&compact)
        .map_err(|e| JobError::InvalidBase64 {
            detail: e.to_string(),
        })?;

    if !bytes.starts_with(PDF_MAGIC) {
        return Err(JobError::NotAPdf {
            magic: bytes.iter().take(4).copied().collect(),
        });
    }

    Ok(bytes)
}

/// A PDF written to a uniquely named temporary file, deleted on drop.
#[derive(Debug)]
pub struct StagedPdf {
    file: NamedTempFile,
}

impl StagedPdf {
    /// Write `bytes` to a new `*.pdf` temp file in `dir` (system temp dir if `None`).
    pub fn write(bytes: &[u8], dir: Option<&Path>) -> Result<Self, JobError> {
        let target = dir.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        let staging_err = |e: std::io::Error| JobError::Staging {
            dir: target.clone(),
            detail: e.to_string(),
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix("pdf2md-job-").suffix(".pdf");
        let mut file = builder.tempfile_in(&target).map_err(staging_err)?;
        file.write_all(bytes).map_err(staging_err)?;
        file.flush().map_err(staging_err)?;

        debug!("Staged {} bytes at {}", bytes.len(), file.path().display());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// The path as an owned `PathBuf`, for moving into a spawned task.
    pub fn to_path_buf(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // "%PDF-1.4\n" base64-encoded.
    const TINY_PDF_B64: &str = "JVBERi0xLjQK";

    #[test]
    fn decodes_plain_payload() {
        let bytes = decode_pdf(TINY_PDF_B64).unwrap();
        assert_eq!(bytes, b"%PDF-1.4\n");
    }

    #[test]
    fn ignores_whitespace_and_data_uri_prefix() {
        let wrapped = format!("  {}JVBE\r\nRi0x\nLjQK\n", DATA_URI_PREFIX);
        assert_eq!(decode_pdf(&wrapped).unwrap(), b"%PDF-1.4\n");
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decode_pdf("not*base64!").unwrap_err();
        assert!(matches!(err, JobError::InvalidBase64 { .. }), "got: {err:?}");
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        // "PK\x03\x04" — a zip header.
        let err = decode_pdf("UEsDBA==").unwrap_err();
        assert_eq!(
            err,
            JobError::NotAPdf {
                magic: b"PK\x03\x04".to_vec()
            }
        );
    }

    #[test]
    fn staged_file_has_pdf_suffix_and_contents() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedPdf::write(b"%PDF-1.7", Some(dir.path())).unwrap();
        assert!(staged.path().starts_with(dir.path()));
        assert_eq!(
            staged.path().extension().and_then(|e| e.to_str()),
            Some("pdf")
        );
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn staged_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedPdf::write(b"%PDF-1.7", Some(dir.path())).unwrap();
        let path = staged.to_path_buf();
        assert!(path.exists());
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn staging_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let err = StagedPdf::write(b"%PDF", Some(&missing)).unwrap_err();
        assert!(matches!(err, JobError::Staging { .. }), "got: {err:?}");
    }
}
