//! File intake: multipart parsing, validation and collision-free storage.
//!
//! Validation happens entirely in memory. Nothing touches the upload
//! directory until the request is known to carry exactly one PDF within the
//! size limit, so rejected uploads never need cleanup.

use crate::error::ApiError;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Form field the PDF must be sent in.
pub const FILE_FIELD: &str = "pdf";

/// The only accepted MIME type.
pub const PDF_MIME: &str = "application/pdf";

/// Attempts at finding an unused name before giving up.
const MAX_NAME_ATTEMPTS: usize = 5;

/// A validated upload that has not been stored yet.
#[derive(Debug, Clone)]
pub struct IncomingPdf {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A stored upload. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Generated unique name inside the upload directory.
    pub filename: String,
    pub original_name: String,
    pub path: PathBuf,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Read the multipart body and validate it.
///
/// Rejects with `NO_FILE` when no `pdf` file field is present (or the body is
/// not multipart at all), `TOO_MANY_FILES` on a second file field,
/// `INVALID_FILE_TYPE` for anything but `application/pdf` and
/// `FILE_TOO_LARGE` once more than `max_size` bytes have arrived.
pub async fn receive_pdf(
    multipart: Result<Multipart, MultipartRejection>,
    max_size: u64,
) -> Result<IncomingPdf, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        debug!("intake: not a multipart body: {}", e);
        ApiError::NoFile
    })?;

    let mut found: Option<IncomingPdf> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_size))?
    {
        // Plain text fields are ignored; only file parts count.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if found.is_some() || field.name() != Some(FILE_FIELD) {
            return Err(ApiError::TooManyFiles);
        }

        let mime_type = field.content_type().unwrap_or_default().to_string();
        if !is_pdf_mime(&mime_type) {
            return Err(ApiError::InvalidFileType { mime: mime_type });
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, max_size))?
        {
            if (bytes.len() + chunk.len()) as u64 > max_size {
                return Err(ApiError::FileTooLarge { limit: max_size });
            }
            bytes.extend_from_slice(&chunk);
        }

        found = Some(IncomingPdf {
            original_name: file_name,
            mime_type,
            bytes,
        });
    }

    found.ok_or(ApiError::NoFile)
}

fn multipart_error(err: MultipartError, max_size: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::FileTooLarge { limit: max_size }
    } else {
        debug!("intake: malformed multipart body: {}", err);
        ApiError::NoFile
    }
}

/// `application/pdf`, ignoring case and parameters.
pub fn is_pdf_mime(mime: &str) -> bool {
    mime.split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(PDF_MIME))
}

/// Write a validated upload into `upload_dir` under a fresh unique name.
pub async fn persist(incoming: IncomingPdf, upload_dir: &Path) -> Result<UploadedFile, ApiError> {
    let mut last_err = None;
    for _ in 0..MAX_NAME_ATTEMPTS {
        let filename = unique_filename(&incoming.original_name);
        let path = upload_dir.join(&filename);
        match write_new(&path, &incoming.bytes).await {
            Ok(()) => {
                let size = incoming.bytes.len() as u64;
                info!("intake: stored {} ({} bytes)", path.display(), size);
                return Ok(UploadedFile {
                    filename,
                    original_name: incoming.original_name,
                    path,
                    mime_type: incoming.mime_type,
                    size,
                    created_at: Utc::now(),
                });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("intake: name collision on {}, regenerating", filename);
                last_err = Some((path, e));
            }
            Err(e) => return Err(ApiError::Storage { path, source: e }),
        }
    }
    let (path, source) = last_err.unwrap_or_else(|| {
        (
            upload_dir.to_path_buf(),
            std::io::Error::new(ErrorKind::AlreadyExists, "no free upload name"),
        )
    });
    Err(ApiError::Storage { path, source })
}

async fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}

/// `<unix millis>-<random 0..1e9>-<sanitised original name>`
pub fn unique_filename(original: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::rng().random_range(0..1_000_000_000);
    format!("{millis}-{suffix}-{}", sanitize_filename(original))
}

/// Keep the final path component and replace anything outside
/// `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn pdf_mime_detection() {
        assert!(is_pdf_mime("application/pdf"));
        assert!(is_pdf_mime("Application/PDF"));
        assert!(is_pdf_mime("application/pdf; charset=binary"));
        assert!(!is_pdf_mime("text/plain"));
        assert!(!is_pdf_mime("application/pdfx"));
        assert!(!is_pdf_mime(""));
    }

    #[test]
    fn sanitize_strips_paths_and_odd_chars() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\my file.pdf"), "my_file.pdf");
        assert_eq!(sanitize_filename("..."), "upload.pdf");
        assert_eq!(sanitize_filename(""), "upload.pdf");
    }

    #[test]
    fn unique_filename_shape() {
        let name = unique_filename("report.pdf");
        let parts: Vec<&str> = name.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].parse::<i64>().is_ok());
        assert!(parts[1].parse::<u32>().unwrap() < 1_000_000_000);
        assert_eq!(parts[2], "report.pdf");
    }

    #[test]
    fn unique_filenames_do_not_collide() {
        let names: HashSet<String> = (0..200).map(|_| unique_filename("a.pdf")).collect();
        assert_eq!(names.len(), 200);
    }

    #[tokio::test]
    async fn persist_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let incoming = IncomingPdf {
            original_name: "doc.pdf".into(),
            mime_type: PDF_MIME.into(),
            bytes: b"%PDF-1.7 test".to_vec(),
        };
        let stored = persist(incoming, dir.path()).await.unwrap();
        assert_eq!(stored.size, 13);
        assert_eq!(stored.original_name, "doc.pdf");
        assert!(stored.filename.ends_with("-doc.pdf"));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"%PDF-1.7 test");
    }

    #[tokio::test]
    async fn persist_into_missing_dir_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let incoming = IncomingPdf {
            original_name: "doc.pdf".into(),
            mime_type: PDF_MIME.into(),
            bytes: vec![1, 2, 3],
        };
        let err = persist(incoming, &dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, ApiError::Storage { .. }));
    }
}
