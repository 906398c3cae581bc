//! Result assembly: pages → one Markdown document + response metadata.

use crate::engine::Page;
use crate::pipeline::intake::UploadedFile;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Successful upload response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResponse {
    pub markdown: String,
    /// Public URL of the stored original.
    pub pdf_url: String,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Pages that contributed content.
    pub pages: usize,
    /// Upload size in bytes.
    pub file_size: u64,
    /// Milliseconds from request start to assembly.
    pub processing_time: u64,
    /// Name the client uploaded the file under.
    pub filename: String,
}

/// Concatenate page contents, each followed by a blank line.
///
/// Pages without content are skipped and not counted. Returns the Markdown and
/// the number of contributing pages.
pub fn assemble(pages: &[Page]) -> (String, usize) {
    let mut markdown = String::new();
    let mut count = 0;
    for content in pages
        .iter()
        .filter_map(|p| p.content.as_deref())
        .filter(|c| !c.is_empty())
    {
        markdown.push_str(content);
        markdown.push_str("\n\n");
        count += 1;
    }
    (markdown, count)
}

/// Build the response for a converted upload.
pub fn build_response(
    pages: &[Page],
    file: &UploadedFile,
    public_path: &str,
    elapsed: Duration,
) -> ConversionResponse {
    let (markdown, page_count) = assemble(pages);
    ConversionResponse {
        markdown,
        pdf_url: format!("{}/{}", public_path.trim_end_matches('/'), file.filename),
        metadata: ResponseMetadata {
            pages: page_count,
            file_size: file.size,
            processing_time: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            filename: file.original_name.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    #[test]
    fn two_pages_separated_by_blank_lines() {
        let (md, n) = assemble(&[Page::new("A"), Page::new("B")]);
        assert_eq!(md, "A\n\nB\n\n");
        assert_eq!(n, 2);
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let (md, n) = assemble(&[]);
        assert_eq!(md, "");
        assert_eq!(n, 0);
    }

    #[test]
    fn pages_without_content_are_skipped() {
        let (md, n) = assemble(&[Page::new("A"), Page::empty(), Page::new(""), Page::new("C")]);
        assert_eq!(md, "A\n\nC\n\n");
        assert_eq!(n, 2);
    }

    #[test]
    fn response_serialises_camel_case() {
        let file = UploadedFile {
            filename: "1700000000000-7-report.pdf".into(),
            original_name: "report.pdf".into(),
            path: PathBuf::from("uploads/1700000000000-7-report.pdf"),
            mime_type: "application/pdf".into(),
            size: 2048,
            created_at: Utc::now(),
        };
        let resp = build_response(
            &[Page::new("# Hi")],
            &file,
            "/uploads",
            Duration::from_millis(1234),
        );
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["pdfUrl"], "/uploads/1700000000000-7-report.pdf");
        assert_eq!(json["markdown"], "# Hi\n\n");
        assert_eq!(json["metadata"]["pages"], 1);
        assert_eq!(json["metadata"]["fileSize"], 2048);
        assert_eq!(json["metadata"]["processingTime"], 1234);
        assert_eq!(json["metadata"]["filename"], "report.pdf");
    }
}
