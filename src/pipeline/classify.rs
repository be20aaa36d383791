//! Upload classification: pick the extraction path from the declared type.
//!
//! The declared content type is trusted as-is; file bytes are never sniffed.
//! Classification happens once, and everything downstream matches on the
//! closed [`ArtifactKind`] instead of comparing MIME strings again.

use bytes::Bytes;
use std::fmt;

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";
pub const MIME_PDF: &str = "application/pdf";

/// Value for the file input's `accept` attribute.
pub const ACCEPTED_TYPES: &str = "image/jpeg,image/png,application/pdf";

/// The single file uploaded with one submission.
///
/// Owned by the request that received it and dropped when that request
/// completes.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedArtifact {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadedArtifact {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// Raw bytes would flood the logs.
impl fmt::Debug for UploadedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedArtifact")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Accepted image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => MIME_JPEG,
            ImageFormat::Png => MIME_PNG,
        }
    }
}

/// Extraction path chosen for an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    Image(ImageFormat),
    Pdf,
    /// Outside the allowlist; carries the normalised declared type.
    Unsupported(String),
}

/// Classify a declared content type.
///
/// Matching is case-insensitive and ignores parameters, so
/// `"Application/PDF; name=x.pdf"` is a PDF.
pub fn classify(content_type: &str) -> ArtifactKind {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        MIME_PDF => ArtifactKind::Pdf,
        MIME_JPEG => ArtifactKind::Image(ImageFormat::Jpeg),
        MIME_PNG => ArtifactKind::Image(ImageFormat::Png),
        _ => ArtifactKind::Unsupported(essence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_is_pdf() {
        assert_eq!(classify("application/pdf"), ArtifactKind::Pdf);
    }

    #[test]
    fn images_by_declared_type() {
        assert_eq!(classify("image/jpeg"), ArtifactKind::Image(ImageFormat::Jpeg));
        assert_eq!(classify("image/png"), ArtifactKind::Image(ImageFormat::Png));
    }

    #[test]
    fn case_and_parameters_ignored() {
        assert_eq!(classify("Application/PDF; name=inv.pdf"), ArtifactKind::Pdf);
        assert_eq!(
            classify(" IMAGE/PNG "),
            ArtifactKind::Image(ImageFormat::Png)
        );
    }

    #[test]
    fn everything_else_is_unsupported() {
        assert_eq!(
            classify("image/gif"),
            ArtifactKind::Unsupported("image/gif".into())
        );
        assert_eq!(
            classify("application/octet-stream"),
            ArtifactKind::Unsupported("application/octet-stream".into())
        );
        assert_eq!(classify(""), ArtifactKind::Unsupported(String::new()));
    }

    #[test]
    fn bytes_are_not_sniffed() {
        // A PDF body declared as PNG still takes the image path.
        let artifact = UploadedArtifact::new("x.png", "image/png", &b"%PDF-1.7"[..]);
        assert_eq!(
            classify(&artifact.content_type),
            ArtifactKind::Image(ImageFormat::Png)
        );
    }

    #[test]
    fn debug_hides_bytes() {
        let artifact = UploadedArtifact::new("a.jpg", "image/jpeg", vec![0xFF; 4096]);
        let dbg = format!("{:?}", artifact);
        assert!(dbg.contains("len: 4096"), "got: {dbg}");
        assert!(!dbg.contains("255"), "got: {dbg}");
    }
}
