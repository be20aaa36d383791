//! Image packaging: uploaded image → inline `{mime_type, bytes}` part.
//!
//! Vision APIs (Gemini, OpenAI, Anthropic) accept images as base64 payloads
//! embedded in the JSON request body, tagged with their MIME type. The bytes
//! are forwarded untouched: no re-encoding, no resizing.

use crate::pipeline::classify::UploadedArtifact;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tracing::debug;

/// Inline binary payload for the model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub mime_type: String,
    pub bytes: Bytes,
}

impl ImagePart {
    /// Base64 (standard alphabet, padded) as the wire formats expect.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:` URI, used for the inline preview on the result page.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Package an image upload for the model.
///
/// The artifact must already be classified as an image. Returns a
/// single-element sequence whose MIME type is the declared type and whose
/// bytes are the uploaded bytes, unchanged.
pub fn package_image(artifact: &UploadedArtifact) -> [ImagePart; 1] {
    debug!(
        "Packaging image '{}' ({}, {} bytes)",
        artifact.filename,
        artifact.content_type,
        artifact.len()
    );
    [ImagePart {
        mime_type: artifact.content_type.clone(),
        bytes: artifact.bytes.clone(),
    }]
}
