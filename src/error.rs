//! Error types for the invoice-qa library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`InvoiceQaError`]: **Fatal**. The service cannot start (bad
//!   configuration, provider not configured, address already in use).
//!   Returned from config building, client construction and
//!   [`crate::server::serve`].
//!
//! * [`AnalysisError`]: **Per submission**. One question about one invoice
//!   failed. It never crosses the request boundary; the presentation layer
//!   turns it into an error panel and the user resubmits.
//!
//! `AnalysisError` has exactly three kinds (validation, extraction and model
//! invocation), so the page renderer can match it exhaustively.

use std::net::SocketAddr;
use thiserror::Error;

/// All fatal errors returned by the invoice-qa library.
#[derive(Debug, Error)]
pub enum InvoiceQaError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured provider could not be created (unknown name, missing
    /// provider-specific API key, …).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Server errors ─────────────────────────────────────────────────────
    /// Could not bind the listening socket.
    #[error("Failed to bind {addr}: {source}\nIs another instance already running?")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// A failed submission. Exactly one of three kinds.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The submission is incomplete or carries a file type we do not accept.
    /// Every problem found is reported, not just the first.
    #[error("{}", join_messages(.0))]
    Validation(Vec<ValidationError>),

    /// The PDF could not be opened or parsed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The external model call failed.
    #[error(transparent)]
    ModelInvocation(#[from] ModelInvocationError),
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A problem with the submitted form, detected before any extraction work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a valid question.")]
    MissingQuestion,

    #[error("Please upload a file to proceed.")]
    MissingFile,

    /// Declared type is outside the JPEG / PNG / PDF allowlist.
    #[error("Unsupported file type '{content_type}'. Please upload a JPEG, PNG or PDF invoice.")]
    UnsupportedType { content_type: String },
}

/// PDF text extraction failed.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// The pdfium shared library could not be loaded.
    #[error(
        "PDF engine unavailable: {detail}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium."
    )]
    EngineUnavailable { detail: String },

    /// The document header/trailer/xref is corrupt, or it is encrypted.
    #[error("Could not read PDF '{filename}': {detail}")]
    Unreadable { filename: String, detail: String },

    /// The blocking extraction task panicked or was cancelled.
    #[error("Internal extraction error: {0}")]
    Internal(String),
}

/// Any failure of the external model call.
///
/// Transient and permanent failures are not distinguished for the user and
/// nothing is retried.
#[derive(Debug, Error)]
pub enum ModelInvocationError {
    /// No API key was configured at startup.
    #[error("No API key configured for '{provider}'. Set GOOGLE_API_KEY or pass --api-key.")]
    MissingCredential { provider: String },

    /// Connection refused, DNS failure, TLS error, …
    #[error("Request to the model failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// HTTP 401/403. The key is invalid or lacks access to the model.
    #[error("Authentication failed (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// Any other non-2xx answer.
    #[error("Model API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// The model answered but produced no text (safety block, max tokens, …).
    #[error("The model declined to answer: {reason}")]
    Declined { reason: String },

    /// Error surfaced by an edgequake-llm provider.
    #[error("LLM provider error: {0}")]
    Provider(String),
}
