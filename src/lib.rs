//! # invoice-qa
//!
//! Ask a free-text question about an invoice (a JPEG/PNG scan or a PDF)
//! and get the answer from a multimodal language model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! question + upload
//!  │
//!  ├─ 1. Validate  both inputs present, declared type on the allowlist
//!  ├─ 2. Classify  image/jpeg | image/png → image path, application/pdf → PDF path
//!  ├─ 3. Extract   image: bytes + MIME as an inline part
//!  │               PDF:   text of every non-empty page via pdfium (spawn_blocking)
//!  ├─ 4. Compose   [question, content, system instruction]
//!  ├─ 5. Invoke    one call to Gemini (or any edgequake-llm provider), no retry
//!  └─ 6. Display   answer verbatim, or the error message
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_qa::{InvoiceAnalyzer, ServiceConfig, Submission, UploadedArtifact};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder()
//!         .api_key(std::env::var("GOOGLE_API_KEY")?)
//!         .build()?;
//!     let analyzer = InvoiceAnalyzer::from_config(&config)?;
//!
//!     let bytes = std::fs::read("invoice.pdf")?;
//!     let upload = UploadedArtifact::new("invoice.pdf", "application/pdf", bytes);
//!     let answer = analyzer
//!         .analyze(Submission::new("What is the total amount?", Some(upload)))
//!         .await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-qa` server binary (clap + anyhow + dotenvy + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod page;
pub mod pipeline;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{InvoiceAnalyzer, Phase, Submission};
pub use config::{ApiKey, ServiceConfig, ServiceConfigBuilder};
pub use error::{AnalysisError, ExtractionError, InvoiceQaError, ModelInvocationError, ValidationError};
pub use pipeline::classify::{classify, ArtifactKind, ImageFormat, UploadedArtifact};
pub use pipeline::compose::{compose, ExtractedContent, Part, PromptRequest};
pub use pipeline::encode::{package_image, ImagePart};
pub use pipeline::extract::{join_page_texts, PdfiumExtractor, TextExtractor};
pub use pipeline::llm::{build_model_client, GeminiClient, ModelClient, ProviderClient};
pub use server::{router, serve};
