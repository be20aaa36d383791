//! Submission orchestration: validate → extract → invoke.
//!
//! One submission walks the phases below and ends in exactly one of two
//! displays. Nothing survives the submission: the artifact, extracted text
//! and answer are dropped once the page is rendered.
//!
//! ```text
//! Idle ─▶ Validating ─┬─▶ Extracting ─┬─▶ Invoking ─┬─▶ Displaying(Result)
//!                     │               │             │
//!                     └───────────────┴─────────────┴─▶ Displaying(Error)
//! ```
//!
//! Validation problems never reach extraction; extraction failures never
//! reach the model.

use crate::config::ServiceConfig;
use crate::error::{AnalysisError, ExtractionError, InvoiceQaError, ValidationError};
use crate::pipeline::classify::{classify, ArtifactKind, UploadedArtifact};
use crate::pipeline::compose::{compose, ExtractedContent};
use crate::pipeline::encode::package_image;
use crate::pipeline::extract::{PdfiumExtractor, TextExtractor};
use crate::pipeline::llm::{build_model_client, ModelClient};
use crate::prompts::{system_instruction, INVOICE_SYSTEM_INSTRUCTION};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Raw form input for one submission.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub question: String,
    pub artifact: Option<UploadedArtifact>,
}

impl Submission {
    pub fn new(question: impl Into<String>, artifact: Option<UploadedArtifact>) -> Self {
        Self {
            question: question.into(),
            artifact,
        }
    }
}

/// Orchestrator phases, logged as the submission advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    Extracting,
    Invoking,
    Displaying,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Validating => "validating",
            Phase::Extracting => "extracting",
            Phase::Invoking => "invoking",
            Phase::Displaying => "displaying",
        })
    }
}

/// A submission that passed validation.
#[derive(Debug)]
struct Validated {
    question: String,
    artifact: UploadedArtifact,
    kind: ValidKind,
}

#[derive(Debug, Clone, Copy)]
enum ValidKind {
    Image,
    Pdf,
}

/// Check presence of both inputs and the declared file type.
///
/// Every problem is collected so the user sees all of them at once. The
/// question is trimmed; a whitespace-only question counts as missing.
fn validate(submission: Submission) -> Result<Validated, Vec<ValidationError>> {
    let question = submission.question.trim().to_string();
    let mut errors = Vec::new();

    if question.is_empty() {
        errors.push(ValidationError::MissingQuestion);
    }

    let kind = match &submission.artifact {
        None => {
            errors.push(ValidationError::MissingFile);
            None
        }
        Some(artifact) => match classify(&artifact.content_type) {
            ArtifactKind::Image(_) => Some(ValidKind::Image),
            ArtifactKind::Pdf => Some(ValidKind::Pdf),
            ArtifactKind::Unsupported(content_type) => {
                errors.push(ValidationError::UnsupportedType { content_type });
                None
            }
        },
    };

    match (errors.is_empty(), submission.artifact, kind) {
        (true, Some(artifact), Some(kind)) => Ok(Validated {
            question,
            artifact,
            kind,
        }),
        _ => Err(errors),
    }
}

/// Drives one submission through the pipeline.
///
/// Cheap to share: hold it in an `Arc` and call [`analyze`](Self::analyze)
/// from as many requests as arrive. Submissions share no state.
pub struct InvoiceAnalyzer {
    model: Arc<dyn ModelClient>,
    extractor: Arc<dyn TextExtractor>,
    instruction: String,
}

impl InvoiceAnalyzer {
    pub fn new(model: Arc<dyn ModelClient>, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            model,
            extractor,
            instruction: INVOICE_SYSTEM_INSTRUCTION.to_string(),
        }
    }

    /// Wire up the configured model client, the pdfium extractor and the
    /// instruction override.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, InvoiceQaError> {
        let model = build_model_client(config)?;
        let extractor = Arc::new(PdfiumExtractor::new(config.pdfium_lib_path.clone()));
        let instruction = system_instruction(config.system_instruction.as_deref());
        info!("Using model {}", model.describe());
        Ok(Self::new(model, extractor).with_instruction(instruction))
    }

    /// Replace the built-in system instruction.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// `provider/model` of the underlying client.
    pub fn model_name(&self) -> String {
        self.model.describe()
    }

    /// Answer one question about one invoice.
    pub async fn analyze(&self, submission: Submission) -> Result<String, AnalysisError> {
        let start = Instant::now();
        debug!(phase = %Phase::Validating, "submission received");

        let validated = validate(submission).map_err(|errors| {
            info!("Submission rejected: {} validation error(s)", errors.len());
            debug!(phase = %Phase::Displaying, "validation failed");
            AnalysisError::Validation(errors)
        })?;

        info!(
            "Analyzing '{}' ({}, {} bytes)",
            validated.artifact.filename,
            validated.artifact.content_type,
            validated.artifact.len()
        );

        debug!(phase = %Phase::Extracting, "extracting content");
        let content = self.extract(&validated).await.map_err(|e| {
            warn!("Extraction failed: {}", e);
            debug!(phase = %Phase::Displaying, "extraction failed");
            e
        })?;

        let request = compose(&self.instruction, &validated.question, content);

        debug!(phase = %Phase::Invoking, model = %self.model.describe(), "calling model");
        let result = self.model.generate(&request).await;
        debug!(phase = %Phase::Displaying, ok = result.is_ok(), "submission finished");

        match result {
            Ok(answer) => {
                info!("Answered in {}ms", start.elapsed().as_millis());
                Ok(answer)
            }
            Err(e) => {
                warn!("Model invocation failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn extract(&self, validated: &Validated) -> Result<ExtractedContent, AnalysisError> {
        match validated.kind {
            ValidKind::Image => {
                let [image] = package_image(&validated.artifact);
                Ok(ExtractedContent::Image(image))
            }
            ValidKind::Pdf => {
                let extractor = Arc::clone(&self.extractor);
                let filename = validated.artifact.filename.clone();
                let bytes = validated.artifact.bytes.clone();

                let text = tokio::task::spawn_blocking(move || extractor.extract(&filename, &bytes))
                    .await
                    .map_err(|e| {
                        ExtractionError::Internal(format!("Extraction task panicked: {}", e))
                    })??;

                debug!("Extracted {} chars of text", text.len());
                Ok(ExtractedContent::Text(text))
            }
        }
    }
}
