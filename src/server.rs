//! HTTP surface: one page, one form, one action.
//!
//! ## Endpoints
//! - `GET /`        : the empty form
//! - `POST /analyze`: `multipart/form-data` with `question` and `invoice`;
//!   answers with the same page showing the result or error panel
//! - `GET /health`  : liveness probe
//!
//! Each request is handled independently. The only shared value is the
//! [`InvoiceAnalyzer`], which holds no per-submission state.

use crate::analyze::{InvoiceAnalyzer, Phase, Submission};
use crate::config::ServiceConfig;
use crate::error::{AnalysisError, InvoiceQaError};
use crate::page::{render_page, PageView, Panel, Preview};
use crate::pipeline::classify::UploadedArtifact;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Form field carrying the question.
pub const QUESTION_FIELD: &str = "question";
/// Form field carrying the file.
pub const FILE_FIELD: &str = "invoice";

/// Declared type used when the browser sends none.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
struct AppState {
    analyzer: Arc<InvoiceAnalyzer>,
}

/// Build the application router.
pub fn router(analyzer: Arc<InvoiceAnalyzer>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/analyze", get(index).post(analyze))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { analyzer })
}

/// Bind `config.bind_addr` and serve until Ctrl-C.
pub async fn serve(config: &ServiceConfig, analyzer: Arc<InvoiceAnalyzer>) -> Result<(), InvoiceQaError> {
    let app = router(analyzer, config.max_upload_bytes);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| InvoiceQaError::Bind {
            addr: config.bind_addr,
            source,
        })?;

    let local = listener.local_addr().unwrap_or(config.bind_addr);
    info!("Invoice QA listening on http://{}", local);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InvoiceQaError::Serve)?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => {
            warn!("Could not install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

async fn index(State(state): State<AppState>) -> Html<String> {
    debug!(phase = %Phase::Idle, "rendering empty form");
    Html(render_page(&PageView {
        model_name: state.analyzer.model_name(),
        ..Default::default()
    }))
}

async fn health() -> &'static str {
    "ok"
}

async fn analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> (StatusCode, Html<String>) {
    let model_name = state.analyzer.model_name();

    let submission = match multipart {
        Ok(multipart) => read_submission(multipart).await,
        Err(rejection) => {
            warn!("Rejected form post: {}", rejection.body_text());
            return error_page(rejection.status(), rejection.body_text(), model_name);
        }
    };

    let submission = match submission {
        Ok(s) => s,
        Err(e) => {
            warn!("Could not read upload: {}", e.body_text());
            return error_page(e.status(), e.body_text(), model_name);
        }
    };

    let question = submission.question.clone();
    let preview = submission.artifact.as_ref().and_then(Preview::for_artifact);

    let result = state.analyzer.analyze(submission).await;

    let view = PageView {
        question,
        panel: Some(Panel::from_result(&result)),
        preview,
        model_name,
    };
    (status_for(&result), Html(render_page(&view)))
}

fn error_page(status: StatusCode, detail: String, model_name: String) -> (StatusCode, Html<String>) {
    let view = PageView {
        panel: Some(Panel::Errors(vec![format!(
            "Could not read the upload: {detail}"
        )])),
        model_name,
        ..Default::default()
    };
    (status, Html(render_page(&view)))
}

/// HTTP status for a finished submission.
pub fn status_for(result: &Result<String, AnalysisError>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::OK,
        Err(AnalysisError::Validation(_)) | Err(AnalysisError::Extraction(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Err(AnalysisError::ModelInvocation(_)) => StatusCode::BAD_GATEWAY,
    }
}

/// Collect the question and file from the form.
///
/// Browsers send an empty file part when nothing was chosen; an upload with
/// no bytes counts as no file. Unknown fields are ignored.
async fn read_submission(mut multipart: Multipart) -> Result<Submission, MultipartError> {
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(QUESTION_FIELD) => {
                submission.question = field.text().await?;
            }
            Some(FILE_FIELD) => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(FALLBACK_CONTENT_TYPE)
                    .to_string();
                let bytes = field.bytes().await?;

                if bytes.is_empty() {
                    debug!("Ignoring empty file part '{}'", filename);
                    continue;
                }
                submission.artifact = Some(UploadedArtifact::new(filename, content_type, bytes));
            }
            other => {
                debug!("Ignoring unknown form field {:?}", other);
            }
        }
    }

    Ok(submission)
}
