//! HTML for the single page: form, busy indicator, result/error panel and
//! upload preview.
//!
//! Rendering is a pure function of [`PageView`], so every state of the page
//! can be unit-tested without a server. All user-controlled text goes through
//! [`escape`].

use crate::error::AnalysisError;
use crate::pipeline::classify::{classify, ArtifactKind, UploadedArtifact, ACCEPTED_TYPES};
use crate::pipeline::encode::package_image;
use crate::prompts::EXAMPLE_QUESTIONS;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt::Write as _;

/// What the result area shows after a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Panel {
    Answer(String),
    /// One message per line item.
    Errors(Vec<String>),
}

impl Panel {
    /// Map a failed submission to user-facing messages.
    pub fn from_error(err: &AnalysisError) -> Self {
        match err {
            AnalysisError::Validation(errors) => {
                Panel::Errors(errors.iter().map(ToString::to_string).collect())
            }
            AnalysisError::Extraction(e) => Panel::Errors(vec![format!("An error occurred: {e}")]),
            AnalysisError::ModelInvocation(e) => {
                Panel::Errors(vec![format!("An error occurred: {e}")])
            }
        }
    }

    pub fn from_result(result: &Result<String, AnalysisError>) -> Self {
        match result {
            Ok(answer) => Panel::Answer(answer.clone()),
            Err(e) => Panel::from_error(e),
        }
    }
}

/// Echo of the uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    /// Shown inline.
    Image { filename: String, data_uri: String },
    /// Offered as a download/view link carrying the original bytes.
    Pdf { filename: String, data_uri: String },
}

impl Preview {
    /// Build a preview for accepted uploads; `None` for anything else.
    pub fn for_artifact(artifact: &UploadedArtifact) -> Option<Self> {
        match classify(&artifact.content_type) {
            ArtifactKind::Image(_) => {
                let [image] = package_image(artifact);
                Some(Preview::Image {
                    filename: artifact.filename.clone(),
                    data_uri: image.to_data_uri(),
                })
            }
            ArtifactKind::Pdf => Some(Preview::Pdf {
                filename: artifact.filename.clone(),
                data_uri: format!("data:application/pdf;base64,{}", STANDARD.encode(&artifact.bytes)),
            }),
            ArtifactKind::Unsupported(_) => None,
        }
    }
}

/// Everything needed to render the page.
#[derive(Debug, Clone, Default)]
pub struct PageView {
    /// Retained question text.
    pub question: String,
    pub panel: Option<Panel>,
    pub preview: Option<Preview>,
    /// `provider/model`, shown in the footer.
    pub model_name: String,
}

/// Escape text for HTML element content and double-quoted attributes.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; background: #f4f4f4; color: #222; }
.layout { display: flex; min-height: 100vh; }
aside { width: 22rem; padding: 1.5rem; background: #fff; border-right: 1px solid #ddd; }
main { flex: 1; padding: 1.5rem 2rem; }
label { display: block; margin-top: 1rem; font-weight: 600; }
input[type=text] { width: 100%; box-sizing: border-box; padding: .5rem; }
button { margin-top: 1.25rem; background: #4caf50; color: #fff; border: 0; border-radius: 10px; font-size: 1.1rem; padding: .6rem 1.2rem; cursor: pointer; }
.info { margin-top: 1.5rem; padding: .75rem; background: #e8f1fb; border-radius: 6px; font-size: .9rem; }
.answer { padding: 1rem; background: #e6f4ea; border-radius: 6px; white-space: pre-wrap; }
.error { padding: 1rem; background: #fdecea; color: #8a1c12; border-radius: 6px; margin-bottom: .5rem; white-space: pre-wrap; }
#busy { display: none; margin-top: 1rem; color: #555; }
form.busy #busy { display: block; }
form.busy button { opacity: .5; pointer-events: none; }
.preview img { max-width: 100%; border: 1px solid #ddd; }
footer { margin-top: 3rem; text-align: center; color: #4caf50; }
"#;

/// Render the complete page.
pub fn render_page(view: &PageView) -> String {
    let mut html = String::with_capacity(4096);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str("<title>Invoice Extractor</title>\n<style>");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n<div class=\"layout\">\n");

    // ── Sidebar: the form ────────────────────────────────────────────────
    html.push_str("<aside>\n<h1>Invoice Extractor Tool</h1>\n");
    html.push_str("<p>Upload an invoice image or PDF and ask any question.</p>\n");
    html.push_str(
        "<form method=\"post\" action=\"/analyze\" enctype=\"multipart/form-data\" \
         onsubmit=\"this.classList.add('busy')\">\n",
    );
    let _ = write!(
        html,
        "<label for=\"question\">Question</label>\n\
         <input type=\"text\" id=\"question\" name=\"question\" value=\"{}\">\n",
        escape(&view.question)
    );
    let _ = write!(
        html,
        "<label for=\"invoice\">Upload Invoice (JPG/PNG/PDF)</label>\n\
         <input type=\"file\" id=\"invoice\" name=\"invoice\" accept=\"{}\">\n",
        ACCEPTED_TYPES
    );
    html.push_str("<button type=\"submit\">Analyze Invoice</button>\n");
    html.push_str("<div id=\"busy\" role=\"status\">Processing the invoice…</div>\n</form>\n");

    html.push_str("<div class=\"info\">Example questions:<ul>\n");
    for q in EXAMPLE_QUESTIONS {
        let _ = writeln!(html, "<li>{}</li>", escape(q));
    }
    html.push_str("</ul></div>\n</aside>\n");

    // ── Main: preview + result ───────────────────────────────────────────
    html.push_str("<main>\n");

    match &view.preview {
        Some(Preview::Image { filename, data_uri }) => {
            let _ = write!(
                html,
                "<div class=\"preview\"><img src=\"{}\" alt=\"Uploaded invoice {}\">\
                 <p>Uploaded Invoice Image: {}</p></div>\n",
                escape(data_uri),
                escape(filename),
                escape(filename)
            );
        }
        Some(Preview::Pdf { filename, data_uri }) => {
            let _ = write!(
                html,
                "<div class=\"preview\"><p>Uploaded Invoice PDF: \
                 <a href=\"{}\" download=\"{}\" target=\"_blank\">{}</a></p></div>\n",
                escape(data_uri),
                escape(filename),
                escape(filename)
            );
        }
        None => {}
    }

    match &view.panel {
        Some(Panel::Answer(answer)) => {
            let _ = write!(
                html,
                "<section id=\"result\">\n<h2>Response</h2>\n<div class=\"answer\">{}</div>\n</section>\n",
                escape(answer)
            );
        }
        Some(Panel::Errors(messages)) => {
            html.push_str("<section id=\"errors\">\n");
            for m in messages {
                let _ = writeln!(html, "<div class=\"error\" role=\"alert\">{}</div>", escape(m));
            }
            html.push_str("</section>\n");
        }
        None => {}
    }

    let _ = write!(
        html,
        "<footer><hr>Powered by {}</footer>\n",
        escape(&view.model_name)
    );
    html.push_str("</main>\n</div>\n</body>\n</html>\n");
    html
}
