//! Pipeline stages for answering a question about one invoice.
//!
//! Each submodule implements exactly one step and can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//!              ┌──▶ encode  ──┐
//! classify ────┤              ├──▶ compose ──▶ llm
//! (MIME type)  └──▶ extract ──┘    (3 parts)   (Gemini / provider)
//!                  (pdfium)
//! ```
//!
//! 1. [`classify`]: route the upload by its declared content type
//! 2. [`encode`]  : package image bytes and MIME type as an inline part
//! 3. [`extract`] : pull the text layer out of a PDF; blocking, so the
//!    caller runs it under `spawn_blocking`
//! 4. [`compose`] : order question, content and instruction into one request
//! 5. [`llm`]     : the only stage with network I/O

pub mod classify;
pub mod compose;
pub mod encode;
pub mod extract;
pub mod llm;
