//! Prompt composition: question + invoice content + instruction, in order.
//!
//! The model reads parts positionally. The order is fixed in exactly one
//! place, [`PromptRequest::parts`]: the user's question first, the invoice
//! content second, the fixed system instruction last. Backends serialise
//! whatever `parts()` yields and never reorder.

use crate::pipeline::encode::ImagePart;

/// What the extraction path produced for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedContent {
    Image(ImagePart),
    Text(String),
}

/// One ordered element of the model request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part<'a> {
    Text(&'a str),
    Inline(&'a ImagePart),
}

/// A request ready to send to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    question: String,
    content: ExtractedContent,
    instruction: String,
}

impl PromptRequest {
    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn content(&self) -> &ExtractedContent {
        &self.content
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// The three parts in wire order.
    pub fn parts(&self) -> [Part<'_>; 3] {
        let content = match &self.content {
            ExtractedContent::Image(image) => Part::Inline(image),
            ExtractedContent::Text(text) => Part::Text(text),
        };
        [
            Part::Text(&self.question),
            content,
            Part::Text(&self.instruction),
        ]
    }
}

/// Build the request. Pure and total.
pub fn compose(instruction: &str, question: &str, content: ExtractedContent) -> PromptRequest {
    PromptRequest {
        question: question.to_string(),
        content,
        instruction: instruction.to_string(),
    }
}
