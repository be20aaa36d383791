//! Fixed instruction sent with every question.
//!
//! Callers can override it via [`crate::config::ServiceConfig::system_instruction`];
//! the constant here is used only when no override is provided.

/// Default system instruction for invoice question answering.
///
/// It travels as the *last* prompt part, after the user's question and the
/// invoice content.
pub const INVOICE_SYSTEM_INSTRUCTION: &str = "You are an expert in understanding invoices. \
You will receive invoices, either as images or as text extracted from PDF documents, \
and answer any questions based on the invoice.";

/// Example questions shown next to the form.
pub const EXAMPLE_QUESTIONS: [&str; 3] = [
    "What is the total amount?",
    "Who is the buyer?",
    "When is the payment due?",
];

/// Resolve the instruction to use: the override if present, else the default.
pub fn system_instruction(override_text: Option<&str>) -> &str {
    override_text.unwrap_or(INVOICE_SYSTEM_INSTRUCTION)
}
