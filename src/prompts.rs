//! System prompts for each transformation instruction.
//!
//! Every preset prompt lives here so a wording change touches one place and
//! unit tests can inspect the prompts without calling a model. Custom
//! instructions are sent verbatim as the system prompt.

use crate::document::InstructionKind;

/// Prompt for [`InstructionKind::Summarize`].
pub const SUMMARY_PROMPT: &str = "You are an expert document summarizer. Convert the input markdown into a well-structured executive summary.";

/// Prompt for [`InstructionKind::StructureAsTable`].
///
/// Asks for `;`-separated CSV so the answer can be read back into a table by
/// [`crate::document::Table::from_transform_output`].
pub const TABLE_PROMPT: &str = "You are professional in analyzing and structuring documents. In the document, identify all tasks/questions and their respective answers. Structure them and convert the input into a well-structured CSV table. Consider a column for each answer per task/question. Take the exact formulation of each question and each answer. Make a column stating the correct answers. Be aware of correct CSV formatting and consider empty spaces if necessary. Separate all with semicolon. Encode in UTF-8, if you see Umlaute like ö,ä,ü,ß,... the transform them properly in oe,ae,ue,ss, etc.";

/// Prompt for [`InstructionKind::RewriteAsReport`].
pub const REPORT_PROMPT: &str =
    "You are a professional analyst. Turn the input markdown into a clear and concise report.";

/// Prompt for [`InstructionKind::RewriteAsArticle`].
pub const ARTICLE_PROMPT: &str = "You are a skilled writer. Transform the input markdown into a well-written, engaging article.";

/// Used when a custom instruction is blank.
pub const FALLBACK_PROMPT: &str = "You are a helpful assistant.";

/// System prompt for an instruction.
pub fn system_prompt_for(kind: &InstructionKind) -> &str {
    match kind {
        InstructionKind::Summarize => SUMMARY_PROMPT,
        InstructionKind::StructureAsTable => TABLE_PROMPT,
        InstructionKind::RewriteAsReport => REPORT_PROMPT,
        InstructionKind::RewriteAsArticle => ARTICLE_PROMPT,
        InstructionKind::Custom(text) if text.trim().is_empty() => FALLBACK_PROMPT,
        InstructionKind::Custom(text) => text.trim(),
    }
}
