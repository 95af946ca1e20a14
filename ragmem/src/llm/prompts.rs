//! Prompt templates for answer generation.
//!
//! Plain `format!()` interpolation; the conversation history is not rendered
//! here because it travels as separate chat messages.

use crate::models::{Chunk, ConversationContext, Summary};

/// System prompt for the document-grounded assistant.
pub const ANSWER_SYSTEM_PROMPT: &str = r#"You are a helpful assistant that answers questions using the reference documents and the conversation memory you are given.

Rules:
- Prefer facts from the reference documents. Cite the document name and page when you use one.
- Use the conversation memory and earlier messages to keep track of who the user is and what was already said.
- If neither the documents nor the memory contain the answer, say so plainly instead of guessing.
- Answer in the same language the user writes in."#;

/// Render the user-facing prompt for one turn: memory summary, retrieved
/// chunks and the question itself.
///
/// # Example
/// ```
/// use ragmem::llm::prompts::rag_answer_prompt;
/// use ragmem::models::ConversationContext;
///
/// let context = ConversationContext {
///     query: "What is on the menu?".to_string(),
///     ..Default::default()
/// };
/// let prompt = rag_answer_prompt(&context);
/// assert!(prompt.contains("What is on the menu?"));
/// ```
pub fn rag_answer_prompt(context: &ConversationContext) -> String {
    let memory = memory_section(&context.summary);
    let documents = documents_section(context);

    format!(
        r#"Conversation memory:
{memory}

Reference documents:
{documents}

Question: {query}"#,
        query = context.query
    )
}

fn memory_section(summary: &Summary) -> String {
    match summary {
        Summary::Absent => "(nothing recorded yet)".to_string(),
        other => other.render(),
    }
}

fn documents_section(context: &ConversationContext) -> String {
    if context.chunks.is_empty() {
        return if context.retrieval_degraded {
            "(document search is unavailable right now; answer from memory only)".to_string()
        } else {
            "(no relevant documents were found)".to_string()
        };
    }

    context
        .chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| render_chunk(i + 1, chunk))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_chunk(position: usize, chunk: &Chunk) -> String {
    let mut rendered = format!(
        "[{position}] {} (page {}, similarity {:.3})\n{}",
        chunk.document_name, chunk.page_number, chunk.similarity, chunk.content
    );
    if let Some(image_url) = &chunk.image_url {
        rendered.push_str(&format!("\nPage image: {image_url}"));
    }
    rendered
}
