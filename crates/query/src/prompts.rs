/// System prompt for every answer the assistant writes.
pub const SYSTEM_PROMPT: &str = r#"You are a personal knowledge assistant.

Your job is to:
1. Answer questions based on the user's personal knowledge base
2. Be precise and cite sources when possible
3. Admit when you don't have enough information
4. Connect ideas from different sources when relevant
5. Be helpful, concise, and friendly

Important guidelines:
- Always respond in the same language the user uses
- If the context doesn't contain relevant information, say so clearly
- When citing sources, mention them naturally in your response
- Keep responses focused and avoid unnecessary verbosity
- If asked about something not in the knowledge base, offer to help index relevant content

You run entirely locally; the user's data never leaves their machine."#;

/// Returned instead of an answer when any step of a query fails.
pub const GENERATION_FAILED: &str = "❌ *Generation Error*\n\n\
Failed to generate a response. \
The AI model might be busy or unavailable. \
Please try again.";

pub fn build_rag_prompt(context: &str, query: &str) -> String {
    format!(
        r#"Based on the following context from the user's knowledge base, answer the question.

CONTEXT:
{}

QUESTION:
{}

INSTRUCTIONS:
- Use ONLY the information from the provided context
- If the context doesn't contain relevant information, clearly state that
- Cite sources naturally when using specific information (e.g., "According to [source]...")
- Be concise and direct
- If multiple sources provide information, synthesize them coherently

RESPONSE:"#,
        context, query
    )
}

pub fn build_no_context_prompt(query: &str) -> String {
    format!(
        r#"The user asked a question but no relevant information was found in their knowledge base.

QUESTION: {}

Please:
1. Acknowledge that you couldn't find relevant information in their knowledge base
2. Offer a general response if you can help
3. Suggest they could index relevant content by sending documents, URLs, or text

Keep your response helpful and friendly."#,
        query
    )
}

pub fn build_idea_prompt(path: &str) -> String {
    format!(
        r#"Generate a creative, practical idea connecting these concepts.

PATH: {}

The path shows how these concepts are connected in the user's knowledge base.
Generate ONE specific, actionable idea that combines these concepts.

Respond with:
IDEA: [One sentence describing the idea]
EXPLANATION: [2-3 sentences explaining why this connection is interesting and how it could be useful]

Be creative but practical. Focus on what could actually be built or done."#,
        path
    )
}

pub fn build_indexing_confirmation(source: &str, source_type: &str, chunk_count: usize) -> String {
    format!(
        "✅ *Content indexed successfully!*\n\n\
         📄 *Source:* `{}`\n\
         📊 *Type:* {}\n\
         🧩 *Chunks:* {}\n\n\
         You can now ask me questions about this content.",
        source, source_type, chunk_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rag_prompt_contains_context_and_question() {
        let prompt = build_rag_prompt("[Source: doc1]\nPython is a language", "what is Python");
        assert!(prompt.contains("[Source: doc1]"));
        assert!(prompt.contains("QUESTION:\nwhat is Python"));
        assert!(prompt.contains("Use ONLY the information"));
    }

    #[test]
    fn idea_prompt_asks_for_tagged_lines() {
        let prompt = build_idea_prompt("Rust → Tokio");
        assert!(prompt.contains("PATH: Rust → Tokio"));
        assert!(prompt.contains("IDEA:"));
        assert!(prompt.contains("EXPLANATION:"));
    }

    #[test]
    fn indexing_confirmation_lists_details() {
        let message = build_indexing_confirmation("test.pdf", "pdf", 5);
        assert!(message.contains("`test.pdf`"));
        assert!(message.contains("*Type:* pdf"));
        assert!(message.contains("*Chunks:* 5"));
    }
}
