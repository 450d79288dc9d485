use nodeflow_memory::store::ScoredChunk;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You answer questions using the provided context. \
If the context does not contain the answer, say you don't know.";

/// Build the answer prompt by injecting retrieved chunks ahead of the question.
pub fn build_answer_prompt(question: &str, documents: &[ScoredChunk]) -> String {
    let mut prompt = String::new();

    if !documents.is_empty() {
        prompt.push_str("## Context\n\n");
        for (i, doc) in documents.iter().enumerate() {
            prompt.push_str(&format!("[{}] ({})\n{}\n\n", i + 1, doc.source, doc.content));
        }
        prompt.push_str("---\n\n");
    }

    prompt.push_str("Question: ");
    prompt.push_str(question);
    prompt
}

/// Build the routing prompt asking the model to pick one of `options`.
pub fn build_route_prompt<'a>(
    instructions: &str,
    question: &str,
    options: impl IntoIterator<Item = &'a String>,
) -> String {
    let options: Vec<&str> = options.into_iter().map(String::as_str).collect();
    format!(
        "{}\n\nQuestion: {}\n\nOptions: {}\n\nRespond with ONLY one option name.",
        instructions,
        question,
        options.join(", ")
    )
}
