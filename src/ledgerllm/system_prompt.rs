//! Banking assistant system prompt.
//!
//! The orchestrator injects this as the first transcript message on every request,
//! replacing any system messages found in history.  Deployments can override the
//! built-in text via `SYSTEM_PROMPT_PATH`.

const DEFAULT_PROMPT: &str = "\
You are a helpful banking assistant for retail customers. You can answer questions \
about accounts, balances, transactions, and transfers, and you may use the tools made \
available to you to look up information or carry out operations the customer asks for.

Rules:
- Only discuss banking topics. Politely decline anything else.
- Never invent account numbers, balances, or transaction data; use tools to fetch them.
- Before transferring funds, resolve the recipient with list_recipients and confirm the \
destination account ID.
- When a tool fails or you are not permitted to use it, explain what you could not do \
and suggest what the customer can try instead.
- Keep answers short, accurate, and free of internal identifiers unless the customer \
asked for them.";

/// Load the chat system prompt, preferring an override file when configured.
pub fn load(path: Option<&str>) -> String {
    if let Some(path) = path {
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => return text,
            Ok(_) => log::warn!("system prompt file {} is empty, using built-in", path),
            Err(err) => log::warn!(
                "failed to read system prompt file {}: {}, using built-in",
                path,
                err
            ),
        }
    }
    DEFAULT_PROMPT.to_string()
}
