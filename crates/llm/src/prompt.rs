//! Prompt assembly

use voice_bridge_core::{History, Message};

/// Builds the message list for one generation call
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    history_window: usize,
}

impl PromptBuilder {
    pub fn new(system_prompt: impl Into<String>, history_window: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history_window,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// System prompt, then the last `history_window` history messages, then
    /// the user turn with `context` (if non-empty) prefixed.
    ///
    /// The user message is normally already the newest history entry, so it
    /// appears twice: once plain in the window and once augmented at the end.
    pub fn build(&self, history: &History, user_text: &str, context: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history_window + 2);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend(history.recent(self.history_window).cloned());

        let content = if context.is_empty() {
            user_text.to_string()
        } else {
            format!("{}\n\n{}", context, user_text)
        };
        messages.push(Message::user(content));

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_bridge_core::Role;

    #[test]
    fn test_build_without_context() {
        let mut history = History::default();
        history.push(Message::user("hello"));

        let messages = PromptBuilder::new("sys", 10).build(&history, "hello", "");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], Message::system("sys"));
        assert_eq!(messages[1], Message::user("hello"));
        assert_eq!(messages[2], Message::user("hello"));
    }

    #[test]
    fn test_context_prefixes_user_turn() {
        let messages = PromptBuilder::new("sys", 10).build(&History::default(), "q", "CTX");
        assert_eq!(messages.last().map(|m| m.content.as_str()), Some("CTX\n\nq"));
        assert_eq!(messages.last().map(|m| m.role), Some(Role::User));
    }

    #[test]
    fn test_history_window_limits_messages() {
        let mut history = History::default();
        for i in 0..18 {
            history.push(Message::assistant(format!("m{}", i)));
        }
        let messages = PromptBuilder::new("sys", 10).build(&history, "q", "");
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[1].content, "m8");
        assert_eq!(messages[10].content, "m17");
    }
}
