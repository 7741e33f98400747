//! Language model capability trait

use tokio::sync::mpsc;

use crate::conversation::Message;

/// Event emitted by one generation call.
///
/// Exactly one `Token` carries `is_first = true`. `Complete` carries the
/// concatenation of every token and is sent once. Nothing follows `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Token { text: String, is_first: bool },
    Complete(String),
    Error(String),
}

pub type GenerationStream = mpsc::Receiver<GenerationEvent>;

/// Streaming text generation provider
pub trait Generation: Send + Sync {
    /// Start a completion for `messages`; runs in the background
    fn stream_completion(&self, messages: Vec<Message>) -> GenerationStream;

    fn model_name(&self) -> &str;
}

/// Producer half of a [`GenerationStream`] that upholds the event contract
#[derive(Debug)]
pub struct GenerationSender {
    tx: mpsc::Sender<GenerationEvent>,
    full_text: String,
    first_sent: bool,
}

impl GenerationSender {
    pub fn channel(buffer: usize) -> (Self, GenerationStream) {
        let (tx, rx) = mpsc::channel(buffer);
        let sender = Self {
            tx,
            full_text: String::new(),
            first_sent: false,
        };
        (sender, rx)
    }

    /// Emit one token; empty text is skipped.
    ///
    /// Returns `false` when the consumer has gone away.
    pub async fn token(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return !self.tx.is_closed();
        }
        let is_first = !self.first_sent;
        self.first_sent = true;
        self.full_text.push_str(text);
        self.tx
            .send(GenerationEvent::Token {
                text: text.to_string(),
                is_first,
            })
            .await
            .is_ok()
    }

    /// Text emitted so far
    pub fn text(&self) -> &str {
        &self.full_text
    }

    pub async fn complete(self) {
        let _ = self.tx.send(GenerationEvent::Complete(self.full_text)).await;
    }

    pub async fn fail(self, error: impl Into<String>) {
        let _ = self.tx.send(GenerationEvent::Error(error.into())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sender_marks_first_token_once() {
        let (mut sender, mut rx) = GenerationSender::channel(8);
        tokio::spawn(async move {
            for t in ["Hi", "", " there", "!"] {
                sender.token(t).await;
            }
            sender.complete().await;
        });

        let mut firsts = 0;
        let mut tokens = Vec::new();
        let mut complete = None;
        while let Some(event) = rx.recv().await {
            match event {
                GenerationEvent::Token { text, is_first } => {
                    if is_first {
                        firsts += 1;
                    }
                    tokens.push(text);
                }
                GenerationEvent::Complete(full) => complete = Some(full),
                GenerationEvent::Error(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(firsts, 1);
        assert_eq!(tokens, vec!["Hi", " there", "!"]);
        assert_eq!(complete.as_deref(), Some("Hi there!"));
    }

    #[tokio::test]
    async fn test_fail_is_terminal() {
        let (mut sender, mut rx) = GenerationSender::channel(8);
        sender.token("partial").await;
        sender.fail("boom").await;

        assert!(matches!(rx.recv().await, Some(GenerationEvent::Token { .. })));
        assert_eq!(rx.recv().await, Some(GenerationEvent::Error("boom".into())));
        assert_eq!(rx.recv().await, None);
    }
}
