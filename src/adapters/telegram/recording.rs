//! Recording transport for unit tests.
//!
//! Keeps every outgoing call in memory and hands out increasing message ids.
//! Chats marked as failing reject every send.

use crate::domain::{DomainError, MessageRef};
use crate::ports::{FileRef, SendOptions, Transport};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentKind {
    Text,
    Document(FileRef),
    Photo(FileRef),
    Forward(MessageRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub chat_id: i64,
    pub message_id: i32,
    pub kind: SentKind,
    /// Message text or caption; empty for forwards.
    pub text: String,
    pub opts: SendOptions,
}

pub struct RecordingTransport {
    next_id: AtomicI32,
    sent: Mutex<Vec<Sent>>,
    answered: Mutex<Vec<String>>,
    failing: Mutex<HashSet<i64>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(1000),
            sent: Mutex::new(Vec::new()),
            answered: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Every later send to `chat_id` returns a transport error.
    pub async fn fail_chat(&self, chat_id: i64) {
        self.failing.lock().await.insert(chat_id);
    }

    pub async fn heal_chat(&self, chat_id: i64) {
        self.failing.lock().await.remove(&chat_id);
    }

    pub async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, chat_id: i64) -> Vec<Sent> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|s| s.chat_id == chat_id)
            .cloned()
            .collect()
    }

    pub async fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent_to(chat_id)
            .await
            .into_iter()
            .map(|s| s.text)
            .collect()
    }

    pub async fn answered(&self) -> Vec<String> {
        self.answered.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }

    async fn push(
        &self,
        chat_id: i64,
        kind: SentKind,
        text: &str,
        opts: SendOptions,
    ) -> Result<i32, DomainError> {
        if self.failing.lock().await.contains(&chat_id) {
            return Err(DomainError::Transport(format!("chat {} unavailable", chat_id)));
        }
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        info!(chat_id, message_id, "[RECORDING] send");
        self.sent.lock().await.push(Sent {
            chat_id,
            message_id,
            kind,
            text: text.to_string(),
            opts,
        });
        Ok(message_id)
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        opts: SendOptions,
    ) -> Result<i32, DomainError> {
        self.push(chat_id, SentKind::Text, text, opts).await
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file: FileRef,
        caption: Option<&str>,
        opts: SendOptions,
    ) -> Result<i32, DomainError> {
        self.push(chat_id, SentKind::Document(file), caption.unwrap_or(""), opts)
            .await
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file: FileRef,
        caption: Option<&str>,
        opts: SendOptions,
    ) -> Result<i32, DomainError> {
        self.push(chat_id, SentKind::Photo(file), caption.unwrap_or(""), opts)
            .await
    }

    async fn forward(&self, to_chat: i64, source: MessageRef) -> Result<i32, DomainError> {
        self.push(to_chat, SentKind::Forward(source), "", SendOptions::default())
            .await
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), DomainError> {
        self.answered.lock().await.push(callback_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_increase_and_failures_are_per_chat() {
        let t = RecordingTransport::new();
        let a = t.send_text(1, "a", SendOptions::default()).await.unwrap();
        let b = t.forward(2, MessageRef::new(1, a)).await.unwrap();
        assert!(b > a);

        t.fail_chat(3).await;
        assert!(t.send_text(3, "x", SendOptions::default()).await.is_err());
        assert_eq!(t.sent().await.len(), 2);
        assert_eq!(t.texts_to(1).await, vec!["a".to_string()]);

        t.heal_chat(3).await;
        assert!(t.send_text(3, "x", SendOptions::default()).await.is_ok());
    }
}
