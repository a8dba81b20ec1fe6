//! Mass sends to registered users: navigator broadcasts and the daily reminder.

use crate::domain::{Audience, BroadcastPayload, DomainError};
use crate::ports::{FileRef, SendOptions, Transport, UserStore};
use crate::shared::texts::CAPTION_LIMIT;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Broadcaster {
    transport: Arc<dyn Transport>,
    users: Arc<dyn UserStore>,
    /// Never targeted, even when present in the user table.
    staff_chats: Vec<i64>,
}

/// Caption cut to the Telegram limit plus the full text to send separately when cut.
fn split_caption(text: &str) -> (String, Option<String>) {
    if text.chars().count() <= CAPTION_LIMIT {
        return (text.to_string(), None);
    }
    let mut caption: String = text.chars().take(CAPTION_LIMIT - 3).collect();
    caption.push_str("...");
    (caption, Some(text.to_string()))
}

impl Broadcaster {
    pub fn new(
        transport: Arc<dyn Transport>,
        users: Arc<dyn UserStore>,
        staff_chats: Vec<i64>,
    ) -> Self {
        Self {
            transport,
            users,
            staff_chats,
        }
    }

    async fn targets(&self, audience: Audience) -> Result<Vec<i64>, DomainError> {
        let mut chats = self.users.list_chats(audience).await?;
        chats.retain(|c| !self.staff_chats.contains(c));
        Ok(chats)
    }

    /// Sends `payload` to every registered user. Returns the number of users reached.
    /// Document wins over photo, photo over plain text.
    pub async fn broadcast(&self, payload: &BroadcastPayload) -> Result<usize, DomainError> {
        let chats = self.targets(Audience::All).await?;
        let text = payload.text.trim();
        let (caption, extra) = split_caption(text);
        let caption = (!caption.is_empty()).then_some(caption);

        let mut reached = 0;
        for chat in chats {
            let sent = if let Some(doc) = &payload.document_file_id {
                self.transport
                    .send_document(
                        chat,
                        FileRef::Id(doc.clone()),
                        caption.as_deref(),
                        SendOptions::default(),
                    )
                    .await
            } else if let Some(photo) = &payload.photo_file_id {
                self.transport
                    .send_photo(
                        chat,
                        FileRef::Id(photo.clone()),
                        caption.as_deref(),
                        SendOptions::default(),
                    )
                    .await
            } else if !text.is_empty() {
                self.transport
                    .send_text(chat, text, SendOptions::default())
                    .await
            } else {
                continue;
            };
            if let Err(e) = sent {
                warn!(chat_id = chat, error = %e, "broadcast send failed");
                continue;
            }
            let has_media = payload.document_file_id.is_some() || payload.photo_file_id.is_some();
            if let (true, Some(full)) = (has_media, &extra) {
                if let Err(e) = self.transport.send_text(chat, full, SendOptions::default()).await {
                    warn!(chat_id = chat, error = %e, "broadcast full text failed");
                }
            }
            reached += 1;
        }
        info!(reached, "broadcast sent");
        Ok(reached)
    }

    /// Plain text to `audience`. Returns the number of users reached.
    pub async fn send_text(&self, audience: Audience, text: &str) -> Result<usize, DomainError> {
        let mut reached = 0;
        for chat in self.targets(audience).await? {
            match self.transport.send_text(chat, text, SendOptions::default()).await {
                Ok(_) => reached += 1,
                Err(e) => warn!(chat_id = chat, error = %e, "text broadcast failed"),
            }
        }
        Ok(reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::SqliteRepo;
    use crate::adapters::telegram::{RecordingTransport, SentKind};
    use crate::domain::UserRecord;

    async fn setup() -> (
        tempfile::TempDir,
        Arc<RecordingTransport>,
        Arc<SqliteRepo>,
        Broadcaster,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let repo = Arc::new(SqliteRepo::connect(dir.path(), 1).await.unwrap());
        for id in [1, 2, 3] {
            repo.upsert(&UserRecord {
                user_id: id,
                chat_id: id,
                username: None,
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap();
        }
        repo.set_allowed(1, true).await.unwrap();
        repo.set_allowed(2, true).await.unwrap();
        repo.set_blocked(2, true).await.unwrap();
        let b = Broadcaster::new(transport.clone(), repo.clone(), vec![3]);
        (dir, transport, repo, b)
    }

    #[tokio::test]
    async fn test_broadcast_skips_staff_and_failures() {
        let (_dir, transport, _repo, b) = setup().await;
        transport.fail_chat(2).await;
        let payload = BroadcastPayload {
            text: "news".into(),
            ..Default::default()
        };
        assert_eq!(b.broadcast(&payload).await.unwrap(), 1);
        assert_eq!(transport.texts_to(1).await, vec!["news".to_string()]);
        assert!(transport.sent_to(3).await.is_empty());
    }

    #[tokio::test]
    async fn test_long_caption_is_cut_and_followed_by_text() {
        let (_dir, transport, _repo, b) = setup().await;
        let long = "x".repeat(1500);
        let payload = BroadcastPayload {
            text: long.clone(),
            document_file_id: Some("doc".into()),
            photo_file_id: Some("ph".into()),
        };
        b.broadcast(&payload).await.unwrap();
        let sent = transport.sent_to(1).await;
        assert_eq!(sent[0].kind, SentKind::Document(FileRef::Id("doc".into())));
        assert_eq!(sent[0].text.chars().count(), 1024);
        assert!(sent[0].text.ends_with("..."));
        assert_eq!(sent[1].text, long);
    }

    #[tokio::test]
    async fn test_reminder_audience_is_eligible_only() {
        let (_dir, transport, _repo, b) = setup().await;
        assert_eq!(b.send_text(Audience::Eligible, "soon").await.unwrap(), 1);
        assert_eq!(transport.sent().await.len(), 1);
        assert_eq!(transport.sent().await[0].chat_id, 1);
    }
}
