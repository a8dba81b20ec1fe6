//! Reply routing between private users and staff chats.
//!
//! - User -> staff: header + forward into a staff chat, both recorded in the message map
//! - Staff -> user: replies from responders are resolved through the map and re-sent
//! - Navigator replies are mirrored into the category/accounting chat that holds the user message

use crate::domain::{Content, DomainError, InboundMessage, MessageRef, UserProfile};
use crate::ports::{FileRef, MessageMapStore, SendOptions, SupportTagStore, Transport};
use crate::shared::texts::{CAPTION_LIMIT, truncate_chars};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Length of the reply summary in mirrored notices.
const MIRROR_SUMMARY_CHARS: usize = 300;

pub struct RelayService {
    transport: Arc<dyn Transport>,
    map: Arc<dyn MessageMapStore>,
    tags: Arc<dyn SupportTagStore>,
    /// responder user id -> alias (may be empty)
    responders: HashMap<i64, String>,
    navigator: i64,
    /// Chats searched, in order, for the mirror anchor of a navigator reply.
    mirror_chats: Vec<i64>,
}

impl RelayService {
    pub fn new(
        transport: Arc<dyn Transport>,
        map: Arc<dyn MessageMapStore>,
        tags: Arc<dyn SupportTagStore>,
        responders: HashMap<i64, String>,
        navigator: i64,
        mirror_chats: Vec<i64>,
    ) -> Self {
        Self {
            transport,
            map,
            tags,
            responders,
            navigator,
            mirror_chats,
        }
    }

    pub fn navigator(&self) -> i64 {
        self.navigator
    }

    pub fn is_responder(&self, user_id: i64) -> bool {
        self.responders.contains_key(&user_id)
    }

    /// Configured alias, else "@username", else "id:N".
    pub fn alias(&self, from: &UserProfile) -> String {
        match self.responders.get(&from.user_id).map(|a| a.trim()) {
            Some(a) if !a.is_empty() => a.to_string(),
            _ => from.reference(),
        }
    }

    /// Posts `header` and forwards `msg` into `dest_chat`, mapping both back to `msg`.
    pub async fn relay(
        &self,
        dest_chat: i64,
        header: &str,
        msg: &InboundMessage,
    ) -> Result<(), DomainError> {
        if dest_chat == 0 {
            debug!(chat_id = msg.chat_id, "relay target not configured, skipping");
            return Ok(());
        }
        let origin = msg.reference();
        let header_id = self
            .transport
            .send_text(dest_chat, header, SendOptions::default())
            .await?;
        self.remember(MessageRef::new(dest_chat, header_id), origin).await;

        let forward_id = self.transport.forward(dest_chat, origin).await?;
        self.remember(MessageRef::new(dest_chat, forward_id), origin).await;

        debug!(
            dest_chat,
            user_chat = origin.chat_id,
            msg_id = origin.message_id,
            "relayed"
        );
        Ok(())
    }

    /// Relays a support question to the navigator and tags it.
    pub async fn relay_support(&self, msg: &InboundMessage, user_ref: &str) -> Result<(), DomainError> {
        self.relay(self.navigator, &format!("От: {}", user_ref), msg)
            .await?;
        self.tags.tag(msg.reference()).await
    }

    /// Records a mapping; storage failures are logged, never fatal.
    pub async fn remember(&self, dest: MessageRef, origin: MessageRef) {
        if let Err(e) = self.map.record(dest, origin).await {
            warn!(
                dest_chat = dest.chat_id,
                dest_msg = dest.message_id,
                error = %e,
                "failed to record message mapping"
            );
        }
    }

    /// Routes a staff reply back to the user. Returns false when the message is not a
    /// routable reply (no reply target, not a responder, unknown target).
    pub async fn handle_staff_reply(&self, msg: &InboundMessage) -> Result<bool, DomainError> {
        let (Some(reply), Some(from)) = (msg.reply_to, msg.from.as_ref()) else {
            return Ok(false);
        };
        if !self.is_responder(from.user_id) {
            debug!(chat_id = msg.chat_id, user_id = from.user_id, "reply from non-responder ignored");
            return Ok(false);
        }
        let dest = MessageRef::new(msg.chat_id, reply.message_id);
        let Some(origin) = self.map.lookup_origin(dest).await? else {
            debug!(chat_id = msg.chat_id, msg_id = reply.message_id, "reply target not mapped");
            return Ok(false);
        };

        let alias = self.alias(from);
        let thread_text = reply.has_media || self.tags.is_tagged(origin).await?;
        let thread = if thread_text || msg.content.is_media() {
            Some(origin.message_id)
        } else {
            None
        };
        if self
            .send_as_staff(origin.chat_id, &alias, &msg.content, thread)
            .await?
            .is_none()
        {
            return Ok(false);
        }
        info!(
            staff_chat = msg.chat_id,
            user_chat = origin.chat_id,
            alias = %alias,
            "staff reply delivered"
        );

        if msg.chat_id == self.navigator {
            self.mirror(origin, &alias, &msg.content).await;
        }
        Ok(true)
    }

    /// Sends staff content to a user with the alias prefix. `None` for unsupported content.
    pub async fn send_as_staff(
        &self,
        user_chat: i64,
        alias: &str,
        content: &Content,
        reply_to: Option<i32>,
    ) -> Result<Option<i32>, DomainError> {
        let opts = reply_to.map(SendOptions::reply_to).unwrap_or_default();
        let caption = || {
            let c = content.caption();
            let full = if c.is_empty() {
                alias.to_string()
            } else {
                format!("{}:\n{}", alias, c)
            };
            truncate_chars(&full, CAPTION_LIMIT)
        };
        let id = match content {
            Content::Text(t) if !t.trim().is_empty() => {
                self.transport
                    .send_text(user_chat, &format!("{}:\n{}", alias, t.trim()), opts)
                    .await?
            }
            Content::Document { file_id, .. } => {
                self.transport
                    .send_document(user_chat, FileRef::Id(file_id.clone()), Some(&caption()), opts)
                    .await?
            }
            Content::Photo { file_id, .. } => {
                self.transport
                    .send_photo(user_chat, FileRef::Id(file_id.clone()), Some(&caption()), opts)
                    .await?
            }
            _ => return Ok(None),
        };
        Ok(Some(id))
    }

    /// Posts the navigator's reply into the staff chat that received the user message.
    async fn mirror(&self, origin: MessageRef, alias: &str, content: &Content) {
        let anchor = match self.mirror_anchor(origin).await {
            Ok(Some(anchor)) => anchor,
            Ok(None) => return,
            Err(e) => {
                warn!(user_chat = origin.chat_id, error = %e, "mirror lookup failed");
                return;
            }
        };
        let opts = SendOptions::reply_to(anchor.message_id);
        let result = match content {
            Content::Document { file_id, .. } => {
                let caption = mirror_text(alias, content.caption(), "[документ]", CAPTION_LIMIT);
                self.transport
                    .send_document(anchor.chat_id, FileRef::Id(file_id.clone()), Some(&caption), opts)
                    .await
            }
            Content::Photo { file_id, .. } => {
                let caption = mirror_text(alias, content.caption(), "[фото]", CAPTION_LIMIT);
                self.transport
                    .send_photo(anchor.chat_id, FileRef::Id(file_id.clone()), Some(&caption), opts)
                    .await
            }
            Content::Text(t) => {
                let summary = truncate_summary(t.trim());
                let text = mirror_text(alias, &summary, "[сообщение]", usize::MAX);
                self.transport.send_text(anchor.chat_id, &text, opts).await
            }
            Content::Other => return,
        };
        if let Err(e) = result {
            warn!(chat_id = anchor.chat_id, error = %e, "mirror send failed");
        }
    }

    async fn mirror_anchor(&self, origin: MessageRef) -> Result<Option<MessageRef>, DomainError> {
        let Some(chat) = self
            .map
            .find_destination_chat(origin, &self.mirror_chats)
            .await?
        else {
            return Ok(None);
        };
        let msg = self.map.find_destination_message(chat, origin).await?;
        Ok(msg.map(|id| MessageRef::new(chat, id)))
    }
}

fn truncate_summary(s: &str) -> String {
    if s.chars().count() <= MIRROR_SUMMARY_CHARS {
        return s.to_string();
    }
    let mut out: String = s.chars().take(MIRROR_SUMMARY_CHARS).collect();
    out.push('…');
    out
}

fn mirror_text(alias: &str, body: &str, placeholder: &str, limit: usize) -> String {
    let body = if body.is_empty() { placeholder } else { body };
    truncate_chars(
        &format!("‼️{} ответил пользователю:\n{}", alias.trim(), body),
        limit,
    )
}
