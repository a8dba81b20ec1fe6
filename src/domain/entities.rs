//! Domain entities. Pure data structures for the relay.
//!
//! No Telegram/IO types here; adapters map into them.

use serde::{Deserialize, Serialize};

/// A message identity: chat plus message id inside that chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

impl MessageRef {
    pub fn new(chat_id: i64, message_id: i32) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// Sender of an inbound message or callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserProfile {
    /// "@username" when the user has one, otherwise "id:N".
    pub fn reference(&self) -> String {
        match self.username.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => format!("@{}", u),
            _ => format!("id:{}", self.user_id),
        }
    }
}

/// Payload of an inbound message. Photos carry the file id of the largest size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Document {
        file_id: String,
        caption: Option<String>,
    },
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Other,
}

impl Content {
    pub fn is_media(&self) -> bool {
        matches!(self, Content::Document { .. } | Content::Photo { .. })
    }

    /// Trimmed caption of a document or photo; empty otherwise.
    pub fn caption(&self) -> &str {
        match self {
            Content::Document { caption, .. } | Content::Photo { caption, .. } => {
                caption.as_deref().map(str::trim).unwrap_or("")
            }
            _ => "",
        }
    }
}

/// The message a reply points at, as far as routing needs to know it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyContext {
    pub message_id: i32,
    pub has_media: bool,
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub is_private: bool,
    pub from: Option<UserProfile>,
    pub content: Content,
    pub reply_to: Option<ReplyContext>,
}

impl InboundMessage {
    pub fn reference(&self) -> MessageRef {
        MessageRef::new(self.chat_id, self.message_id)
    }

    /// Trimmed message text; empty for media and service messages.
    pub fn text(&self) -> &str {
        match &self.content {
            Content::Text(t) => t.trim(),
            _ => "",
        }
    }

    /// Bot command without the leading slash and `@botname` suffix, e.g. "start".
    pub fn command(&self) -> Option<&str> {
        let text = self.text();
        let cmd = text.strip_prefix('/')?.split_whitespace().next()?;
        Some(cmd.split('@').next().unwrap_or(cmd))
    }

    pub fn sender_id(&self) -> Option<i64> {
        self.from.as_ref().map(|u| u.user_id)
    }
}

/// Inline keyboard button press.
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub id: String,
    pub from: UserProfile,
    /// Message carrying the keyboard; absent for inaccessible messages.
    pub message: Option<MessageRef>,
    pub data: String,
}

#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message(InboundMessage),
    Callback(CallbackEvent),
}

/// Company data returned by the registry lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyData {
    pub kpp: String,
    pub name: String,
    pub address: String,
}

/// Audience for mass sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every registered user.
    All,
    /// Users who passed the access check.
    Allowed,
    /// Allowed and not blocked.
    Eligible,
}

/// A user row as upserted from an inbound private message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserRecord {
    pub fn from_profile(profile: &UserProfile, chat_id: i64) -> Self {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        Self {
            user_id: profile.user_id,
            chat_id,
            username: clean(&profile.username),
            first_name: clean(&profile.first_name),
            last_name: clean(&profile.last_name),
        }
    }
}

/// Content of a navigator broadcast. At least one field is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastPayload {
    pub text: String,
    pub document_file_id: Option<String>,
    pub photo_file_id: Option<String>,
}

impl BroadcastPayload {
    /// Builds a payload from a captured message. `None` when it carries nothing sendable.
    pub fn from_content(content: &Content) -> Option<Self> {
        let payload = match content {
            Content::Text(t) => Self {
                text: t.trim().to_string(),
                ..Self::default()
            },
            Content::Document { file_id, .. } => Self {
                text: content.caption().to_string(),
                document_file_id: Some(file_id.clone()),
                ..Self::default()
            },
            Content::Photo { file_id, .. } => Self {
                text: content.caption().to_string(),
                photo_file_id: Some(file_id.clone()),
                ..Self::default()
            },
            Content::Other => return None,
        };
        if payload.is_empty() {
            None
        } else {
            Some(payload)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.document_file_id.is_none() && self.photo_file_id.is_none()
    }
}

/// A broadcast claimed from the durable queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledBroadcast {
    pub id: i64,
    pub due_at: i64,
    pub payload: BroadcastPayload,
}
