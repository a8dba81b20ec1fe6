//! Builders for inbound messages used across use-case tests.

use crate::domain::{Content, InboundMessage, ReplyContext, UserProfile};

pub fn user(user_id: i64, username: Option<&str>) -> UserProfile {
    UserProfile {
        user_id,
        username: username.map(String::from),
        first_name: Some("Ann".into()),
        last_name: None,
    }
}

/// Private message: the chat id equals the user id.
pub fn private(user_id: i64, message_id: i32, content: Content) -> InboundMessage {
    InboundMessage {
        chat_id: user_id,
        message_id,
        is_private: true,
        from: Some(user(user_id, Some("ann"))),
        content,
        reply_to: None,
    }
}

pub fn private_text(user_id: i64, message_id: i32, text: &str) -> InboundMessage {
    private(user_id, message_id, Content::Text(text.into()))
}

pub fn document(file_id: &str, caption: Option<&str>) -> Content {
    Content::Document {
        file_id: file_id.into(),
        caption: caption.map(String::from),
    }
}

/// Group message from `sender`, optionally replying to `reply_to`.
pub fn group(
    chat_id: i64,
    sender: i64,
    message_id: i32,
    reply_to: Option<ReplyContext>,
    content: Content,
) -> InboundMessage {
    InboundMessage {
        chat_id,
        message_id,
        is_private: false,
        from: Some(user(sender, Some("staff"))),
        content,
        reply_to,
    }
}

pub fn reply_to(message_id: i32) -> Option<ReplyContext> {
    Some(ReplyContext {
        message_id,
        has_media: false,
    })
}
