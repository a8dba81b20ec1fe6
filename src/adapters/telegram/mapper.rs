//! Map teloxide types to domain entities.
//!
//! Extracts InboundMessage and CallbackEvent from Bot API updates.

use crate::domain::{
    CallbackEvent, Content, InboundMessage, MessageRef, ReplyContext, UserProfile,
};
use teloxide::types::{CallbackQuery, Message, User};

pub fn user_to_domain(user: &User) -> UserProfile {
    UserProfile {
        user_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|s| !s.is_empty()),
        last_name: user.last_name.clone(),
    }
}

/// Text first, then document, then photo (largest size is last).
fn content_of(msg: &Message) -> Content {
    if let Some(text) = msg.text() {
        return Content::Text(text.to_string());
    }
    let caption = msg.caption().map(String::from);
    if let Some(doc) = msg.document() {
        return Content::Document {
            file_id: doc.file.id.to_string(),
            caption,
        };
    }
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        return Content::Photo {
            file_id: photo.file.id.to_string(),
            caption,
        };
    }
    Content::Other
}

pub fn message_to_domain(msg: &Message) -> InboundMessage {
    InboundMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        is_private: msg.chat.is_private(),
        from: msg.from.as_ref().map(user_to_domain),
        content: content_of(msg),
        reply_to: msg.reply_to_message().map(|r| ReplyContext {
            message_id: r.id.0,
            has_media: r.document().is_some() || r.photo().is_some(),
        }),
    }
}

pub fn callback_to_domain(query: &CallbackQuery) -> CallbackEvent {
    CallbackEvent {
        id: query.id.to_string(),
        from: user_to_domain(&query.from),
        message: query
            .regular_message()
            .map(|m| MessageRef::new(m.chat.id.0, m.id.0)),
        data: query.data.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn private_base(user_id: i64) -> serde_json::Value {
        json!({
            "message_id": 7,
            "date": 1700000000i64,
            "chat": { "id": user_id, "type": "private", "first_name": "Ann" },
            "from": { "id": user_id, "is_bot": false, "first_name": "Ann", "username": "ann" },
        })
    }

    #[test]
    fn test_text_reply_in_group() {
        let json = json!({
            "message_id": 50,
            "date": 1700000000i64,
            "chat": { "id": -100123i64, "type": "supergroup", "title": "Desk" },
            "from": { "id": 9, "is_bot": false, "first_name": "Staff" },
            "text": "done",
            "reply_to_message": {
                "message_id": 40,
                "date": 1700000000i64,
                "chat": { "id": -100123i64, "type": "supergroup", "title": "Desk" },
                "document": { "file_id": "doc1", "file_unique_id": "u1" },
            },
        });
        let msg: Message = serde_json::from_value(json).unwrap();
        let inbound = message_to_domain(&msg);
        assert!(!inbound.is_private);
        assert_eq!(inbound.chat_id, -100123);
        assert_eq!(inbound.text(), "done");
        assert_eq!(
            inbound.reply_to,
            Some(ReplyContext {
                message_id: 40,
                has_media: true
            })
        );
        assert_eq!(inbound.from.unwrap().reference(), "id:9");
    }

    #[test]
    fn test_photo_takes_largest_size() {
        let mut json = private_base(10);
        json["photo"] = json!([
            { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 90 },
            { "file_id": "big", "file_unique_id": "b", "width": 800, "height": 600 },
        ]);
        json["caption"] = json!("receipt");
        let msg: Message = serde_json::from_value(json).unwrap();
        let inbound = message_to_domain(&msg);
        assert!(inbound.is_private);
        assert_eq!(
            inbound.content,
            Content::Photo {
                file_id: "big".into(),
                caption: Some("receipt".into())
            }
        );
        assert_eq!(inbound.from.unwrap().reference(), "@ann");
    }

    #[test]
    fn test_location_maps_to_other() {
        let mut json = private_base(10);
        json["location"] = json!({ "latitude": 1.0, "longitude": 2.0 });
        let msg: Message = serde_json::from_value(json).unwrap();
        assert_eq!(message_to_domain(&msg).content, Content::Other);
    }
}
