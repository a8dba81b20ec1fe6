//! Implements Transport using a teloxide Bot.
//!
//! Handles flood control (RetryAfter) by sleeping and retrying.

use crate::domain::{DomainError, MessageRef};
use crate::ports::{FileRef, Keyboard, SendOptions, Transport};
use async_trait::async_trait;
use std::future::Future;
use teloxide::prelude::*;
use teloxide::requests::Request;
use teloxide::types::{
    CallbackQueryId, FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile,
    KeyboardButton, KeyboardMarkup, MessageId, ReplyMarkup, ReplyParameters,
};
use teloxide::RequestError;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;

/// Telegram transport adapter. The Bot is cheap to clone (shared client inside).
pub struct TeloxideTransport {
    bot: Bot,
}

impl TeloxideTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Runs `call` until it succeeds, sleeping through flood control up to MAX_ATTEMPTS times.
async fn with_flood_retry<T, F, Fut>(op: &'static str, mut call: F) -> Result<T, DomainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        match call().await {
            Ok(v) => return Ok(v),
            Err(RequestError::RetryAfter(secs)) if attempt < MAX_ATTEMPTS => {
                let wait = secs.duration();
                warn!(op, attempt, wait_secs = wait.as_secs(), "flood control, sleeping");
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(DomainError::Transport(format!("{}: {}", op, e))),
        }
    }
    Err(DomainError::Transport(format!("{}: flood control retries exhausted", op)))
}

fn input_file(file: &FileRef) -> InputFile {
    match file {
        FileRef::Id(id) => InputFile::file_id(FileId(id.clone())),
        FileRef::Path(path) => InputFile::file(path.clone()),
    }
}

/// Map a port keyboard to teloxide markup. Reply keyboards are always resized.
pub fn reply_markup(keyboard: &Keyboard) -> ReplyMarkup {
    match keyboard {
        Keyboard::Reply { rows, one_time } => {
            let mut markup = KeyboardMarkup::new(rows.iter().map(|row| {
                row.iter()
                    .map(|label| KeyboardButton::new(label.clone()))
                    .collect::<Vec<_>>()
            }));
            markup.resize_keyboard = true;
            markup.one_time_keyboard = *one_time;
            ReplyMarkup::Keyboard(markup)
        }
        Keyboard::Inline(rows) => ReplyMarkup::InlineKeyboard(InlineKeyboardMarkup::new(
            rows.iter().map(|row| {
                row.iter()
                    .map(|b| InlineKeyboardButton::callback(b.text.clone(), b.data.clone()))
                    .collect::<Vec<_>>()
            }),
        )),
    }
}

#[async_trait]
impl Transport for TeloxideTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        opts: SendOptions,
    ) -> Result<i32, DomainError> {
        let sent = with_flood_retry("send_message", || {
            let mut req = self.bot.send_message(ChatId(chat_id), text);
            if let Some(id) = opts.reply_to {
                req = req.reply_parameters(ReplyParameters::new(MessageId(id)));
            }
            if let Some(kb) = &opts.keyboard {
                req = req.reply_markup(reply_markup(kb));
            }
            req.send()
        })
        .await?;
        debug!(chat_id, message_id = sent.id.0, "sent text");
        Ok(sent.id.0)
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file: FileRef,
        caption: Option<&str>,
        opts: SendOptions,
    ) -> Result<i32, DomainError> {
        let sent = with_flood_retry("send_document", || {
            let mut req = self.bot.send_document(ChatId(chat_id), input_file(&file));
            if let Some(c) = caption.filter(|c| !c.is_empty()) {
                req = req.caption(c);
            }
            if let Some(id) = opts.reply_to {
                req = req.reply_parameters(ReplyParameters::new(MessageId(id)));
            }
            if let Some(kb) = &opts.keyboard {
                req = req.reply_markup(reply_markup(kb));
            }
            req.send()
        })
        .await?;
        debug!(chat_id, message_id = sent.id.0, "sent document");
        Ok(sent.id.0)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file: FileRef,
        caption: Option<&str>,
        opts: SendOptions,
    ) -> Result<i32, DomainError> {
        let sent = with_flood_retry("send_photo", || {
            let mut req = self.bot.send_photo(ChatId(chat_id), input_file(&file));
            if let Some(c) = caption.filter(|c| !c.is_empty()) {
                req = req.caption(c);
            }
            if let Some(id) = opts.reply_to {
                req = req.reply_parameters(ReplyParameters::new(MessageId(id)));
            }
            if let Some(kb) = &opts.keyboard {
                req = req.reply_markup(reply_markup(kb));
            }
            req.send()
        })
        .await?;
        debug!(chat_id, message_id = sent.id.0, "sent photo");
        Ok(sent.id.0)
    }

    async fn forward(&self, to_chat: i64, source: MessageRef) -> Result<i32, DomainError> {
        let sent = with_flood_retry("forward_message", || {
            self.bot
                .forward_message(
                    ChatId(to_chat),
                    ChatId(source.chat_id),
                    MessageId(source.message_id),
                )
                .send()
        })
        .await?;
        Ok(sent.id.0)
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), DomainError> {
        with_flood_retry("answer_callback_query", || {
            self.bot
                .answer_callback_query(CallbackQueryId(callback_id.to_owned()))
                .send()
        })
        .await?;
        Ok(())
    }
}
