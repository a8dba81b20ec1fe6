//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{
    Audience, BroadcastPayload, CompanyData, DomainError, MessageRef, ScheduledBroadcast,
    UserRecord,
};
use std::path::{Path, PathBuf};

/// Keyboard attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Reply keyboard under the input field. Rows of button labels.
    Reply {
        rows: Vec<Vec<String>>,
        one_time: bool,
    },
    /// Inline buttons with callback data.
    Inline(Vec<Vec<InlineButton>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Thread the message as a reply to this message id in the target chat.
    pub reply_to: Option<i32>,
    pub keyboard: Option<Keyboard>,
}

impl SendOptions {
    pub fn reply_to(message_id: i32) -> Self {
        Self {
            reply_to: Some(message_id),
            keyboard: None,
        }
    }

    pub fn keyboard(keyboard: Keyboard) -> Self {
        Self {
            reply_to: None,
            keyboard: Some(keyboard),
        }
    }
}

/// A file to send: an already-uploaded Telegram file id or a local path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    Id(String),
    Path(PathBuf),
}

/// Telegram Bot API transport. Every send returns the id of the new message.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str, opts: SendOptions)
    -> Result<i32, DomainError>;

    async fn send_document(
        &self,
        chat_id: i64,
        file: FileRef,
        caption: Option<&str>,
        opts: SendOptions,
    ) -> Result<i32, DomainError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        file: FileRef,
        caption: Option<&str>,
        opts: SendOptions,
    ) -> Result<i32, DomainError>;

    /// Forward `source` into `to_chat`.
    async fn forward(&self, to_chat: i64, source: MessageRef) -> Result<i32, DomainError>;

    async fn answer_callback(&self, callback_id: &str) -> Result<(), DomainError>;
}

/// Durable map from a message posted in a staff chat to the user message it represents.
#[async_trait::async_trait]
pub trait MessageMapStore: Send + Sync {
    /// Idempotent; the first mapping recorded for `dest` wins.
    async fn record(&self, dest: MessageRef, origin: MessageRef) -> Result<(), DomainError>;

    async fn lookup_origin(&self, dest: MessageRef) -> Result<Option<MessageRef>, DomainError>;

    /// First chat in `candidates` (caller's order) holding a mapping to `origin`.
    async fn find_destination_chat(
        &self,
        origin: MessageRef,
        candidates: &[i64],
    ) -> Result<Option<i64>, DomainError>;

    /// Largest destination message id in `dest_chat` mapped to `origin`.
    async fn find_destination_message(
        &self,
        dest_chat: i64,
        origin: MessageRef,
    ) -> Result<Option<i32>, DomainError>;
}

/// Registered private users and their access flags.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Insert or refresh chat id and names; flags and category are preserved.
    async fn upsert(&self, user: &UserRecord) -> Result<(), DomainError>;

    async fn category(&self, user_id: i64) -> Result<Option<String>, DomainError>;

    async fn set_category(&self, user_id: i64, category: &str) -> Result<(), DomainError>;

    async fn is_allowed(&self, user_id: i64) -> Result<bool, DomainError>;

    async fn set_allowed(&self, user_id: i64, allowed: bool) -> Result<(), DomainError>;

    async fn is_blocked(&self, user_id: i64) -> Result<bool, DomainError>;

    async fn set_blocked(&self, user_id: i64, blocked: bool) -> Result<(), DomainError>;

    async fn list_chats(&self, audience: Audience) -> Result<Vec<i64>, DomainError>;

    /// Chat of an allowed, non-blocked user by username (case-insensitive, leading `@` optional).
    async fn find_eligible_chat_by_username(
        &self,
        username: &str,
    ) -> Result<Option<i64>, DomainError>;

    async fn find_eligible_chat_by_user_id(&self, user_id: i64)
    -> Result<Option<i64>, DomainError>;
}

/// Gap-free, cross-process unique invoice numbers.
#[async_trait::async_trait]
pub trait InvoiceSequence: Send + Sync {
    /// Reserves and returns the next number. Never returns the same number twice.
    async fn reserve(&self) -> Result<i64, DomainError>;
}

/// Durable queue of scheduled broadcasts.
#[async_trait::async_trait]
pub trait BroadcastQueue: Send + Sync {
    async fn schedule(&self, due_at: i64, payload: &BroadcastPayload) -> Result<i64, DomainError>;

    /// Marks every unsent broadcast due at or before `now` as sent and returns them.
    /// A broadcast is returned by at most one call, across processes.
    async fn claim_due(&self, now: i64) -> Result<Vec<ScheduledBroadcast>, DomainError>;

    /// Returns a claimed broadcast to the queue so a later claim picks it up again.
    async fn release(&self, id: i64) -> Result<(), DomainError>;
}

/// Company registry lookup by tax id.
#[async_trait::async_trait]
pub trait RegistryLookup: Send + Sync {
    async fn lookup(&self, tax_id: &str) -> Result<CompanyData, DomainError>;
}

/// Office document to PDF conversion.
#[async_trait::async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Converts `source` and returns the path of the produced PDF.
    async fn convert(&self, source: &Path) -> Result<PathBuf, DomainError>;
}

/// Cell-level access to the invoice worksheet. Cells are A1-style references.
pub trait InvoiceSheet {
    fn cell_text(&self, cell: &str) -> String;

    fn set_text(&mut self, cell: &str, value: &str);

    fn set_number(&mut self, cell: &str, value: f64);

    /// Inserts `count` empty rows before 1-based `row`, shifting the rows below down.
    fn insert_rows(&mut self, row: u32, count: u32);
}

/// Fill callback run against the template's invoice sheet.
pub type SheetFill = Box<dyn FnOnce(&mut dyn InvoiceSheet) + Send>;

/// Spreadsheet engine: open template, fill, save under a new name.
#[async_trait::async_trait]
pub trait SpreadsheetPort: Send + Sync {
    async fn render(&self, template: &Path, output: &Path, fill: SheetFill)
    -> Result<(), DomainError>;
}
