//! In-process state ports. Lost on restart.

use crate::domain::{ApprovalItem, ConversationState, DomainError, MessageRef};

/// Per-user application flow state. Missing users read as a fresh idle state.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, user_id: i64) -> Result<ConversationState, DomainError>;

    /// Saving an idle state with an empty draft drops the entry.
    async fn save(&self, user_id: i64, state: ConversationState) -> Result<(), DomainError>;
}

/// Pending approval requests keyed by the request message id in the approval chat.
#[async_trait::async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn insert(&self, key: i32, item: ApprovalItem) -> Result<(), DomainError>;

    async fn get(&self, key: i32) -> Result<Option<ApprovalItem>, DomainError>;

    /// Atomically removes and returns the item; `None` if already resolved.
    async fn remove(&self, key: i32) -> Result<Option<ApprovalItem>, DomainError>;

    /// Moves the item to `AwaitingRevisionReason` and remembers the staff prompt id.
    /// Returns false when the item is gone.
    async fn begin_revision(&self, key: i32, prompt_id: Option<i32>)
    -> Result<bool, DomainError>;

    /// Removes and returns the item awaiting a revision reason whose request or prompt is `reply_to`.
    async fn take_revision(
        &self,
        reply_to: i32,
    ) -> Result<Option<(i32, ApprovalItem)>, DomainError>;
}

/// Marks user messages that were relayed as support questions.
#[async_trait::async_trait]
pub trait SupportTagStore: Send + Sync {
    async fn tag(&self, origin: MessageRef) -> Result<(), DomainError>;

    async fn is_tagged(&self, origin: MessageRef) -> Result<bool, DomainError>;
}
