//! Approval workflow for submitted applications.
//!
//! An item lives from the moment the request is posted in the approval chat until
//! it is approved or a revision reason is relayed. Removed items ignore all actions.

use super::entities::MessageRef;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    AwaitingDecision,
    AwaitingRevisionReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalItem {
    /// The user's final message of the application.
    pub user: MessageRef,
    pub summary: String,
    pub state: ApprovalState,
    pub invoice_number: i64,
    /// Generated invoice (xlsx).
    pub document: PathBuf,
    /// Staff prompt asking for the revision reason; replies to it count as replies to the request.
    pub revision_prompt: Option<i32>,
}

impl ApprovalItem {
    pub fn new(user: MessageRef, summary: String, invoice_number: i64, document: PathBuf) -> Self {
        Self {
            user,
            summary,
            state: ApprovalState::AwaitingDecision,
            invoice_number,
            document,
            revision_prompt: None,
        }
    }
}

/// Inline button actions on an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAction {
    Approve,
    RequestRevision,
}

impl ApprovalAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "app_ok" => Some(Self::Approve),
            "app_fix" => Some(Self::RequestRevision),
            _ => None,
        }
    }

    pub fn callback_data(self) -> &'static str {
        match self {
            Self::Approve => "app_ok",
            Self::RequestRevision => "app_fix",
        }
    }
}
