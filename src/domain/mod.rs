//! Core domain layer. No external I/O dependencies.
//!
//! Entities, the application flow, the approval workflow and money rules live here.

pub mod application;
pub mod approval;
pub mod entities;
pub mod errors;
pub mod money;
pub mod org_name;
pub mod support_interrupt;

pub use application::{
    Control, ConversationState, Draft, Effect, FlowInput, LineItem, Notice, Stage,
};
pub use approval::{ApprovalAction, ApprovalItem, ApprovalState};
pub use entities::{
    Audience, BroadcastPayload, CallbackEvent, CompanyData, Content, InboundEvent,
    InboundMessage, MessageRef, ReplyContext, ScheduledBroadcast, UserProfile, UserRecord,
};
pub use errors::DomainError;
