//! Port traits. API boundaries for the hexagon.
//!
//! - Inbound: Called by the Telegram adapter into the application
//! - Outbound: Called by application into infrastructure
//! - State: In-process stores used by the flows

pub mod inbound;
pub mod outbound;
pub mod state;

pub use inbound::EventHandler;
pub use outbound::{
    BroadcastQueue, DocumentConverter, FileRef, InlineButton, InvoiceSequence, InvoiceSheet,
    Keyboard, MessageMapStore, RegistryLookup, SendOptions, SheetFill, SpreadsheetPort,
    Transport, UserStore,
};
pub use state::{ApprovalStore, ConversationStore, SupportTagStore};
