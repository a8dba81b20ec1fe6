//! Persistence adapters: durable SQLite stores and in-process state.

pub mod memory_state;
pub mod sqlite_repo;

pub use memory_state::{MemoryApprovalStore, MemoryConversationStore, MemorySupportTags};
pub use sqlite_repo::SqliteRepo;
