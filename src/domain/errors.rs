//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Telegram transport error: {0}")]
    Transport(String),

    #[error("Repository error: {0}")]
    Repo(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Registry lookup failed: {0}")]
    Registry(String),

    #[error("Document conversion failed: {0}")]
    Converter(String),

    #[error("Document generation failed: {0}")]
    Document(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Broken internal guarantee (e.g. duplicate invoice number). Reported to staff, never to users.
    #[error("Invariant violated: {0}")]
    Invariant(String),
}
