//! Infrastructure adapters. Implement outbound ports.
//!
//! Telegram, SQLite, company registry, spreadsheet tools. Map errors to DomainError.

pub mod integrations;
pub mod persistence;
pub mod telegram;
pub mod tools;
