//! Shared infrastructure: configuration, local clock, user-facing copy.

pub mod clock;
pub mod config;
pub mod texts;
