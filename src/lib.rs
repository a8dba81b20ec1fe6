//! desk-relay: Telegram support desk bot with invoice approval, Hexagonal Architecture.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
