//! Telegram Bot API adapters (teloxide).

pub mod client;
pub mod mapper;
pub mod poller;
#[cfg(test)]
pub mod recording;

pub use client::TeloxideTransport;
pub use poller::{run_event_loop, spawn_polling};
#[cfg(test)]
pub use recording::{RecordingTransport, Sent, SentKind};
