//! Third-party integrations: company registry lookup.

pub mod rusprofile;
pub mod static_registry;

pub use rusprofile::RusprofileAdapter;
pub use static_registry::StaticRegistry;
