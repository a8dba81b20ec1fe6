//! External tools: spreadsheet engine and PDF converter.

#[cfg(test)]
pub mod memory_sheet;
pub mod soffice;
pub mod xlsx;

#[cfg(test)]
pub use memory_sheet::{MemorySheet, MemorySpreadsheet};
pub use soffice::SofficeConverter;
pub use xlsx::UmyaSpreadsheet;
