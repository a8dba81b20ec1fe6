//! In-memory worksheet and spreadsheet engine for unit tests.

use crate::domain::DomainError;
use crate::ports::{InvoiceSheet, SheetFill, SpreadsheetPort};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

/// Sparse sheet keyed by A1 references.
#[derive(Debug, Clone, Default)]
pub struct MemorySheet {
    cells: HashMap<(String, u32), Cell>,
}

/// Split "AB12" into ("AB", 12). Lower-case letters are accepted.
fn split_ref(cell: &str) -> Option<(String, u32)> {
    let digits = cell.find(|c: char| c.is_ascii_digit())?;
    let (col, row) = cell.split_at(digits);
    if col.is_empty() || !col.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((col.to_ascii_uppercase(), row.parse().ok()?))
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, cell: &str, value: &str) -> Self {
        self.set_text(cell, value);
        self
    }

    pub fn get(&self, cell: &str) -> Option<&Cell> {
        split_ref(cell).and_then(|k| self.cells.get(&k))
    }

    pub fn number(&self, cell: &str) -> Option<f64> {
        match self.get(cell)? {
            Cell::Number(n) => Some(*n),
            Cell::Text(_) => None,
        }
    }
}

impl InvoiceSheet for MemorySheet {
    fn cell_text(&self, cell: &str) -> String {
        match self.get(cell) {
            Some(Cell::Text(t)) => t.clone(),
            Some(Cell::Number(n)) => n.to_string(),
            None => String::new(),
        }
    }

    fn set_text(&mut self, cell: &str, value: &str) {
        if let Some(key) = split_ref(cell) {
            self.cells.insert(key, Cell::Text(value.to_string()));
        }
    }

    fn set_number(&mut self, cell: &str, value: f64) {
        if let Some(key) = split_ref(cell) {
            self.cells.insert(key, Cell::Number(value));
        }
    }

    fn insert_rows(&mut self, row: u32, count: u32) {
        if count == 0 {
            return;
        }
        self.cells = std::mem::take(&mut self.cells)
            .into_iter()
            .map(|((col, r), v)| {
                let r = if r >= row { r + count } else { r };
                ((col, r), v)
            })
            .collect();
    }
}

/// Spreadsheet engine over a fixed template sheet. Saved sheets are kept by output path.
pub struct MemorySpreadsheet {
    template: MemorySheet,
    saved: Mutex<HashMap<PathBuf, MemorySheet>>,
}

impl MemorySpreadsheet {
    pub fn new(template: MemorySheet) -> Self {
        Self {
            template,
            saved: Mutex::new(HashMap::new()),
        }
    }

    pub async fn saved(&self, output: &Path) -> Option<MemorySheet> {
        self.saved.lock().await.get(output).cloned()
    }
}

#[async_trait::async_trait]
impl SpreadsheetPort for MemorySpreadsheet {
    async fn render(
        &self,
        _template: &Path,
        output: &Path,
        fill: SheetFill,
    ) -> Result<(), DomainError> {
        let mut sheet = self.template.clone();
        fill(&mut sheet);
        self.saved.lock().await.insert(output.to_path_buf(), sheet);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rows_shifts_cells_below() {
        let mut sheet = MemorySheet::new()
            .with_text("A18", "first")
            .with_text("P20", "total")
            .with_text("a26", "deadline");
        sheet.insert_rows(19, 2);
        assert_eq!(sheet.cell_text("A18"), "first");
        assert_eq!(sheet.cell_text("P22"), "total");
        assert_eq!(sheet.cell_text("A28"), "deadline");
        assert_eq!(sheet.cell_text("P20"), "");
    }

    #[test]
    fn test_bad_refs_are_ignored() {
        let mut sheet = MemorySheet::new();
        sheet.set_text("17", "x");
        sheet.set_text("A", "x");
        assert!(sheet.cells.is_empty());
    }
}
