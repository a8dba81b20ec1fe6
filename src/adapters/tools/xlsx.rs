//! umya-spreadsheet adapter. Implements SpreadsheetPort.
//!
//! Reading and writing xlsx is blocking; the whole open-fill-save runs on the blocking pool.

use crate::domain::DomainError;
use crate::ports::{InvoiceSheet, SheetFill, SpreadsheetPort};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use umya_spreadsheet::Worksheet;

/// Name of the invoice sheet in the template; the first sheet is used when absent.
pub const INVOICE_SHEET: &str = "schet";

pub struct UmyaSpreadsheet;

impl UmyaSpreadsheet {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UmyaSpreadsheet {
    fn default() -> Self {
        Self::new()
    }
}

struct UmyaSheet<'a> {
    ws: &'a mut Worksheet,
}

impl InvoiceSheet for UmyaSheet<'_> {
    fn cell_text(&self, cell: &str) -> String {
        self.ws.get_cell_value(cell).get_value().to_string()
    }

    fn set_text(&mut self, cell: &str, value: &str) {
        self.ws.get_cell_mut(cell).set_value(value);
    }

    fn set_number(&mut self, cell: &str, value: f64) {
        self.ws.get_cell_mut(cell).set_value_number(value);
    }

    fn insert_rows(&mut self, row: u32, count: u32) {
        if count > 0 {
            self.ws.insert_new_row(&row, &count);
        }
    }
}

fn render_blocking(template: &Path, output: &Path, fill: SheetFill) -> Result<(), DomainError> {
    let mut book = umya_spreadsheet::reader::xlsx::read(template).map_err(|e| {
        DomainError::Document(format!("open template {}: {}", template.display(), e))
    })?;
    let has_invoice_sheet = book.get_sheet_by_name(INVOICE_SHEET).is_some();
    let ws = if has_invoice_sheet {
        book.get_sheet_by_name_mut(INVOICE_SHEET)
    } else {
        book.get_sheet_mut(&0)
    }
    .ok_or_else(|| DomainError::Document("template has no sheets".into()))?;

    fill(&mut UmyaSheet { ws });

    if let Some(dir) = output.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| DomainError::Document(format!("create output dir: {}", e)))?;
    }
    umya_spreadsheet::writer::xlsx::write(&book, output)
        .map_err(|e| DomainError::Document(format!("save {}: {}", output.display(), e)))
}

#[async_trait]
impl SpreadsheetPort for UmyaSpreadsheet {
    async fn render(
        &self,
        template: &Path,
        output: &Path,
        fill: SheetFill,
    ) -> Result<(), DomainError> {
        let template: PathBuf = template.to_path_buf();
        let output: PathBuf = output.to_path_buf();
        debug!(template = %template.display(), output = %output.display(), "rendering xlsx");
        tokio::task::spawn_blocking(move || render_blocking(&template, &output, fill))
            .await
            .map_err(|e| DomainError::Document(format!("render task: {}", e)))?
    }
}
