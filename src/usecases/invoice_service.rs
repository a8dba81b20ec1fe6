//! Invoice numbering and document generation.
//!
//! - Reserves the next number from the durable sequence
//! - Fills the invoice template (fixed cell layout, items from row 18)
//! - Optionally converts the result to PDF for delivery

use crate::domain::money::{amount_in_words, capitalize_first, round2, to_cell, vat_included};
use crate::domain::{DomainError, Draft};
use crate::ports::{DocumentConverter, InvoiceSequence, InvoiceSheet, SpreadsheetPort};
use crate::shared::clock::{LocalClock, date_in_words, ddmmyyyy};
use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

const FIRST_ITEM_ROW: u32 = 18;
const DEFAULT_UNIT: &str = "шт";

fn date_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{2}\.\d{2}\.\d{4}\b").expect("static regex"))
}

/// A generated invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub number: i64,
    pub xlsx: PathBuf,
}

pub struct InvoiceService {
    sequence: Arc<dyn InvoiceSequence>,
    sheets: Arc<dyn SpreadsheetPort>,
    converter: Option<Arc<dyn DocumentConverter>>,
    template: PathBuf,
    output_dir: PathBuf,
    vat_rate: Decimal,
    clock: LocalClock,
}

impl InvoiceService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: Arc<dyn InvoiceSequence>,
        sheets: Arc<dyn SpreadsheetPort>,
        converter: Option<Arc<dyn DocumentConverter>>,
        template: PathBuf,
        output_dir: PathBuf,
        vat_rate: Decimal,
        clock: LocalClock,
    ) -> Self {
        Self {
            sequence,
            sheets,
            converter,
            template,
            output_dir,
            vat_rate,
            clock,
        }
    }

    /// Reserves a number and renders `invoice_<N>.xlsx` dated today (local time).
    pub async fn generate(&self, draft: &Draft) -> Result<Invoice, DomainError> {
        let number = self.sequence.reserve().await?;
        let output = self.output_dir.join(format!("invoice_{}.xlsx", number));
        if tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(DomainError::Invariant(format!(
                "invoice number {} already used ({})",
                number,
                output.display()
            )));
        }

        let template = resolve_template(&self.template);
        let date = self.clock.now().date_naive();
        let vat_rate = self.vat_rate;
        let draft = draft.clone();
        self.sheets
            .render(
                &template,
                &output,
                Box::new(move |sheet: &mut dyn InvoiceSheet| {
                    fill_invoice(sheet, number, date, &draft, vat_rate)
                }),
            )
            .await?;

        info!(invoice_no = number, path = %output.display(), "invoice generated");
        Ok(Invoice {
            number,
            xlsx: output,
        })
    }

    /// File to send to the user: the PDF when conversion is configured and works, else the xlsx.
    pub async fn deliverable(&self, xlsx: &Path) -> PathBuf {
        let Some(converter) = &self.converter else {
            return xlsx.to_path_buf();
        };
        match converter.convert(xlsx).await {
            Ok(pdf) => pdf,
            Err(e) => {
                warn!(path = %xlsx.display(), error = %e, "pdf conversion failed, sending xlsx");
                xlsx.to_path_buf()
            }
        }
    }
}

/// The path as given when it exists, else relative to the executable dir and its two parents.
pub fn resolve_template(path: &Path) -> PathBuf {
    if path.exists() || path.is_absolute() {
        return path.to_path_buf();
    }
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));
    if let Some(dir) = exe_dir {
        for base in dir.ancestors().take(3) {
            let candidate = base.join(path);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    path.to_path_buf()
}

/// Writes the invoice into the template sheet.
pub fn fill_invoice(
    sheet: &mut dyn InvoiceSheet,
    number: i64,
    date: NaiveDate,
    draft: &Draft,
    vat_rate: Decimal,
) {
    sheet.set_text(
        "A9",
        &format!("Счёт на оплату № {} от {}", number, date_in_words(date)),
    );
    sheet.set_text("E13", &payer_block(draft));

    let contract = draft.contract.trim();
    let contract_line = if contract.is_empty() || contract == "0" {
        String::new()
    } else {
        format!("{} от {}", contract, ddmmyyyy(date))
    };
    sheet.set_text("E15", &contract_line);

    let count = draft.items.len() as u32;
    let offset = count.saturating_sub(1);
    if offset > 0 {
        sheet.insert_rows(FIRST_ITEM_ROW + 1, offset);
    }
    for (row, item) in (FIRST_ITEM_ROW..).zip(&draft.items) {
        let name = item.name.trim();
        let unit = item.unit.trim();
        sheet.set_text(&format!("B{}", row), if name.is_empty() { "-" } else { name });
        sheet.set_number(&format!("K{}", row), f64::from(item.quantity));
        sheet.set_text(
            &format!("M{}", row),
            if unit.is_empty() { DEFAULT_UNIT } else { unit },
        );
        sheet.set_number(&format!("O{}", row), to_cell(item.unit_price));
        sheet.set_number(&format!("P{}", row), to_cell(item.line_total));
    }

    let total = round2(draft.total());
    sheet.set_number(&format!("P{}", 20 + offset), to_cell(total));
    sheet.set_number(
        &format!("P{}", 21 + offset),
        to_cell(vat_included(total, vat_rate)),
    );
    sheet.set_number(&format!("P{}", 22 + offset), to_cell(total));
    sheet.set_text(
        &format!("A{}", 23 + offset),
        &format!("Всего наименований {}, на сумму {:.2}", count, total),
    );
    sheet.set_text(
        &format!("A{}", 24 + offset),
        &capitalize_first(&amount_in_words(total)),
    );

    let deadline_cell = format!("A{}", 26 + offset);
    let current = sheet.cell_text(&deadline_cell);
    sheet.set_text(&deadline_cell, &rewrite_deadline(&current, &ddmmyyyy(date)));
}

fn payer_block(draft: &Draft) -> String {
    let tax_id = draft.tax_id.trim();
    let kpp = draft.registry.kpp.trim();
    let parts = [
        draft.payer_name().to_string(),
        if tax_id.is_empty() { String::new() } else { format!("ИНН {}", tax_id) },
        if kpp.is_empty() { String::new() } else { format!("КПП {}", kpp) },
        draft.registry.address.trim().to_string(),
    ];
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Replaces every dd.mm.yyyy token with `date`; without tokens the deadline phrase is prepended.
pub fn rewrite_deadline(current: &str, date: &str) -> String {
    let current = current.trim();
    if current.is_empty() {
        return format!("Оплатить не позднее {}", date);
    }
    if date_token().is_match(current) {
        return date_token().replace_all(current, date).into_owned();
    }
    format!("Оплатить не позднее {} {}", date, current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::SqliteRepo;
    use crate::adapters::tools::{MemorySheet, MemorySpreadsheet};
    use crate::domain::{CompanyData, LineItem};

    fn money(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn item(name: &str, quantity: u32, unit_price: &str, line_total: &str) -> LineItem {
        LineItem {
            name: name.into(),
            quantity,
            unit: String::new(),
            unit_price: money(unit_price),
            line_total: money(line_total),
        }
    }

    fn vat() -> Decimal {
        Decimal::from(22)
    }

    fn draft(items: Vec<LineItem>) -> Draft {
        Draft {
            company: "Компания 1".into(),
            tax_id: "7701234567".into(),
            legal_name: "ООО Ромашка".into(),
            contract: "Д-15".into(),
            items,
            registry: CompanyData {
                kpp: "770101001".into(),
                name: "ООО \"РОМАШКА\"".into(),
                address: "г. Москва".into(),
            },
            registry_error: None,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 20).unwrap()
    }

    #[test]
    fn test_fill_single_item_layout() {
        let mut sheet = MemorySheet::new().with_text("A26", "Оплатить до 01.01.2020");
        let d = draft(vec![item("Болт", 1, "1000", "1000")]);
        fill_invoice(&mut sheet, 7, date(), &d, vat());

        assert_eq!(sheet.cell_text("A9"), "Счёт на оплату № 7 от 20 января 2026 г.");
        assert_eq!(
            sheet.cell_text("E13"),
            "ООО \"РОМАШКА\", ИНН 7701234567, КПП 770101001, г. Москва"
        );
        assert_eq!(sheet.cell_text("E15"), "Д-15 от 20.01.2026");
        assert_eq!(sheet.cell_text("B18"), "Болт");
        assert_eq!(sheet.cell_text("M18"), "шт");
        assert_eq!(sheet.number("K18"), Some(1.0));
        assert_eq!(sheet.number("P20"), Some(1000.0));
        assert_eq!(sheet.number("P21"), Some(180.33));
        assert_eq!(sheet.number("P22"), Some(1000.0));
        assert_eq!(sheet.cell_text("A23"), "Всего наименований 1, на сумму 1000.00");
        assert_eq!(sheet.cell_text("A24"), "Одна тысяча рублей 00 копеек");
        assert_eq!(sheet.cell_text("A26"), "Оплатить до 20.01.2026");
    }

    #[test]
    fn test_fill_three_items_shifts_summary() {
        let mut sheet = MemorySheet::new()
            .with_text("P20", "old total")
            .with_text("A26", "");
        let mut d = draft(vec![
            item("A", 3, "100", "300"),
            item("", 1, "50.5", "50.5"),
            item("C", 2, "10", "20"),
        ]);
        d.contract = "0".into();
        d.registry = CompanyData::default();
        fill_invoice(&mut sheet, 1, date(), &d, vat());

        assert_eq!(sheet.cell_text("E13"), "ООО Ромашка, ИНН 7701234567");
        assert_eq!(sheet.cell_text("E15"), "");
        assert_eq!(sheet.cell_text("B19"), "-");
        assert_eq!(sheet.number("O20"), Some(10.0));
        assert_eq!(sheet.number("P22"), Some(370.5));
        assert_eq!(sheet.number("P24"), Some(370.5));
        assert_eq!(sheet.cell_text("A25"), "Всего наименований 3, на сумму 370.50");
        assert_eq!(sheet.cell_text("A28"), "Оплатить не позднее 20.01.2026");
    }

    #[test]
    fn test_rewrite_deadline() {
        assert_eq!(
            rewrite_deadline("с 01.02.2024 по 03.04.2024", "20.01.2026"),
            "с 20.01.2026 по 20.01.2026"
        );
        assert_eq!(
            rewrite_deadline("в течение 3 дней", "20.01.2026"),
            "Оплатить не позднее 20.01.2026 в течение 3 дней"
        );
        assert_eq!(rewrite_deadline("  ", "20.01.2026"), "Оплатить не позднее 20.01.2026");
    }

    #[tokio::test]
    async fn test_generate_uses_reserved_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(SqliteRepo::connect(dir.path(), 41).await.unwrap());
        let sheets = Arc::new(MemorySpreadsheet::new(MemorySheet::new()));
        let out_dir = dir.path().join("invoices");
        let svc = InvoiceService::new(
            repo,
            sheets.clone(),
            None,
            PathBuf::from("template.xlsx"),
            out_dir.clone(),
            vat(),
            LocalClock::new(3),
        );

        let d = draft(vec![item("Болт", 1, "10", "10")]);
        let first = svc.generate(&d).await.unwrap();
        let second = svc.generate(&d).await.unwrap();
        assert_eq!(first.number, 41);
        assert_eq!(second.number, 42);
        assert_eq!(first.xlsx, out_dir.join("invoice_41.xlsx"));

        let saved = sheets.saved(&first.xlsx).await.unwrap();
        assert!(saved.cell_text("A9").starts_with("Счёт на оплату № 41 от "));
        assert_eq!(svc.deliverable(&first.xlsx).await, first.xlsx);
    }

    #[test]
    fn test_resolve_template_keeps_missing_path() {
        let p = Path::new("no/such/template.xlsx");
        assert_eq!(resolve_template(p), p.to_path_buf());
    }
}
