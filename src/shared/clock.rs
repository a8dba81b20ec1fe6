//! Local time at a fixed UTC offset and the date formats used in invoices and panels.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

const MONTHS_GENITIVE: [&str; 12] = [
    "января", "февраля", "марта", "апреля", "мая", "июня", "июля", "августа", "сентября",
    "октября", "ноября", "декабря",
];

/// Wall clock for one fixed offset. Copy it freely.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    /// Out-of-range offsets fall back to UTC.
    pub fn new(utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
        Self { offset }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    pub fn at(&self, unix: i64) -> Option<DateTime<FixedOffset>> {
        self.offset.timestamp_opt(unix, 0).single()
    }

    /// Parse "DD.MM.YYYY HH:MM" as local time.
    pub fn parse_local(&self, input: &str) -> Option<DateTime<FixedOffset>> {
        let naive = NaiveDateTime::parse_from_str(input.trim(), "%d.%m.%Y %H:%M").ok()?;
        self.offset.from_local_datetime(&naive).single()
    }
}

/// 05.12.2025
pub fn ddmmyyyy(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// 05.12.2025 10:30
pub fn ddmmyyyy_hhmm<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format("%d.%m.%Y %H:%M").to_string()
}

/// "5 декабря 2025 г."
pub fn date_in_words(date: NaiveDate) -> String {
    use chrono::Datelike;
    let month = MONTHS_GENITIVE
        .get(date.month0() as usize)
        .copied()
        .unwrap_or("");
    format!("{} {} {} г.", date.day(), month, date.year())
}
