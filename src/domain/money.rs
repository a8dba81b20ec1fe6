//! Money parsing, rounding, VAT and Russian amount-in-words.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

const ONES_MASCULINE: [&str; 10] = [
    "", "один", "два", "три", "четыре", "пять", "шесть", "семь", "восемь", "девять",
];
const ONES_FEMININE: [&str; 10] = [
    "", "одна", "две", "три", "четыре", "пять", "шесть", "семь", "восемь", "девять",
];
const TEENS: [&str; 10] = [
    "десять",
    "одиннадцать",
    "двенадцать",
    "тринадцать",
    "четырнадцать",
    "пятнадцать",
    "шестнадцать",
    "семнадцать",
    "восемнадцать",
    "девятнадцать",
];
const TENS: [&str; 10] = [
    "",
    "",
    "двадцать",
    "тридцать",
    "сорок",
    "пятьдесят",
    "шестьдесят",
    "семьдесят",
    "восемьдесят",
    "девяносто",
];
const HUNDREDS: [&str; 10] = [
    "",
    "сто",
    "двести",
    "триста",
    "четыреста",
    "пятьсот",
    "шестьсот",
    "семьсот",
    "восемьсот",
    "девятьсот",
];

/// Scale words from the largest down, with grammatical gender of the scale noun.
const SCALES: [(u64, bool, [&str; 3]); 3] = [
    (1_000_000_000, false, ["миллиард", "миллиарда", "миллиардов"]),
    (1_000_000, false, ["миллион", "миллиона", "миллионов"]),
    (1_000, true, ["тысяча", "тысячи", "тысяч"]),
];

/// Parses a user-entered amount: digit groups optionally separated by spaces
/// (regular, non-breaking or narrow), with an optional `.` or `,` fraction.
/// Negative and non-numeric input yields `None`.
pub fn parse_money(input: &str) -> Option<Decimal> {
    let compact: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{00A0}' | '\u{202F}'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    let (int_part, frac_part) = match compact.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (compact.as_str(), None),
    };
    if int_part.is_empty() || !int_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if let Some(f) = frac_part {
        if f.is_empty() || !f.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }
    Decimal::from_str(&compact).ok()
}

/// Rounds half away from zero to two decimal places.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// VAT contained in a VAT-inclusive `total` at `rate` percent.
pub fn vat_included(total: Decimal, rate: Decimal) -> Decimal {
    round2(total * rate / (Decimal::ONE_HUNDRED + rate))
}

/// Cell value for the spreadsheet, rounded to kopecks.
pub fn to_cell(value: Decimal) -> f64 {
    round2(value).to_f64().unwrap_or_default()
}

/// Russian plural form selection: `one` for 1, 21, 31…, `few` for 2-4, 22-24…, `many` otherwise.
pub fn plural<'a>(n: u64, one: &'a str, few: &'a str, many: &'a str) -> &'a str {
    let n100 = n % 100;
    if (11..=19).contains(&n100) {
        return many;
    }
    match n % 10 {
        1 => one,
        2..=4 => few,
        _ => many,
    }
}

fn triad_words(n: u64, feminine: bool, out: &mut Vec<&'static str>) {
    let hundreds = (n / 100) as usize;
    let rest = n % 100;
    if hundreds > 0 {
        out.push(HUNDREDS[hundreds]);
    }
    if (10..=19).contains(&rest) {
        out.push(TEENS[(rest - 10) as usize]);
        return;
    }
    let tens = (rest / 10) as usize;
    let ones = (rest % 10) as usize;
    if tens > 1 {
        out.push(TENS[tens]);
    }
    if ones > 0 {
        out.push(if feminine {
            ONES_FEMININE[ones]
        } else {
            ONES_MASCULINE[ones]
        });
    }
}

fn integer_words(n: u64, feminine: bool) -> String {
    if n == 0 {
        return "ноль".to_string();
    }
    let mut words: Vec<String> = Vec::new();
    let mut rest = n;
    for (scale, scale_feminine, forms) in SCALES {
        let count = rest / scale;
        if count == 0 {
            continue;
        }
        rest %= scale;
        if count >= 1000 {
            words.push(integer_words(count, scale_feminine));
        } else {
            let mut parts = Vec::new();
            triad_words(count, scale_feminine, &mut parts);
            words.extend(parts.into_iter().map(String::from));
        }
        words.push(plural(count, forms[0], forms[1], forms[2]).to_string());
    }
    if rest > 0 {
        let mut parts = Vec::new();
        triad_words(rest, feminine, &mut parts);
        words.extend(parts.into_iter().map(String::from));
    }
    words.join(" ")
}

/// Amount in Russian words: rubles spelled out, kopecks as two digits.
///
/// `1234.50` → "одна тысяча двести тридцать четыре рубля 50 копеек".
pub fn amount_in_words(amount: Decimal) -> String {
    let rounded = round2(amount.abs());
    let rubles = rounded.trunc().to_u64().unwrap_or(u64::MAX);
    let kopecks = (rounded.fract() * Decimal::ONE_HUNDRED).to_u64().unwrap_or(0);
    format!(
        "{} {} {:02} {}",
        integer_words(rubles, false),
        plural(rubles, "рубль", "рубля", "рублей"),
        kopecks,
        plural(kopecks, "копейка", "копейки", "копеек")
    )
}

pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
