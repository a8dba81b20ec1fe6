//! Legal-entity name comparison against the registry's official name.

use regex::Regex;
use std::sync::OnceLock;

/// Legal-form tokens removed before comparison. Long forms first so that
/// "публичное акционерное общество" is not half-eaten by "акционерное общество".
const LEGAL_FORMS: &[&str] = &[
    "общество с ограниченной ответственностью",
    "публичное акционерное общество",
    "акционерное общество",
    "ооо",
    "оао",
    "зао",
    "пао",
    "ао",
    "ип",
];

fn non_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").expect("static regex"))
}

/// Lower-cases, strips legal forms and quote marks, then drops every non-alphanumeric.
pub fn normalize(name: &str) -> String {
    let mut s = name.trim().to_lowercase();
    for form in LEGAL_FORMS {
        s = s.replace(form, "");
    }
    s = s.replace(['"', '«', '»'], "");
    non_alnum().replace_all(&s, "").into_owned()
}

/// True when the user's input names the same entity as the registry.
/// An official name that normalizes to nothing never blocks; empty user input never matches.
pub fn names_match(user_input: &str, official: &str) -> bool {
    let official = normalize(official);
    if official.is_empty() {
        return true;
    }
    let input = normalize(user_input);
    !input.is_empty() && input == official
}
