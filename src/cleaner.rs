//! Body text cleanup

use once_cell::sync::Lazy;
use regex::Regex;

/// Quoted reply lines (`\n>...\r`) and runs of three or more zero-width spaces
static NOISE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\n>+(.*?)\r)|(\x{200B}{3,})").expect("noise pattern is a valid regex")
});

/// Remove every quoted-reply span and zero-width-space run from `text`.
///
/// The whole match goes, including the leading newline and the trailing
/// carriage return; runs of one or two U+200B are left alone.
pub fn clean_body(text: &str) -> String {
    NOISE_PATTERN.replace_all(text, "").into_owned()
}
