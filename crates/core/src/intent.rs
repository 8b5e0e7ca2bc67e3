//! Lexical intent routing.
//!
//! Categories are checked in a fixed order and the first hit wins: fee
//! vocabulary, then structure vocabulary (with an optional year number), then
//! overview vocabulary.

use crate::models::{Intent, Section};
use once_cell::sync::Lazy;
use regex::Regex;

static FEE_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(fee|fees|tuition|per[\s-]*year|cost|costs|price|annual)\b").unwrap()
});

static STRUCTURE_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(year\s*\d{1,2}|structure|modules?|subjects?)\b").unwrap()
});

static OVERVIEW_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(overview|what\s+is|about|summary)\b").unwrap());

static YEAR_CAPTURE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\byear\s*(\d{1,2})\b").unwrap());

pub fn classify(query: &str) -> Intent {
    if FEE_WORDS.is_match(query) {
        return Intent {
            section: Some(Section::Fees),
            year: None,
        };
    }

    if STRUCTURE_WORDS.is_match(query) {
        let year = YEAR_CAPTURE
            .captures(query)
            .and_then(|capture| capture.get(1))
            .and_then(|digits| digits.as_str().parse().ok());
        return Intent {
            section: Some(Section::Structure),
            year,
        };
    }

    if OVERVIEW_WORDS.is_match(query) {
        return Intent {
            section: Some(Section::Overview),
            year: None,
        };
    }

    Intent::default()
}
