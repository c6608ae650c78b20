// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Filename feature extraction
//!
//! Turns a raw filename into the signals the classifier works with: a
//! category hint, an optional document date and an optional personal name.
//! Everything here is pure; no filesystem access.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// First names recognised without any configuration
const BUILTIN_NAMES: &[&str] = &[
    "alexander", "andrea", "andreas", "anna", "christian", "daniel", "david",
    "elena", "emma", "eva", "felix", "florian", "hans", "jan", "johannes",
    "jonas", "julia", "katharina", "laura", "lea", "lena", "lisa", "lukas",
    "maria", "markus", "martin", "max", "michael", "paul", "peter", "sabine",
    "sarah", "sophie", "stefan", "thomas", "tobias", "ursula", "wolfgang",
    "john", "jane", "james", "mary", "robert", "linda",
];

/// Signals extracted from one filename
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenameSignals {
    /// Token most likely naming the category (normalized)
    pub category_hint: Option<String>,
    /// Date parsed from the filename
    pub date: Option<NaiveDate>,
    /// Personal name as written in the filename
    pub personal_name: Option<String>,
    /// All normalized candidate tokens in filename order, hint first
    pub tokens: Vec<String>,
}

impl FilenameSignals {
    pub fn year(&self) -> Option<i32> {
        self.date.map(|d| d.year())
    }
}

/// Extracts [`FilenameSignals`] from filenames
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    names: HashSet<String>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    /// Extractor with the built-in name list
    pub fn new() -> Self {
        Self {
            names: BUILTIN_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Extractor with additional personal names
    pub fn with_names<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut extractor = Self::new();
        extractor.names.extend(
            extra
                .into_iter()
                .map(|n| normalize_token(n.as_ref()))
                .filter(|n| !n.is_empty()),
        );
        extractor
    }

    /// Extract signals from a filename (a bare name or a path)
    pub fn extract(&self, filename: &str) -> FilenameSignals {
        let stem = file_stem(filename);
        let chars: Vec<char> = stem.chars().collect();

        let date_match = find_date(&chars);
        let raw_tokens = split_tokens(&chars);

        let name_flags = self.flag_names(&raw_tokens);

        let mut personal: Vec<&str> = Vec::new();
        let mut tokens: Vec<String> = Vec::new();

        for (i, token) in raw_tokens.iter().enumerate() {
            if let Some((_, start, end)) = date_match {
                if token.start < end && start < token.end {
                    continue;
                }
            }
            if name_flags[i] {
                personal.push(&token.text);
                continue;
            }
            if token.text.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let normalized = normalize_token(&token.text);
            if !normalized.is_empty() && !tokens.contains(&normalized) {
                tokens.push(normalized);
            }
        }

        FilenameSignals {
            category_hint: tokens.first().cloned(),
            date: date_match.map(|(d, _, _)| d),
            personal_name: if personal.is_empty() { None } else { Some(personal.join(" ")) },
            tokens,
        }
    }

    /// A token is a name if it is on the name list, or if it is a
    /// capitalized word directly following a listed first name.
    fn flag_names(&self, tokens: &[RawToken]) -> Vec<bool> {
        let listed: Vec<bool> = tokens
            .iter()
            .map(|t| self.names.contains(&normalize_token(&t.text)))
            .collect();
        (0..tokens.len())
            .map(|i| listed[i] || (i > 0 && listed[i - 1] && is_capitalized(&tokens[i].text)))
            .collect()
    }
}

/// Extract signals with the default extractor
pub fn extract(filename: &str) -> FilenameSignals {
    FeatureExtractor::new().extract(filename)
}

/// Lower-case a token and fold diacritics (`ä` → `a`, `ß` → `ss`)
pub fn normalize_token(token: &str) -> String {
    token
        .trim()
        .to_lowercase()
        .replace('ß', "ss")
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Rewrite a leading `YYYYMMDD_` / `YYYYMMDD-` prefix to `YYYY-MM-DD `.
/// Names without such a prefix, or with an impossible date, are returned unchanged.
pub fn normalize_date_prefix(file_name: &str) -> String {
    let path = Path::new(file_name);
    let stem = match path.file_stem().and_then(|s| s.to_str()) {
        Some(s) => s,
        None => return file_name.to_string(),
    };
    let chars: Vec<char> = stem.chars().collect();
    if chars.len() < 10 || !chars[..8].iter().all(|c| c.is_ascii_digit()) || !matches!(chars[8], '_' | '-') {
        return file_name.to_string();
    }
    if date_from_digits(&chars[..8]).is_none() {
        return file_name.to_string();
    }

    let digits: String = chars[..8].iter().collect();
    let rest: String = chars[9..].iter().collect();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    format!("{}-{}-{} {}{}", &digits[..4], &digits[4..6], &digits[6..], rest, ext)
}

struct RawToken {
    text: String,
    start: usize,
    end: usize,
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

fn split_tokens(chars: &[char]) -> Vec<RawToken> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in chars.iter().enumerate() {
        match (c.is_alphanumeric(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                tokens.push(RawToken { text: chars[s..i].iter().collect(), start: s, end: i });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(RawToken { text: chars[s..].iter().collect(), start: s, end: chars.len() });
    }
    tokens
}

fn is_capitalized(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            let rest: Vec<char> = chars.collect();
            !rest.is_empty() && rest.iter().all(|c| c.is_lowercase())
        }
        _ => false,
    }
}

/// Find the earliest valid `YYYYMMDD`, `YYYY-MM-DD` or `YYYY_MM_DD` date.
/// Returns the date with its char span. Candidates with impossible calendar
/// values are skipped.
fn find_date(chars: &[char]) -> Option<(NaiveDate, usize, usize)> {
    let digit = |i: usize| chars.get(i).map_or(false, |c| c.is_ascii_digit());

    for start in 0..chars.len() {
        if !digit(start) || (start > 0 && digit(start - 1)) {
            continue;
        }
        if !(start..start + 4).all(digit) {
            continue;
        }

        // YYYYMMDD, not part of a longer digit run
        if (start..start + 8).all(digit) && !digit(start + 8) {
            if let Some(date) = date_from_digits(&chars[start..start + 8]) {
                return Some((date, start, start + 8));
            }
        }

        // YYYY-MM-DD / YYYY_MM_DD with the same separator twice
        if let Some(&sep) = chars.get(start + 4) {
            if (sep == '-' || sep == '_')
                && digit(start + 5)
                && digit(start + 6)
                && chars.get(start + 7) == Some(&sep)
                && digit(start + 8)
                && digit(start + 9)
                && !digit(start + 10)
            {
                let digits: Vec<char> = chars[start..start + 4]
                    .iter()
                    .chain(&chars[start + 5..start + 7])
                    .chain(&chars[start + 8..start + 10])
                    .copied()
                    .collect();
                if let Some(date) = date_from_digits(&digits) {
                    return Some((date, start, start + 10));
                }
            }
        }
    }
    None
}

fn date_from_digits(digits: &[char]) -> Option<NaiveDate> {
    let s: String = digits.iter().collect();
    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month: u32 = s.get(4..6)?.parse().ok()?;
    let day: u32 = s.get(6..8)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
