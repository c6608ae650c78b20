// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Category classification from filename signals
//!
//! Matching runs in two tiers and stops at the first tier that finds
//! anything:
//!
//! 1. the category hint or any other filename token equals a known token
//! 2. a known token (3+ chars) is contained in a filename token
//!
//! One category in a tier is a match; several are ambiguous and go back to
//! the user. Nothing is ever picked silently. Classifying never changes the
//! knowledge base.

use serde::Serialize;
use tracing::debug;

use crate::feedback::Resolution;
use crate::knowledge::{Category, KnowledgeBase};
use crate::signals::FilenameSignals;
use crate::Result;

/// Shortest known token used for substring matching
const MIN_SUBSTRING_TOKEN: usize = 3;

/// Outcome of classifying one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Classification {
    Matched(Category),
    Ambiguous(Vec<Category>),
    Unknown,
}

impl Classification {
    pub fn is_matched(&self) -> bool {
        matches!(self, Classification::Matched(_))
    }

    /// Categories offered to the user, if any
    pub fn candidates(&self) -> &[Category] {
        match self {
            Classification::Matched(c) => std::slice::from_ref(c),
            Classification::Ambiguous(cs) => cs,
            Classification::Unknown => &[],
        }
    }
}

/// Classify a file's signals against the knowledge base
pub fn classify(signals: &FilenameSignals, kb: &KnowledgeBase) -> Classification {
    if signals.category_hint.is_none() {
        return Classification::Unknown;
    }

    let mut exact: Vec<&Category> = Vec::new();
    for token in &signals.tokens {
        for category in kb.owners_of(token) {
            push_unique(&mut exact, category);
        }
    }
    if let Some(result) = decide(exact, "exact token") {
        return result;
    }

    let mut contained: Vec<&Category> = Vec::new();
    for category in kb.ordered() {
        let hit = category.known_tokens.iter().any(|known| {
            known.chars().count() >= MIN_SUBSTRING_TOKEN
                && signals.tokens.iter().any(|t| t.contains(known.as_str()))
        });
        if hit {
            push_unique(&mut contained, category);
        }
    }
    decide(contained, "substring").unwrap_or(Classification::Unknown)
}

/// Add the signals' hint to the category's known tokens
pub fn learn(kb: &mut KnowledgeBase, order_index: u32, signals: &FilenameSignals) -> Result<bool> {
    kb.learn(order_index, signals.category_hint.as_deref())
}

/// Apply the user's answer: create the category if asked to, then learn the
/// token. Returns the chosen category, or `None` when the file is skipped.
pub fn apply_resolution(
    kb: &mut KnowledgeBase,
    resolution: &Resolution,
    signals: &FilenameSignals,
) -> Result<Option<Category>> {
    let (order_index, token) = match resolution {
        Resolution::Existing { order_index, token } => {
            if kb.get(*order_index).is_none() {
                return Err(crate::DocsortError::UnknownCategory(format!("#{}", order_index)));
            }
            (*order_index, token)
        }
        Resolution::New { name, token } => {
            let index = match kb.find_by_name(name) {
                Some(existing) => existing.order_index,
                None => kb.add_category(name)?.order_index,
            };
            (index, token)
        }
        Resolution::Skip | Resolution::Abort => return Ok(None),
    };

    match token {
        Some(t) => kb.learn(order_index, Some(t.as_str()))?,
        None => learn(kb, order_index, signals)?,
    };
    Ok(kb.get(order_index).cloned())
}

fn decide(found: Vec<&Category>, tier: &str) -> Option<Classification> {
    match found.len() {
        0 => None,
        1 => {
            debug!("Matched {} by {}", found[0].canonical_name(), tier);
            Some(Classification::Matched(found[0].clone()))
        }
        n => {
            debug!("{} categories share a {} match", n, tier);
            Some(Classification::Ambiguous(found.into_iter().cloned().collect()))
        }
    }
}

fn push_unique<'a>(list: &mut Vec<&'a Category>, category: &'a Category) {
    if !list.iter().any(|c| c.order_index == category.order_index) {
        list.push(category);
    }
}
