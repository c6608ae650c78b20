// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Learned categories and the filename tokens that point at them

pub mod store;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::signals::normalize_token;
use crate::{DocsortError, Result};

pub use store::KnowledgeStore;

/// Categories every fresh install can be seeded with, in display order
pub const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    ("Antrag", &["antrag", "application", "bewerbung", "formular", "form"]),
    ("Bescheid", &["bescheid", "decision", "entscheidung", "beschluss", "notice"]),
    ("Vertrag", &["vertrag", "contract", "vereinbarung", "agreement"]),
    ("Rechnung", &["rechnung", "invoice", "bill", "faktura", "beleg", "quittung"]),
    ("Information", &["information", "info", "infoblatt", "mitteilung", "benachrichtigung"]),
];

/// A numbered bucket documents are filed into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub display_name: String,
    pub order_index: u32,
    #[serde(default)]
    pub known_tokens: BTreeSet<String>,
    /// Fields written by other tools or newer versions, kept on rewrite
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Category {
    pub fn new(display_name: impl Into<String>, order_index: u32) -> Self {
        Self {
            display_name: display_name.into(),
            order_index,
            known_tokens: BTreeSet::new(),
            extra: Map::new(),
        }
    }

    /// Folder name this category lives in, e.g. `03_Vertrag`
    pub fn canonical_name(&self) -> String {
        format!("{:02}_{}", self.order_index, self.display_name)
    }

    /// Case and diacritic insensitive name comparison
    pub fn has_name(&self, name: &str) -> bool {
        normalize_token(&self.display_name) == normalize_token(name)
    }

    pub fn knows(&self, token: &str) -> bool {
        self.known_tokens.contains(token)
    }
}

/// All learned categories
///
/// `categories` keeps first-learned order; `order_index` is the display
/// order and always forms the dense range `1..=N`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeBase {
    categories: Vec<Category>,
    /// Unknown top-level fields of the knowledge file
    pub(crate) extra: Map<String, Value>,
    location: Option<PathBuf>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Knowledge base holding the built-in default categories
    pub fn with_defaults() -> Self {
        let mut kb = Self::new();
        kb.seed_defaults();
        kb
    }

    /// Build from persisted categories, repairing gaps and duplicate indices
    pub fn from_categories(categories: Vec<Category>) -> Self {
        let mut kb = Self {
            categories,
            ..Self::default()
        };
        if kb.renumber() {
            warn!("Category numbering was not contiguous; renumbered 1..={}", kb.len());
        }
        kb
    }

    /// Categories in first-learned order
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Categories sorted by `order_index`
    pub fn ordered(&self) -> Vec<&Category> {
        let mut ordered: Vec<&Category> = self.categories.iter().collect();
        ordered.sort_by_key(|c| c.order_index);
        ordered
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Where this knowledge base was loaded from, if it came from disk
    pub fn storage_location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub(crate) fn set_storage_location(&mut self, location: PathBuf) {
        self.location = Some(location);
    }

    pub fn get(&self, order_index: u32) -> Option<&Category> {
        self.categories.iter().find(|c| c.order_index == order_index)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.has_name(name))
    }

    /// Index the next new category receives
    pub fn next_order_index(&self) -> u32 {
        self.categories.len() as u32 + 1
    }

    /// Add a category at the end of the display order
    pub fn add_category(&mut self, display_name: &str) -> Result<&Category> {
        let name = display_name.trim();
        if !is_valid_name(name) {
            return Err(DocsortError::InvalidCategoryName(display_name.to_string()));
        }
        if self.find_by_name(name).is_some() {
            return Err(DocsortError::DuplicateCategory(name.to_string()));
        }

        let category = Category::new(name, self.next_order_index());
        debug!("New category {}", category.canonical_name());
        self.categories.push(category);
        Ok(&self.categories[self.categories.len() - 1])
    }

    /// Record `token` as pointing at the category with `order_index`.
    /// Returns whether anything changed.
    pub fn learn(&mut self, order_index: u32, token: Option<&str>) -> Result<bool> {
        let category = self
            .categories
            .iter_mut()
            .find(|c| c.order_index == order_index)
            .ok_or_else(|| DocsortError::UnknownCategory(format!("#{}", order_index)))?;

        let token = match token.map(normalize_token) {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(false),
        };
        let added = category.known_tokens.insert(token.clone());
        if added {
            debug!("Learned '{}' -> {}", token, category.canonical_name());
        }
        Ok(added)
    }

    /// Categories that list `token` among their known tokens
    pub fn owners_of(&self, token: &str) -> Vec<&Category> {
        self.ordered().into_iter().filter(|c| c.knows(token)).collect()
    }

    /// Add any missing default categories and their seed tokens
    pub fn seed_defaults(&mut self) -> bool {
        let mut changed = false;
        for (name, tokens) in DEFAULT_CATEGORIES {
            let index = match self.find_by_name(name) {
                Some(existing) => existing.order_index,
                None => {
                    changed = true;
                    self.next_order_index()
                }
            };
            if self.get(index).is_none() {
                self.categories.push(Category::new(*name, index));
            }
            for token in tokens.iter() {
                if let Ok(added) = self.learn(index, Some(*token)) {
                    changed |= added;
                }
            }
        }
        changed
    }

    /// Restore the dense `1..=N` numbering. Sorts by current index, ties
    /// broken by insertion order. Returns whether any index changed.
    pub fn renumber(&mut self) -> bool {
        let mut order: Vec<usize> = (0..self.categories.len()).collect();
        order.sort_by_key(|&i| (self.categories[i].order_index, i));

        let mut changed = false;
        for (rank, &i) in order.iter().enumerate() {
            let index = rank as u32 + 1;
            if self.categories[i].order_index != index {
                self.categories[i].order_index = index;
                changed = true;
            }
        }
        changed
    }

    /// Check the numbering and naming invariants
    pub fn is_consistent(&self) -> bool {
        let mut indices: Vec<u32> = self.categories.iter().map(|c| c.order_index).collect();
        indices.sort_unstable();
        let dense = indices.iter().enumerate().all(|(i, &idx)| idx == i as u32 + 1);

        let mut names: Vec<String> = self
            .categories
            .iter()
            .map(|c| normalize_token(&c.display_name))
            .collect();
        names.sort();
        names.dedup();

        dense && names.len() == self.categories.len()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control)
}
