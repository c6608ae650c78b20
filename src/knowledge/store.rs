// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Loading and saving the knowledge file

use chrono::Local;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{Category, KnowledgeBase};
use crate::fsutil::write_atomic;
use crate::materialize::CloudProvider;
use crate::signals::normalize_token;
use crate::{DocsortError, Result};

const FORMAT_VERSION: u64 = 1;

/// Reads and writes one knowledge file
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    path: PathBuf,
}

impl KnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decide where the knowledge file lives: an explicit path wins, then the
    /// sync folder of the cloud provider `root` belongs to, then the home
    /// directory.
    pub fn resolve_location(explicit: Option<PathBuf>, root: &Path, file_name: &str) -> PathBuf {
        if let Some(path) = explicit {
            return path;
        }
        if let Some(base) = CloudProvider::detect(root).and_then(|p| p.base_dir()) {
            return base.join(file_name);
        }
        dirs::home_dir()
            .unwrap_or_else(|| root.to_path_buf())
            .join(file_name)
    }

    /// Load the knowledge base. A missing file is a first run and yields an
    /// empty knowledge base; malformed content is `CorruptKnowledge`.
    pub fn load(&self) -> Result<KnowledgeBase> {
        if !self.path.exists() {
            info!("No knowledge file at {:?}, starting empty", self.path);
            let mut kb = KnowledgeBase::new();
            kb.set_storage_location(self.path.clone());
            return Ok(kb);
        }

        let bytes = std::fs::read(&self.path)?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;
        let mut kb = self.parse(value)?;
        kb.set_storage_location(self.path.clone());
        info!("Loaded {} categories from {:?}", kb.len(), self.path);
        Ok(kb)
    }

    /// Load, falling back to an empty knowledge base when the file is
    /// corrupt. The corrupt file is renamed aside first so a later save
    /// cannot overwrite it. Returns the recovered-from error alongside.
    pub fn load_or_recover(&self) -> Result<(KnowledgeBase, Option<DocsortError>)> {
        match self.load() {
            Ok(kb) => Ok((kb, None)),
            Err(err @ DocsortError::CorruptKnowledge { .. }) => {
                let backup = self.backup_path();
                std::fs::rename(&self.path, &backup).map_err(|e| DocsortError::KnowledgeUnusable {
                    path: self.path.clone(),
                    reason: format!("{}; moving it aside failed: {}", err, e),
                })?;
                warn!("{}; moved it to {:?} and starting with empty knowledge", err, backup);
                let mut kb = KnowledgeBase::new();
                kb.set_storage_location(self.path.clone());
                Ok((kb, Some(err)))
            }
            Err(DocsortError::FileSystem(e)) => Err(DocsortError::KnowledgeUnusable {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Write the knowledge base atomically
    pub fn save(&self, kb: &KnowledgeBase) -> Result<()> {
        let json = serde_json::to_string_pretty(&to_json(kb)?)?;
        write_atomic(&self.path, json.as_bytes()).map_err(|source| DocsortError::Persistence {
            path: self.path.clone(),
            source,
        })?;
        info!("Saved {} categories to {:?}", kb.len(), self.path);
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".corrupt-{}", Local::now().format("%Y%m%d%H%M%S")));
        self.path.with_file_name(name)
    }

    fn corrupt(&self, reason: impl Into<String>) -> DocsortError {
        DocsortError::CorruptKnowledge {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn parse(&self, value: Value) -> Result<KnowledgeBase> {
        let mut root = match value {
            Value::Object(map) => map,
            _ => return Err(self.corrupt("top level is not an object")),
        };

        let kb = match root.remove("categories") {
            Some(Value::Array(items)) => {
                let categories = items
                    .into_iter()
                    .map(|item| serde_json::from_value::<Category>(item).map(normalize_category))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| self.corrupt(format!("bad category record: {}", e)))?;
                root.remove("version");
                let mut kb = KnowledgeBase::from_categories(categories);
                kb.extra = root;
                kb
            }
            Some(_) => return Err(self.corrupt("'categories' is not an array")),
            None => {
                let categories = parse_legacy(&root).map_err(|reason| self.corrupt(reason))?;
                if !categories.is_empty() {
                    info!("Imported {} categories from the old knowledge layout", categories.len());
                }
                KnowledgeBase::from_categories(categories)
            }
        };

        if !kb.is_consistent() {
            return Err(self.corrupt("category names are not unique"));
        }
        Ok(kb)
    }
}

fn to_json(kb: &KnowledgeBase) -> Result<Value> {
    let mut root = Map::new();
    root.insert("version".to_string(), Value::from(FORMAT_VERSION));
    let categories = kb
        .ordered()
        .into_iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    root.insert("categories".to_string(), Value::Array(categories));
    for (key, value) in &kb.extra {
        if key != "version" && key != "categories" {
            root.insert(key.clone(), value.clone());
        }
    }
    Ok(Value::Object(root))
}

fn normalize_category(mut category: Category) -> Category {
    category.display_name = category.display_name.trim().to_string();
    category.known_tokens = category
        .known_tokens
        .iter()
        .map(|t| normalize_token(t))
        .filter(|t| !t.is_empty())
        .collect();
    category
}

/// Old layout: `{"03 Vertrag": {"document_types": [...], "created_at": ...}}`
fn parse_legacy(root: &Map<String, Value>) -> std::result::Result<Vec<Category>, String> {
    let mut numbered: Vec<(u32, Category)> = Vec::new();
    let mut unnumbered: Vec<Category> = Vec::new();

    for (key, value) in root {
        let mut fields = match value {
            Value::Object(fields) => fields.clone(),
            _ => return Err(format!("entry '{}' is not an object", key)),
        };

        let tokens: BTreeSet<String> = match fields.remove("document_types") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(normalize_token)
                .filter(|t| !t.is_empty())
                .collect(),
            None => BTreeSet::new(),
            Some(_) => return Err(format!("'document_types' of '{}' is not an array", key)),
        };

        let (number, name) = split_numbered_name(key);
        if name.is_empty() {
            return Err(format!("entry '{}' has no category name", key));
        }
        let mut category = Category::new(name, number.unwrap_or(0));
        category.known_tokens = tokens;
        category.extra = fields;

        match number {
            Some(n) => numbered.push((n, category)),
            None => unnumbered.push(category),
        }
    }

    numbered.sort_by_key(|(n, _)| *n);
    let offset = numbered.last().map_or(0, |(n, _)| *n);
    let mut categories: Vec<Category> = numbered.into_iter().map(|(_, c)| c).collect();
    for (i, mut category) in unnumbered.into_iter().enumerate() {
        category.order_index = offset + i as u32 + 1;
        categories.push(category);
    }
    Ok(categories)
}

/// Split `"03 Vertrag"` / `"03_Vertrag"` into `(Some(3), "Vertrag")`
pub(crate) fn split_numbered_name(name: &str) -> (Option<u32>, &str) {
    let trimmed = name.trim();
    let digits_end = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(trimmed.len(), |(i, _)| i);
    if digits_end == 0 {
        return (None, trimmed);
    }
    let rest = trimmed[digits_end..].trim_start_matches([' ', '_', '-', '.']);
    match trimmed[..digits_end].parse() {
        Ok(n) => (Some(n), rest),
        Err(_) => (None, trimmed),
    }
}
