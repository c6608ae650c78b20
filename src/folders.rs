// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Reconciling a root folder's category folders with the knowledge base
//!
//! Folders are matched to categories by name, ignoring any leading number,
//! case, diacritics and `_`/`-`/space differences. Failing that, a folder
//! named after one of a category's known tokens (`Invoices` for a category
//! that knows `invoices`) is matched. Matched folders are renamed to the
//! canonical `NN_Name`; missing ones are created. Folders that match no
//! category are never touched, and folder contents are never inspected,
//! merged or deleted.

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::knowledge::store::split_numbered_name;
use crate::knowledge::{Category, KnowledgeBase};
use crate::signals::normalize_token;
use crate::{DocsortError, Result};

/// What has to happen for a category folder to be canonical
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FolderAction {
    NoOp,
    Create,
    RenameFrom(PathBuf),
}

/// Planned state of one category folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderPlan {
    pub order_index: u32,
    pub category: String,
    pub target_path: PathBuf,
    pub action: FolderAction,
}

/// Several folders claim the same category; reported, never merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderConflict {
    pub order_index: u32,
    pub category: String,
    /// The canonical folder, when it already exists
    pub canonical: Option<PathBuf>,
    pub others: Vec<PathBuf>,
}

impl FolderConflict {
    pub fn to_error(&self, root: &Path) -> DocsortError {
        DocsortError::Conflict {
            category: self.category.clone(),
            canonical: self
                .canonical
                .clone()
                .unwrap_or_else(|| root.join(format!("{:02}_{}", self.order_index, self.category))),
            others: self.others.clone(),
        }
    }
}

/// Result of comparing the folder tree with the knowledge base
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// One plan per category without a conflict blocking it, in order
    pub plans: Vec<FolderPlan>,
    pub conflicts: Vec<FolderConflict>,
    /// Folders no category claims; left alone
    pub unmatched: Vec<PathBuf>,
}

impl SyncReport {
    /// Whether applying this report would change nothing
    pub fn is_noop(&self) -> bool {
        self.plans.iter().all(|p| p.action == FolderAction::NoOp)
    }

    pub fn plan_for(&self, order_index: u32) -> Option<&FolderPlan> {
        self.plans.iter().find(|p| p.order_index == order_index)
    }

    pub fn conflict_for(&self, order_index: u32) -> Option<&FolderConflict> {
        self.conflicts.iter().find(|c| c.order_index == order_index)
    }

    /// Every existing folder that belongs to some category
    pub fn category_folders(&self) -> HashSet<PathBuf> {
        let mut folders = HashSet::new();
        for plan in &self.plans {
            match &plan.action {
                FolderAction::NoOp => {
                    folders.insert(plan.target_path.clone());
                }
                FolderAction::RenameFrom(old) => {
                    folders.insert(old.clone());
                }
                FolderAction::Create => {}
            }
        }
        for conflict in &self.conflicts {
            folders.extend(conflict.canonical.iter().cloned());
            folders.extend(conflict.others.iter().cloned());
        }
        folders
    }
}

/// Keeps the category folders under one root in canonical shape
#[derive(Debug, Clone)]
pub struct FolderSynchronizer {
    root: PathBuf,
}

impl FolderSynchronizer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Plan the folder changes needed for `kb`. Reads the tree, changes nothing.
    pub fn sync(&self, kb: &KnowledgeBase) -> Result<SyncReport> {
        let folders = self.subfolders()?;
        let ordered = kb.ordered();
        let mut claimed: HashSet<PathBuf> = HashSet::new();
        let mut report = SyncReport::default();

        // Canonical folders are claimed first so a renumbered category can
        // never take over another category's folder.
        for category in &ordered {
            let canonical = self.root.join(category.canonical_name());
            if folders.contains(&canonical) {
                claimed.insert(canonical);
            }
        }

        for category in &ordered {
            let canonical = self.root.join(category.canonical_name());
            let has_canonical = folders.contains(&canonical);

            let key = folder_key(&category.display_name);
            let mut matches: Vec<PathBuf> = folders
                .iter()
                .filter(|f| !claimed.contains(*f) && folder_name_key(f) == key)
                .cloned()
                .collect();
            if matches.is_empty() {
                matches = folders
                    .iter()
                    .filter(|f| !claimed.contains(*f) && matches_known_token(category, f))
                    .cloned()
                    .collect();
            }
            claimed.extend(matches.iter().cloned());

            if has_canonical {
                report.plans.push(plan(category, canonical.clone(), FolderAction::NoOp));
                if !matches.is_empty() {
                    warn!(
                        "{} exists next to {:?}; leaving both untouched",
                        category.canonical_name(),
                        matches
                    );
                    report.conflicts.push(conflict(category, Some(canonical), matches));
                }
                continue;
            }

            match matches.len() {
                0 => report.plans.push(plan(category, canonical, FolderAction::Create)),
                1 => {
                    let old = matches.remove(0);
                    report.plans.push(plan(category, canonical, FolderAction::RenameFrom(old)));
                }
                _ => {
                    warn!(
                        "{:?} all look like {}; not guessing which to rename",
                        matches,
                        category.canonical_name()
                    );
                    report.conflicts.push(conflict(category, None, matches));
                }
            }
        }

        report.unmatched = folders.into_iter().filter(|f| !claimed.contains(f)).collect();
        debug!(
            "Folder sync for {:?}: {} plans, {} conflicts, {} unrelated folders",
            self.root,
            report.plans.len(),
            report.conflicts.len(),
            report.unmatched.len()
        );
        Ok(report)
    }

    /// Carry out one plan. Safe to repeat: an already-applied plan is a no-op.
    pub fn apply(&self, plan: &FolderPlan) -> Result<()> {
        let target = &plan.target_path;
        match &plan.action {
            FolderAction::NoOp => Ok(()),
            FolderAction::Create => match fs::create_dir(target) {
                Ok(()) => {
                    info!("Created folder: {:?}", target);
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && target.is_dir() => Ok(()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(DocsortError::Conflict {
                    category: plan.category.clone(),
                    canonical: target.clone(),
                    others: Vec::new(),
                }),
                Err(e) => Err(e.into()),
            },
            FolderAction::RenameFrom(old) => {
                if !old.exists() && target.is_dir() {
                    debug!("{:?} already renamed to {:?}", old, target);
                    return Ok(());
                }
                let case_only = is_case_only_rename(old, target);
                if case_only && !has_entry_named(target)? {
                    let staging = old.with_file_name(format!(
                        ".{}.docsort-rename",
                        old.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
                    ));
                    rename_through(old, &staging, target)?;
                } else if case_only || target.exists() {
                    return Err(DocsortError::Conflict {
                        category: plan.category.clone(),
                        canonical: target.clone(),
                        others: vec![old.clone()],
                    });
                } else {
                    fs::rename(old, target)?;
                }
                info!("Renamed folder: {:?} -> {:?}", old, target);
                Ok(())
            }
        }
    }

    /// Apply every plan, continuing past failures. Returns the failures.
    pub fn apply_all(&self, report: &SyncReport) -> Vec<DocsortError> {
        let mut failures = Vec::new();
        for plan in &report.plans {
            if let Err(e) = self.apply(plan) {
                warn!("Could not prepare {:?}: {}", plan.target_path, e);
                failures.push(e);
            }
        }
        failures
    }

    /// Make sure the folder for one category exists in canonical form and
    /// return its path. With `dry_run` only the planned path is returned.
    pub fn ensure_category(&self, kb: &KnowledgeBase, order_index: u32, dry_run: bool) -> Result<PathBuf> {
        let report = self.sync(kb)?;
        if let Some(plan) = report.plan_for(order_index) {
            if !dry_run {
                self.apply(plan)?;
            }
            return Ok(plan.target_path.clone());
        }
        match report.conflict_for(order_index) {
            Some(conflict) => Err(conflict.to_error(&self.root)),
            None => Err(DocsortError::UnknownCategory(format!("#{}", order_index))),
        }
    }

    /// `{category_path}/{year}`, created when missing
    pub fn ensure_year_folder(category_path: &Path, year: i32, dry_run: bool) -> Result<PathBuf> {
        let year_path = category_path.join(year.to_string());
        if dry_run || year_path.is_dir() {
            return Ok(year_path);
        }
        match fs::create_dir(&year_path) {
            Ok(()) => {
                debug!("Created year folder {:?}", year_path);
                Ok(year_path)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists && year_path.is_dir() => Ok(year_path),
            Err(e) => Err(e.into()),
        }
    }

    /// Immediate, non-hidden subfolders of the root, sorted by name
    fn subfolders(&self) -> Result<Vec<PathBuf>> {
        let mut folders = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            folders.push(entry.path());
        }
        folders.sort();
        Ok(folders)
    }
}

/// Comparison key for a folder or category name: number prefix dropped,
/// separators unified, case and diacritics folded
pub fn folder_key(name: &str) -> String {
    let (_, rest) = split_numbered_name(name);
    let spaced: String = rest
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();
    normalize_token(&spaced.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn folder_name_key(path: &Path) -> String {
    path.file_name()
        .map(|n| folder_key(&n.to_string_lossy()))
        .unwrap_or_default()
}

fn matches_known_token(category: &Category, folder: &Path) -> bool {
    let key = folder_name_key(folder);
    !key.is_empty() && category.knows(&key)
}

fn is_case_only_rename(old: &Path, target: &Path) -> bool {
    old != target
        && old.parent() == target.parent()
        && old.to_string_lossy().to_lowercase() == target.to_string_lossy().to_lowercase()
}

/// Whether the parent directory lists an entry with exactly this name.
/// Unlike `exists()` this tells `01_Vertrag` from `01_vertrag` on a
/// case-insensitive filesystem.
fn has_entry_named(path: &Path) -> Result<bool> {
    let (parent, name) = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => (parent, name),
        _ => return Ok(false),
    };
    for entry in fs::read_dir(parent)? {
        if entry?.file_name() == name {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Two-step rename via `staging`. If the second step fails the folder is
/// put back under its old name.
fn rename_through(old: &Path, staging: &Path, target: &Path) -> std::io::Result<()> {
    fs::rename(old, staging)?;
    if let Err(e) = fs::rename(staging, target) {
        warn!("Renaming {:?} to {:?} failed: {}; restoring {:?}", staging, target, e, old);
        if let Err(restore) = fs::rename(staging, old) {
            warn!("Could not restore {:?}: {}", old, restore);
        }
        return Err(e);
    }
    Ok(())
}

fn plan(category: &Category, target_path: PathBuf, action: FolderAction) -> FolderPlan {
    FolderPlan {
        order_index: category.order_index,
        category: category.display_name.clone(),
        target_path,
        action,
    }
}

fn conflict(category: &Category, canonical: Option<PathBuf>, others: Vec<PathBuf>) -> FolderConflict {
    FolderConflict {
        order_index: category.order_index,
        category: category.display_name.clone(),
        canonical,
        others,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn kb(names: &[&str]) -> KnowledgeBase {
        let mut kb = KnowledgeBase::new();
        for name in names {
            kb.add_category(name).unwrap();
        }
        kb
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_folder_key() {
        assert_eq!(folder_key("03_Vertrag"), "vertrag");
        assert_eq!(folder_key("3 vertrag"), "vertrag");
        assert_eq!(folder_key("Steuer-Unterlagen"), "steuer unterlagen");
        assert_eq!(folder_key("05_Bestätigung"), "bestatigung");
        assert_eq!(folder_key("2023"), "");
    }

    #[test]
    fn test_creates_missing_folders() {
        let dir = TempDir::new().unwrap();
        let sync = FolderSynchronizer::new(dir.path());
        let report = sync.sync(&kb(&["Antrag", "Vertrag"])).unwrap();

        assert_eq!(report.plans.len(), 2);
        assert!(report.plans.iter().all(|p| p.action == FolderAction::Create));
        assert!(sync.apply_all(&report).is_empty());
        assert_eq!(names_in(dir.path()), vec!["01_Antrag", "02_Vertrag"]);
    }

    #[test]
    fn test_sync_is_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Vertrag")).unwrap();
        fs::create_dir(dir.path().join("1 antrag")).unwrap();
        let kb = kb(&["Antrag", "Vertrag", "Rechnung"]);
        let sync = FolderSynchronizer::new(dir.path());

        let first = sync.sync(&kb).unwrap();
        assert!(!first.is_noop());
        assert!(sync.apply_all(&first).is_empty());

        let second = sync.sync(&kb).unwrap();
        assert!(second.is_noop());
        assert!(second.conflicts.is_empty());
        assert_eq!(names_in(dir.path()), vec!["01_Antrag", "02_Vertrag", "03_Rechnung"]);
    }

    #[test]
    fn test_rename_keeps_contents() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("03_Invoices");
        fs::create_dir(&old).unwrap();
        fs::write(old.join("a.pdf"), "a").unwrap();
        fs::write(old.join("b.pdf"), "b").unwrap();

        let mut kb = kb(&["Antrag", "Vertrag", "Rechnung"]);
        kb.learn(3, Some("invoices")).unwrap();
        let sync = FolderSynchronizer::new(dir.path());
        let report = sync.sync(&kb).unwrap();

        let plan = report.plan_for(3).unwrap();
        assert_eq!(plan.action, FolderAction::RenameFrom(old.clone()));
        sync.apply(plan).unwrap();

        let renamed = dir.path().join("03_Rechnung");
        assert!(!old.exists());
        assert_eq!(names_in(&renamed), vec!["a.pdf", "b.pdf"]);
        assert_eq!(fs::read_to_string(renamed.join("a.pdf")).unwrap(), "a");
    }

    #[test]
    fn test_renumbering_renames() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("01_Vertrag")).unwrap();
        fs::create_dir(dir.path().join("02_Antrag")).unwrap();
        let kb = kb(&["Antrag", "Vertrag"]);
        let sync = FolderSynchronizer::new(dir.path());

        let report = sync.sync(&kb).unwrap();
        assert!(sync.apply_all(&report).is_empty());
        assert_eq!(names_in(dir.path()), vec!["01_Antrag", "02_Vertrag"]);
    }

    #[test]
    fn test_unknown_folders_untouched() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Urlaub")).unwrap();
        fs::create_dir(dir.path().join("2023")).unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let sync = FolderSynchronizer::new(dir.path());

        let report = sync.sync(&kb(&["Vertrag"])).unwrap();
        assert_eq!(
            report.unmatched,
            vec![dir.path().join("2023"), dir.path().join("Urlaub")]
        );
        sync.apply_all(&report);
        assert_eq!(names_in(dir.path()), vec![".git", "01_Vertrag", "2023", "Urlaub"]);
    }

    #[test]
    fn test_canonical_and_old_folder_conflict() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("01_Vertrag")).unwrap();
        fs::create_dir(dir.path().join("Vertrag")).unwrap();
        fs::write(dir.path().join("Vertrag").join("x.pdf"), "x").unwrap();
        let sync = FolderSynchronizer::new(dir.path());

        let report = sync.sync(&kb(&["Vertrag"])).unwrap();
        assert_eq!(report.plans[0].action, FolderAction::NoOp);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].others, vec![dir.path().join("Vertrag")]);

        sync.apply_all(&report);
        assert!(dir.path().join("Vertrag").join("x.pdf").exists());
        assert!(matches!(
            report.conflicts[0].to_error(dir.path()),
            DocsortError::Conflict { .. }
        ));
    }

    #[test]
    fn test_two_candidates_block_the_category_only() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Vertrag")).unwrap();
        fs::create_dir(dir.path().join("vertrag-alt")).unwrap();
        fs::create_dir(dir.path().join("3_vertrag")).unwrap();
        let kb = kb(&["Vertrag", "Rechnung"]);
        let sync = FolderSynchronizer::new(dir.path());

        let report = sync.sync(&kb).unwrap();
        assert!(report.plan_for(1).is_none());
        assert_eq!(report.conflict_for(1).unwrap().others.len(), 2);
        assert_eq!(report.plan_for(2).unwrap().action, FolderAction::Create);

        assert!(matches!(
            sync.ensure_category(&kb, 1, false),
            Err(DocsortError::Conflict { .. })
        ));
        assert_eq!(
            sync.ensure_category(&kb, 2, false).unwrap(),
            dir.path().join("02_Rechnung")
        );
    }

    #[test]
    fn test_partial_apply_converges() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Antrag")).unwrap();
        fs::create_dir(dir.path().join("Vertrag")).unwrap();
        let kb = kb(&["Antrag", "Vertrag"]);
        let sync = FolderSynchronizer::new(dir.path());

        let report = sync.sync(&kb).unwrap();
        // Only the first rename happens before an interruption
        sync.apply(&report.plans[0]).unwrap();
        // Re-applying the stale plan is harmless
        sync.apply(&report.plans[0]).unwrap();

        let resumed = sync.sync(&kb).unwrap();
        assert_eq!(resumed.plan_for(1).unwrap().action, FolderAction::NoOp);
        assert!(sync.apply_all(&resumed).is_empty());
        assert!(sync.sync(&kb).unwrap().is_noop());
    }

    #[test]
    fn test_rename_onto_existing_path_is_conflict() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Vertrag")).unwrap();
        let sync = FolderSynchronizer::new(dir.path());
        let report = sync.sync(&kb(&["Vertrag"])).unwrap();

        // Someone else creates the canonical folder between plan and apply
        fs::create_dir(dir.path().join("01_Vertrag")).unwrap();
        assert!(matches!(
            sync.apply(&report.plans[0]),
            Err(DocsortError::Conflict { .. })
        ));
        assert!(dir.path().join("Vertrag").exists());
    }

    #[test]
    fn test_case_only_difference_is_renamed() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("01_vertrag")).unwrap();
        let sync = FolderSynchronizer::new(dir.path());
        let kb = kb(&["Vertrag"]);

        let report = sync.sync(&kb).unwrap();
        assert!(sync.apply_all(&report).is_empty());
        assert_eq!(names_in(dir.path()), vec!["01_Vertrag"]);
    }

    #[test]
    fn test_case_only_rename_onto_distinct_folder_is_conflict() {
        let dir = TempDir::new().unwrap();
        let lower = dir.path().join("01_vertrag");
        fs::create_dir(&lower).unwrap();
        fs::write(lower.join("a.pdf"), "a").unwrap();
        let sync = FolderSynchronizer::new(dir.path());
        let report = sync.sync(&kb(&["Vertrag"])).unwrap();
        assert_eq!(report.plans[0].action, FolderAction::RenameFrom(lower.clone()));

        // A case-insensitive filesystem can't hold both names
        let upper = dir.path().join("01_Vertrag");
        if fs::create_dir(&upper).is_err() {
            return;
        }
        fs::write(upper.join("b.pdf"), "b").unwrap();

        assert!(matches!(
            sync.apply(&report.plans[0]),
            Err(DocsortError::Conflict { .. })
        ));
        assert_eq!(names_in(dir.path()), vec!["01_Vertrag", "01_vertrag"]);
        assert_eq!(names_in(&lower), vec!["a.pdf"]);
        assert_eq!(names_in(&upper), vec!["b.pdf"]);
    }

    #[test]
    fn test_failed_second_rename_restores_folder() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("vertrag");
        let staging = dir.path().join(".vertrag.docsort-rename");
        let target = dir.path().join("taken");
        fs::create_dir(&old).unwrap();
        fs::write(old.join("a.pdf"), "a").unwrap();
        fs::create_dir(&target).unwrap();
        fs::write(target.join("b.pdf"), "b").unwrap();

        assert!(rename_through(&old, &staging, &target).is_err());
        assert!(!staging.exists());
        assert_eq!(names_in(&old), vec!["a.pdf"]);
        assert_eq!(names_in(&target), vec!["b.pdf"]);
    }

    #[test]
    fn test_year_folder() {
        let dir = TempDir::new().unwrap();
        let year = FolderSynchronizer::ensure_year_folder(dir.path(), 2023, false).unwrap();
        assert!(year.is_dir());
        assert_eq!(year, dir.path().join("2023"));
        // Existing folder is fine
        FolderSynchronizer::ensure_year_folder(dir.path(), 2023, false).unwrap();

        let planned = FolderSynchronizer::ensure_year_folder(dir.path(), 2021, true).unwrap();
        assert!(!planned.exists());
    }
}
