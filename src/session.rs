// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! One sorting run over a root folder
//!
//! Per file: wait for it to be local, extract signals, classify, ask the
//! user when needed, make sure the category folder exists, move. Problems
//! with one file are recorded and the run moves on.

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::classify::{self, Classification};
use crate::config::{AppConfig, RuleConfig, ScanConfig};
use crate::feedback::{FeedbackProvider, FeedbackRequest, Resolution};
use crate::folders::FolderSynchronizer;
use crate::fsutil::move_file;
use crate::history::{create_entry, file_hash, History};
use crate::knowledge::{Category, KnowledgeBase, KnowledgeStore};
use crate::materialize::{should_process, Materializer};
use crate::signals::{normalize_date_prefix, FeatureExtractor, FilenameSignals};
use crate::{DocsortError, Result};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Scanning,
    Extracting,
    Classifying,
    AwaitingInput,
    Synchronizing,
    Moving,
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub dry_run: bool,
    pub scan: ScanConfig,
    pub rules: RuleConfig,
    pub save_retries: u32,
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            dry_run: false,
            scan: config.scan.clone(),
            rules: config.rules.clone(),
            save_retries: config.knowledge.save_retries,
        }
    }
}

/// A file that was (or in a dry run would be) moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedFile {
    pub from: PathBuf,
    pub to: PathBuf,
    pub category: String,
}

#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: DocsortError,
}

/// What a run did
#[derive(Debug, Default)]
pub struct RunSummary {
    pub moved: Vec<MovedFile>,
    /// Left in place on the user's request
    pub skipped: Vec<PathBuf>,
    pub errors: Vec<FileFailure>,
    /// Folder problems found while preparing category folders
    pub conflicts: Vec<DocsortError>,
    /// The user quit before every file was handled
    pub cancelled: bool,
    /// The latest knowledge changes could not be written
    pub knowledge_unsaved: bool,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.conflicts.is_empty() && !self.knowledge_unsaved
    }

    /// Moved files grouped by category, in first-seen order
    pub fn by_category(&self) -> Vec<(&str, Vec<&MovedFile>)> {
        let mut groups: Vec<(&str, Vec<&MovedFile>)> = Vec::new();
        for file in &self.moved {
            match groups.iter_mut().find(|(name, _)| *name == file.category) {
                Some((_, files)) => files.push(file),
                None => groups.push((file.category.as_str(), vec![file])),
            }
        }
        groups
    }
}

enum FileOutcome {
    Moved(MovedFile),
    Skipped,
    Cancelled,
}

enum Choice {
    File(Category),
    Skip,
    Cancel,
}

/// Sorts the documents of one root folder into category folders
pub struct OrganizeSession<'a> {
    knowledge: &'a mut KnowledgeBase,
    store: &'a KnowledgeStore,
    materializer: &'a dyn Materializer,
    feedback: &'a mut dyn FeedbackProvider,
    history: Option<&'a History>,
    extractor: FeatureExtractor,
    options: SessionOptions,
    state: SessionState,
    unsaved: bool,
}

impl<'a> OrganizeSession<'a> {
    pub fn new(
        knowledge: &'a mut KnowledgeBase,
        store: &'a KnowledgeStore,
        materializer: &'a dyn Materializer,
        feedback: &'a mut dyn FeedbackProvider,
    ) -> Self {
        Self {
            knowledge,
            store,
            materializer,
            feedback,
            history: None,
            extractor: FeatureExtractor::new(),
            options: SessionOptions {
                save_retries: 3,
                ..SessionOptions::default()
            },
            state: SessionState::Idle,
            unsaved: false,
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_history(mut self, history: &'a History) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn enter(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Sort every candidate file under `root`
    pub async fn run(&mut self, root: &Path) -> Result<RunSummary> {
        if !root.is_dir() {
            return Err(DocsortError::InvalidRoot(root.to_path_buf()));
        }
        let mut summary = RunSummary {
            dry_run: self.options.dry_run,
            ..RunSummary::default()
        };
        let synchronizer = FolderSynchronizer::new(root);

        self.enter(SessionState::Synchronizing);
        let report = synchronizer.sync(self.knowledge)?;
        for conflict in &report.conflicts {
            let err = conflict.to_error(root);
            warn!("{}", err);
            summary.conflicts.push(err);
        }
        if !self.options.dry_run {
            summary.conflicts.extend(synchronizer.apply_all(&report));
        }
        let mut category_dirs = report.category_folders();
        category_dirs.extend(report.plans.iter().map(|p| p.target_path.clone()));

        self.enter(SessionState::Scanning);
        let files = self.scan(root, &category_dirs)?;
        info!("Found {} file(s) to sort in {:?}", files.len(), root);

        for path in files {
            match self.process_file(&synchronizer, &path).await {
                Ok(FileOutcome::Moved(moved)) => summary.moved.push(moved),
                Ok(FileOutcome::Skipped) => summary.skipped.push(path),
                Ok(FileOutcome::Cancelled) => {
                    info!("Run cancelled at {:?}", path);
                    summary.cancelled = true;
                    break;
                }
                Err(e) if e.is_fatal() => {
                    self.enter(SessionState::Idle);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    summary.errors.push(FileFailure { path, error: e });
                }
            }
        }

        summary.knowledge_unsaved = self.unsaved;
        self.enter(SessionState::Idle);
        info!(
            "Run finished: {} moved, {} skipped, {} error(s)",
            summary.moved.len(),
            summary.skipped.len(),
            summary.errors.len()
        );
        Ok(summary)
    }

    async fn process_file(&mut self, synchronizer: &FolderSynchronizer, path: &Path) -> Result<FileOutcome> {
        if !self.materializer.ensure_materialized(path).await {
            return Err(DocsortError::NotMaterialized(path.to_path_buf()));
        }

        self.enter(SessionState::Extracting);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let signals = self.extractor.extract(&file_name);
        debug!("{}: {:?}", file_name, signals);

        self.enter(SessionState::Classifying);
        let category = match self.choose_category(&file_name, &signals)? {
            Choice::File(category) => category,
            Choice::Skip => return Ok(FileOutcome::Skipped),
            Choice::Cancel => return Ok(FileOutcome::Cancelled),
        };

        self.enter(SessionState::Synchronizing);
        let dry_run = self.options.dry_run;
        let mut dir = synchronizer.ensure_category(self.knowledge, category.order_index, dry_run)?;
        if self.options.rules.year_subfolders {
            if let Some(year) = signals.year() {
                dir = FolderSynchronizer::ensure_year_folder(&dir, year, dry_run)?;
            }
        }

        self.enter(SessionState::Moving);
        let target_name = if self.options.rules.normalize_date_prefix {
            normalize_date_prefix(&file_name)
        } else {
            file_name.clone()
        };
        let target = free_target(path, &dir, &target_name, self.options.rules.max_collision_suffix)?;

        if dry_run {
            info!("[DRY RUN] Would move {:?} -> {:?}", path, target);
        } else {
            self.move_and_record(path, &target, &category)?;
        }

        Ok(FileOutcome::Moved(MovedFile {
            from: path.to_path_buf(),
            to: target,
            category: category.display_name,
        }))
    }

    /// Settle the category for one file, asking the user when the
    /// classifier can't
    fn choose_category(&mut self, file_name: &str, signals: &FilenameSignals) -> Result<Choice> {
        let classification = classify::classify(signals, self.knowledge);
        let before = self.knowledge.clone();

        let chosen = match &classification {
            Classification::Matched(category) => {
                info!("{} -> {}", file_name, category.canonical_name());
                Some(category.clone())
            }
            Classification::Ambiguous(_) | Classification::Unknown => {
                self.enter(SessionState::AwaitingInput);
                let request = FeedbackRequest {
                    file_name,
                    signals,
                    classification: &classification,
                    knowledge: &*self.knowledge,
                };
                let resolution = self.feedback.resolve(&request)?;
                match resolution {
                    Resolution::Skip => {
                        info!("Skipped {}", file_name);
                        return Ok(Choice::Skip);
                    }
                    Resolution::Abort => return Ok(Choice::Cancel),
                    _ => {}
                }
                self.enter(SessionState::Classifying);
                classify::apply_resolution(self.knowledge, &resolution, signals)?
            }
        };

        if *self.knowledge != before && !self.options.dry_run {
            self.persist_knowledge();
        }
        Ok(chosen.map_or(Choice::Skip, Choice::File))
    }

    /// Save after a change, retrying a few times. A save that keeps failing
    /// leaves the knowledge in memory and flags the run.
    fn persist_knowledge(&mut self) {
        let attempts = self.options.save_retries.max(1);
        for attempt in 1..=attempts {
            match self.store.save(self.knowledge) {
                Ok(()) => {
                    self.unsaved = false;
                    return;
                }
                Err(e) => warn!("Saving knowledge failed (attempt {}/{}): {}", attempt, attempts, e),
            }
        }
        error!("Knowledge could not be saved to {:?}; keeping it in memory", self.store.path());
        self.unsaved = true;
    }

    fn move_and_record(&self, from: &Path, to: &Path, category: &Category) -> Result<()> {
        let hash = match self.history {
            Some(_) => Some(file_hash(from)?),
            None => None,
        };

        move_file(from, to).map_err(|e| DocsortError::FileMove {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Moved {:?} -> {:?}", from, to);

        if let (Some(history), Some(hash)) = (self.history, hash) {
            let entry = create_entry(from.to_path_buf(), to.to_path_buf(), category.canonical_name(), hash);
            if let Err(e) = history.append(&entry) {
                warn!("Failed to record move in history: {}", e);
            }
        }
        Ok(())
    }

    /// Candidate files in sorted order
    fn scan(&self, root: &Path, category_dirs: &HashSet<PathBuf>) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                let file_type = entry.file_type()?;

                if file_type.is_dir() {
                    if self.options.scan.recursive
                        && !category_dirs.contains(&path)
                        && !is_year_folder(&path)
                        && !is_hidden(&path)
                    {
                        pending.push(path);
                    }
                } else if file_type.is_file()
                    && should_process(&path)
                    && self.options.scan.accepts_extension(&path)
                {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

fn is_year_folder(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.len() == 4 && n.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// `dir/name`, or `dir/stem_altN.ext` for the first free N
fn free_target(source: &Path, dir: &Path, name: &str, max_suffix: u32) -> Result<PathBuf> {
    let target = dir.join(name);
    if !target.exists() {
        return Ok(target);
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for n in 1..=max_suffix {
        let candidate = dir.join(format!("{}_alt{}{}", stem, n, ext));
        if !candidate.exists() {
            debug!("{:?} exists, using {:?}", target, candidate);
            return Ok(candidate);
        }
    }
    Err(DocsortError::FileMove {
        from: source.to_path_buf(),
        to: target,
        reason: format!("no free name after {} alternatives", max_suffix),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::LocalMaterializer;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Answers prompts from a fixed script; skips once the script runs out
    #[derive(Default)]
    struct Scripted {
        answers: VecDeque<Resolution>,
        asked: Vec<String>,
    }

    impl Scripted {
        fn new(answers: Vec<Resolution>) -> Self {
            Self { answers: answers.into(), asked: Vec::new() }
        }
    }

    impl FeedbackProvider for Scripted {
        fn resolve(&mut self, request: &FeedbackRequest<'_>) -> Result<Resolution> {
            self.asked.push(request.file_name.to_string());
            Ok(self.answers.pop_front().unwrap_or(Resolution::Skip))
        }
    }

    struct NeverReady;

    #[async_trait]
    impl Materializer for NeverReady {
        async fn ensure_materialized(&self, _path: &Path) -> bool {
            false
        }
    }

    fn kb_with(entries: &[(&str, &[&str])]) -> KnowledgeBase {
        let mut kb = KnowledgeBase::new();
        for (name, tokens) in entries {
            let index = kb.add_category(name).unwrap().order_index;
            for token in tokens.iter() {
                kb.learn(index, Some(*token)).unwrap();
            }
        }
        kb
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"%PDF-1.4").unwrap();
    }

    fn new_vertrag() -> Resolution {
        Resolution::New { name: "Vertrag".into(), token: None }
    }

    #[tokio::test]
    async fn test_first_file_creates_category_and_moves() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        touch(&root.path().join("20230515_agreement.pdf"));

        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let mut kb = KnowledgeBase::new();
        let mut feedback = Scripted::new(vec![new_vertrag()]);

        let summary = OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback)
            .run(root.path())
            .await
            .unwrap();

        let expected = root.path().join("01_Vertrag").join("2023").join("20230515_agreement.pdf");
        assert_eq!(summary.moved.len(), 1);
        assert_eq!(summary.moved[0].to, expected);
        assert_eq!(summary.moved[0].category, "Vertrag");
        assert!(expected.is_file());
        assert!(!root.path().join("20230515_agreement.pdf").exists());
        assert!(summary.is_clean());

        assert!(kb.get(1).unwrap().knows("agreement"));
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.categories(), kb.categories());
    }

    #[tokio::test]
    async fn test_learned_token_needs_no_prompt() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        touch(&root.path().join("agreement_mieter.pdf"));

        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let mut kb = kb_with(&[("Vertrag", &["agreement"])]);
        let mut feedback = Scripted::default();

        let summary = OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback)
            .run(root.path())
            .await
            .unwrap();

        assert!(feedback.asked.is_empty());
        assert_eq!(summary.moved.len(), 1);
        // No date: filed directly under the category folder
        assert!(root.path().join("01_Vertrag").join("agreement_mieter.pdf").is_file());
    }

    #[tokio::test]
    async fn test_automatic_match_learns_nothing() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        touch(&root.path().join("other_invoice.pdf"));

        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let mut kb = kb_with(&[("Rechnung", &["invoice"]), ("Vertrag", &["contract"])]);
        let before = kb.clone();
        let mut feedback = Scripted::default();

        let summary = OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback)
            .run(root.path())
            .await
            .unwrap();

        assert_eq!(summary.moved.len(), 1);
        assert!(root.path().join("01_Rechnung").join("other_invoice.pdf").is_file());
        assert_eq!(kb, before);
        assert!(!store.path().exists());

        // "other" must not have become a Rechnung token
        match classify::classify(&crate::signals::extract("other_contract.pdf"), &kb) {
            Classification::Matched(c) => assert_eq!(c.display_name, "Vertrag"),
            other => panic!("expected Vertrag, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_skip_leaves_file_and_knowledge() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let file = root.path().join("scan_0001.pdf");
        touch(&file);

        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let mut kb = KnowledgeBase::new();
        let mut feedback = Scripted::new(vec![Resolution::Skip]);

        let summary = OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback)
            .run(root.path())
            .await
            .unwrap();

        assert_eq!(summary.skipped, vec![file.clone()]);
        assert!(file.is_file());
        assert!(kb.is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_quit_stops_the_run() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        touch(&root.path().join("a_first.pdf"));
        touch(&root.path().join("b_second.pdf"));

        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let mut kb = KnowledgeBase::new();
        let mut feedback = Scripted::new(vec![Resolution::Abort, new_vertrag()]);

        let mut session = OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback);
        let summary = session.run(root.path()).await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);

        assert!(summary.cancelled);
        assert!(summary.moved.is_empty());
        assert!(summary.skipped.is_empty());
        assert_eq!(feedback.asked, vec!["a_first.pdf".to_string()]);
        assert!(root.path().join("b_second.pdf").is_file());
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let file = root.path().join("20230515_agreement.pdf");
        touch(&file);

        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let mut kb = KnowledgeBase::new();
        let mut feedback = Scripted::new(vec![new_vertrag()]);
        let options = SessionOptions { dry_run: true, ..SessionOptions::default() };

        let summary = OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback)
            .with_options(options)
            .run(root.path())
            .await
            .unwrap();

        assert!(summary.dry_run);
        assert_eq!(
            summary.moved[0].to,
            root.path().join("01_Vertrag").join("2023").join("20230515_agreement.pdf")
        );
        assert!(file.is_file());
        assert!(!root.path().join("01_Vertrag").exists());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_unavailable_file_is_skipped_with_error() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let file = root.path().join("agreement.pdf");
        touch(&file);

        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let mut kb = kb_with(&[("Vertrag", &["agreement"])]);
        let mut feedback = Scripted::default();

        let summary = OrganizeSession::new(&mut kb, &store, &NeverReady, &mut feedback)
            .run(root.path())
            .await
            .unwrap();

        assert!(summary.moved.is_empty());
        assert_eq!(summary.errors.len(), 1);
        assert!(matches!(summary.errors[0].error, DocsortError::NotMaterialized(_)));
        assert!(file.is_file());
    }

    #[tokio::test]
    async fn test_conflicted_category_does_not_stop_other_files() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        fs::create_dir(root.path().join("1 Vertrag")).unwrap();
        fs::create_dir(root.path().join("Vertrag")).unwrap();
        let blocked = root.path().join("agreement_2023.pdf");
        touch(&blocked);
        touch(&root.path().join("invoice_mai.pdf"));

        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let mut kb = kb_with(&[("Vertrag", &["agreement"]), ("Rechnung", &["invoice"])]);
        let mut feedback = Scripted::default();

        let summary = OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback)
            .run(root.path())
            .await
            .unwrap();

        assert_eq!(summary.conflicts.len(), 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(matches!(summary.errors[0].error, DocsortError::Conflict { .. }));
        assert!(blocked.is_file());
        assert!(root.path().join("02_Rechnung").join("invoice_mai.pdf").is_file());
        assert!(root.path().join("1 Vertrag").is_dir());
        assert!(root.path().join("Vertrag").is_dir());
    }

    #[tokio::test]
    async fn test_name_collision_gets_suffix() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let existing = root.path().join("01_Vertrag").join("2023").join("20230515_agreement.pdf");
        touch(&existing);
        touch(&root.path().join("20230515_agreement.pdf"));

        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let mut kb = kb_with(&[("Vertrag", &["agreement"])]);
        let mut feedback = Scripted::default();

        let summary = OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback)
            .run(root.path())
            .await
            .unwrap();

        let alt = root.path().join("01_Vertrag").join("2023").join("20230515_agreement_alt1.pdf");
        assert_eq!(summary.moved[0].to, alt);
        assert!(alt.is_file());
        assert!(existing.is_file());
    }

    #[tokio::test]
    async fn test_date_prefix_normalized_and_move_journaled() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let source = root.path().join("20230515_agreement.pdf");
        touch(&source);

        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let history = History::new(data.path().join("history.jsonl"));
        let mut kb = kb_with(&[("Vertrag", &["agreement"])]);
        let mut feedback = Scripted::default();
        let mut options = SessionOptions::default();
        options.rules.normalize_date_prefix = true;

        OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback)
            .with_options(options)
            .with_history(&history)
            .run(root.path())
            .await
            .unwrap();

        let target = root.path().join("01_Vertrag").join("2023").join("2023-05-15 agreement.pdf");
        assert!(target.is_file());

        let entries = history.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].original_path, source);
        assert_eq!(entries[0].new_path, target);
        assert_eq!(entries[0].category, "01_Vertrag");
        assert_eq!(entries[0].file_hash, file_hash(&target).unwrap());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_learning_in_memory() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        touch(&root.path().join("20230515_agreement.pdf"));
        // A directory where the knowledge file should be cannot be replaced
        let blocked = data.path().join("kb.json");
        fs::create_dir(&blocked).unwrap();

        let store = KnowledgeStore::new(&blocked);
        let mut kb = KnowledgeBase::new();
        let mut feedback = Scripted::new(vec![new_vertrag()]);

        let summary = OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback)
            .run(root.path())
            .await
            .unwrap();

        assert!(summary.knowledge_unsaved);
        assert_eq!(summary.moved.len(), 1);
        assert!(kb.get(1).unwrap().knows("agreement"));
    }

    #[tokio::test]
    async fn test_recursive_scan_skips_category_folders() {
        let root = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let filed = root.path().join("01_Vertrag").join("old_agreement.pdf");
        touch(&filed);
        touch(&root.path().join("inbox").join("agreement_neu.pdf"));
        touch(&root.path().join("inbox").join("notes.txt"));
        touch(&root.path().join("inbox").join(".hidden.pdf"));

        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let mut kb = kb_with(&[("Vertrag", &["agreement"])]);
        let mut feedback = Scripted::default();
        let mut options = SessionOptions::default();
        options.scan.recursive = true;

        let summary = OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback)
            .with_options(options)
            .run(root.path())
            .await
            .unwrap();

        assert_eq!(summary.moved.len(), 1);
        assert!(filed.is_file());
        assert!(root.path().join("01_Vertrag").join("agreement_neu.pdf").is_file());
        assert!(root.path().join("inbox").join("notes.txt").is_file());
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let data = TempDir::new().unwrap();
        let store = KnowledgeStore::new(data.path().join("kb.json"));
        let mut kb = KnowledgeBase::new();
        let mut feedback = Scripted::default();

        let err = OrganizeSession::new(&mut kb, &store, &LocalMaterializer, &mut feedback)
            .run(&data.path().join("nope"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_summary_groups_by_category() {
        let moved = |to: &str, category: &str| MovedFile {
            from: PathBuf::from("x"),
            to: PathBuf::from(to),
            category: category.to_string(),
        };
        let summary = RunSummary {
            moved: vec![moved("a", "Vertrag"), moved("b", "Rechnung"), moved("c", "Vertrag")],
            ..RunSummary::default()
        };
        let groups = summary.by_category();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "Vertrag");
        assert_eq!(groups[0].1.len(), 2);
    }
}
