// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! docsort: sort documents into learned category folders

use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use docsort::classify::{classify, Classification};
use docsort::config::AppConfig;
use docsort::feedback::{FeedbackProvider, SkipUnresolved, TerminalPrompt};
use docsort::folders::{FolderAction, FolderSynchronizer};
use docsort::history::{History, UndoOutcome};
use docsort::knowledge::{KnowledgeBase, KnowledgeStore};
use docsort::materialize::materializer_for;
use docsort::session::{OrganizeSession, RunSummary, SessionOptions};
use docsort::signals::FeatureExtractor;
use docsort::{DocsortError, Result};

/// docsort CLI - learns where your documents belong
#[derive(Parser, Debug)]
#[command(name = "docsort")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.0.0")]
#[command(about = "Sort documents into numbered category folders by filename", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(long, default_value = "docsort.json", global = true)]
    config: PathBuf,

    /// Knowledge file to use instead of the resolved default
    #[arg(short, long, global = true)]
    knowledge: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sort the documents in a folder
    Sort {
        /// Root folder (asked for when omitted)
        path: Option<PathBuf>,

        /// Show what would happen without moving anything
        #[arg(long)]
        dry_run: bool,

        /// Also pick up files in subfolders
        #[arg(short, long)]
        recursive: bool,

        /// Don't offer to sort another folder afterwards
        #[arg(long)]
        once: bool,

        /// Never ask; leave files that can't be classified where they are
        #[arg(long)]
        no_prompt: bool,
    },

    /// Bring category folders in line with the knowledge base
    Sync {
        /// Root folder
        path: PathBuf,

        /// Only print the plan
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what docsort makes of a filename
    Classify {
        filename: String,
    },

    /// Inspect or edit the knowledge base
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeCommands,
    },

    /// History and undo operations
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Write a default configuration and seed the default categories
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum KnowledgeCommands {
    /// List categories and their known tokens
    Show,

    /// Add a category at the end of the order
    Add {
        name: String,
    },

    /// Print where the knowledge file lives
    Path,
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent history entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Move recently sorted files back
    Undo {
        /// Number of moves to undo (0 for all)
        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Dry run (show what would be undone)
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear all history
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "docsort.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(path) = &cli.knowledge {
        config.knowledge.path = Some(path.to_string_lossy().into_owned());
    }

    match cli.command {
        Some(Commands::Sort { path, dry_run, recursive, once, no_prompt }) => {
            run_sort(config, path, dry_run, recursive, once || no_prompt, no_prompt).await
        }
        Some(Commands::Sync { path, dry_run }) => run_sync(config, path, dry_run),
        Some(Commands::Classify { filename }) => run_classify(config, &filename),
        Some(Commands::Knowledge { action }) => run_knowledge_command(config, action),
        Some(Commands::History { action }) => run_history_command(config, action),
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Init { dir, force }) => run_init(config, dir, force),
        None => run_sort(config, None, false, false, false, false).await,
    }
}

/// Knowledge store for a root folder
fn knowledge_store(config: &AppConfig, root: &Path) -> KnowledgeStore {
    KnowledgeStore::new(KnowledgeStore::resolve_location(
        config.knowledge_path(),
        root,
        &config.knowledge.file_name,
    ))
}

/// Load knowledge, setting a corrupt file aside, and seed defaults if configured
fn load_knowledge(config: &AppConfig, store: &KnowledgeStore) -> Result<KnowledgeBase> {
    let (mut kb, recovered) = store.load_or_recover()?;
    if let Some(e) = recovered {
        warn!("Started with empty knowledge: {}", e);
    }
    if config.knowledge.seed_defaults && kb.seed_defaults() {
        info!("Seeded default categories");
        store.save(&kb)?;
    }
    Ok(kb)
}

/// Load knowledge for a read-only command. A corrupt file is reported and
/// left where it is.
fn read_knowledge(store: &KnowledgeStore) -> Result<KnowledgeBase> {
    match store.load() {
        Ok(kb) => Ok(kb),
        Err(e @ DocsortError::CorruptKnowledge { .. }) => {
            eprintln!("{}", e);
            eprintln!("Showing results for empty knowledge; the file was not changed");
            Ok(KnowledgeBase::new())
        }
        Err(e) => Err(e),
    }
}

/// Interactive sorting loop
async fn run_sort(
    config: AppConfig,
    path: Option<PathBuf>,
    dry_run: bool,
    recursive: bool,
    once: bool,
    no_prompt: bool,
) -> Result<()> {
    let mut prompt = TerminalPrompt::new(io::stdin().lock(), io::stdout());

    let mut root = match path {
        Some(p) => p,
        None => ask_root(&mut prompt)?,
    };

    let mut store = knowledge_store(&config, &root);
    info!("Knowledge file: {:?}", store.path());
    let mut kb = load_knowledge(&config, &store)?;

    let history = History::new(PathBuf::from(&config.history.path));
    let extractor = FeatureExtractor::with_names(&config.names);
    let mut options = SessionOptions::from_config(&config);
    options.dry_run = dry_run;
    options.scan.recursive |= recursive;

    if dry_run {
        warn!("DRY RUN MODE - nothing will be moved or saved");
    }

    loop {
        let materializer = materializer_for(&root, &config.cloud);
        let mut skip = SkipUnresolved;
        let feedback: &mut dyn FeedbackProvider = if no_prompt { &mut skip } else { &mut prompt };
        let mut session = OrganizeSession::new(&mut kb, &store, &*materializer, feedback)
            .with_options(options.clone())
            .with_extractor(extractor.clone());
        if config.history.enabled {
            session = session.with_history(&history);
        }
        let summary = session.run(&root).await?;

        print_summary(&summary);

        if summary.knowledge_unsaved {
            if let Some(alternate) = save_elsewhere(&mut prompt, &kb)? {
                store = alternate;
            }
        }

        if once || summary.cancelled || !prompt.confirm("\nSort another folder? (y/n): ")? {
            break;
        }
        root = ask_root(&mut prompt)?;
    }

    Ok(())
}

fn ask_root<R: BufRead, W: Write>(prompt: &mut TerminalPrompt<R, W>) -> Result<PathBuf> {
    loop {
        match prompt.ask("Folder to sort: ")? {
            None => return Err(DocsortError::Cancelled),
            Some(answer) if answer.is_empty() => continue,
            Some(answer) => {
                let path = PathBuf::from(answer.trim_matches('"'));
                if path.is_dir() {
                    return Ok(path);
                }
                println!("Not a folder: {}", path.display());
            }
        }
    }
}

/// Offer another place for knowledge that could not be saved
fn save_elsewhere<R: BufRead, W: Write>(
    prompt: &mut TerminalPrompt<R, W>,
    kb: &KnowledgeBase,
) -> Result<Option<KnowledgeStore>> {
    println!("\nLearned categories could not be saved.");
    loop {
        let answer = match prompt.ask("Save them to another file (empty to keep them in memory only): ")? {
            Some(a) if !a.is_empty() => a,
            _ => return Ok(None),
        };
        let store = KnowledgeStore::new(PathBuf::from(answer));
        match store.save(kb) {
            Ok(()) => {
                println!("Saved to {}", store.path().display());
                return Ok(Some(store));
            }
            Err(e) => println!("That didn't work either: {}", e),
        }
    }
}

fn print_summary(summary: &RunSummary) {
    let verb = if summary.dry_run { "Would move" } else { "Moved" };
    println!("\n{} {} file(s)", verb, summary.moved.len());
    for (category, files) in summary.by_category() {
        println!("  {} ({})", category, files.len());
        for file in files {
            println!("    {} -> {}", file.from.display(), file.to.display());
        }
    }
    if !summary.skipped.is_empty() {
        println!("Skipped {} file(s)", summary.skipped.len());
    }
    if !summary.conflicts.is_empty() {
        println!("Folder conflicts:");
        for conflict in &summary.conflicts {
            println!("  {}", conflict);
        }
    }
    if !summary.errors.is_empty() {
        println!("Errors:");
        for failure in &summary.errors {
            println!("  {}: {}", failure.path.display(), failure.error);
        }
    }
    if summary.cancelled {
        println!("Stopped before all files were handled.");
    }
}

/// Plan and apply the folder layout for one root
fn run_sync(config: AppConfig, root: PathBuf, dry_run: bool) -> Result<()> {
    if !root.is_dir() {
        return Err(DocsortError::InvalidRoot(root));
    }
    let store = knowledge_store(&config, &root);
    let kb = load_knowledge(&config, &store)?;
    let synchronizer = FolderSynchronizer::new(&root);
    let report = synchronizer.sync(&kb)?;

    for plan in &report.plans {
        match &plan.action {
            FolderAction::NoOp => println!("  ok      {}", plan.target_path.display()),
            FolderAction::Create => println!("  create  {}", plan.target_path.display()),
            FolderAction::RenameFrom(old) => {
                println!("  rename  {} -> {}", old.display(), plan.target_path.display())
            }
        }
    }
    for conflict in &report.conflicts {
        println!("  CONFLICT {}", conflict.to_error(&root));
    }
    for folder in &report.unmatched {
        println!("  ignored {}", folder.display());
    }

    if dry_run || report.is_noop() {
        return Ok(());
    }
    let failures = synchronizer.apply_all(&report);
    for failure in &failures {
        println!("Failed: {}", failure);
    }
    if failures.is_empty() {
        println!("Folders are up to date");
    }
    Ok(())
}

fn run_classify(config: AppConfig, filename: &str) -> Result<()> {
    let root = std::env::current_dir()?;
    let store = knowledge_store(&config, &root);
    let kb = read_knowledge(&store)?;

    let signals = FeatureExtractor::with_names(&config.names).extract(filename);
    println!("{}", serde_json::to_string_pretty(&signals)?);

    match classify(&signals, &kb) {
        Classification::Matched(c) => println!("Matched: {}", c.canonical_name()),
        Classification::Ambiguous(cs) => {
            let names: Vec<String> = cs.iter().map(|c| c.canonical_name()).collect();
            println!("Ambiguous: {}", names.join(", "));
        }
        Classification::Unknown => println!("Unknown"),
    }
    Ok(())
}

fn run_knowledge_command(config: AppConfig, action: KnowledgeCommands) -> Result<()> {
    let root = std::env::current_dir()?;
    let store = knowledge_store(&config, &root);

    match action {
        KnowledgeCommands::Show => {
            let kb = read_knowledge(&store)?;
            if kb.is_empty() {
                println!("No categories learned yet");
            }
            for c in kb.ordered() {
                let tokens: Vec<&str> = c.known_tokens.iter().map(String::as_str).collect();
                println!("{}  [{}]", c.canonical_name(), tokens.join(", "));
            }
        }
        KnowledgeCommands::Add { name } => {
            let mut kb = load_knowledge(&config, &store)?;
            let created = kb.add_category(&name)?.canonical_name();
            store.save(&kb)?;
            println!("Added {}", created);
        }
        KnowledgeCommands::Path => println!("{}", store.path().display()),
    }
    Ok(())
}

/// Run history commands
fn run_history_command(config: AppConfig, action: HistoryCommands) -> Result<()> {
    let history = History::new(PathBuf::from(&config.history.path));

    match action {
        HistoryCommands::List { count } => {
            let entries = history.get_recent(count)?;
            println!("Recent history ({} entries):", entries.len());
            for entry in entries {
                let status = if entry.undone { "[UNDONE]" } else { "" };
                println!("  {} [{}] {} -> {} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.category,
                    entry.original_path.display(),
                    entry.new_path.display(),
                    status
                );
            }
        }
        HistoryCommands::Undo { count, dry_run } => {
            let results = history.undo(count, dry_run)?;
            if results.is_empty() {
                println!("No moves to undo");
            }
            for (entry, outcome) in results {
                let line = format!("{} -> {}", entry.new_path.display(), entry.original_path.display());
                match outcome {
                    UndoOutcome::Restored => println!("Undone: {}", line),
                    UndoOutcome::WouldRestore => println!("Would undo: {}", line),
                    UndoOutcome::Missing => println!("Skip (file gone): {}", line),
                    UndoOutcome::OriginalOccupied => println!("Skip (original path taken): {}", line),
                    UndoOutcome::Modified => println!("Skip (file changed since move): {}", line),
                    UndoOutcome::Failed(reason) => println!("Failed ({}): {}", reason, line),
                }
            }
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            history.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Extensions: {:?}", config.scan.extensions);
            println!("  Year subfolders: {}", config.rules.year_subfolders);
            match config.knowledge_path() {
                Some(p) => println!("  Knowledge file: {}", p.display()),
                None => println!("  Knowledge file: resolved per folder ({})", config.knowledge.file_name),
            }
        }
    }

    Ok(())
}

/// Write a default config and seed the default categories
fn run_init(config: AppConfig, dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("docsort.json");

    if config_path.exists() && !force {
        return Err(DocsortError::Config(
            "docsort.json already exists. Use --force to overwrite".to_string()
        ));
    }

    std::fs::create_dir_all(&target)?;
    AppConfig::default().save(&config_path)?;

    let store = knowledge_store(&config, &target);
    let (mut kb, _) = store.load_or_recover()?;
    if kb.seed_defaults() {
        store.save(&kb)?;
    }

    println!("docsort initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - docsort.json");
    println!("  - {} ({} categories)", store.path().display(), kb.len());
    println!("\nNext step: docsort sort <folder>");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["docsort"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("docsort.json"));
    }

    #[test]
    fn test_cli_sort_command() {
        let cli = Cli::try_parse_from([
            "docsort", "sort", "/tmp/inbox", "--dry-run", "--once"
        ]).unwrap();

        match cli.command {
            Some(Commands::Sort { path, dry_run, recursive, once, no_prompt }) => {
                assert_eq!(path, Some(PathBuf::from("/tmp/inbox")));
                assert!(dry_run);
                assert!(!recursive);
                assert!(once);
                assert!(!no_prompt);
            }
            _ => panic!("Expected Sort command"),
        }
    }

    #[test]
    fn test_read_only_load_leaves_corrupt_file_in_place() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, "{ not json").unwrap();

        let kb = read_knowledge(&KnowledgeStore::new(&path)).unwrap();
        assert!(kb.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_cli_global_knowledge_flag() {
        let cli = Cli::try_parse_from([
            "docsort", "knowledge", "show", "--knowledge", "/tmp/kb.json"
        ]).unwrap();

        assert_eq!(cli.knowledge, Some(PathBuf::from("/tmp/kb.json")));
        assert!(matches!(
            cli.command,
            Some(Commands::Knowledge { action: KnowledgeCommands::Show })
        ));
    }

    #[test]
    fn test_cli_history_undo() {
        let cli = Cli::try_parse_from(["docsort", "history", "undo", "-c", "0"]).unwrap();
        match cli.command {
            Some(Commands::History { action: HistoryCommands::Undo { count, dry_run } }) => {
                assert_eq!(count, 0);
                assert!(!dry_run);
            }
            _ => panic!("Expected History Undo command"),
        }
    }
}
