// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! docsort Undo Utility
//!
//! Moves sorted files back to where they came from, newest first.

use clap::Parser;
use std::path::PathBuf;

use docsort::history::{History, UndoOutcome};

#[derive(Parser, Debug)]
#[command(name = "docsort-undo")]
#[command(version = "1.0.0")]
#[command(about = "Undo docsort file moves")]
struct Args {
    /// Path to history file
    #[arg(short = 'f', long, default_value = "docsort_history.jsonl")]
    history_file: PathBuf,

    /// Number of moves to undo (default: 1, use 0 for all)
    #[arg(short, long, default_value = "1")]
    count: usize,

    /// Dry run - show what would be undone without doing it
    #[arg(long)]
    dry_run: bool,

    /// List all entries in history
    #[arg(long)]
    list: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if !args.history_file.exists() {
        eprintln!("History file not found: {:?}", args.history_file);
        eprintln!("No moves to undo.");
        return Ok(());
    }

    let history = History::new(args.history_file.clone());

    if args.list {
        let entries = history.read_all()?;
        println!("Move History ({} entries):", entries.len());
        println!("{:-<80}", "");
        for (i, entry) in entries.iter().rev().enumerate() {
            println!(
                "{:3}. [{}] {} -> {}{}",
                i + 1,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.original_path.display(),
                entry.new_path.display(),
                if entry.undone { " (undone)" } else { "" }
            );
            println!("     Category: {}", entry.category);
        }
        return Ok(());
    }

    let results = history.undo(args.count, args.dry_run)?;
    if results.is_empty() {
        println!("No history entries left to undo.");
        return Ok(());
    }

    println!(
        "{}Undoing {} move(s)...",
        if args.dry_run { "[DRY RUN] " } else { "" },
        results.len()
    );

    let mut undone = 0;
    let mut failed = 0;

    for (entry, outcome) in &results {
        let from = entry.new_path.display();
        let to = entry.original_path.display();
        match outcome {
            UndoOutcome::Restored => {
                println!("  Undone: {} -> {}", from, to);
                undone += 1;
            }
            UndoOutcome::WouldRestore => {
                println!("  Would move: {} -> {}", from, to);
                undone += 1;
            }
            UndoOutcome::Missing => {
                eprintln!("  Skip: {} (file not found, may have been moved/deleted)", from);
                failed += 1;
            }
            UndoOutcome::OriginalOccupied => {
                eprintln!("  Skip: {} (original path already exists)", to);
                failed += 1;
            }
            UndoOutcome::Modified => {
                eprintln!("  Skip: {} (content changed since it was sorted)", from);
                failed += 1;
            }
            UndoOutcome::Failed(reason) => {
                eprintln!("  Failed: {} ({})", from, reason);
                failed += 1;
            }
        }
    }

    println!();
    if args.dry_run {
        println!("Dry run complete. {} move(s) would be undone.", undone);
    } else {
        println!("Done. {} undone, {} failed/skipped.", undone, failed);
    }

    Ok(())
}
