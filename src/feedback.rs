// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Asking the user where a file belongs

use std::io::{BufRead, Write};

use crate::classify::Classification;
use crate::knowledge::KnowledgeBase;
use crate::signals::FilenameSignals;
use crate::Result;

/// The user's answer for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// File into an existing category. `token` replaces the extracted hint
    /// as the token to learn (e.g. when the hint was really a name).
    Existing { order_index: u32, token: Option<String> },
    /// Create a category at the end of the order and file into it
    New { name: String, token: Option<String> },
    /// Leave this file where it is; learn nothing
    Skip,
    /// Stop the run after this file
    Abort,
}

/// Everything the user needs to make a decision
#[derive(Debug)]
pub struct FeedbackRequest<'a> {
    pub file_name: &'a str,
    pub signals: &'a FilenameSignals,
    pub classification: &'a Classification,
    pub knowledge: &'a KnowledgeBase,
}

/// Resolves `Ambiguous` and `Unknown` classifications
pub trait FeedbackProvider {
    fn resolve(&mut self, request: &FeedbackRequest<'_>) -> Result<Resolution>;
}

/// Non-interactive runs: anything not matched automatically stays put
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipUnresolved;

impl FeedbackProvider for SkipUnresolved {
    fn resolve(&mut self, _request: &FeedbackRequest<'_>) -> Result<Resolution> {
        Ok(Resolution::Skip)
    }
}

/// Line-based prompt on a reader/writer pair (stdin/stdout in the CLI)
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `question` and read one trimmed line; `None` on end of input
    pub fn ask(&mut self, question: &str) -> Result<Option<String>> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Yes/no question; anything but `y`/`yes` is no
    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        Ok(matches!(
            self.ask(question)?.map(|a| a.to_lowercase()).as_deref(),
            Some("y") | Some("yes")
        ))
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }

    /// Let the user pick which token names the document type when the
    /// filename may contain a personal name
    fn pick_token(&mut self, signals: &FilenameSignals) -> Result<Option<String>> {
        if signals.tokens.len() < 2 {
            return Ok(None);
        }
        if !self.confirm("Does the filename contain a personal name? (y/n): ")? {
            return Ok(None);
        }
        writeln!(self.output, "Which part is the document type?")?;
        for (i, token) in signals.tokens.iter().enumerate() {
            writeln!(self.output, "  {}. {}", i + 1, token)?;
        }
        loop {
            let answer = match self.ask("Enter number: ")? {
                Some(a) => a,
                None => return Ok(None),
            };
            match answer.parse::<usize>() {
                Ok(n) if (1..=signals.tokens.len()).contains(&n) => {
                    return Ok(Some(signals.tokens[n - 1].clone()));
                }
                _ => writeln!(self.output, "Please enter a valid number.")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> FeedbackProvider for TerminalPrompt<R, W> {
    fn resolve(&mut self, request: &FeedbackRequest<'_>) -> Result<Resolution> {
        writeln!(self.output)?;
        writeln!(self.output, "Need help categorizing: {}", request.file_name)?;
        match &request.signals.category_hint {
            Some(hint) => writeln!(self.output, "Document type appears to be: {}", hint)?,
            None => writeln!(self.output, "No document type found in the name")?,
        }
        if let Some(name) = &request.signals.personal_name {
            writeln!(self.output, "Personal name detected: {}", name)?;
        }

        let token = self.pick_token(request.signals)?;

        let candidates = request.classification.candidates();
        if !candidates.is_empty() {
            writeln!(self.output, "Several categories fit:")?;
            for c in candidates {
                writeln!(self.output, "  * {}", c.canonical_name())?;
            }
        }

        writeln!(self.output, "Available categories:")?;
        for c in request.knowledge.ordered() {
            writeln!(self.output, "  {}. {}", c.order_index, c.display_name)?;
            if !c.known_tokens.is_empty() {
                let known: Vec<&str> = c.known_tokens.iter().map(String::as_str).collect();
                writeln!(self.output, "     Known types: {}", known.join(", "))?;
            }
        }

        loop {
            let answer = match self.ask("Category number, (n)ew, (s)kip or (q)uit: ")? {
                Some(a) => a,
                None => return Ok(Resolution::Abort),
            };
            match answer.to_lowercase().as_str() {
                "s" | "skip" => return Ok(Resolution::Skip),
                "q" | "quit" => return Ok(Resolution::Abort),
                "n" | "new" => {
                    let name = match self.ask("Name of the new category: ")? {
                        Some(n) if !n.is_empty() => n,
                        Some(_) => continue,
                        None => return Ok(Resolution::Abort),
                    };
                    return Ok(Resolution::New { name, token });
                }
                other => match other.parse::<u32>() {
                    Ok(n) if request.knowledge.get(n).is_some() => {
                        return Ok(Resolution::Existing { order_index: n, token });
                    }
                    _ => writeln!(self.output, "Please enter a listed number, n, s or q.")?,
                },
            }
        }
    }
}
