// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! docsort: adaptive document sorting
//!
//! Files documents into numbered category folders (`01_Vertrag`,
//! `02_Rechnung`, ...) based on what their filenames say, and learns new
//! filename tokens every time the user settles a doubtful case.

pub mod classify;
pub mod config;
pub mod error;
pub mod feedback;
pub mod folders;
pub mod fsutil;
pub mod history;
pub mod knowledge;
pub mod materialize;
pub mod session;
pub mod signals;

pub use config::AppConfig;
pub use error::{DocsortError, Result};
pub use knowledge::{Category, KnowledgeBase, KnowledgeStore};
pub use session::{OrganizeSession, RunSummary, SessionOptions};
