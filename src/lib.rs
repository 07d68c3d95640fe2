//! CodeWarden - local code intelligence pipeline
//!
//! Indexes a project tree, answers line searches, detects issues with a fixed
//! rule catalogue, applies the fixable ones with backups, and reports the
//! state of its four stores.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod fix;
pub mod indexer;
pub mod scan;
pub mod search;
pub mod status;
pub mod storage;
pub mod tools;

/// Re-export commonly used types
pub use analysis::{AnalysisIssue, Analyzer};
pub use config::WorkspaceConfig;
pub use fix::Fixer;
pub use indexer::Indexer;
pub use search::SearchEngine;
pub use status::StatusAggregator;
pub use tools::{ToolRequest, ToolResponse, Toolkit};

/// Application-wide error type
pub use anyhow::Result;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "codewarden";
