//! CLI interface using clap
//!
//! Each subcommand maps onto `ToolRequest`s, except `config` which works on
//! the config file directly.

mod commands;

pub use commands::*;

use crate::analysis::AnalyzeOptions;
use crate::fix::FixOptions;
use crate::indexer::IndexOptions;
use crate::search::{MatchType, SearchOptions};
use crate::status::{StatusAction, StatusOptions};
use crate::tools::ToolRequest;
use clap::{Parser, Subcommand};

/// CodeWarden - local code indexing, search, analysis and fixing
#[derive(Parser, Debug)]
#[command(name = "codewarden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the project (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    pub path: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index project files, folders and frameworks
    Index(IndexArgs),

    /// Show the indexed project structure
    Structure,

    /// Search the contents of indexed files
    Grep(GrepArgs),

    /// Search the line index
    Search(SearchArgs),

    /// Show recent search queries
    History(HistoryArgs),

    /// Analyze source files for issues
    Analyze(AnalyzeArgs),

    /// Apply automatic fixes for analyzed issues
    Fix(FixArgs),

    /// Show fix history
    Fixes(HistoryArgs),

    /// Show the state of every store
    Status(StatusArgs),

    /// Show or reset configuration
    Config(ConfigArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for index command
#[derive(Parser, Debug)]
pub struct IndexArgs {
    /// Glob pattern of files to index (repeatable)
    #[arg(short, long = "include")]
    pub include: Vec<String>,

    /// Glob pattern of files to skip (repeatable)
    #[arg(short, long = "exclude")]
    pub exclude: Vec<String>,

    /// Maximum number of files
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Maximum file size in bytes
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Store a keyword signature per file
    #[arg(long)]
    pub vectors: bool,

    /// Record import and include references
    #[arg(long)]
    pub dependencies: bool,

    /// Read files sequentially
    #[arg(long)]
    pub sequential: bool,
}

/// Arguments for grep command
#[derive(Parser, Debug)]
pub struct GrepArgs {
    /// Text to look for
    pub term: String,
}

/// Arguments for search command
#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Query text
    pub query: String,

    /// Match type (exact, semantic, structural)
    #[arg(short = 't', long = "type", default_value = "exact")]
    pub match_type: MatchType,

    /// Only files whose path contains this text
    #[arg(short, long)]
    pub file: Option<String>,

    /// Only files of this language
    #[arg(short, long)]
    pub language: Option<String>,

    /// Maximum number of results
    #[arg(short = 'n', long)]
    pub max_results: Option<usize>,

    /// Match case exactly
    #[arg(short, long)]
    pub case_sensitive: bool,

    /// Rebuild the line index before searching
    #[arg(long)]
    pub rebuild: bool,
}

/// Arguments for history and fixes commands
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Number of entries to show
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

/// Arguments for analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// File or directory, relative to the project root
    pub target: Option<String>,

    /// Rule set name, echoed in the result
    #[arg(short, long)]
    pub ruleset: Option<String>,
}

/// Arguments for fix command
#[derive(Parser, Debug)]
pub struct FixArgs {
    /// Issue ID to fix (repeatable; all issues when omitted)
    #[arg(short, long = "issue")]
    pub issue: Vec<String>,

    /// Show the changes without writing them
    #[arg(short, long)]
    pub dry_run: bool,
}

/// Arguments for status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Include recommendations
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Reset to defaults
    #[arg(long)]
    pub reset: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Commands {
    /// Requests this command issues, in order; `None` for `config`
    pub fn requests(&self) -> Option<Vec<ToolRequest>> {
        let requests = match self {
            Commands::Index(args) => vec![ToolRequest::Index(IndexOptions {
                include_patterns: non_empty(&args.include),
                exclude_patterns: non_empty(&args.exclude),
                max_file_size: args.max_file_size,
                max_files: args.max_files,
                max_depth: None,
                enable_vectors: args.vectors,
                analyze_dependencies: args.dependencies,
                parallel: args.sequential.then_some(false),
            })],
            Commands::Structure => vec![ToolRequest::Structure],
            Commands::Grep(args) => vec![ToolRequest::SearchProject {
                term: args.term.clone(),
            }],
            Commands::Search(args) => {
                let search = ToolRequest::Search(SearchOptions {
                    query: args.query.clone(),
                    match_type: args.match_type,
                    file_filter: args.file.clone(),
                    language: args.language.clone(),
                    max_results: args.max_results,
                    case_sensitive: args.case_sensitive,
                    file_types: None,
                });
                if args.rebuild {
                    vec![ToolRequest::BuildSearchIndex(Default::default()), search]
                } else {
                    vec![search]
                }
            }
            Commands::History(args) => vec![ToolRequest::QueryHistory { limit: args.limit }],
            Commands::Analyze(args) => vec![ToolRequest::Analyze(AnalyzeOptions {
                path: args.target.clone(),
                ruleset: args.ruleset.clone(),
            })],
            Commands::Fix(args) => vec![ToolRequest::Fix(FixOptions {
                issue_ids: non_empty(&args.issue),
                dry_run: args.dry_run,
            })],
            Commands::Fixes(args) => vec![ToolRequest::FixHistory { limit: args.limit }],
            Commands::Status(args) => vec![ToolRequest::Status(StatusOptions {
                action: if args.detailed {
                    StatusAction::Detailed
                } else {
                    StatusAction::Status
                },
            })],
            Commands::Config(_) => return None,
        };
        Some(requests)
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}
