//! Language detection from file names

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages recognised by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Rust,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Shell,
    Markdown,
    Json,
    Yaml,
    Toml,
    Html,
    Css,
    Sql,
    Text,
    Unknown,
}

/// How comments are written, which decides how lines are classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `//` line comments and `/* */` blocks
    Slash,
    /// `#` line comments
    Hash,
    /// `--` line comments
    DoubleDash,
    /// No comment syntax
    None,
}

impl Language {
    /// Detect language from a path's extension or well-known file name
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        match name {
            "Makefile" | "Dockerfile" => return Language::Shell,
            "Cargo.lock" => return Language::Toml,
            _ => {}
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Detect language from a file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "py" | "pyi" => Language::Python,
            "rs" => Language::Rust,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "cs" => Language::CSharp,
            "rb" | "rake" => Language::Ruby,
            "php" => Language::Php,
            "sh" | "bash" | "zsh" => Language::Shell,
            "md" | "mdx" | "markdown" => Language::Markdown,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "html" | "htm" => Language::Html,
            "css" | "scss" | "less" => Language::Css,
            "sql" => Language::Sql,
            "txt" | "rst" => Language::Text,
            _ => Language::Unknown,
        }
    }

    /// Parse a stored language name back into a language
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "javascript" | "js" => Language::JavaScript,
            "typescript" | "ts" => Language::TypeScript,
            "python" | "py" => Language::Python,
            "rust" | "rs" => Language::Rust,
            "go" | "golang" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            "csharp" | "c#" | "cs" => Language::CSharp,
            "ruby" | "rb" => Language::Ruby,
            "php" => Language::Php,
            "shell" | "bash" | "sh" => Language::Shell,
            "markdown" | "md" => Language::Markdown,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "html" => Language::Html,
            "css" => Language::Css,
            "sql" => Language::Sql,
            "text" | "txt" => Language::Text,
            _ => Language::Unknown,
        }
    }

    /// File extensions associated with this language
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::TypeScript => &["ts", "tsx", "mts", "cts"],
            Language::Python => &["py", "pyi"],
            Language::Rust => &["rs"],
            Language::Go => &["go"],
            Language::Java => &["java"],
            Language::C => &["c", "h"],
            Language::Cpp => &["cpp", "cc", "cxx", "hpp", "hxx", "hh"],
            Language::CSharp => &["cs"],
            Language::Ruby => &["rb", "rake"],
            Language::Php => &["php"],
            Language::Shell => &["sh", "bash", "zsh"],
            Language::Markdown => &["md", "mdx", "markdown"],
            Language::Json => &["json"],
            Language::Yaml => &["yaml", "yml"],
            Language::Toml => &["toml"],
            Language::Html => &["html", "htm"],
            Language::Css => &["css", "scss", "less"],
            Language::Sql => &["sql"],
            Language::Text => &["txt", "rst"],
            Language::Unknown => &[],
        }
    }

    pub fn comment_style(&self) -> CommentStyle {
        match self {
            Language::JavaScript
            | Language::TypeScript
            | Language::Rust
            | Language::Go
            | Language::Java
            | Language::C
            | Language::Cpp
            | Language::CSharp
            | Language::Php
            | Language::Css => CommentStyle::Slash,
            Language::Python
            | Language::Ruby
            | Language::Shell
            | Language::Yaml
            | Language::Toml => CommentStyle::Hash,
            Language::Sql => CommentStyle::DoubleDash,
            _ => CommentStyle::None,
        }
    }

    /// Whether this is source code rather than data or prose
    pub fn is_source(&self) -> bool {
        !matches!(
            self,
            Language::Markdown
                | Language::Json
                | Language::Yaml
                | Language::Toml
                | Language::Text
                | Language::Unknown
        )
    }

    /// JavaScript and TypeScript share loose-equality and console semantics
    pub fn is_script(&self) -> bool {
        matches!(self, Language::JavaScript | Language::TypeScript)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Shell => "shell",
            Language::Markdown => "markdown",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Html => "html",
            Language::Css => "css",
            Language::Sql => "sql",
            Language::Text => "text",
            Language::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}
