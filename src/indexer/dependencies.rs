//! Cross-file dependency references found by line heuristics

use super::DependencyRef;
use crate::scan::Language;
use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    es_import: Regex,
    require: Regex,
    py_from: Regex,
    py_import: Regex,
    rust_use: Regex,
    rust_mod: Regex,
    c_include: Regex,
    java_import: Regex,
    cs_using: Regex,
    go_single: Regex,
    go_block_entry: Regex,
    ruby_require: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        es_import: Regex::new(r#"^\s*(?:import|export)\b.*?\bfrom\s+['"]([^'"]+)['"]|^\s*import\s+['"]([^'"]+)['"]"#)
            .expect("valid regex"),
        require: Regex::new(r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#).expect("valid regex"),
        py_from: Regex::new(r"^\s*from\s+([\w\.]+)\s+import\b").expect("valid regex"),
        py_import: Regex::new(r"^\s*import\s+([\w\.]+(?:\s*,\s*[\w\.]+)*)").expect("valid regex"),
        rust_use: Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([\w:]+)").expect("valid regex"),
        rust_mod: Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+(\w+)\s*;").expect("valid regex"),
        c_include: Regex::new(r#"^\s*#\s*include\s*[<"]([^>"]+)[>"]"#).expect("valid regex"),
        java_import: Regex::new(r"^\s*import\s+(?:static\s+)?([\w\.\*]+)\s*;").expect("valid regex"),
        cs_using: Regex::new(r"^\s*using\s+(?:static\s+)?([\w\.]+)\s*;").expect("valid regex"),
        go_single: Regex::new(r#"^\s*import\s+(?:\w+\s+)?"([^"]+)""#).expect("valid regex"),
        go_block_entry: Regex::new(r#"^\s*(?:\w+\s+)?"([^"]+)"\s*$"#).expect("valid regex"),
        ruby_require: Regex::new(r#"^\s*require(?:_relative)?\s+['"]([^'"]+)['"]"#).expect("valid regex"),
    })
}

/// Extract dependency references from one file
pub fn extract_dependencies(source: &str, language: Language, content: &str) -> Vec<DependencyRef> {
    let p = patterns();
    let mut deps = Vec::new();
    let mut in_go_block = false;

    let mut push = |line: usize, target: &str, kind: &str| {
        deps.push(DependencyRef {
            source: source.to_string(),
            target: target.trim().to_string(),
            kind: kind.to_string(),
            line,
        });
    };

    for (idx, line) in content.lines().enumerate() {
        let number = idx + 1;

        match language {
            Language::JavaScript | Language::TypeScript => {
                if let Some(caps) = p.es_import.captures(line) {
                    if let Some(target) = caps.get(1).or_else(|| caps.get(2)) {
                        push(number, target.as_str(), "import");
                    }
                }
                for caps in p.require.captures_iter(line) {
                    push(number, &caps[1], "require");
                }
            }
            Language::Python => {
                if let Some(caps) = p.py_from.captures(line) {
                    push(number, &caps[1], "import");
                } else if let Some(caps) = p.py_import.captures(line) {
                    for module in caps[1].split(',') {
                        push(number, module, "import");
                    }
                }
            }
            Language::Rust => {
                if let Some(caps) = p.rust_use.captures(line) {
                    push(number, &caps[1], "use");
                } else if let Some(caps) = p.rust_mod.captures(line) {
                    push(number, &caps[1], "module");
                }
            }
            Language::C | Language::Cpp => {
                if let Some(caps) = p.c_include.captures(line) {
                    push(number, &caps[1], "include");
                }
            }
            Language::Java => {
                if let Some(caps) = p.java_import.captures(line) {
                    push(number, &caps[1], "import");
                }
            }
            Language::CSharp => {
                if let Some(caps) = p.cs_using.captures(line) {
                    push(number, &caps[1], "using");
                }
            }
            Language::Go => {
                let trimmed = line.trim();
                if in_go_block {
                    if trimmed.starts_with(')') {
                        in_go_block = false;
                    } else if let Some(caps) = p.go_block_entry.captures(line) {
                        push(number, &caps[1], "import");
                    }
                } else if trimmed.starts_with("import (") {
                    in_go_block = true;
                } else if let Some(caps) = p.go_single.captures(line) {
                    push(number, &caps[1], "import");
                }
            }
            Language::Ruby => {
                if let Some(caps) = p.ruby_require.captures(line) {
                    push(number, &caps[1], "require");
                }
            }
            _ => {}
        }
    }

    deps
}
