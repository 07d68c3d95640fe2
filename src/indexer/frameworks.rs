//! Framework detection from package manifests

use super::FrameworkHit;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Known package names and the framework they indicate
const KNOWN_PACKAGES: &[(&str, &str)] = &[
    ("react", "React"),
    ("vue", "Vue"),
    ("@angular/core", "Angular"),
    ("svelte", "Svelte"),
    ("next", "Next.js"),
    ("nuxt", "Nuxt"),
    ("express", "Express"),
    ("fastify", "Fastify"),
    ("@nestjs/core", "NestJS"),
    ("jest", "Jest"),
    ("vitest", "Vitest"),
    ("django", "Django"),
    ("flask", "Flask"),
    ("fastapi", "FastAPI"),
    ("pytest", "pytest"),
    ("tokio", "Tokio"),
    ("axum", "Axum"),
    ("actix-web", "Actix Web"),
    ("rocket", "Rocket"),
    ("github.com/gin-gonic/gin", "Gin"),
    ("github.com/labstack/echo", "Echo"),
    ("rails", "Rails"),
    ("spring-boot", "Spring Boot"),
];

fn lookup(package: &str) -> Option<&'static str> {
    let package = package.trim().to_lowercase();
    KNOWN_PACKAGES
        .iter()
        .find(|(name, _)| package == *name || package.starts_with(&format!("{}/", name)))
        .map(|(_, framework)| *framework)
}

/// Detect frameworks from a manifest file, given its project-relative path
pub fn detect_in_manifest(relative: &str, content: &str) -> Vec<FrameworkHit> {
    let file_name = Path::new(relative)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let packages: Vec<String> = match file_name {
        "package.json" => package_json_names(content),
        "Cargo.toml" => cargo_names(content),
        "requirements.txt" => requirement_names(content),
        "pyproject.toml" => pyproject_names(content),
        "go.mod" => go_mod_names(content),
        "Gemfile" => gemfile_names(content),
        "pom.xml" | "build.gradle" | "build.gradle.kts" => {
            if content.contains("spring-boot") {
                vec!["spring-boot".to_string()]
            } else {
                Vec::new()
            }
        }
        _ => return Vec::new(),
    };

    let mut hits: BTreeMap<&str, FrameworkHit> = BTreeMap::new();
    for package in &packages {
        if let Some(framework) = lookup(package) {
            hits.entry(framework).or_insert_with(|| FrameworkHit {
                name: framework.to_string(),
                evidence: format!("{} in {}", package, relative),
            });
        }
    }

    debug!(manifest = relative, found = hits.len(), "Scanned manifest");
    hits.into_values().collect()
}

/// Whether a path names a manifest this module understands
pub fn is_manifest(relative: &str) -> bool {
    matches!(
        Path::new(relative).file_name().and_then(|n| n.to_str()),
        Some(
            "package.json"
                | "Cargo.toml"
                | "requirements.txt"
                | "pyproject.toml"
                | "go.mod"
                | "Gemfile"
                | "pom.xml"
                | "build.gradle"
                | "build.gradle.kts"
        )
    )
}

fn package_json_names(content: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(content) else {
        return Vec::new();
    };

    ["dependencies", "devDependencies", "peerDependencies"]
        .iter()
        .filter_map(|section| value.get(section).and_then(|s| s.as_object()))
        .flat_map(|deps| deps.keys().cloned())
        .collect()
}

fn cargo_names(content: &str) -> Vec<String> {
    let Ok(value) = content.parse::<toml::Table>() else {
        return Vec::new();
    };

    let mut names = Vec::new();
    for section in ["dependencies", "dev-dependencies"] {
        if let Some(table) = value.get(section).and_then(|s| s.as_table()) {
            names.extend(table.keys().cloned());
        }
    }
    if let Some(table) = value
        .get("workspace")
        .and_then(|w| w.get("dependencies"))
        .and_then(|d| d.as_table())
    {
        names.extend(table.keys().cloned());
    }
    names
}

fn requirement_names(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
        .map(|line| {
            line.split(|c: char| "=<>~![; ".contains(c))
                .next()
                .unwrap_or(line)
                .to_string()
        })
        .collect()
}

fn pyproject_names(content: &str) -> Vec<String> {
    let Ok(value) = content.parse::<toml::Table>() else {
        return Vec::new();
    };

    let mut names = Vec::new();
    if let Some(deps) = value
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array())
    {
        for dep in deps.iter().filter_map(|d| d.as_str()) {
            names.extend(requirement_names(dep));
        }
    }
    if let Some(table) = value
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_table())
    {
        names.extend(table.keys().cloned());
    }
    names
}

fn go_mod_names(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .map(|line| line.trim_start_matches("require").trim())
        .filter_map(|line| line.split_whitespace().next())
        .filter(|module| module.contains('.'))
        .map(str::to_string)
        .collect()
}

fn gemfile_names(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("gem "))
        .filter_map(|rest| {
            rest.trim()
                .trim_start_matches(['\'', '"'])
                .split(['\'', '"'])
                .next()
                .map(str::to_string)
        })
        .collect()
}
