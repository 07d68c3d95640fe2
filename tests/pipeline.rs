use codewarden::analysis::{AnalyzeOptions, Analyzer};
use codewarden::config::WorkspaceConfig;
use codewarden::fix::{FixOptions, Fixer};
use codewarden::indexer::{IndexOptions, Indexer};
use codewarden::search::{BuildOptions, MatchType, SearchEngine, SearchOptions};
use codewarden::status::{StatusAction, StatusAggregator, StatusOptions};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use walkdir::WalkDir;

const GREET: &str = r#"function greet(name: any) {
  console.log("hello " + name);
  if (name == "admin") {
    return true;
  }
  return false;
}
"#;

const FIXED_GREET: &str = r#"function greet(name: unknown) {
  if (name === "admin") {
    return true;
  }
  return false;
}
"#;

fn setup_project() -> (tempfile::TempDir, WorkspaceConfig) {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("src/util")).unwrap();
    fs::write(root.join("src/greet.ts"), GREET).unwrap();
    fs::write(
        root.join("src/util/math.py"),
        "# arithmetic helpers\ndef add(a, b):\n    return a + b\n",
    )
    .unwrap();
    fs::write(root.join("README.md"), "# Demo\n\nGreets people.\n").unwrap();
    let config = WorkspaceConfig::for_project(root);
    (temp, config)
}

fn status(config: &WorkspaceConfig) -> codewarden::status::SystemStatus {
    StatusAggregator::new(config.clone())
        .status(&StatusOptions {
            action: StatusAction::Detailed,
        })
        .unwrap()
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

#[test]
fn end_to_end_index_analyze_fix() {
    let (temp, config) = setup_project();
    let root = temp.path();

    let indexed = Indexer::new(config.clone()).index_project(&IndexOptions::default());
    assert!(indexed.success);
    assert_eq!(indexed.files_indexed, 3);

    let mut analyzer = Analyzer::new(config.clone());
    let analysis = analyzer
        .analyze(&AnalyzeOptions {
            path: Some("src/greet.ts".to_string()),
            ruleset: None,
        })
        .unwrap();
    assert_eq!(analysis.issues_found, 3);
    let mut rules: Vec<_> = analysis.issues.iter().map(|i| i.rule.as_str()).collect();
    rules.sort();
    assert_eq!(rules, vec!["eqeqeq", "no-console", "no-explicit-any"]);

    let fixed = Fixer::new(config.clone())
        .fix_issues(&FixOptions::default())
        .unwrap();
    assert!(fixed.success);
    assert_eq!(fixed.files_fixed, 1);
    assert_eq!(fixed.issues_fixed, 3);
    assert_eq!(read(root, "src/greet.ts"), FIXED_GREET);

    assert_eq!(status(&config).fixes.total_fixes, 3);

    let reanalysis = analyzer
        .analyze(&AnalyzeOptions {
            path: Some("src/greet.ts".to_string()),
            ruleset: None,
        })
        .unwrap();
    assert_eq!(reanalysis.issues_found, 0);
}

#[test]
fn search_build_is_idempotent() {
    let (_temp, config) = setup_project();
    let mut engine = SearchEngine::new(config);

    let first = engine.build_search_index(&BuildOptions::default()).unwrap();
    let second = engine.build_search_index(&BuildOptions::default()).unwrap();
    assert!(first.lines_indexed > 0);
    assert_eq!(first.lines_indexed, second.lines_indexed);
    assert_eq!(first.files_indexed, second.files_indexed);
}

#[test]
fn every_indexed_line_is_found() {
    let (temp, config) = setup_project();
    let mut engine = SearchEngine::new(config);

    for rel in ["src/greet.ts", "src/util/math.py", "README.md"] {
        let content = read(temp.path(), rel);
        for (idx, line) in content.lines().enumerate() {
            let needle = line.trim();
            if needle.is_empty() {
                continue;
            }
            let response = engine
                .search(&SearchOptions {
                    query: needle.to_string(),
                    match_type: MatchType::Exact,
                    max_results: Some(1000),
                    ..Default::default()
                })
                .unwrap();
            assert!(
                response
                    .results
                    .iter()
                    .any(|r| r.file == rel && r.line == idx + 1),
                "{rel}:{} not found for {needle:?}",
                idx + 1
            );
        }
    }
}

#[test]
fn case_folded_search_matches_non_ascii_lines() {
    let (temp, config) = setup_project();
    fs::write(temp.path().join("notes.txt"), "Die Straße ÜBER alles\n").unwrap();
    let mut engine = SearchEngine::new(config);

    let response = engine
        .search(&SearchOptions {
            query: "über alles".to_string(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(response.total_results, 1);
    assert_eq!(response.results[0].file, "notes.txt");
    assert_eq!(response.results[0].line, 1);
}

#[test]
fn analysis_scope_cannot_leave_project() {
    let outer = tempdir().unwrap();
    let root = outer.path().join("project");
    fs::create_dir_all(&root).unwrap();
    fs::create_dir_all(outer.path().join("sibling")).unwrap();
    fs::write(root.join("app.js"), "if (x == y) {}\n").unwrap();
    fs::write(outer.path().join("sibling/victim.js"), "if (a == b) {}\n").unwrap();
    let config = WorkspaceConfig::for_project(&root);

    let outside = Analyzer::new(config.clone()).analyze(&AnalyzeOptions {
        path: Some("../sibling".to_string()),
        ruleset: None,
    });
    assert!(outside.is_err());

    Analyzer::new(config.clone())
        .analyze(&AnalyzeOptions::default())
        .unwrap();
    let fixed = Fixer::new(config)
        .fix_issues(&FixOptions::default())
        .unwrap();
    assert!(fixed.fixes.iter().all(|f| !f.file.contains("..")));
    assert_eq!(read(&root, "app.js"), "if (x === y) {}\n");
    assert_eq!(read(outer.path(), "sibling/victim.js"), "if (a == b) {}\n");
}

#[test]
fn dry_run_changes_nothing() {
    let (temp, config) = setup_project();
    Analyzer::new(config.clone())
        .analyze(&AnalyzeOptions::default())
        .unwrap();

    let before = read(temp.path(), "src/greet.ts");
    let result = Fixer::new(config.clone())
        .fix_issues(&FixOptions {
            issue_ids: None,
            dry_run: true,
        })
        .unwrap();

    assert!(result.dry_run);
    assert_eq!(result.issues_fixed, 3);
    assert_eq!(read(temp.path(), "src/greet.ts"), before);
    assert!(!config.stores.fixes.exists());
    assert!(!status(&config).fixes.store.exists);
}

#[test]
fn one_backup_per_file_per_run() {
    let (temp, config) = setup_project();
    fs::write(
        temp.path().join("src/other.js"),
        "if (a == b) {}\nif (c != d) {}\n",
    )
    .unwrap();
    Analyzer::new(config.clone())
        .analyze(&AnalyzeOptions::default())
        .unwrap();

    let result = Fixer::new(config.clone())
        .fix_issues(&FixOptions::default())
        .unwrap();
    assert_eq!(result.files_fixed, 2);
    assert_eq!(result.issues_fixed, 5);

    let run_dir = config.fix.backup_dir.join(&result.run_id);
    let mut backups: Vec<_> = walk_files(&run_dir)
        .into_iter()
        .map(|p| p.strip_prefix(&run_dir).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    backups.sort();
    assert_eq!(backups, vec!["src/greet.ts", "src/other.js"]);

    assert_eq!(read(&run_dir, "src/greet.ts"), GREET);
    assert_eq!(
        read(&run_dir, "src/other.js"),
        "if (a == b) {}\nif (c != d) {}\n"
    );
    assert_eq!(read(temp.path(), "src/other.js"), "if (a === b) {}\nif (c !== d) {}\n");
}

#[test]
fn status_reflects_completed_operations() {
    let (_temp, config) = setup_project();

    let clean = status(&config);
    assert!(!clean.index.store.exists);
    assert!(!clean.search.store.exists);
    assert!(!clean.analysis.store.exists);
    assert!(!clean.fixes.store.exists);
    assert_eq!(clean.recommendations.len(), 4);

    Indexer::new(config.clone()).index_project(&IndexOptions::default());
    let after_index = status(&config);
    assert!(after_index.index.store.exists);
    assert_eq!(after_index.index.file_count, 3);
    assert!(!after_index.search.store.exists);

    SearchEngine::new(config.clone())
        .build_search_index(&BuildOptions::default())
        .unwrap();
    assert!(status(&config).search.store.exists);

    Analyzer::new(config.clone())
        .analyze(&AnalyzeOptions::default())
        .unwrap();
    let after_analysis = status(&config);
    assert!(after_analysis.analysis.store.exists);
    assert_eq!(after_analysis.analysis.total_issues, 3);
    assert_eq!(after_analysis.analysis.by_severity.high, 1);
    assert!(!after_analysis.fixes.store.exists);
    assert!(after_analysis
        .recommendations
        .iter()
        .any(|r| r.contains("high-severity")));

    Fixer::new(config.clone())
        .fix_issues(&FixOptions::default())
        .unwrap();
    let after_fix = status(&config);
    assert!(after_fix.fixes.store.exists);
    assert!(after_fix.fixes.last_fix_at.is_some());
    assert!(after_fix.recommendations.is_empty());
}

fn walk_files(dir: &Path) -> Vec<std::path::PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}
