//! Directory scanning and walk streaming integration tests.

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use vestige::rules::{DisabledRules, RuleSet};
use vestige::scanner::{stream_walk, Scanner};

const JPEG_PREFIX: [u8; 10] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
const PDF_PREFIX: &[u8] = b"%PDF-1.7\n";

fn scanner() -> Scanner {
    Scanner::new(4, Arc::new(DisabledRules))
}

#[test]
fn test_scan_finds_jpeg() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("test.jpg"), JPEG_PREFIX).unwrap();

    let scanner = scanner();
    let result = scanner.scan_dir(tmp.path());
    scanner.close();

    assert!(result.success);
    assert_eq!(result.files_scanned, 1);
    assert_eq!(result.matches.len(), 1);
    let item = &result.matches[0];
    assert_eq!(item.signature_name, "JPEG");
    assert_eq!(item.offset, 0);
    assert!(item.file_path.ends_with("test.jpg"));
    assert!(result.rule_matches.is_empty());
}

#[test]
fn test_scan_mixed_tree() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("images")).unwrap();
    fs::create_dir(tmp.path().join("docs")).unwrap();
    fs::write(tmp.path().join("images/photo.jpg"), JPEG_PREFIX).unwrap();
    fs::write(tmp.path().join("docs/report.pdf"), PDF_PREFIX).unwrap();
    fs::write(tmp.path().join("notes.txt"), b"just some text").unwrap();

    let scanner = scanner();
    let result = scanner.scan_dir(tmp.path());
    scanner.close();

    assert!(result.success);
    assert_eq!(result.files_scanned, 3);

    // Completion order is nondeterministic; compare as a set.
    let found: BTreeSet<String> = result
        .matches
        .iter()
        .map(|m| m.signature_name.clone())
        .collect();
    let expected: BTreeSet<String> = ["JPEG", "PDF"].iter().map(|s| s.to_string()).collect();
    assert_eq!(found, expected);
}

#[test]
fn test_scan_empty_dir() {
    let tmp = TempDir::new().unwrap();

    let scanner = scanner();
    let result = scanner.scan_dir(tmp.path());
    scanner.close();

    assert!(result.success);
    assert_eq!(result.files_scanned, 0);
    assert!(result.matches.is_empty());
    assert!(result.job_id.starts_with("job_"));
}

#[test]
fn test_scan_nonexistent_root() {
    let tmp = TempDir::new().unwrap();

    let scanner = scanner();
    let result = scanner.scan_dir(&tmp.path().join("missing"));
    scanner.close();

    assert!(!result.success);
    assert_eq!(result.files_scanned, 0);
    assert!(result.error_message.is_some());
}

#[test]
fn test_short_files_are_tolerated() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("tiny"), [0xFFu8]).unwrap();
    fs::write(tmp.path().join("empty"), b"").unwrap();

    let scanner = scanner();
    let result = scanner.scan_dir(tmp.path());
    scanner.close();

    assert!(result.success);
    assert_eq!(result.files_scanned, 2);
    assert!(result.matches.is_empty());
}

#[test]
fn test_rule_matches_are_aggregated() {
    let tmp = TempDir::new().unwrap();
    let bundle = tmp.path().join("rules.txt");
    fs::write(
        &bundle,
        "# test bundle\nexfil-marker [test]: SECRET_TOKEN\n",
    )
    .unwrap();

    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("clean.txt"), b"nothing interesting").unwrap();
    fs::write(root.join("leaky.txt"), b"prefix SECRET_TOKEN suffix").unwrap();

    let rules = Arc::new(RuleSet::from_file(&bundle).unwrap());
    let scanner = Scanner::new(4, rules);
    let result = scanner.scan_dir(&root);
    scanner.close();

    assert!(result.success);
    assert_eq!(result.rule_matches.len(), 1);
    let m = &result.rule_matches[0];
    assert_eq!(m.rule_name, "exfil-marker");
    assert_eq!(m.tags, vec!["test"]);
    assert!(m.file_path.ends_with("leaky.txt"));
}

#[test]
fn test_signature_and_rule_match_same_file() {
    let tmp = TempDir::new().unwrap();
    let bundle = tmp.path().join("rules.txt");
    fs::write(&bundle, "jfif-app0: JFIF\n").unwrap();

    let root = tmp.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("photo.jpg"), JPEG_PREFIX).unwrap();

    let rules = Arc::new(RuleSet::from_file(&bundle).unwrap());
    let scanner = Scanner::new(2, rules);
    let result = scanner.scan_dir(&root);
    scanner.close();

    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.rule_matches.len(), 1);
}

#[test]
fn test_disabled_rules_produce_nothing() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("leaky.txt"), b"SECRET_TOKEN").unwrap();

    let scanner = scanner();
    let result = scanner.scan_dir(tmp.path());
    scanner.close();

    assert!(result.rule_matches.is_empty());
}

#[test]
fn test_walk_covers_scanned_files() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("sub")).unwrap();
    fs::write(tmp.path().join("a.jpg"), JPEG_PREFIX).unwrap();
    fs::write(tmp.path().join("sub/b.txt"), b"text").unwrap();

    let mut walked_files = BTreeSet::new();
    let mut walked_dirs = 0u64;
    stream_walk(tmp.path(), |entry| {
        if entry.is_dir {
            walked_dirs += 1;
        } else {
            walked_files.insert(entry.path.clone());
        }
        Ok(())
    })
    .unwrap();

    let scanner = scanner();
    let result = scanner.scan_dir(tmp.path());
    scanner.close();

    // Every file the scanner considered was also visited by the walk,
    // which additionally reports directories.
    assert_eq!(walked_files.len() as u64, result.files_scanned);
    assert_eq!(walked_dirs, 2); // the root and "sub"
}

#[test]
fn test_walk_entry_metadata() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("data.bin"), vec![0u8; 1234]).unwrap();

    let mut sizes = Vec::new();
    stream_walk(tmp.path(), |entry| {
        if !entry.is_dir {
            sizes.push(entry.size);
            assert!(entry.modified_time > 0);
            assert_ne!(entry.mode, 0);
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(sizes, vec![1234]);
}

#[test]
fn test_walk_consumer_failure_aborts() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a"), b"1").unwrap();
    fs::write(tmp.path().join("b"), b"2").unwrap();

    let mut seen = 0;
    let outcome = stream_walk(tmp.path(), |_entry| {
        seen += 1;
        anyhow::bail!("consumer refused entry")
    });

    assert!(outcome.is_err());
    assert_eq!(seen, 1);
}
