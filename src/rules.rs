//! Pluggable content-rule matching.
//!
//! The scanner only sees the `RuleMatcher` capability; whether a compiled
//! rule set is behind it or rules are disabled entirely is invisible to it.
//!
//! A rule bundle is plain text, one rule per line:
//!
//! ```text
//! # comment
//! exfil-marker: BEGIN[ _-]SECRET
//! web-shell [php,backdoor]: eval\s*\(\s*base64_decode
//! ```

use crate::error::{EngineError, Result};
use regex::bytes::{Regex, RegexSet, RegexSetBuilder};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Upper bound on the compiled pattern set size.
const RULE_SET_SIZE_LIMIT: usize = 50 * 1024 * 1024;

/// Only this much of a file is scanned for rule matches.
const MAX_SCAN_BYTES: u64 = 8 * 1024 * 1024;

/// One rule firing on one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub file_path: String,
    pub rule_name: String,
    pub tags: Vec<String>,
}

/// Capability the scanner holds: scan a file, report whether active.
pub trait RuleMatcher: Send + Sync {
    fn scan_file(&self, path: &Path) -> anyhow::Result<Vec<RuleMatch>>;
    fn enabled(&self) -> bool;
}

/// Inactive variant: no matches, reports disabled.
pub struct DisabledRules;

impl RuleMatcher for DisabledRules {
    fn scan_file(&self, _path: &Path) -> anyhow::Result<Vec<RuleMatch>> {
        Ok(Vec::new())
    }

    fn enabled(&self) -> bool {
        false
    }
}

#[derive(Debug)]
struct CompiledRule {
    name: String,
    tags: Vec<String>,
}

/// Active variant: every bundle pattern compiled into one byte regex set.
#[derive(Debug)]
pub struct RuleSet {
    set: RegexSet,
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<Self> {
        let mut patterns = Vec::new();
        let mut rules = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (head, pattern) = line.split_once(':').ok_or_else(|| {
                EngineError::InvalidRule {
                    line: line_no,
                    reason: "expected `name [tags]: pattern`".to_string(),
                }
            })?;
            let pattern = pattern.trim();
            if pattern.is_empty() {
                return Err(EngineError::InvalidRule {
                    line: line_no,
                    reason: "empty pattern".to_string(),
                });
            }

            let head = head.trim();
            let (name, tags) = match head.split_once('[') {
                Some((name, rest)) => {
                    let tag_list =
                        rest.strip_suffix(']')
                            .ok_or_else(|| EngineError::InvalidRule {
                                line: line_no,
                                reason: "unterminated tag list".to_string(),
                            })?;
                    let tags: Vec<String> = tag_list
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect();
                    (name.trim(), tags)
                }
                None => (head, Vec::new()),
            };
            if name.is_empty() {
                return Err(EngineError::InvalidRule {
                    line: line_no,
                    reason: "missing rule name".to_string(),
                });
            }

            // Compile individually first so a bad pattern reports its line.
            Regex::new(pattern).map_err(|e| EngineError::InvalidRule {
                line: line_no,
                reason: e.to_string(),
            })?;

            patterns.push(pattern.to_string());
            rules.push(CompiledRule {
                name: name.to_string(),
                tags,
            });
        }

        let set = RegexSetBuilder::new(&patterns)
            .size_limit(RULE_SET_SIZE_LIMIT)
            .build()
            .map_err(|e| EngineError::InvalidRule {
                line: 0,
                reason: e.to_string(),
            })?;

        Ok(Self { set, rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleMatcher for RuleSet {
    /// Scans the first 8 MiB of the file; one match per firing rule.
    fn scan_file(&self, path: &Path) -> anyhow::Result<Vec<RuleMatch>> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.by_ref().take(MAX_SCAN_BYTES).read_to_end(&mut data)?;

        let matches = self
            .set
            .matches(&data)
            .iter()
            .map(|idx| {
                let rule = &self.rules[idx];
                RuleMatch {
                    file_path: path.display().to_string(),
                    rule_name: rule.name.clone(),
                    tags: rule.tags.clone(),
                }
            })
            .collect();
        Ok(matches)
    }

    fn enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_rule() {
        let set = RuleSet::parse("marker: BEGIN").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.rules[0].name, "marker");
        assert!(set.rules[0].tags.is_empty());
    }

    #[test]
    fn test_parse_tagged_rule() {
        let set = RuleSet::parse("web-shell [php, backdoor]: eval").unwrap();
        assert_eq!(set.rules[0].name, "web-shell");
        assert_eq!(set.rules[0].tags, vec!["php", "backdoor"]);
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let set = RuleSet::parse("# header\n\nmarker: BEGIN\n").unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_parse_reports_line_numbers() {
        let err = RuleSet::parse("ok: fine\nbroken line\n").unwrap_err();
        match err {
            EngineError::InvalidRule { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_regex() {
        let err = RuleSet::parse("bad: [unclosed").unwrap_err();
        match err {
            EngineError::InvalidRule { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_disabled_rules_are_inert() {
        let rules = DisabledRules;
        assert!(!rules.enabled());
        let matches = rules.scan_file(Path::new("/does/not/exist")).unwrap();
        assert!(matches.is_empty());
    }
}
