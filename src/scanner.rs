//! Directory scanning and tree walking.
//!
//! `scan_dir` walks a tree sequentially and fans per-file work out to the
//! worker pool: a 32-byte signature sniff plus an optional rule scan, both
//! aggregated under a single lock. `stream_walk` is the synchronous
//! metadata variant feeding a fallible consumer.

use crate::pool::WorkerPool;
use crate::rules::{RuleMatch, RuleMatcher};
use crate::signatures;
use chrono::Local;
use crossbeam_channel::unbounded;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

/// Bytes sniffed from each file for the signature check.
const PREFIX_LEN: usize = 32;

/// A file whose leading bytes matched a registered signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundItem {
    pub file_path: String,
    pub signature_name: String,
    /// Always 0: scanning matches prefixes only.
    pub offset: u64,
}

/// Aggregated outcome of one `scan_dir` invocation.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub job_id: String,
    pub success: bool,
    pub files_scanned: u64,
    pub matches: Vec<FoundItem>,
    pub rule_matches: Vec<RuleMatch>,
    pub error_message: Option<String>,
}

/// Metadata for one visited filesystem object.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: String,
    pub size: u64,
    pub mode: u32,
    pub modified_time: i64,
    pub is_dir: bool,
}

/// Both finding kinds append under this one lock; a single mutex avoids
/// ordering hazards between the two sequences.
#[derive(Default)]
struct Findings {
    matches: Vec<FoundItem>,
    rule_matches: Vec<RuleMatch>,
}

pub struct Scanner {
    pool: WorkerPool,
    rules: Arc<dyn RuleMatcher>,
}

impl Scanner {
    /// Creates a scanner with a started pool of `worker_count` workers and
    /// the given rule-matching capability.
    pub fn new(worker_count: usize, rules: Arc<dyn RuleMatcher>) -> Self {
        let mut pool = WorkerPool::new(worker_count);
        pool.start();
        Self { pool, rules }
    }

    /// Applies a submission memory gate to the underlying pool.
    pub fn with_memory_limit(mut self, max_memory_mb: u64) -> Self {
        self.pool.set_memory_limit(max_memory_mb);
        self
    }

    /// Stops the scanner and its workers.
    pub fn close(mut self) {
        self.pool.stop();
    }

    /// Walks `root` and submits one task per regular file. Waits for all
    /// submitted tasks before assembling the result. Never raises: a root
    /// that cannot be walked at all is reported through the result.
    pub fn scan_dir(&self, root: &Path) -> ScanResult {
        let job_id = format!("job_{}", Local::now().format("%Y%m%d%H%M%S"));
        let findings = Arc::new(Mutex::new(Findings::default()));
        let (done_tx, done_rx) = unbounded::<()>();
        let mut files_scanned: u64 = 0;

        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.depth() == 0 {
                        // The root itself is unreadable; nothing was walked.
                        return ScanResult {
                            job_id,
                            success: false,
                            files_scanned: 0,
                            matches: Vec::new(),
                            rule_matches: Vec::new(),
                            error_message: Some(e.to_string()),
                        };
                    }
                    log::warn!("error accessing path: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            files_scanned += 1;
            let path = entry.into_path();
            let findings = Arc::clone(&findings);
            let rules = Arc::clone(&self.rules);
            let done = done_tx.clone();

            self.pool.submit(Box::new(move |_cancel| {
                // Dropped on any exit path; scan_dir counts the drops.
                let _done = done;
                process_file(&path, rules.as_ref(), &findings);
                Ok(())
            }));
        }
        drop(done_tx);

        // Unblocks once every task clone of the done channel is gone.
        while done_rx.recv().is_ok() {}

        let mut guard = findings.lock().expect("findings mutex poisoned");
        let findings = std::mem::take(&mut *guard);
        drop(guard);

        ScanResult {
            job_id,
            success: true,
            files_scanned,
            matches: findings.matches,
            rule_matches: findings.rule_matches,
            error_message: None,
        }
    }
}

/// Sniffs and rule-scans one file. Failures are logged and produce no
/// finding; they never poison the scan.
fn process_file(path: &Path, rules: &dyn RuleMatcher, findings: &Mutex<Findings>) {
    let mut prefix = [0u8; PREFIX_LEN];
    let n = match File::open(path).and_then(|mut f| read_prefix(&mut f, &mut prefix)) {
        Ok(n) => n,
        Err(e) => {
            log::warn!("failed to read {} for signature scan: {}", path.display(), e);
            return;
        }
    };

    if let Some(sig) = signatures::match_signature(&prefix[..n]) {
        let mut guard = findings.lock().expect("findings mutex poisoned");
        guard.matches.push(FoundItem {
            file_path: path.display().to_string(),
            signature_name: sig.name.to_string(),
            offset: 0,
        });
    }

    if rules.enabled() {
        match rules.scan_file(path) {
            Ok(matches) if !matches.is_empty() => {
                let mut guard = findings.lock().expect("findings mutex poisoned");
                guard.rule_matches.extend(matches);
            }
            Ok(_) => {}
            Err(e) => log::warn!("rule scan failed for {}: {:#}", path.display(), e),
        }
    }
}

/// Fills `buf` from the start of the file, tolerating short files.
fn read_prefix(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Synchronously emits one `WalkEntry` per visited object (directories
/// included). Access errors are logged and skipped; a consumer failure
/// aborts the walk and is returned.
pub fn stream_walk<F>(root: &Path, mut consumer: F) -> crate::error::Result<()>
where
    F: FnMut(WalkEntry) -> anyhow::Result<()>,
{
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("error accessing path: {}", e);
                continue;
            }
        };
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                log::warn!("failed to stat {}: {}", entry.path().display(), e);
                continue;
            }
        };

        consumer(WalkEntry {
            path: entry.path().display().to_string(),
            size: meta.len(),
            mode: meta.mode(),
            modified_time: meta.mtime(),
            is_dir: entry.file_type().is_dir(),
        })
        .map_err(|e| crate::error::EngineError::WalkAborted(e.to_string()))?;
    }
    Ok(())
}
