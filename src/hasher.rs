//! Multi-algorithm streaming digests.

use crate::error::Result;
use digest::DynDigest;
use md5::Md5;
use sha2::Sha256;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Buffer size for streaming file reads (64 KiB).
const BUF_SIZE: usize = 64 * 1024;

/// Digests for one file, keyed by algorithm name, lowercase hex values.
#[derive(Debug, Clone)]
pub struct HashResult {
    pub file_path: String,
    pub hashes: HashMap<String, String>,
}

/// Computes the requested digests over a single read pass.
///
/// Recognized algorithm names are `md5` and `sha256` (lowercase). Unknown
/// names are skipped; an empty request defaults to SHA-256. If nothing
/// requested is recognized the result carries an empty map. Only the open
/// and read failures are errors.
pub fn calculate_hashes(file_path: &Path, algorithms: &[String]) -> Result<HashResult> {
    let mut file = File::open(file_path)?;

    let requested: Vec<&str> = if algorithms.is_empty() {
        vec!["sha256"]
    } else {
        algorithms.iter().map(String::as_str).collect()
    };

    let mut digests: Vec<(&'static str, Box<dyn DynDigest>)> = Vec::new();
    for algo in requested {
        if digests.iter().any(|(name, _)| *name == algo) {
            continue;
        }
        match algo {
            "md5" => digests.push(("md5", Box::new(Md5::default()))),
            "sha256" => digests.push(("sha256", Box::new(Sha256::default()))),
            other => log::debug!("ignoring unknown hash algorithm {:?}", other),
        }
    }

    let mut hashes = HashMap::new();
    if digests.is_empty() {
        return Ok(HashResult {
            file_path: file_path.display().to_string(),
            hashes,
        });
    }

    // One pass over the file, fanned out to every accumulator.
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for (_, digest) in digests.iter_mut() {
            digest.update(&buf[..n]);
        }
    }

    for (name, digest) in digests {
        hashes.insert(name.to_string(), hex::encode(digest.finalize()));
    }

    Ok(HashResult {
        file_path: file_path.display().to_string(),
        hashes,
    })
}
