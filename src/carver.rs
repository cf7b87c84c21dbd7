use crate::signatures::{self, Signature};
use memchr::memmem;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Reports the carve cursor position as the scan advances.
pub type ProgressFn = dyn Fn(u64) + Send + Sync;

const DEFAULT_BLOCK_SIZE: u64 = 4096;
/// Only this many bytes at the start of each block are probed for headers.
const HEADER_PROBE: usize = 32;
/// Window size for the forward footer search.
const FOOTER_WINDOW: usize = 4096;
/// Recovered size when a footer exists but was not found within the cap.
const SALVAGE_CAP: u64 = 5 * 1024 * 1024;
/// Recovered size for footerless formats.
const HEADER_ONLY_CHUNK: u64 = 1024 * 1024;

/// Outcome of a single carve invocation.
#[derive(Debug, Clone)]
pub struct CarveResult {
    pub success: bool,
    pub files_recovered: u64,
    pub error_message: Option<String>,
}

impl CarveResult {
    fn setup_failure(err: impl ToString) -> Self {
        Self {
            success: false,
            files_recovered: 0,
            error_message: Some(err.to_string()),
        }
    }
}

/// Recovers files from a raw image using header and footer signatures,
/// without consulting any filesystem metadata.
pub struct Carver {
    block_size: u64,
}

impl Carver {
    /// Non-positive block sizes fall back to 4096.
    pub fn new(block_size: i64) -> Self {
        let block_size = if block_size <= 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            block_size as u64
        };
        Self { block_size }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Scans `source_path` block by block and writes every recovered
    /// artifact into `output_dir`.
    ///
    /// Headers are only recognized at block starts (the first 32 bytes of
    /// each block); a file whose header sits mid-block is not found.
    /// Setup failures (unreadable source, uncreatable output directory)
    /// are reported through the result, not raised.
    pub fn carve(
        &self,
        source_path: &Path,
        output_dir: &Path,
        progress: Option<&ProgressFn>,
    ) -> CarveResult {
        let mut source = match File::open(source_path) {
            Ok(f) => f,
            Err(e) => return CarveResult::setup_failure(e),
        };

        if let Err(e) = fs::create_dir_all(output_dir) {
            return CarveResult::setup_failure(e);
        }

        let mut buffer = vec![0u8; self.block_size as usize];
        let mut offset: u64 = 0;
        let mut recovered: u64 = 0;

        loop {
            let n = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    log::warn!("read error at offset {}: {}", offset, e);
                    break;
                }
            };

            let probe = &buffer[..n.min(HEADER_PROBE)];
            if let Some(sig) = signatures::match_signature(probe) {
                log::info!("found {} header at offset {}", sig.name, offset);

                let size_to_recover = if sig.has_footer() {
                    match self.scan_footer(&mut source, offset, sig) {
                        Some(size) => size,
                        // Footer lost within the cap: salvage a bounded
                        // chunk rather than writing junk to the limit.
                        None => SALVAGE_CAP.min(sig.max_file_size),
                    }
                } else {
                    HEADER_ONLY_CHUNK
                };

                let artifact_name =
                    format!("{}_{}.recovered", offset, sig.name.replace('/', "_"));
                let artifact_path = output_dir.join(artifact_name);

                match self.save_chunk(&mut source, offset, &artifact_path, size_to_recover) {
                    Ok(()) => recovered += 1,
                    Err(e) => {
                        log::warn!("failed to save {}: {}", artifact_path.display(), e)
                    }
                }

                // Skip past the recovered range, rounded up to the next
                // block boundary so the following read cannot re-trigger
                // on bytes inside the artifact.
                let next = align_up(offset + size_to_recover, self.block_size);
                if source.seek(SeekFrom::Start(next)).is_err() {
                    break;
                }
                offset = next;
                if let Some(cb) = progress {
                    cb(offset);
                }
                continue;
            }

            offset += n as u64;
            if let Some(cb) = progress {
                cb(offset);
            }
        }

        CarveResult {
            success: true,
            files_recovered: recovered,
            error_message: None,
        }
    }

    /// Searches forward from `start_offset` for the signature's footer, in
    /// 4 KiB windows, never reading past `max_file_size` bytes from the
    /// header. Returns the recoverable size (footer included) on a hit.
    ///
    /// A footer straddling two windows is not detected; those carves fall
    /// back to the salvage cap.
    fn scan_footer(&self, source: &mut File, start_offset: u64, sig: &Signature) -> Option<u64> {
        let original = source.stream_position().ok()?;
        let found = scan_footer_from(source, start_offset, sig);
        let _ = source.seek(SeekFrom::Start(original));
        found
    }

    /// Copies `size` bytes starting at `start_offset` into `out_path`,
    /// restoring the source cursor afterwards. A short copy at EOF is not
    /// an error.
    fn save_chunk(
        &self,
        source: &mut File,
        start_offset: u64,
        out_path: &Path,
        size: u64,
    ) -> io::Result<()> {
        let original = source.stream_position()?;
        source.seek(SeekFrom::Start(start_offset))?;

        let copied = File::create(out_path)
            .and_then(|mut out| io::copy(&mut source.by_ref().take(size), &mut out));

        source.seek(SeekFrom::Start(original))?;
        copied.map(|_| ())
    }
}

impl Default for Carver {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE as i64)
    }
}

fn scan_footer_from(source: &mut File, start_offset: u64, sig: &Signature) -> Option<u64> {
    if source.seek(SeekFrom::Start(start_offset)).is_err() {
        return None;
    }

    let finder = memmem::Finder::new(sig.footer);
    let mut window = [0u8; FOOTER_WINDOW];
    let mut scanned: u64 = 0;

    while scanned < sig.max_file_size {
        let want = FOOTER_WINDOW.min((sig.max_file_size - scanned) as usize);
        let n = match source.read(&mut window[..want]) {
            Ok(0) => return None,
            Ok(n) => n,
            Err(_) => return None,
        };

        if let Some(idx) = finder.find(&window[..n]) {
            return Some(scanned + idx as u64 + sig.footer.len() as u64);
        }
        scanned += n as u64;
    }

    None
}

fn align_up(value: u64, alignment: u64) -> u64 {
    let remainder = value % alignment;
    if remainder == 0 {
        value
    } else {
        value + (alignment - remainder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_fallback() {
        assert_eq!(Carver::new(0).block_size(), 4096);
        assert_eq!(Carver::new(-5).block_size(), 4096);
        assert_eq!(Carver::new(8192).block_size(), 8192);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4096), 0);
        assert_eq!(align_up(1, 4096), 4096);
        assert_eq!(align_up(4096, 4096), 4096);
        assert_eq!(align_up(4097, 4096), 8192);
        assert_eq!(align_up(514, 4096), 4096);
    }

    #[test]
    fn test_artifact_name_sanitization() {
        // "ZIP/Jar/Docx" must not produce nested artifact paths.
        let name = format!("{}_{}.recovered", 4096, "ZIP/Jar/Docx".replace('/', "_"));
        assert_eq!(name, "4096_ZIP_Jar_Docx.recovered");
    }
}
