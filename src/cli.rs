use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "vestige")]
#[command(version = "0.1.0")]
#[command(about = "Forensic signature scanning, file carving and hashing", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a directory tree for signature and rule matches
    Scan {
        /// Root directory to scan
        source: PathBuf,

        /// Free-form scan label, echoed into the logs
        #[arg(long, default_value = "full")]
        scan_type: String,

        /// Rule bundle to match file contents against
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Worker threads for per-file processing
        #[arg(short, long, default_value = "20")]
        workers: usize,

        /// Stall task submission above this process RSS in MB (0 = off)
        #[arg(long, default_value = "0")]
        max_memory: u64,
    },

    /// Carve recoverable files out of a raw image
    Carve {
        /// Raw image or device dump to carve
        source: PathBuf,

        #[arg(short, long, default_value = "./recovered")]
        output: PathBuf,

        #[arg(short, long, default_value = "4096")]
        block_size: i64,
    },

    /// Compute file digests in a single streaming pass
    Hash {
        file: PathBuf,

        /// Comma-separated algorithm names (sha256, md5)
        #[arg(short, long, value_delimiter = ',')]
        algorithms: Vec<String>,
    },

    /// Stream metadata for every object under a root
    Walk {
        root: PathBuf,
    },

    /// Liveness check
    Ping,

    /// Print the signature registry
    ListSignatures,
}

pub struct ProgressReporter {
    bar: Arc<ProgressBar>,
}

impl ProgressReporter {
    pub fn for_carve(total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .unwrap()
                .progress_chars("#>-"),
        );
        bar.set_message("Carving raw image...".to_string());
        Self { bar: Arc::new(bar) }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Callback suitable for `Carver::carve`'s progress hook.
    pub fn carve_callback(&self) -> Box<dyn Fn(u64) + Send + Sync> {
        let bar = Arc::clone(&self.bar);
        Box::new(move |offset: u64| {
            bar.set_position(offset);
        })
    }
}
