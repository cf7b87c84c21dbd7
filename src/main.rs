use anyhow::{Context, Result};
use clap::Parser;
use humansize::{format_size, BINARY};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use vestige::cli::{Cli, Commands, ProgressReporter};
use vestige::rules::{DisabledRules, RuleMatcher, RuleSet};
use vestige::scanner::{stream_walk, Scanner};
use vestige::signatures::SIGNATURES;
use vestige::{calculate_hashes, Carver};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Scan {
            source,
            scan_type,
            rules,
            workers,
            max_memory,
        } => {
            run_scan(&source, &scan_type, rules.as_deref(), workers, max_memory)?;
        }
        Commands::Carve {
            source,
            output,
            block_size,
        } => {
            run_carve(&source, &output, block_size)?;
        }
        Commands::Hash { file, algorithms } => {
            run_hash(&file, &algorithms)?;
        }
        Commands::Walk { root } => {
            run_walk(&root)?;
        }
        Commands::Ping => {
            let pong = vestige::ping();
            println!("{} {}", pong.status, pong.timestamp);
        }
        Commands::ListSignatures => {
            list_signatures();
        }
    }
    Ok(())
}

fn run_scan(
    source: &Path,
    scan_type: &str,
    rule_bundle: Option<&Path>,
    workers: usize,
    max_memory: u64,
) -> Result<()> {
    log::info!(
        "scan request for {} [type: {}]",
        source.display(),
        scan_type
    );

    let rules: Arc<dyn RuleMatcher> = match rule_bundle {
        Some(path) => {
            let set = RuleSet::from_file(path)
                .with_context(|| format!("failed to load rule bundle {}", path.display()))?;
            println!("Loaded {} rules from {}", set.len(), path.display());
            Arc::new(set)
        }
        None => Arc::new(DisabledRules),
    };

    let scanner = Scanner::new(workers, rules).with_memory_limit(max_memory);
    let result = scanner.scan_dir(source);
    scanner.close();

    if !result.success {
        println!(
            "Scan failed: {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
        return Ok(());
    }

    println!("\nScan {} complete", result.job_id);
    println!("  Files scanned:  {}", result.files_scanned);
    println!("  Matches:        {}", result.matches.len());
    println!("  Rule matches:   {}", result.rule_matches.len());

    for item in &result.matches {
        println!("  [{}] {}", item.signature_name, item.file_path);
    }
    for m in &result.rule_matches {
        let tags = if m.tags.is_empty() {
            String::new()
        } else {
            format!(" ({})", m.tags.join(", "))
        };
        println!("  [rule {}{}] {}", m.rule_name, tags, m.file_path);
    }
    Ok(())
}

fn run_carve(source: &Path, output: &Path, block_size: i64) -> Result<()> {
    let source_len = fs::metadata(source).map(|m| m.len()).unwrap_or(0);
    println!(
        "Carving {} ({}) into {}",
        source.display(),
        format_size(source_len, BINARY),
        output.display()
    );

    let progress = ProgressReporter::for_carve(source_len);
    let callback = progress.carve_callback();

    let carver = Carver::new(block_size);
    let result = carver.carve(source, output, Some(callback.as_ref()));
    progress.finish("Carve complete");

    if result.success {
        println!("Recovered {} file(s)", result.files_recovered);
    } else {
        println!(
            "Carve failed: {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn run_hash(file: &Path, algorithms: &[String]) -> Result<()> {
    let result = calculate_hashes(file, algorithms)
        .with_context(|| format!("failed to hash {}", file.display()))?;

    let mut entries: Vec<_> = result.hashes.iter().collect();
    entries.sort();
    for (algo, hexdigest) in entries {
        println!("{:8} {}", algo, hexdigest);
    }
    Ok(())
}

fn run_walk(root: &Path) -> Result<()> {
    stream_walk(root, |entry| {
        let marker = if entry.is_dir { "d" } else { "-" };
        println!(
            "{} {:o} {:>12} {:>12} {}",
            marker, entry.mode, entry.size, entry.modified_time, entry.path
        );
        Ok(())
    })?;
    Ok(())
}

fn list_signatures() {
    println!("\nRegistered file signatures\n");
    for sig in SIGNATURES {
        println!("  {}", sig.name);
        println!("    Header: {}", sig.header_hex());
        if sig.has_footer() {
            let footer_hex: Vec<String> = sig.footer.iter().map(|b| format!("{:02X}", b)).collect();
            println!("    Footer: {}", footer_hex.join(" "));
            println!("    Max:    {}", format_size(sig.max_file_size, BINARY));
        }
        println!();
    }
}
