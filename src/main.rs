//! `cachemap`: recover cache-to-origin block mappings from device content.
//!
//! ```bash
//! cachemap collect origin.idx /dev/mapper/origin
//! cachemap sort origin.idx
//! cachemap find origin.idx /dev/mapper/cache > mapping.txt
//! ```

mod cli;
mod commands;
mod error;

use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use cachemap_config::Config;
use cachemap_index::Progress;
use clap::Parser;
use exn::ResultExt;
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(&cli, &mut std::io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

/// Log to stderr; `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run(cli: &Cli, out: &mut dyn Write) -> Result<()> {
    let config = Config::load(cli.config.as_deref(), &cli.command.overrides()).or_raise(|| ErrorKind::Config)?;
    let mut progress = if cli.quiet { Progress::hidden() } else { Progress::stderr() };
    match &cli.command {
        Command::Collect(args) => commands::collect(args, &config, &mut progress),
        Command::Sort(args) => commands::sort(args, &config, &mut progress),
        Command::Find(args) => commands::find(args, &config, &mut progress, out),
        Command::Check(args) => commands::check(args, &config, &mut progress, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const BLOCK: usize = 8192;

    fn block(n: u8) -> Vec<u8> {
        (0..BLOCK).map(|i| (i as u8).wrapping_mul(n | 1) ^ n).collect()
    }

    fn cli(dir: &Path, args: &[&str]) -> Cli {
        let config = dir.join("cachemap.toml");
        if !config.exists() {
            std::fs::write(&config, "").unwrap();
        }
        let config = config.to_str().unwrap().to_string();
        let argv = ["cachemap", "--quiet", "--config", config.as_str()].into_iter().chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap()
    }

    fn run_to_string(cli: &Cli) -> String {
        let mut out = Vec::new();
        run(cli, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_collect_sort_find_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name).to_str().unwrap().to_string();
        let origin: Vec<u8> = (0..16).flat_map(block).collect();
        std::fs::write(path("origin"), &origin).unwrap();
        // Cache block 0 is origin unit 2, cache block 1 is unseen content.
        let mut cache = origin[8 * BLOCK..12 * BLOCK].to_vec();
        cache.extend(vec![0xA5; 4 * BLOCK]);
        std::fs::write(path("cache"), &cache).unwrap();

        run_to_string(&cli(dir.path(), &["collect", path("origin.idx").as_str(), path("origin").as_str()]));
        run_to_string(&cli(dir.path(), &["sort", path("origin.idx").as_str()]));
        let report = run_to_string(&cli(dir.path(), &["check", path("origin.idx").as_str()]));
        assert_eq!(report, "blocks: 1\nrecords: 16\nsentinels: 276\nsorted: yes\n");

        // 64 sectors: four 8 KiB fine blocks per cache block.
        let output = run_to_string(&cli(
            dir.path(),
            &["find", path("origin.idx").as_str(), path("cache").as_str(), "-s", "64", "--memory-limit", "0"],
        ));
        assert_eq!(output, "0 -> 2 (100.00% match)\n# no match found for cache block 1\n");
    }

    #[test]
    fn test_collect_refuses_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        let origin = dir.path().join("origin");
        let index = dir.path().join("origin.idx");
        std::fs::write(&origin, block(1)).unwrap();
        std::fs::write(&index, b"keep").unwrap();
        let cli = cli(dir.path(), &["collect", index.to_str().unwrap(), origin.to_str().unwrap()]);
        let err = run(&cli, &mut Vec::new()).unwrap_err();
        assert_eq!(*err, ErrorKind::Index);
        assert_eq!(std::fs::read(&index).unwrap(), b"keep");
    }

    #[test]
    fn test_invalid_cache_block_size() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(dir.path(), &["find", "origin.idx", "cache", "-s", "3"]);
        let err = run(&cli, &mut Vec::new()).unwrap_err();
        assert_eq!(*err, ErrorKind::Config);
    }
}
