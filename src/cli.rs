//! Command-line definition. Sizes are given in 512 byte sectors.

use cachemap_config::{Overrides, SECTOR_SIZE};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More logging; repeat for more detail (overridden by RUST_LOG)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Don't print progress
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an index file from an origin device
    Collect(CollectArgs),
    /// Sort an index file in place so it can be searched on disk
    Sort(SortArgs),
    /// Guess which origin block each cache block is a copy of
    Find(FindArgs),
    /// Check an index file and report on its contents
    Check(CheckArgs),
}

#[derive(Args, Debug, Default)]
pub struct GeometryArgs {
    /// Size of fine blocks in sectors (16 = 8 KiB)
    #[arg(long)]
    pub block_size: Option<u64>,

    /// Size of index storage blocks in sectors (16 = 8 KiB)
    #[arg(long)]
    pub index_block_size: Option<u64>,
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Where to create the index file; must not exist
    pub index: PathBuf,

    /// Origin device or file
    pub origin: PathBuf,

    #[command(flatten)]
    pub geometry: GeometryArgs,
}

#[derive(Args, Debug)]
pub struct SortArgs {
    /// Index file to sort
    pub index: PathBuf,

    #[command(flatten)]
    pub geometry: GeometryArgs,
}

#[derive(Args, Debug)]
pub struct FindArgs {
    /// Index file of the origin device
    pub index: PathBuf,

    /// Cache device or file
    pub cache: PathBuf,

    /// Size of cache blocks in sectors (512 = 256 KiB)
    #[arg(short = 's', long)]
    pub cache_block_size: Option<u64>,

    /// Load indexes up to this many bytes into memory instead of searching on disk
    #[arg(long)]
    pub memory_limit: Option<u64>,

    #[command(flatten)]
    pub geometry: GeometryArgs,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Index file to check
    pub index: PathBuf,

    #[command(flatten)]
    pub geometry: GeometryArgs,
}

impl Command {
    /// Command-line values as the top configuration layer, in bytes.
    pub fn overrides(&self) -> Overrides {
        let geometry = match self {
            Self::Collect(args) => &args.geometry,
            Self::Sort(args) => &args.geometry,
            Self::Find(args) => &args.geometry,
            Self::Check(args) => &args.geometry,
        };
        let mut overrides = Overrides {
            block_size: geometry.block_size.map(|sectors| sectors.saturating_mul(SECTOR_SIZE)),
            index_block_size: geometry.index_block_size.map(|sectors| sectors.saturating_mul(SECTOR_SIZE)),
            ..Overrides::default()
        };
        if let Self::Find(args) = self {
            overrides.cache_block_sectors = args.cache_block_size;
            overrides.memory_limit = args.memory_limit;
        }
        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&["cachemap", "collect", "o.idx", "/dev/sda"], Overrides::default())]
    #[case(
        &["cachemap", "collect", "o.idx", "/dev/sda", "--block-size", "8"],
        Overrides { block_size: Some(4096), ..Overrides::default() }
    )]
    #[case(
        &["cachemap", "sort", "o.idx", "--index-block-size", "32"],
        Overrides { index_block_size: Some(16384), ..Overrides::default() }
    )]
    #[case(
        &["cachemap", "find", "o.idx", "/dev/sdb", "-s", "64", "--memory-limit", "1000"],
        Overrides { cache_block_sectors: Some(64), memory_limit: Some(1000), ..Overrides::default() }
    )]
    fn test_overrides(#[case] argv: &[&str], #[case] expected: Overrides) {
        let cli = Cli::try_parse_from(argv.iter().copied()).unwrap();
        assert_eq!(cli.command.overrides(), expected);
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["cachemap", "check", "o.idx", "-vv", "--quiet", "--config", "c.toml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(cli.command, Command::Check(_)));
    }

    #[test]
    fn test_find_requires_cache() {
        assert!(Cli::try_parse_from(["cachemap", "find", "o.idx"]).is_err());
    }
}
