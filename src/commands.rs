//! One function per subcommand.

use crate::cli::{CheckArgs, CollectArgs, FindArgs, SortArgs};
use crate::error::{ErrorKind, Result};
use cachemap_config::Config;
use cachemap_device::{Device, Mode};
use cachemap_index::{Geometry, Index, IndexFile, Progress, SortedIndex};
use cachemap_matcher::Matcher;
use exn::ResultExt;
use std::io::Write;
use std::path::Path;

fn geometry(config: &Config) -> Result<Geometry> {
    Geometry::new(config.block_size, config.index_block_size).or_raise(|| ErrorKind::Config)
}

fn open_device(path: &Path, mode: Mode, config: &Config) -> Result<Device> {
    Device::open(path, mode)
        .map(|device| device.with_window_size(config.window_size))
        .or_raise(|| ErrorKind::Device)
}

fn open_index(path: &Path, mode: Mode, config: &Config) -> Result<IndexFile> {
    let device = open_device(path, mode, config)?;
    IndexFile::from_device(device, geometry(config)?).or_raise(|| ErrorKind::Index)
}

pub fn collect(args: &CollectArgs, config: &Config, progress: &mut Progress) -> Result<()> {
    let mut origin = open_device(&args.origin, Mode::ReadOnly, config)?;
    let summary =
        cachemap_index::collect(&mut origin, &args.index, &geometry(config)?, progress).or_raise(|| ErrorKind::Index)?;
    tracing::info!(records = summary.records, index_blocks = summary.index_blocks, "Collected");
    Ok(())
}

pub fn sort(args: &SortArgs, config: &Config, progress: &mut Progress) -> Result<()> {
    let mut index = open_index(&args.index, Mode::ReadWrite, config)?;
    let summary = cachemap_index::sort(&mut index, progress).or_raise(|| ErrorKind::Index)?;
    tracing::info!(blocks = summary.blocks, writes = summary.writes, "Sorted");
    Ok(())
}

pub fn find(args: &FindArgs, config: &Config, progress: &mut Progress, out: &mut dyn Write) -> Result<()> {
    let file = open_index(&args.index, Mode::ReadOnly, config)?;
    let index = Index::open(file, config.memory_limit, progress).or_raise(|| ErrorKind::Index)?;
    let mut cache = open_device(&args.cache, Mode::ReadOnly, config)?;
    let mut matcher =
        Matcher::new(index, geometry(config)?, config.cache_block_size()).or_raise(|| ErrorKind::Config)?;
    let summary = matcher
        .run(&mut cache, progress, |result| {
            writeln!(out, "{result}")?;
            out.flush()
        })
        .or_raise(|| ErrorKind::Matcher)?;
    tracing::info!(
        cache_blocks = summary.cache_blocks,
        matched = summary.matched,
        fake_matches = summary.fake_matches,
        "Find complete"
    );
    Ok(())
}

pub fn check(args: &CheckArgs, config: &Config, progress: &mut Progress, out: &mut dyn Write) -> Result<()> {
    let file = open_index(&args.index, Mode::ReadOnly, config)?;
    let report = SortedIndex::from(file).verify(progress).or_raise(|| ErrorKind::Index)?;
    writeln!(
        out,
        "blocks: {}\nrecords: {}\nsentinels: {}\nsorted: {}",
        report.blocks,
        report.records,
        report.sentinels,
        if report.sorted { "yes" } else { "no" },
    )
    .or_raise(|| ErrorKind::Output)
}
