//! Building a fresh, unsorted index from an origin device.

use crate::error::{ErrorKind, Result};
use crate::file::IndexFile;
use crate::geometry::Geometry;
use crate::hash::hash_block;
use crate::progress::Progress;
use crate::record::Record;
use cachemap_device::{Device, Mode};
use exn::ResultExt;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::instrument;

/// What [`collect`] wrote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildSummary {
    /// Bytes of origin device scanned.
    pub bytes: u64,
    /// Real records written, one per fine block.
    pub records: u64,
    /// Storage blocks in the new index file.
    pub index_blocks: u64,
}

/// Hash every fine block of `origin` into a new index file at `path`.
///
/// Records are written in scan order (unsorted). The file is assembled under a
/// temporary name next to `path` and only appears at `path` once every record
/// has been flushed, so an interrupted build never leaves a partial index
/// behind. Fails with [`AlreadyExists`](ErrorKind::AlreadyExists) without
/// reading the origin if `path` exists.
#[instrument(skip(origin, progress), fields(origin = %origin.path().display(), size = origin.size()))]
pub fn collect(origin: &mut Device, path: &Path, geometry: &Geometry, progress: &mut Progress) -> Result<BuildSummary> {
    if path.try_exists().or_raise(|| ErrorKind::Io)? {
        exn::bail!(ErrorKind::AlreadyExists(path.to_path_buf()));
    }
    let block_size = geometry.block_size();
    if origin.window_size() % block_size != 0 {
        exn::bail!(ErrorKind::InvalidLayout(format!(
            "window size {} is not a multiple of the {} byte block size",
            origin.window_size(),
            block_size,
        )));
    }

    let size = origin.size();
    let records = geometry.record_count(size);
    let index_size = geometry.index_size(size);
    let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".cachemap-")
        .suffix(".partial")
        .tempfile_in(directory)
        .or_raise(|| ErrorKind::Io)?;
    staging.as_file().set_len(index_size).or_raise(|| ErrorKind::Io)?;
    let file = staging.reopen().or_raise(|| ErrorKind::Io)?;
    let device = Device::from_file(file, staging.path(), Mode::ReadWrite).or_raise(|| ErrorKind::Device)?;
    let mut index = IndexFile::from_device(device, *geometry)?;
    tracing::info!(records, index_size, staging = %staging.path().display(), "Building index");

    progress.start(size, "bytes");
    for n in 0..records {
        let offset = n * block_size;
        // The final block may be short; it is hashed over what is there.
        let len = block_size.min(size - offset) as usize;
        let digest = hash_block(origin.read(offset, len).or_raise(|| ErrorKind::Device)?);
        let (block, slot) = geometry.flat_position(n);
        index.set_record(block, slot, &Record::new(digest, offset))?;
        progress.set(offset + len as u64);
    }
    progress.finish();

    let summary = BuildSummary { bytes: size, records, index_blocks: index.shape().blocks() };
    index.flush()?;
    drop(index);
    persist(staging, path)?;
    tracing::info!(path = %path.display(), records, "Index written");
    Ok(summary)
}

/// Move a finished staging file to `path`, never replacing an existing file.
fn persist(staging: NamedTempFile, path: &Path) -> Result<()> {
    let Err(err) = staging.persist_noclobber(path) else {
        return Ok(());
    };
    let kind = match err.error.kind() {
        std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists(path.to_path_buf()),
        _ => ErrorKind::Io,
    };
    Err(err.error).or_raise(|| kind)
}
