//! Windowed memory-mapped access to files and block devices.
//!
//! A [`Device`] addresses a byte range far larger than anything it is willing
//! to map at once. It keeps at most one [`memmap2`] window of `window_size`
//! bytes alive and transparently replaces it whenever an access falls outside
//! of it, so sequential scans over multi-terabyte devices stay within a
//! bounded address-space footprint.
//!
//! Windows always start at a multiple of the window size. A single access must
//! therefore fit inside one aligned window: callers read in block-sized,
//! block-aligned pieces and pick a window size that is a multiple of their
//! block size. Violating this (or reading past the end of the device) is a
//! programming error and panics.

pub mod error;

use crate::error::{ErrorKind, Result};
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Default window size: 128 MiB.
pub const DEFAULT_WINDOW_SIZE: u64 = 128 * 1024 * 1024;

/// How a [`Device`] is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    ReadOnly,
    ReadWrite,
}

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

/// The single active mapping of a [`Device`].
struct Window {
    offset: u64,
    mapping: Mapping,
}
impl Window {
    fn len(&self) -> u64 {
        match &self.mapping {
            Mapping::ReadOnly(m) => m.len() as u64,
            Mapping::ReadWrite(m) => m.len() as u64,
        }
    }

    fn contains(&self, offset: u64, len: usize) -> bool {
        offset >= self.offset && offset + len as u64 <= self.offset + self.len()
    }

    fn bytes(&self) -> &[u8] {
        match &self.mapping {
            Mapping::ReadOnly(m) => &m[..],
            Mapping::ReadWrite(m) => &m[..],
        }
    }

    fn flush(&self) -> std::io::Result<()> {
        match &self.mapping {
            Mapping::ReadOnly(_) => Ok(()),
            Mapping::ReadWrite(m) => m.flush(),
        }
    }
}

/// A regular file or block device of fixed size, accessed through one
/// memory-mapped window at a time.
///
/// # Examples
///
/// ```no_run
/// use cachemap_device::{Device, Mode};
///
/// # fn example() -> cachemap_device::error::Result<()> {
/// let mut origin = Device::open("/dev/mapper/origin", Mode::ReadOnly)?;
/// let first_block = origin.read(0, 8192)?;
/// assert_eq!(first_block.len(), 8192);
/// # Ok(())
/// # }
/// ```
pub struct Device {
    path: PathBuf,
    file: File,
    mode: Mode,
    size: u64,
    window_size: u64,
    window: Option<Window>,
}
impl Device {
    /// Open an existing file or block device.
    pub fn open(path: impl AsRef<Path>, mode: Mode) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(mode == Mode::ReadWrite)
            .open(path)
            .map_err(|e| ErrorKind::from_io(e, path))?;
        Self::from_file(file, path, mode)
    }

    /// Create a new file of exactly `size` bytes (zero-filled) and open it
    /// read-write. Never overwrites: fails with
    /// [`AlreadyExists`](ErrorKind::AlreadyExists) if `path` exists.
    pub fn create(path: impl AsRef<Path>, size: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| ErrorKind::from_io(e, path))?;
        file.set_len(size).map_err(|e| ErrorKind::from_io(e, path))?;
        Self::from_file(file, path, Mode::ReadWrite)
    }

    /// Wrap a file that is already open. `path` is only used for error
    /// reporting and logging.
    pub fn from_file(mut file: File, path: impl Into<PathBuf>, mode: Mode) -> Result<Self> {
        let path = path.into();
        // Block devices report a metadata length of zero; seeking to the end
        // works for both them and regular files.
        let size = file.seek(SeekFrom::End(0)).map_err(|e| ErrorKind::from_io(e, &path))?;
        tracing::debug!(path = %path.display(), size, ?mode, "Opened device");
        Ok(Self {
            path,
            file,
            mode,
            size,
            window_size: DEFAULT_WINDOW_SIZE,
            window: None,
        })
    }

    /// Replace the window size. Releases the current window.
    #[must_use]
    pub fn with_window_size(mut self, window_size: u64) -> Self {
        assert!(window_size > 0, "window size must be non-zero");
        self.window = None;
        self.window_size = window_size;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the device in bytes, fixed at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// Byte range covered by the currently mapped window, if any.
    #[cfg(test)]
    fn mapped_range(&self) -> Option<Range<u64>> {
        self.window.as_ref().map(|w| w.offset..w.offset + w.len())
    }

    /// Borrow `len` bytes starting at `offset`.
    ///
    /// # Panics
    ///
    /// If the range extends past the end of the device, or does not fit
    /// inside a single window-aligned window.
    pub fn read(&mut self, offset: u64, len: usize) -> Result<&[u8]> {
        if len == 0 {
            self.check_bounds(offset, len);
            return Ok(&[]);
        }
        let window = self.window_for(offset, len)?;
        let start = (offset - window.offset) as usize;
        Ok(&window.bytes()[start..start + len])
    }

    /// Copy `data` into the device starting at `offset`.
    ///
    /// # Panics
    ///
    /// Under the same conditions as [`read`](Self::read).
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if self.mode != Mode::ReadWrite {
            exn::bail!(ErrorKind::ReadOnly(self.path.clone()));
        }
        if data.is_empty() {
            self.check_bounds(offset, 0);
            return Ok(());
        }
        let window = self.window_for(offset, data.len())?;
        let start = (offset - window.offset) as usize;
        match &mut window.mapping {
            Mapping::ReadWrite(m) => m[start..start + data.len()].copy_from_slice(data),
            Mapping::ReadOnly(_) => unreachable!("read-write device mapped a read-only window"),
        }
        Ok(())
    }

    /// Flush the active window and sync the file to stable storage.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(window) = &self.window {
            window.flush().map_err(|e| ErrorKind::from_io(e, &self.path))?;
        }
        if self.mode == Mode::ReadWrite {
            self.file.sync_all().map_err(|e| ErrorKind::from_io(e, &self.path))?;
        }
        Ok(())
    }

    fn check_bounds(&self, offset: u64, len: usize) {
        assert!(
            offset.checked_add(len as u64).is_some_and(|end| end <= self.size),
            "access {offset}+{len} out of range for {} ({} bytes)",
            self.path.display(),
            self.size,
        );
    }

    fn window_for(&mut self, offset: u64, len: usize) -> Result<&mut Window> {
        self.check_bounds(offset, len);
        let window = match self.window.take() {
            Some(current) if current.contains(offset, len) => current,
            previous => {
                // Unmapping a shared mapping keeps its writes; syncing is left
                // to `flush`.
                drop(previous);
                self.map_window(offset, len)?
            },
        };
        Ok(self.window.insert(window))
    }

    fn map_window(&self, offset: u64, len: usize) -> Result<Window> {
        let start = offset - offset % self.window_size;
        let length = self.window_size.min(self.size - start);
        assert!(
            offset + len as u64 <= start + length,
            "access {offset}+{len} does not fit in a {} byte window",
            self.window_size,
        );
        tracing::trace!(path = %self.path.display(), start, length, "Mapping window");
        let mut options = MmapOptions::new();
        options.offset(start).len(length as usize);
        // SAFETY: the file stays open for as long as the mapping exists (both
        // are owned by `self`). Concurrent modification of the underlying
        // device by another process is outside of what this tool guards against.
        let mapping = match self.mode {
            Mode::ReadOnly => {
                let mmap = unsafe { options.map(&self.file) }.map_err(|e| ErrorKind::from_io(e, &self.path))?;
                #[cfg(unix)]
                if let Err(err) = mmap.advise(memmap2::Advice::Sequential) {
                    tracing::debug!(%err, "Ignoring failed madvise");
                }
                Mapping::ReadOnly(mmap)
            },
            Mode::ReadWrite => {
                let mmap = unsafe { options.map_mut(&self.file) }.map_err(|e| ErrorKind::from_io(e, &self.path))?;
                Mapping::ReadWrite(mmap)
            },
        };
        Ok(Window { offset: start, mapping })
    }
}
impl Drop for Device {
    fn drop(&mut self) {
        if let Some(window) = self.window.take()
            && let Err(err) = window.flush()
        {
            tracing::warn!(path = %self.path.display(), %err, "Failed to flush window on drop");
        }
    }
}
