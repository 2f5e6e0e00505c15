//! Record-level access to an index file.

use crate::error::{ErrorKind, Result};
use crate::geometry::Geometry;
use crate::record::{RECORD_SIZE, Record};
use crate::tree::TreeShape;
use cachemap_device::{Device, Mode};
use exn::ResultExt;
use std::path::Path;

/// An index file opened through a [`Device`], addressed by storage block and
/// slot.
pub struct IndexFile {
    device: Device,
    geometry: Geometry,
    shape: TreeShape,
}
impl IndexFile {
    pub fn open(path: impl AsRef<Path>, geometry: Geometry, mode: Mode) -> Result<Self> {
        let device = Device::open(path, mode).or_raise(|| ErrorKind::Device)?;
        Self::from_device(device, geometry)
    }

    /// Wrap an already-open device. The window size is rounded down to a
    /// whole number of storage blocks so that no block straddles two windows.
    pub fn from_device(device: Device, geometry: Geometry) -> Result<Self> {
        let block_size = geometry.index_block_size();
        if device.size() == 0 || device.size() % block_size != 0 {
            exn::bail!(ErrorKind::InvalidLayout(format!(
                "index size {} is not a positive multiple of the {} byte block size",
                device.size(),
                block_size,
            )));
        }
        let window = device.window_size();
        let device = match window % block_size {
            0 => device,
            excess => device.with_window_size((window - excess).max(block_size)),
        };
        let shape = TreeShape::new(geometry.entries_per_block(), device.size() / block_size);
        Ok(Self { device, geometry, shape })
    }

    pub fn path(&self) -> &Path {
        self.device.path()
    }

    /// Size of the index file in bytes.
    pub fn size(&self) -> u64 {
        self.device.size()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn shape(&self) -> TreeShape {
        self.shape
    }

    pub fn record(&mut self, block: u64, slot: usize) -> Result<Record> {
        let offset = self.geometry.slot_offset(block, slot);
        let bytes = self.device.read(offset, RECORD_SIZE).or_raise(|| ErrorKind::Device)?;
        Ok(Record::decode(bytes))
    }

    pub fn set_record(&mut self, block: u64, slot: usize, record: &Record) -> Result<()> {
        let offset = self.geometry.slot_offset(block, slot);
        self.device.write(offset, &record.encode()).or_raise(|| ErrorKind::Device)
    }

    /// All records of one storage block, in slot order.
    pub fn read_block(&mut self, block: u64) -> Result<Vec<Record>> {
        let offset = self.geometry.slot_offset(block, 0);
        let len = self.shape.entries() * RECORD_SIZE;
        let bytes = self.device.read(offset, len).or_raise(|| ErrorKind::Device)?;
        Ok(bytes.chunks_exact(RECORD_SIZE).map(Record::decode).collect())
    }

    /// Overwrite one storage block; `records` holds one record per slot.
    pub fn write_block(&mut self, block: u64, records: &[Record]) -> Result<()> {
        assert_eq!(records.len(), self.shape.entries(), "a block holds exactly {} records", self.shape.entries());
        let bytes: Vec<u8> = records.iter().flat_map(Record::encode).collect();
        let offset = self.geometry.slot_offset(block, 0);
        self.device.write(offset, &bytes).or_raise(|| ErrorKind::Device)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.device.flush().or_raise(|| ErrorKind::Device)
    }
}
