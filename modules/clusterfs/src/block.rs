//! Byte container underneath the image: a randomly seekable device plus the
//! cursor-tracking reader and writer views every upper layer goes through.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::rc::Rc;

use clustervfs::FsResult;

pub trait ByteDevice {
    fn size(&self) -> FsResult<u64>;
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> FsResult<()>;
    fn write_at(&self, offset: u64, buf: &[u8]) -> FsResult<()>;
    fn flush(&self) -> FsResult<()>;
}

pub struct FileDevice {
    file: RefCell<File>,
}

impl FileDevice {
    pub fn open(path: impl AsRef<Path>) -> FsResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file: RefCell::new(file) })
    }

    pub fn create(path: impl AsRef<Path>) -> FsResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file: RefCell::new(file) })
    }
}

impl ByteDevice for FileDevice {
    fn size(&self) -> FsResult<u64> {
        Ok(self.file.borrow().metadata()?.len())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> FsResult<()> {
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> FsResult<()> {
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn flush(&self) -> FsResult<()> {
        self.file.borrow_mut().flush()?;
        Ok(())
    }
}

/// Image held in memory. Writes past the end extend the buffer.
#[derive(Default)]
pub struct MemDevice {
    data: RefCell<Vec<u8>>,
}

impl MemDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data: RefCell::new(data) }
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }
}

impl ByteDevice for MemDevice {
    fn size(&self) -> FsResult<u64> {
        Ok(self.data.borrow().len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> FsResult<()> {
        let data = self.data.borrow();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> FsResult<()> {
        let mut data = self.data.borrow_mut();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> FsResult<()> {
        Ok(())
    }
}

pub type SharedDevice = Rc<dyn ByteDevice>;

#[derive(Clone)]
pub struct DiskReader {
    device: SharedDevice,
    offset: u64,
    handled: u64,
    block_size: u64,
}

impl DiskReader {
    pub fn new(device: SharedDevice, offset: u64, block_size: u64) -> Self {
        Self { device, offset, handled: 0, block_size }
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
        self.handled = 0;
    }

    pub fn set_block_size(&mut self, block_size: u64) {
        self.block_size = block_size;
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Read one block at the cursor, clamped to the end of the device.
    pub fn read(&self) -> FsResult<Vec<u8>> {
        let position = self.offset + self.handled;
        let available = self.device.size()?.saturating_sub(position);
        let mut buf = vec![0u8; core::cmp::min(self.block_size, available) as usize];
        self.device.read_at(position, &mut buf)?;
        Ok(buf)
    }

    pub fn read_next(&mut self) -> FsResult<Vec<u8>> {
        let block = self.read()?;
        self.handled += block.len() as u64;
        Ok(block)
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> FsResult<()> {
        self.device.read_at(offset, buf)
    }
}

#[derive(Clone)]
pub struct DiskWriter {
    device: SharedDevice,
    offset: u64,
    handled: u64,
}

impl DiskWriter {
    pub fn new(device: SharedDevice, offset: u64) -> Self {
        Self { device, offset, handled: 0 }
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
        self.handled = 0;
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }

    pub fn write(&self, bytes: &[u8]) -> FsResult<()> {
        self.device.write_at(self.offset + self.handled, bytes)
    }

    pub fn write_next(&mut self, bytes: &[u8]) -> FsResult<()> {
        self.write(bytes)?;
        self.handled += bytes.len() as u64;
        Ok(())
    }

    pub fn write_at(&self, offset: u64, bytes: &[u8]) -> FsResult<()> {
        self.device.write_at(offset, bytes)
    }

    pub fn flush(&self) -> FsResult<()> {
        self.device.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustervfs::FsError;

    #[test]
    fn reader_writer_cursor() {
        let dev: SharedDevice = Rc::new(MemDevice::from_vec(vec![0u8; 8]));
        let mut writer = DiskWriter::new(dev.clone(), 2);
        writer.write_next(&[1, 2]).unwrap();
        writer.write_next(&[3]).unwrap();
        assert_eq!(writer.handled(), 3);

        let mut reader = DiskReader::new(dev, 2, 2);
        assert_eq!(reader.read_next().unwrap(), vec![1, 2]);
        assert_eq!(reader.read_next().unwrap(), vec![3, 0]);
        assert_eq!(reader.handled(), 4);
        reader.set_offset(0);
        assert_eq!(reader.handled(), 0);
        assert_eq!(reader.read().unwrap(), vec![0, 0]);
    }

    #[test]
    fn read_clamps_at_device_end() {
        let dev: SharedDevice = Rc::new(MemDevice::from_vec(vec![7u8; 5]));
        let mut reader = DiskReader::new(dev, 3, 4);
        assert_eq!(reader.read_next().unwrap(), vec![7, 7]);
        assert!(reader.read_next().unwrap().is_empty());
    }

    #[test]
    fn mem_device_bounds() {
        let dev = MemDevice::from_vec(vec![0u8; 4]);
        let mut buf = [0u8; 4];
        assert!(matches!(dev.read_at(1, &mut buf), Err(FsError::Io(_))));
        dev.write_at(6, &[9]).unwrap();
        assert_eq!(dev.size().unwrap(), 7);
        assert_eq!(dev.snapshot()[6], 9);
    }

    #[test]
    fn file_device_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");
        let dev = FileDevice::create(&path).unwrap();
        dev.write_at(3, b"abc").unwrap();
        dev.flush().unwrap();
        assert_eq!(dev.size().unwrap(), 6);
        drop(dev);

        let dev = FileDevice::open(&path).unwrap();
        let mut buf = [0u8; 3];
        dev.read_at(3, &mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }
}
