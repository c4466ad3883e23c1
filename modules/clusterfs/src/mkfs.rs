//! One-time image initializer.

use std::path::Path;
use std::rc::Rc;

use clustervfs::{FsResult, FAT_ENTRY_SIZE, FAT_OFFSET};
use log::{debug, info};

use crate::block::{DiskWriter, FileDevice, SharedDevice};
use crate::fat::FatEntry;
use crate::layout::{write_signature, Settings};

const FILL_BLOCK: usize = 64 * 1024;

pub fn make_image(path: impl AsRef<Path>, settings: Settings, allow_large: bool) -> FsResult<()> {
    settings.validate(allow_large)?;
    let path = path.as_ref();
    let device: SharedDevice = Rc::new(FileDevice::create(path)?);
    format(device, settings, allow_large)?;
    info!("created image {} ({settings})", path.display());
    Ok(())
}

/// Writes a zeroed image with signature, settings and an all-free table.
pub fn format(device: SharedDevice, settings: Settings, allow_large: bool) -> FsResult<()> {
    settings.validate(allow_large)?;

    let mut writer = DiskWriter::new(device.clone(), 0);
    let zeros = vec![0u8; FILL_BLOCK];
    let mut remaining = settings.image_size;
    while remaining > 0 {
        let chunk = core::cmp::min(remaining, FILL_BLOCK as u64) as usize;
        writer.write_next(&zeros[..chunk])?;
        remaining -= chunk as u64;
    }

    write_signature(device.as_ref())?;
    settings.write_to(device.as_ref())?;

    let entries = settings.entries_count();
    let per_block = (FILL_BLOCK as u64 / FAT_ENTRY_SIZE).max(1);
    let free = FatEntry::FREE.to_bytes();
    writer.set_offset(FAT_OFFSET);
    let mut written = 0;
    while written < entries {
        let count = core::cmp::min(per_block, entries - written);
        let block: Vec<u8> = (0..count).flat_map(|_| free).collect();
        writer.write_next(&block)?;
        written += count;
    }
    writer.flush()?;
    debug!("formatted image: {settings}, {entries} clusters");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ByteDevice, MemDevice};
    use crate::layout::check_signature;
    use clustervfs::FsError;

    #[test]
    fn format_writes_header_and_free_table() {
        let dev = Rc::new(MemDevice::new());
        format(dev.clone(), Settings::new(1024, 64), false).unwrap();
        let data = dev.snapshot();
        assert_eq!(data.len(), 1024);
        check_signature(dev.as_ref()).unwrap();
        assert_eq!(Settings::read_from(dev.as_ref()).unwrap(), Settings::new(1024, 64));
        for index in 0..13usize {
            let at = 32 + index * 9;
            assert_eq!(data[at], 0xFF);
        }
        assert!(data[149..].iter().all(|&b| b == 0));
    }

    #[test]
    fn invalid_settings_write_nothing() {
        let dev = Rc::new(MemDevice::new());
        let err = format(dev.clone(), Settings::new(1024, 2), false).unwrap_err();
        assert!(matches!(err, FsError::InvalidSettings(_)));
        assert_eq!(dev.size().unwrap(), 0);
    }

    #[test]
    fn make_image_on_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        make_image(&path, Settings::new(4096, 128), false).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
        assert!(make_image(dir.path().join("bad.img"), Settings::new(8, 8), false).is_err());
        assert!(!dir.path().join("bad.img").exists());
    }
}
