use core::fmt;

use clustervfs::{
    FsError, FsResult, FAT_ENTRY_SIZE, FAT_OFFSET, LARGE_IMAGE_THRESHOLD, MIN_CLUSTER_SIZE,
    MIN_IMAGE_SIZE, SETTINGS_OFFSET, SETTINGS_SIZE, SIGNATURE, SIGNATURE_SIZE,
};

use crate::block::ByteDevice;
use crate::codec::{decode_u64, encode_u64, U64_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub image_size: u64,
    pub cluster_size: u64,
}

impl Settings {
    pub const fn new(image_size: u64, cluster_size: u64) -> Self {
        Self { image_size, cluster_size }
    }

    /// Rejects geometries that cannot hold a table plus at least one cluster.
    pub fn validate(&self, allow_large: bool) -> FsResult<()> {
        if self.image_size < MIN_IMAGE_SIZE {
            return Err(FsError::InvalidSettings(format!(
                "image size must be at least {MIN_IMAGE_SIZE} bytes"
            )));
        }
        if self.cluster_size < MIN_CLUSTER_SIZE {
            return Err(FsError::InvalidSettings(format!(
                "cluster size must be at least {MIN_CLUSTER_SIZE} bytes"
            )));
        }
        if self.image_size < self.cluster_size
            || self.image_size - self.cluster_size < MIN_IMAGE_SIZE
        {
            return Err(FsError::InvalidSettings(
                "cluster size leaves no room for the image header".into(),
            ));
        }
        if !allow_large && self.image_size > LARGE_IMAGE_THRESHOLD {
            return Err(FsError::InvalidSettings(
                "images above 16 GiB need allow_large".into(),
            ));
        }
        Ok(())
    }

    pub fn entries_count(&self) -> u64 {
        self.image_size.saturating_sub(FAT_OFFSET) / (FAT_ENTRY_SIZE + self.cluster_size)
    }

    /// Absolute offset of cluster 0.
    pub fn clusters_start(&self) -> u64 {
        FAT_OFFSET + self.entries_count() * FAT_ENTRY_SIZE
    }

    pub fn cluster_offset(&self, cluster: u64) -> u64 {
        self.clusters_start() + cluster * self.cluster_size
    }

    pub fn to_bytes(&self) -> [u8; SETTINGS_SIZE as usize] {
        let mut buf = [0u8; SETTINGS_SIZE as usize];
        buf[..U64_SIZE].copy_from_slice(&encode_u64(self.image_size));
        buf[U64_SIZE..].copy_from_slice(&encode_u64(self.cluster_size));
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> FsResult<Self> {
        Ok(Self {
            image_size: decode_u64(bytes)?,
            cluster_size: decode_u64(&bytes[U64_SIZE.min(bytes.len())..])?,
        })
    }

    pub fn write_to(&self, device: &dyn ByteDevice) -> FsResult<()> {
        device.write_at(SETTINGS_OFFSET, &self.to_bytes())
    }

    pub fn read_from(device: &dyn ByteDevice) -> FsResult<Self> {
        let mut buf = [0u8; SETTINGS_SIZE as usize];
        device.read_at(SETTINGS_OFFSET, &mut buf)?;
        Self::from_bytes(&buf)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "image size: {}b, cluster size: {}b",
            self.image_size, self.cluster_size
        )
    }
}

pub fn write_signature(device: &dyn ByteDevice) -> FsResult<()> {
    device.write_at(0, SIGNATURE)
}

pub fn check_signature(device: &dyn ByteDevice) -> FsResult<()> {
    if device.size()? < SIGNATURE_SIZE as u64 {
        return Err(FsError::NotAFileSystem);
    }
    let mut buf = [0u8; SIGNATURE_SIZE];
    device.read_at(0, &mut buf)?;
    if &buf != SIGNATURE {
        return Err(FsError::NotAFileSystem);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDevice;

    #[test]
    fn geometry() {
        let settings = Settings::new(1024, 64);
        assert_eq!(settings.entries_count(), 13);
        assert_eq!(settings.clusters_start(), 32 + 13 * 9);
        assert_eq!(settings.cluster_offset(2), 149 + 128);
        assert!(settings.clusters_start() + 13 * 64 <= 1024);
    }

    #[test]
    fn validation() {
        assert!(Settings::new(1024, 64).validate(false).is_ok());
        assert!(Settings::new(15, 8).validate(false).is_err());
        assert!(Settings::new(1024, 4).validate(false).is_err());
        assert!(Settings::new(20, 8).validate(false).is_err());
        assert!(Settings::new(24, 8).validate(false).is_ok());
        let big = Settings::new(LARGE_IMAGE_THRESHOLD + 1, 4096);
        assert!(matches!(big.validate(false), Err(FsError::InvalidSettings(_))));
        assert!(big.validate(true).is_ok());
    }

    #[test]
    fn settings_and_signature_on_device() {
        let dev = MemDevice::from_vec(vec![0u8; 64]);
        assert!(matches!(check_signature(&dev), Err(FsError::NotAFileSystem)));
        write_signature(&dev).unwrap();
        check_signature(&dev).unwrap();
        let settings = Settings::new(64, 8);
        settings.write_to(&dev).unwrap();
        assert_eq!(Settings::read_from(&dev).unwrap(), settings);
        assert!(matches!(
            check_signature(&MemDevice::new()),
            Err(FsError::NotAFileSystem)
        ));
    }
}
