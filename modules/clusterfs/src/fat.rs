//! The file allocation table: one fixed-width entry per cluster in the arena,
//! recording whether the cluster is free, the tail of a chain, or linked to
//! a successor.

use core::fmt;

use clustervfs::{corrupted, ClusterId, FsError, FsResult, FAT_ENTRY_SIZE, FAT_STATUS_SIZE};
use log::trace;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::block::{DiskReader, DiskWriter, SharedDevice};
use crate::codec::{decode_u64, encode_u64};

/// Entries fetched per device read when scanning the table.
const SCAN_CHUNK: u64 = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ClusterStatus {
    Free = 0xFF,
    Allocated = 0xAA,
    Last = 0xEE,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FatEntry {
    pub status: ClusterStatus,
    /// Successor cluster; only meaningful for `Allocated`.
    pub next: ClusterId,
}

impl FatEntry {
    pub const FREE: Self = Self { status: ClusterStatus::Free, next: 0 };
    pub const LAST: Self = Self { status: ClusterStatus::Last, next: 0 };

    pub const fn linked(next: ClusterId) -> Self {
        Self { status: ClusterStatus::Allocated, next }
    }

    pub fn to_bytes(&self) -> [u8; FAT_ENTRY_SIZE as usize] {
        let mut buf = [0u8; FAT_ENTRY_SIZE as usize];
        buf[0] = self.status.into();
        buf[FAT_STATUS_SIZE as usize..].copy_from_slice(&encode_u64(self.next));
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> FsResult<Self> {
        let raw = *bytes
            .first()
            .ok_or_else(|| corrupted("empty allocation table entry"))?;
        let status = ClusterStatus::try_from(raw)
            .map_err(|_| corrupted(format!("invalid cluster status byte {raw:#04x}")))?;
        let next = decode_u64(&bytes[FAT_STATUS_SIZE as usize..])?;
        Ok(Self { status, next })
    }
}

impl fmt::Display for FatEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            ClusterStatus::Free => write!(f, "FREE"),
            ClusterStatus::Last => write!(f, "LAST"),
            ClusterStatus::Allocated => write!(f, "ALLOCATED -> {}", self.next),
        }
    }
}

#[derive(Clone)]
pub struct Fat {
    reader: DiskReader,
    writer: DiskWriter,
    offset: u64,
    entries_count: u64,
}

impl Fat {
    pub fn new(device: SharedDevice, offset: u64, entries_count: u64) -> Self {
        Self {
            reader: DiskReader::new(device.clone(), offset, FAT_ENTRY_SIZE),
            writer: DiskWriter::new(device, offset),
            offset,
            entries_count,
        }
    }

    pub fn entries_count(&self) -> u64 {
        self.entries_count
    }

    fn check(&self, cluster: ClusterId) -> FsResult<()> {
        if cluster >= self.entries_count {
            return Err(FsError::InvalidCluster {
                cluster,
                entries: self.entries_count,
            });
        }
        Ok(())
    }

    fn entry_offset(&self, cluster: ClusterId) -> u64 {
        self.offset + cluster * FAT_ENTRY_SIZE
    }

    pub fn entry(&self, cluster: ClusterId) -> FsResult<FatEntry> {
        self.check(cluster)?;
        let mut buf = [0u8; FAT_ENTRY_SIZE as usize];
        self.reader.read_at(self.entry_offset(cluster), &mut buf)?;
        FatEntry::from_bytes(&buf)
    }

    pub fn set_entry(&self, cluster: ClusterId, entry: FatEntry) -> FsResult<()> {
        self.check(cluster)?;
        self.writer.write_at(self.entry_offset(cluster), &entry.to_bytes())
    }

    fn read_range(&self, start: ClusterId, count: u64) -> FsResult<Vec<FatEntry>> {
        let mut buf = vec![0u8; (count * FAT_ENTRY_SIZE) as usize];
        self.reader.read_at(self.entry_offset(start), &mut buf)?;
        buf.chunks_exact(FAT_ENTRY_SIZE as usize)
            .map(FatEntry::from_bytes)
            .collect()
    }

    /// Claims the lowest free cluster as a one-cluster chain.
    pub fn allocate(&self) -> FsResult<ClusterId> {
        let mut start = 0;
        while start < self.entries_count {
            let count = core::cmp::min(SCAN_CHUNK, self.entries_count - start);
            let chunk = self.read_range(start, count)?;
            if let Some(index) = chunk.iter().position(|e| e.status == ClusterStatus::Free) {
                let cluster = start + index as u64;
                self.set_entry(cluster, FatEntry::LAST)?;
                trace!("fat: allocated cluster {cluster}");
                return Ok(cluster);
            }
            start += count;
        }
        Err(FsError::OutOfSpace)
    }

    pub fn allocate_next(&self, cluster: ClusterId) -> FsResult<ClusterId> {
        if self.entry(cluster)?.status == ClusterStatus::Free {
            return Err(corrupted(format!("cannot extend free cluster {cluster}")));
        }
        let next = self.allocate()?;
        if let Err(err) = self.set_next(cluster, next) {
            self.set_entry(next, FatEntry::FREE)?;
            return Err(err);
        }
        trace!("fat: linked {cluster} -> {next}");
        Ok(next)
    }

    pub fn free(&self, cluster: ClusterId) -> FsResult<()> {
        let mut current = cluster;
        let mut hops = 0u64;
        loop {
            let entry = self.entry(current)?;
            match entry.status {
                ClusterStatus::Free => {
                    return Err(corrupted(format!("cluster {current} is already free")));
                }
                ClusterStatus::Last => {
                    self.set_entry(current, FatEntry::FREE)?;
                    break;
                }
                ClusterStatus::Allocated => {
                    self.set_entry(current, FatEntry::FREE)?;
                    current = entry.next;
                }
            }
            hops += 1;
            if hops > self.entries_count {
                return Err(corrupted(format!("chain from {cluster} does not terminate")));
            }
        }
        trace!("fat: freed chain starting at {cluster}");
        Ok(())
    }

    /// Cuts the chain after `cluster`, which becomes its tail.
    pub fn shrink(&self, cluster: ClusterId) -> FsResult<()> {
        let entry = self.entry(cluster)?;
        match entry.status {
            ClusterStatus::Free => Err(corrupted(format!("cannot shrink free cluster {cluster}"))),
            ClusterStatus::Last => Ok(()),
            ClusterStatus::Allocated => {
                self.set_entry(cluster, FatEntry::LAST)?;
                self.free(entry.next)
            }
        }
    }

    /// Links the tail `cluster` to `next`.
    pub fn set_next(&self, cluster: ClusterId, next: ClusterId) -> FsResult<()> {
        self.check(next)?;
        if self.entry(cluster)?.status != ClusterStatus::Last {
            return Err(corrupted(format!(
                "cluster {cluster} is not the tail of its chain"
            )));
        }
        self.set_entry(cluster, FatEntry::linked(next))
    }

    pub fn get_next(&self, cluster: ClusterId) -> FsResult<ClusterId> {
        self.next(cluster)?
            .ok_or_else(|| corrupted(format!("cluster {cluster} has no successor")))
    }

    pub fn next(&self, cluster: ClusterId) -> FsResult<Option<ClusterId>> {
        let entry = self.entry(cluster)?;
        match entry.status {
            ClusterStatus::Free => Err(corrupted(format!("cluster {cluster} is free"))),
            ClusterStatus::Last => Ok(None),
            ClusterStatus::Allocated => {
                self.check(entry.next)?;
                Ok(Some(entry.next))
            }
        }
    }

    pub fn is_last(&self, cluster: ClusterId) -> FsResult<bool> {
        Ok(self.entry(cluster)?.status == ClusterStatus::Last)
    }

    pub fn is_allocated(&self, cluster: ClusterId) -> FsResult<bool> {
        Ok(self.entry(cluster)?.status != ClusterStatus::Free)
    }

    pub fn entries(&self) -> FsResult<Vec<FatEntry>> {
        let mut entries = Vec::with_capacity(self.entries_count as usize);
        let mut start = 0;
        while start < self.entries_count {
            let count = core::cmp::min(SCAN_CHUNK, self.entries_count - start);
            entries.extend(self.read_range(start, count)?);
            start += count;
        }
        Ok(entries)
    }

    pub fn free_count(&self) -> FsResult<u64> {
        Ok(self
            .entries()?
            .iter()
            .filter(|e| e.status == ClusterStatus::Free)
            .count() as u64)
    }

    pub fn chain(&self, cluster: ClusterId) -> FsResult<Vec<ClusterId>> {
        let mut clusters = vec![cluster];
        let mut current = cluster;
        while let Some(next) = self.next(current)? {
            if clusters.len() as u64 >= self.entries_count {
                return Err(corrupted(format!("chain from {cluster} does not terminate")));
            }
            clusters.push(next);
            current = next;
        }
        Ok(clusters)
    }
}
