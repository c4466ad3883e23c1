//! Byte-range I/O over a cluster chain.

use clustervfs::{corrupted, ClusterId, FsResult};
use log::trace;

use crate::block::{DiskReader, DiskWriter};
use crate::fat::Fat;
use crate::layout::Settings;

#[derive(Clone)]
pub struct ClusterReader {
    reader: DiskReader,
    settings: Settings,
}

impl ClusterReader {
    pub fn new(reader: DiskReader, settings: Settings) -> Self {
        Self { reader, settings }
    }

    /// Fills as much of `buf` as fits between `offset` and the cluster end.
    pub fn read(&self, cluster: ClusterId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let cluster_size = self.settings.cluster_size;
        if offset >= cluster_size || buf.is_empty() {
            return Ok(0);
        }
        let take = core::cmp::min(buf.len() as u64, cluster_size - offset) as usize;
        self.reader
            .read_at(self.settings.cluster_offset(cluster) + offset, &mut buf[..take])?;
        Ok(take)
    }
}

#[derive(Clone)]
pub struct ClusterWriter {
    writer: DiskWriter,
    settings: Settings,
}

impl ClusterWriter {
    pub fn new(writer: DiskWriter, settings: Settings) -> Self {
        Self { writer, settings }
    }

    pub fn write(&self, cluster: ClusterId, offset: u64, buf: &[u8]) -> FsResult<usize> {
        let cluster_size = self.settings.cluster_size;
        if offset >= cluster_size || buf.is_empty() {
            return Ok(0);
        }
        let take = core::cmp::min(buf.len() as u64, cluster_size - offset) as usize;
        self.writer
            .write_at(self.settings.cluster_offset(cluster) + offset, &buf[..take])?;
        Ok(take)
    }
}

#[derive(Clone)]
pub struct ByteReader {
    fat: Fat,
    cluster: ClusterReader,
    first: ClusterId,
    cluster_size: u64,
}

impl ByteReader {
    pub fn new(fat: Fat, cluster: ClusterReader, first: ClusterId, cluster_size: u64) -> Self {
        Self { fat, cluster, first, cluster_size }
    }

    pub fn first_cluster(&self) -> ClusterId {
        self.first
    }

    fn successor(&self, cluster: ClusterId) -> FsResult<ClusterId> {
        self.fat.next(cluster)?.ok_or_else(|| {
            corrupted(format!("chain from {} ends before the requested range", self.first))
        })
    }

    /// Copies `length` bytes starting `offset` bytes into the chain.
    pub fn read_bytes(&self, offset: u64, length: u64) -> FsResult<Vec<u8>> {
        let mut out = vec![0u8; length as usize];
        if out.is_empty() {
            return Ok(out);
        }
        let mut current = self.first;
        for _ in 0..offset / self.cluster_size {
            current = self.successor(current)?;
        }
        let mut position = offset % self.cluster_size;
        let mut done = 0;
        while done < out.len() {
            if position == self.cluster_size {
                current = self.successor(current)?;
                position = 0;
            }
            let read = self.cluster.read(current, position, &mut out[done..])?;
            done += read;
            position += read as u64;
        }
        Ok(out)
    }
}

#[derive(Clone)]
pub struct ByteWriter {
    fat: Fat,
    cluster: ClusterWriter,
    first: ClusterId,
    cluster_size: u64,
}

impl ByteWriter {
    pub fn new(fat: Fat, cluster: ClusterWriter, first: ClusterId, cluster_size: u64) -> Self {
        Self { fat, cluster, first, cluster_size }
    }

    pub fn first_cluster(&self) -> ClusterId {
        self.first
    }

    fn successor_or_grow(&self, cluster: ClusterId) -> FsResult<ClusterId> {
        match self.fat.next(cluster)? {
            Some(next) => Ok(next),
            None => {
                trace!("chain {}: growing past cluster {cluster}", self.first);
                self.fat.allocate_next(cluster)
            }
        }
    }

    /// Writes `bytes` at `offset`, extending the chain as needed. Returns the
    /// offset just past the last byte written.
    pub fn write_bytes(&self, offset: u64, bytes: &[u8]) -> FsResult<u64> {
        if bytes.is_empty() {
            return Ok(offset);
        }
        let mut current = self.first;
        for _ in 0..offset / self.cluster_size {
            current = self.successor_or_grow(current)?;
        }
        let mut position = offset % self.cluster_size;
        let mut done = 0;
        while done < bytes.len() {
            if position == self.cluster_size {
                current = self.successor_or_grow(current)?;
                position = 0;
            }
            let written = self.cluster.write(current, position, &bytes[done..])?;
            done += written;
            position += written as u64;
        }
        Ok(offset + done as u64)
    }
}
