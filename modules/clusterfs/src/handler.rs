//! Binds the table and chain I/O to a starting cluster.

use clustervfs::{ClusterId, FsError, FsResult, METADATA_SIZE};

use crate::block::{DiskReader, DiskWriter, SharedDevice};
use crate::chain::{ByteReader, ByteWriter, ClusterReader, ClusterWriter};
use crate::codec::encode_u64;
use crate::directory::Directory;
use crate::fat::Fat;
use crate::layout::Settings;
use crate::metadata::{Metadata, MetadataHandler};

const HEADER: u64 = METADATA_SIZE as u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    File(Metadata),
    Directory(Metadata, Directory),
}

impl Entry {
    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::File(meta) | Self::Directory(meta, _) => meta,
        }
    }
}

#[derive(Clone)]
pub struct HandlerFactory {
    fat: Fat,
    cluster_reader: ClusterReader,
    cluster_writer: ClusterWriter,
    settings: Settings,
}

impl HandlerFactory {
    pub fn new(device: SharedDevice, fat: Fat, settings: Settings) -> Self {
        let clusters_start = settings.clusters_start();
        let reader = DiskReader::new(device.clone(), clusters_start, settings.cluster_size);
        let writer = DiskWriter::new(device, clusters_start);
        Self {
            fat,
            cluster_reader: ClusterReader::new(reader, settings),
            cluster_writer: ClusterWriter::new(writer, settings),
            settings,
        }
    }

    pub fn fat(&self) -> &Fat {
        &self.fat
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn byte_reader(&self, first: ClusterId) -> ByteReader {
        ByteReader::new(
            self.fat.clone(),
            self.cluster_reader.clone(),
            first,
            self.settings.cluster_size,
        )
    }

    pub fn byte_writer(&self, first: ClusterId) -> ByteWriter {
        ByteWriter::new(
            self.fat.clone(),
            self.cluster_writer.clone(),
            first,
            self.settings.cluster_size,
        )
    }

    pub fn metadata_handler(&self, first: ClusterId) -> MetadataHandler {
        MetadataHandler::new(self.byte_reader(first), self.byte_writer(first))
    }

    pub fn metadata(&self, first: ClusterId) -> FsResult<Metadata> {
        self.metadata_handler(first).read()
    }

    pub fn file_reader(&self, first: ClusterId) -> FsResult<FileReader> {
        let meta = self.metadata(first)?;
        if meta.is_directory {
            return Err(FsError::IsADirectory);
        }
        Ok(FileReader {
            bytes: self.byte_reader(first),
            size: meta.size,
            offset: 0,
            handled: 0,
            block_size: self.settings.cluster_size,
        })
    }

    pub fn file_writer(&self, first: ClusterId) -> FsResult<FileWriter> {
        if self.metadata(first)?.is_directory {
            return Err(FsError::IsADirectory);
        }
        Ok(FileWriter {
            bytes: self.byte_writer(first),
            header: self.metadata_handler(first),
            offset: 0,
            handled: 0,
        })
    }

    pub fn read_directory(&self, first: ClusterId) -> FsResult<Directory> {
        let meta = self.metadata(first)?;
        if !meta.is_directory {
            return Err(FsError::NotADirectory);
        }
        let bytes = self.byte_reader(first).read_bytes(HEADER, meta.size)?;
        Directory::from_bytes(&bytes)
    }

    pub fn load_entry(&self, first: ClusterId) -> FsResult<Entry> {
        let meta = self.metadata(first)?;
        if meta.is_directory {
            let dir = self.read_directory(first)?;
            Ok(Entry::Directory(meta, dir))
        } else {
            Ok(Entry::File(meta))
        }
    }

    pub fn append_child(&self, dir: ClusterId, child: ClusterId) -> FsResult<()> {
        let handler = self.metadata_handler(dir);
        let mut meta = handler.read()?;
        if !meta.is_directory {
            return Err(FsError::NotADirectory);
        }
        let end = self
            .byte_writer(dir)
            .write_bytes(HEADER + meta.size, &encode_u64(child))?;
        meta.size = end - HEADER;
        handler.write(&meta)
    }

    /// Replaces the whole content of the entry at `first`, releasing every
    /// cluster past the first before rewriting.
    pub fn replace_content(&self, first: ClusterId, content: &[u8]) -> FsResult<()> {
        let handler = self.metadata_handler(first);
        let mut meta = handler.read()?;
        self.fat.shrink(first)?;
        meta.size = 0;
        handler.write(&meta)?;
        let end = self.byte_writer(first).write_bytes(HEADER, content)?;
        meta.size = end - HEADER;
        handler.write(&meta)
    }
}

pub struct FileReader {
    bytes: ByteReader,
    size: u64,
    offset: u64,
    handled: u64,
    block_size: u64,
}

impl FileReader {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
        self.handled = 0;
    }

    pub fn set_block_size(&mut self, block_size: u64) {
        self.block_size = block_size;
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Next block at the cursor; empty once the end of the file is reached.
    pub fn read(&self) -> FsResult<Vec<u8>> {
        let position = self.offset + self.handled;
        let length = core::cmp::min(self.block_size, self.size.saturating_sub(position));
        self.bytes.read_bytes(HEADER + position, length)
    }

    pub fn read_next(&mut self) -> FsResult<Vec<u8>> {
        let block = self.read()?;
        self.handled += block.len() as u64;
        Ok(block)
    }
}

/// Writer over a file's content; keeps the header size in step.
pub struct FileWriter {
    bytes: ByteWriter,
    header: MetadataHandler,
    offset: u64,
    handled: u64,
}

impl FileWriter {
    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
        self.handled = 0;
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Writes at the cursor, which may not sit past the end of the file.
    pub fn write(&self, data: &[u8]) -> FsResult<()> {
        let position = self.offset + self.handled;
        let mut meta = self.header.read()?;
        if position > meta.size {
            return Err(FsError::InvalidOffset { offset: position, size: meta.size });
        }
        let end = self.bytes.write_bytes(HEADER + position, data)? - HEADER;
        if end > meta.size {
            meta.size = end;
            self.header.write(&meta)?;
        }
        Ok(())
    }

    pub fn write_next(&mut self, data: &[u8]) -> FsResult<()> {
        self.write(data)?;
        self.handled += data.len() as u64;
        Ok(())
    }
}
