use core::fmt;

use clustervfs::{corrupted, ClusterId, EntryKind, FsResult, METADATA_SIZE, NAME_SIZE};

use crate::chain::{ByteReader, ByteWriter};
use crate::codec::{
    decode_bool, decode_string, decode_u64, encode_bool, encode_string, encode_u64, U64_SIZE,
};

const SIZE_AT: usize = NAME_SIZE;
const FIRST_AT: usize = SIZE_AT + U64_SIZE;
const PARENT_AT: usize = FIRST_AT + U64_SIZE;
const DIR_FLAG_AT: usize = PARENT_AT + U64_SIZE;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    /// Content length in bytes, header excluded.
    pub size: u64,
    pub first_cluster: ClusterId,
    pub parent_first_cluster: ClusterId,
    pub is_directory: bool,
}

impl Metadata {
    pub fn new(name: &str, kind: EntryKind, first_cluster: ClusterId, parent: ClusterId) -> Self {
        Self {
            name: name.into(),
            size: 0,
            first_cluster,
            parent_first_cluster: parent,
            is_directory: kind.is_dir(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        if self.is_directory {
            EntryKind::Dir
        } else {
            EntryKind::File
        }
    }

    pub fn to_bytes(&self) -> FsResult<[u8; METADATA_SIZE]> {
        let mut buf = [0u8; METADATA_SIZE];
        buf[..SIZE_AT].copy_from_slice(&encode_string(&self.name, NAME_SIZE)?);
        buf[SIZE_AT..FIRST_AT].copy_from_slice(&encode_u64(self.size));
        buf[FIRST_AT..PARENT_AT].copy_from_slice(&encode_u64(self.first_cluster));
        buf[PARENT_AT..DIR_FLAG_AT].copy_from_slice(&encode_u64(self.parent_first_cluster));
        buf[DIR_FLAG_AT] = encode_bool(self.is_directory);
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> FsResult<Self> {
        if bytes.len() < METADATA_SIZE {
            return Err(corrupted("truncated entry header"));
        }
        Ok(Self {
            name: decode_string(&bytes[..SIZE_AT])?,
            size: decode_u64(&bytes[SIZE_AT..])?,
            first_cluster: decode_u64(&bytes[FIRST_AT..])?,
            parent_first_cluster: decode_u64(&bytes[PARENT_AT..])?,
            is_directory: decode_bool(bytes[DIR_FLAG_AT])?,
        })
    }

    /// Long form used by `ls -l` and `stat`.
    pub fn verbose(&self) -> VerboseMetadata<'_> {
        VerboseMetadata(self)
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.is_directory { 'D' } else { 'F' };
        write!(f, "{tag} {}", self.name)
    }
}

pub struct VerboseMetadata<'a>(&'a Metadata);

impl fmt::Display for VerboseMetadata<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{m}, {}b, fc: {}, pfc: {}",
            m.size, m.first_cluster, m.parent_first_cluster
        )
    }
}

#[derive(Clone)]
pub struct MetadataHandler {
    reader: ByteReader,
    writer: ByteWriter,
}

impl MetadataHandler {
    pub fn new(reader: ByteReader, writer: ByteWriter) -> Self {
        Self { reader, writer }
    }

    pub fn read(&self) -> FsResult<Metadata> {
        let bytes = self.reader.read_bytes(0, METADATA_SIZE as u64)?;
        let metadata = Metadata::from_bytes(&bytes)?;
        if metadata.first_cluster != self.reader.first_cluster() {
            return Err(corrupted(format!(
                "header at cluster {} claims first cluster {}",
                self.reader.first_cluster(),
                metadata.first_cluster
            )));
        }
        Ok(metadata)
    }

    pub fn write(&self, metadata: &Metadata) -> FsResult<()> {
        self.writer.write_bytes(0, &metadata.to_bytes()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustervfs::FsError;

    #[test]
    fn header_layout() {
        let mut meta = Metadata::new("notes", EntryKind::File, 3, 1);
        meta.size = 0x0102;
        let bytes = meta.to_bytes().unwrap();
        assert_eq!(&bytes[..5], b"notes");
        assert!(bytes[5..64].iter().all(|&b| b == 0));
        assert_eq!(&bytes[64..72], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(bytes[79], 3);
        assert_eq!(bytes[87], 1);
        assert_eq!(bytes[88], 0);
        assert_eq!(Metadata::from_bytes(&bytes).unwrap(), meta);
    }

    #[test]
    fn rejects_bad_headers() {
        let long = "x".repeat(NAME_SIZE + 1);
        assert!(Metadata::new(&long, EntryKind::File, 0, 0).to_bytes().is_err());
        let mut bytes = Metadata::new("d", EntryKind::Dir, 0, 0).to_bytes().unwrap();
        bytes[88] = 7;
        assert!(matches!(Metadata::from_bytes(&bytes), Err(FsError::Corrupted(_))));
        assert!(Metadata::from_bytes(&bytes[..40]).is_err());
    }

    #[test]
    fn display_forms() {
        let mut meta = Metadata::new("a", EntryKind::Dir, 2, 0);
        assert_eq!(meta.to_string(), "D a");
        meta.is_directory = false;
        meta.size = 13;
        assert_eq!(meta.verbose().to_string(), "F a, 13b, fc: 2, pfc: 0");
        assert_eq!(meta.kind(), EntryKind::File);
    }
}
