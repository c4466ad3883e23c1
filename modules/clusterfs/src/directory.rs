use clustervfs::{corrupted, ClusterId, FsResult};

use crate::codec::{decode_u64, encode_u64, U64_SIZE};

/// Child list of a directory: first clusters of its immediate children, in
/// insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Directory {
    children: Vec<ClusterId>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> FsResult<Self> {
        if bytes.len() % U64_SIZE != 0 {
            return Err(corrupted(format!(
                "directory content of {} bytes is not a list of cluster indices",
                bytes.len()
            )));
        }
        let children = bytes
            .chunks_exact(U64_SIZE)
            .map(decode_u64)
            .collect::<FsResult<_>>()?;
        Ok(Self { children })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.children.iter().flat_map(|&c| encode_u64(c)).collect()
    }

    pub fn add(&mut self, cluster: ClusterId) {
        self.children.push(cluster);
    }

    /// Drops the first occurrence of `cluster`.
    pub fn remove(&mut self, cluster: ClusterId) -> bool {
        match self.children.iter().position(|&c| c == cluster) {
            Some(index) => {
                self.children.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn children(&self) -> &[ClusterId] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode() {
        let mut dir = Directory::new();
        dir.add(3);
        dir.add(0x0102);
        let bytes = dir.to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[8..], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(Directory::from_bytes(&bytes).unwrap(), dir);
        assert!(Directory::from_bytes(&[]).unwrap().is_empty());
        assert!(Directory::from_bytes(&bytes[..9]).is_err());
    }

    #[test]
    fn remove_first_match_only() {
        let mut dir = Directory::new();
        for c in [4, 5, 4] {
            dir.add(c);
        }
        assert!(dir.remove(4));
        assert_eq!(dir.children(), &[5, 4]);
        assert!(!dir.remove(9));
        assert_eq!(dir.len(), 2);
    }
}
