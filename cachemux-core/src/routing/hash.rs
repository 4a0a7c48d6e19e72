//! Key hashing used by the distribution strategies
//!
//! CRC32 is the IEEE polynomial (same as zlib), so bucket assignments match
//! other clients that shard with `crc32(key) % n`.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Hash function used to place keys and virtual nodes on the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMethod {
    /// CRC32 (IEEE)
    #[default]
    Crc32,
    /// First four bytes of the MD5 digest, little endian
    Md5,
}

impl HashMethod {
    /// Hash raw bytes to a ring position
    pub fn hash(self, data: &[u8]) -> u32 {
        match self {
            Self::Crc32 => crc32(data),
            Self::Md5 => {
                let digest = Md5::digest(data);
                u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
            }
        }
    }

    /// Hash a string key to a ring position
    pub fn hash_key(self, key: &str) -> u32 {
        self.hash(key.as_bytes())
    }
}

/// CRC32 checksum of the raw key bytes
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
