//! Checksum and hashing utilities

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::protocol::defaults::HASH_BLOCK_SIZE;

/// Available content digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    #[default]
    Sha256,
    Blake3,
}

impl ChecksumType {
    /// Stable identifier carried in the metadata frame
    pub fn wire_id(self) -> u8 {
        match self {
            Self::Sha256 => 1,
            Self::Blake3 => 2,
        }
    }

    pub fn from_wire_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Sha256),
            2 => Some(Self::Blake3),
            _ => None,
        }
    }

    /// Length of the hex-encoded digest
    pub fn hex_len(self) -> usize {
        // Both produce 32-byte digests
        64
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

impl std::fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Incremental hasher over either algorithm
pub enum StreamHasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl StreamHasher {
    pub fn new(checksum_type: ChecksumType) -> Self {
        match checksum_type {
            ChecksumType::Sha256 => Self::Sha256(Sha256::new()),
            ChecksumType::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => to_hex(&h.finalize()),
            Self::Blake3(h) => to_hex(h.finalize().as_bytes()),
        }
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>()
}

/// Hex digest of an in-memory buffer
pub fn strong_checksum(data: &[u8], checksum_type: ChecksumType) -> String {
    let mut hasher = StreamHasher::new(checksum_type);
    hasher.update(data);
    hasher.finalize_hex()
}

/// Hex digest of everything a reader yields, consumed in `block_size` pieces
pub fn hash_reader<R: Read>(
    mut reader: R,
    checksum_type: ChecksumType,
    block_size: usize,
) -> std::io::Result<String> {
    let mut hasher = StreamHasher::new(checksum_type);
    let mut buf = vec![0u8; block_size.max(1)];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// Hex digest of a file on disk; memory use is one 4 KiB block
pub fn hash_file(path: &Path, checksum_type: ChecksumType) -> Result<String> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    hash_reader(f, checksum_type, HASH_BLOCK_SIZE)
        .with_context(|| format!("read {}", path.display()))
}
