//! Metadata framing and receiver-side path safety
//!
//! Transport agnostic: the async sender and receiver both build on these.

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Component, Path, PathBuf};

use crate::checksum::ChecksumType;
use crate::protocol::{frame, HEADER_LEN, MAGIC, MAX_METADATA_SIZE, MAX_NAME_LEN, VERSION};

/// Sent once per transfer, before any file bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMetadata {
    pub name: String,
    pub size: u64,
    pub algorithm: ChecksumType,
    /// Lowercase hex
    pub content_hash: String,
}

/// Validate frame payload size against protocol::MAX_METADATA_SIZE
pub fn validate_frame_size(size: usize) -> Result<()> {
    if size > MAX_METADATA_SIZE {
        bail!(
            "frame payload too large: {} bytes (max: {})",
            size,
            MAX_METADATA_SIZE
        );
    }
    Ok(())
}

/// Build frame header (11 bytes)
/// Format: MAGIC (4) | VERSION (2) | TYPE (1) | LENGTH (4)
pub fn build_frame_header(frame_type: u8, payload_len: u32) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&VERSION.to_le_bytes());
    header[6] = frame_type;
    header[7..11].copy_from_slice(&payload_len.to_le_bytes());
    header
}

/// Parse frame header
/// Returns: (frame_type, payload_length)
pub fn parse_frame_header(header: &[u8; HEADER_LEN]) -> Result<(u8, u32)> {
    if &header[0..4] != MAGIC {
        bail!("invalid magic in frame header");
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        bail!("protocol version mismatch: got {}, expected {}", version, VERSION);
    }

    let frame_type = header[6];
    let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);

    Ok((frame_type, payload_len))
}

fn take<'a>(buf: &mut &'a [u8], n: usize, what: &str) -> Result<&'a [u8]> {
    if buf.len() < n {
        bail!("truncated metadata: missing {}", what);
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

impl TransferMetadata {
    /// Payload layout, little-endian:
    /// ALGO (1) | NAME_LEN (2) | NAME | SIZE (8) | HASH_LEN (2) | HASH (ASCII hex)
    pub fn encode(&self) -> Result<Vec<u8>> {
        let name = self.name.as_bytes();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            bail!("file name must be 1..={} bytes, got {}", MAX_NAME_LEN, name.len());
        }
        let hash = self.content_hash.as_bytes();
        let mut out = Vec::with_capacity(1 + 2 + name.len() + 8 + 2 + hash.len());
        out.push(self.algorithm.wire_id());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&(hash.len() as u16).to_le_bytes());
        out.extend_from_slice(hash);
        validate_frame_size(out.len())?;
        Ok(out)
    }

    /// Header plus payload, ready to write
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        let payload = self.encode()?;
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&build_frame_header(frame::METADATA, payload.len() as u32));
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut rest = payload;
        let algo_id = take(&mut rest, 1, "algorithm")?[0];
        let algorithm = ChecksumType::from_wire_id(algo_id)
            .ok_or_else(|| anyhow!("unknown digest algorithm id {}", algo_id))?;

        let name_len = u16::from_le_bytes(take(&mut rest, 2, "name length")?.try_into()?) as usize;
        if name_len == 0 || name_len > MAX_NAME_LEN {
            bail!("file name must be 1..={} bytes, got {}", MAX_NAME_LEN, name_len);
        }
        let name = std::str::from_utf8(take(&mut rest, name_len, "name")?)
            .context("file name is not UTF-8")?
            .to_string();

        let size = u64::from_le_bytes(take(&mut rest, 8, "size")?.try_into()?);

        let hash_len = u16::from_le_bytes(take(&mut rest, 2, "hash length")?.try_into()?) as usize;
        if hash_len != algorithm.hex_len() {
            bail!(
                "{} digest must be {} hex chars, got {}",
                algorithm,
                algorithm.hex_len(),
                hash_len
            );
        }
        let hash = take(&mut rest, hash_len, "hash")?;
        if !hash.iter().all(u8::is_ascii_hexdigit) {
            bail!("content hash is not hexadecimal");
        }
        let content_hash = String::from_utf8_lossy(hash).to_ascii_lowercase();

        if !rest.is_empty() {
            bail!("{} trailing bytes after metadata", rest.len());
        }

        Ok(Self {
            name,
            size,
            algorithm,
            content_hash,
        })
    }
}

/// Reduce an untrusted peer-supplied name to a single plain file name.
/// Separators of either platform, drive prefixes, NUL and dot names are refused.
pub fn safe_file_name(name: &str) -> Result<&str> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        bail!("file name must be 1..={} bytes", MAX_NAME_LEN);
    }
    if name.contains('\0') {
        bail!("file name contains NUL byte");
    }
    if name.contains('/') || name.contains('\\') {
        bail!("file name contains a path separator: {:?}", name);
    }
    if name.contains(':') {
        bail!("file name contains colon: {:?}", name);
    }
    if name == "." || name == ".." {
        bail!("file name is a directory reference: {:?}", name);
    }
    Ok(name)
}

/// Normalize a path to be safely under a root directory.
/// This prevents path traversal attacks by:
/// 1. Rejecting absolute paths, parent directory components, and root/prefix components
/// 2. Rejecting NUL bytes in path
/// 3. Canonicalizing the final path to resolve symlinks
/// 4. Ensuring the result is under the root
pub fn normalize_under_root(root: &Path, p: &Path) -> Result<PathBuf> {
    use Component::{CurDir, Normal, ParentDir, Prefix, RootDir};

    let root = root
        .canonicalize()
        .map_err(|e| anyhow!("failed to canonicalize root {:?}: {}", root, e))?;

    if p.to_string_lossy().contains('\0') {
        bail!("path contains NUL byte");
    }

    let mut safe = PathBuf::new();
    for component in p.components() {
        match component {
            CurDir => {}
            Normal(s) => safe.push(s),
            ParentDir | RootDir | Prefix(_) => {
                bail!("path contains disallowed component: {:?}", component);
            }
        }
    }

    let joined = root.join(&safe);

    // Existing paths resolve symlinks; new files resolve their parent
    let final_path = if joined.exists() {
        joined
            .canonicalize()
            .map_err(|e| anyhow!("failed to canonicalize {:?}: {}", joined, e))?
    } else if let (Some(parent), Some(filename)) = (joined.parent(), joined.file_name()) {
        if parent.exists() {
            parent
                .canonicalize()
                .map_err(|e| anyhow!("failed to canonicalize parent {:?}: {}", parent, e))?
                .join(filename)
        } else {
            joined
        }
    } else {
        joined
    };

    if !final_path.starts_with(&root) {
        bail!("path {:?} escapes root {:?}", p, root);
    }

    Ok(final_path)
}

/// Where a received file named `name` is stored under `storage_dir`
pub fn destination_path(storage_dir: &Path, name: &str) -> Result<PathBuf> {
    let name = safe_file_name(name)?;
    let path = normalize_under_root(storage_dir, Path::new(name))?;
    if path.is_dir() {
        bail!("destination {} is a directory", path.display());
    }
    Ok(path)
}

/// Create directory with parent creation
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("create directory {}", path.display()))?;
    }
    Ok(())
}
