//! Shared protocol constants for the dropline wire format

// Protocol header constants
pub const MAGIC: &[u8; 4] = b"DRPL";
pub const VERSION: u16 = 1;

// MAGIC (4) | VERSION (2) | TYPE (1) | LENGTH (4)
pub const HEADER_LEN: usize = 11;

// Metadata carries a name and a digest only, never file bytes
pub const MAX_METADATA_SIZE: usize = 4 * 1024;

// Longest file name the receiver will store
pub const MAX_NAME_LEN: usize = 255;

// Frame type IDs
pub mod frame {
    pub const METADATA: u8 = 1;
}

// Fixed-size handshake replies, receiver -> sender
pub mod token {
    pub const LEN: usize = 3;
    pub const ACK: &[u8; LEN] = b"ACK";
    pub const NAK: &[u8; LEN] = b"NAK";
}

pub mod defaults {
    pub const PORT: u16 = 12345;
    pub const BIND_HOST: &str = "0.0.0.0";

    // 100 MiB
    pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

    pub const BLOCK_SIZE: usize = 4096;
    pub const MAX_BLOCK_SIZE: usize = 1024 * 1024;

    // Hashing always streams in 4 KiB blocks regardless of the transfer block size
    pub const HASH_BLOCK_SIZE: usize = 4096;

    pub const STORAGE_DIR: &str = "received";
    pub const HISTORY_FILE: &str = "dropline-history.jsonl";

    // Placeholder when a transfer fails before the name is known
    pub const UNKNOWN_FILE_NAME: &str = "<unknown>";
}

// Timeout defaults; 0 in configuration means wait forever
pub mod timeouts {
    // Accepting a peer blocks until one connects
    pub const ACCEPT_MS: u64 = 0;

    // Metadata frame and acknowledgment token
    pub const HANDSHAKE_MS: u64 = 30_000;

    // Gap allowed between two block reads or writes
    pub const IDLE_MS: u64 = 60_000;

    // Connection establishment
    pub const CONNECT_MS: u64 = 10_000;
}
