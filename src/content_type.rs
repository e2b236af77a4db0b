//! Content type detection from leading file bytes
//!
//! Names and extensions are never consulted: a file is classified by its
//! magic signature, or as plain text when the prefix is printable UTF-8.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes inspected from the start of a file
pub const SNIFF_LEN: usize = 8192;

/// Allow-list categories
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Document,
    Image,
    Text,
    Archive,
    Video,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Document,
        Category::Image,
        Category::Text,
        Category::Archive,
        Category::Video,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Image => "image",
            Self::Text => "text",
            Self::Archive => "archive",
            Self::Video => "video",
        }
    }
}

/// A detected MIME type and the category it belongs to, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentType {
    pub mime: &'static str,
    pub category: Option<Category>,
}

impl ContentType {
    const fn new(mime: &'static str, category: Option<Category>) -> Self {
        Self { mime, category }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime)
    }
}

pub const PLAIN_TEXT: ContentType = ContentType::new("text/plain", Some(Category::Text));
pub const OCTET_STREAM: ContentType = ContentType::new("application/octet-stream", None);

// (offset, signature, type)
const SIGNATURES: &[(usize, &[u8], ContentType)] = &[
    (0, b"%PDF-", ContentType::new("application/pdf", Some(Category::Document))),
    (0, b"{\\rtf", ContentType::new("application/rtf", Some(Category::Document))),
    (
        0,
        &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1],
        ContentType::new("application/x-ole-storage", Some(Category::Document)),
    ),
    (
        0,
        &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        ContentType::new("image/png", Some(Category::Image)),
    ),
    (0, &[0xFF, 0xD8, 0xFF], ContentType::new("image/jpeg", Some(Category::Image))),
    (0, b"GIF87a", ContentType::new("image/gif", Some(Category::Image))),
    (0, b"GIF89a", ContentType::new("image/gif", Some(Category::Image))),
    (0, b"PK\x03\x04", ContentType::new("application/zip", Some(Category::Archive))),
    (0, b"PK\x05\x06", ContentType::new("application/zip", Some(Category::Archive))),
    (0, &[0x1F, 0x8B], ContentType::new("application/gzip", Some(Category::Archive))),
    (
        0,
        &[b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C],
        ContentType::new("application/x-7z-compressed", Some(Category::Archive)),
    ),
    (0, b"Rar!\x1a\x07", ContentType::new("application/vnd.rar", Some(Category::Archive))),
    (257, b"ustar", ContentType::new("application/x-tar", Some(Category::Archive))),
    (
        0,
        &[0x1A, 0x45, 0xDF, 0xA3],
        ContentType::new("video/webm", Some(Category::Video)),
    ),
    (0, b"\x7fELF", ContentType::new("application/x-executable", None)),
    (0, b"MZ", ContentType::new("application/x-msdownload", None)),
];

/// Classify a file from its leading bytes
pub fn detect(prefix: &[u8]) -> ContentType {
    if let Some(found) = detect_riff(prefix).or_else(|| detect_ftyp(prefix)) {
        return found;
    }
    for (offset, magic, content_type) in SIGNATURES {
        if prefix.len() >= offset + magic.len() && &prefix[*offset..offset + magic.len()] == *magic {
            return *content_type;
        }
    }
    if looks_like_text(prefix) {
        PLAIN_TEXT
    } else {
        OCTET_STREAM
    }
}

/// Read up to SNIFF_LEN bytes from a file and classify them
pub fn detect_file(path: &Path) -> std::io::Result<ContentType> {
    let f = File::open(path)?;
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    f.take(SNIFF_LEN as u64).read_to_end(&mut prefix)?;
    Ok(detect(&prefix))
}

// RIFF containers share a magic; the form type at offset 8 decides
fn detect_riff(prefix: &[u8]) -> Option<ContentType> {
    if prefix.len() < 12 || &prefix[0..4] != b"RIFF" {
        return None;
    }
    match &prefix[8..12] {
        b"WEBP" => Some(ContentType::new("image/webp", Some(Category::Image))),
        b"AVI " => Some(ContentType::new("video/x-msvideo", Some(Category::Video))),
        b"WAVE" => Some(ContentType::new("audio/wav", None)),
        _ => None,
    }
}

// ISO base media files share `ftyp`; the major brand at offset 8 decides
fn detect_ftyp(prefix: &[u8]) -> Option<ContentType> {
    if prefix.len() < 8 || &prefix[4..8] != b"ftyp" {
        return None;
    }
    let found = match prefix.get(8..12) {
        Some(b"heic" | b"heix" | b"heim" | b"heis") => {
            ContentType::new("image/heic", Some(Category::Image))
        }
        Some(b"mif1" | b"msf1") => ContentType::new("image/heif", Some(Category::Image)),
        Some(b"avif" | b"avis") => ContentType::new("image/avif", Some(Category::Image)),
        Some(b"M4A " | b"M4B " | b"M4P ") => ContentType::new("audio/mp4", None),
        Some(b"qt  ") => ContentType::new("video/quicktime", Some(Category::Video)),
        _ => ContentType::new("video/mp4", Some(Category::Video)),
    };
    Some(found)
}

// Empty input counts as text
fn looks_like_text(prefix: &[u8]) -> bool {
    let valid = match std::str::from_utf8(prefix) {
        Ok(s) => s,
        // A multi-byte sequence cut off by the sniff window is still text
        Err(e) if e.error_len().is_none() => {
            match std::str::from_utf8(&prefix[..e.valid_up_to()]) {
                Ok(s) => s,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    valid
        .chars()
        .all(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r' | '\x0c' | '\x1b'))
}
