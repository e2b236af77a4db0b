//! Size, content type and digest checks for a file already on disk

use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::checksum::{hash_file, ChecksumType};
use crate::config::Config;
use crate::content_type::{detect_file, Category};

/// Verdict for one file. Never an error: every failure becomes a rejected result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityResult {
    pub accepted: bool,
    pub reason: Option<String>,
    pub digest: Option<String>,
    pub size: Option<u64>,
    pub content_type: Option<String>,
}

impl IntegrityResult {
    fn rejected(reason: String, size: Option<u64>, content_type: Option<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            digest: None,
            size,
            content_type,
        }
    }

    /// Reason text for a rejection; empty for an accepted result
    pub fn reason_or_default(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct IntegrityChecker {
    max_file_size: u64,
    allowed: BTreeSet<Category>,
    algorithm: ChecksumType,
}

impl IntegrityChecker {
    pub fn new(
        max_file_size: u64,
        allowed: impl IntoIterator<Item = Category>,
        algorithm: ChecksumType,
    ) -> Self {
        Self {
            max_file_size,
            allowed: allowed.into_iter().collect(),
            algorithm,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_file_size,
            config.allowed_categories.iter().copied(),
            config.algorithm,
        )
    }

    /// Same policy, different digest algorithm
    pub fn with_algorithm(&self, algorithm: ChecksumType) -> Self {
        Self {
            algorithm,
            ..self.clone()
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn algorithm(&self) -> ChecksumType {
        self.algorithm
    }

    pub fn check_size(&self, size: u64) -> Result<(), String> {
        if size > self.max_file_size {
            return Err(format!(
                "file size {} bytes exceeds limit of {} bytes",
                size, self.max_file_size
            ));
        }
        Ok(())
    }

    /// Size ceiling, then content type, then digest. Stops at the first failure.
    pub fn check(&self, path: &Path) -> IntegrityResult {
        let size = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m.len(),
            Ok(_) => {
                return IntegrityResult::rejected(
                    format!("{} is not a regular file", path.display()),
                    None,
                    None,
                )
            }
            Err(e) => {
                return IntegrityResult::rejected(
                    format!("failed to stat {}: {}", path.display(), e),
                    None,
                    None,
                )
            }
        };
        if let Err(reason) = self.check_size(size) {
            return IntegrityResult::rejected(reason, Some(size), None);
        }

        let content_type = match detect_file(path) {
            Ok(ct) => ct,
            Err(e) => {
                return IntegrityResult::rejected(
                    format!("failed to read {}: {}", path.display(), e),
                    Some(size),
                    None,
                )
            }
        };
        let refusal = match content_type.category {
            Some(c) if self.allowed.contains(&c) => None,
            Some(c) => Some(format!(
                "content type {} ({}) is not allowed",
                content_type,
                c.name()
            )),
            None => Some(format!("content type {} is not allowed", content_type)),
        };
        if let Some(reason) = refusal {
            return IntegrityResult::rejected(
                reason,
                Some(size),
                Some(content_type.mime.to_string()),
            );
        }

        match hash_file(path, self.algorithm) {
            Ok(digest) => {
                debug!(
                    "integrity ok: {} size={} type={} {}={}",
                    path.display(),
                    size,
                    content_type,
                    self.algorithm,
                    digest
                );
                IntegrityResult {
                    accepted: true,
                    reason: None,
                    digest: Some(digest),
                    size: Some(size),
                    content_type: Some(content_type.mime.to_string()),
                }
            }
            Err(e) => IntegrityResult::rejected(
                format!("failed to hash: {:#}", e),
                Some(size),
                Some(content_type.mime.to_string()),
            ),
        }
    }

    /// Runs `check` on the blocking pool
    pub async fn check_async(&self, path: PathBuf) -> IntegrityResult {
        let checker = self.clone();
        match tokio::task::spawn_blocking(move || checker.check(&path)).await {
            Ok(result) => result,
            Err(e) => IntegrityResult::rejected(format!("integrity check aborted: {}", e), None, None),
        }
    }
}
