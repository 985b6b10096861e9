//! Reader for the root metadata a working directory caches locally.
//!
//! Only two facts are needed: how many keys the root role lists in total,
//! and which of them are currently trusted to sign root.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::HarnessError;

#[derive(Debug, Deserialize)]
struct SignedRoot {
    signed: RootBody,
}

#[derive(Debug, Deserialize)]
struct RootBody {
    keys: serde_json::Map<String, serde_json::Value>,
    roles: Roles,
}

#[derive(Debug, Deserialize)]
struct Roles {
    root: RootRole,
}

#[derive(Debug, Deserialize)]
struct RootRole {
    keyids: Vec<String>,
}

/// Summary of a cached `root.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootMetadata {
    path: PathBuf,
    total_keys: usize,
    trusted_root_keys: Vec<String>,
}

impl RootMetadata {
    /// Location of the cached root metadata for `identity` under `trust_dir`.
    #[must_use]
    pub fn path_for(trust_dir: &Path, identity: &str) -> PathBuf {
        trust_dir
            .join("tuf")
            .join(identity)
            .join("metadata")
            .join("root.json")
    }

    /// Reads the cached root metadata.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Metadata`] if the file is missing or lacks
    /// `signed.keys` or `signed.roles.root.keyids`.
    pub fn load(trust_dir: &Path, identity: &str) -> Result<Self, HarnessError> {
        let path = Self::path_for(trust_dir, identity);
        let raw = std::fs::read_to_string(&path).map_err(|e| HarnessError::Metadata {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Self::parse(path, &raw)
    }

    fn parse(path: PathBuf, raw: &str) -> Result<Self, HarnessError> {
        let parsed: SignedRoot = serde_json::from_str(raw).map_err(|e| HarnessError::Metadata {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            path,
            total_keys: parsed.signed.keys.len(),
            trusted_root_keys: parsed.signed.roles.root.keyids,
        })
    }

    /// File this summary was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries in `signed.keys`.
    #[must_use]
    pub const fn total_keys(&self) -> usize {
        self.total_keys
    }

    /// `signed.roles.root.keyids`, in file order.
    #[must_use]
    pub fn trusted_root_keys(&self) -> &[String] {
        &self.trusted_root_keys
    }
}

/// Checks that a root rotation replaced the single trusted root key.
///
/// Holds when `before` trusts exactly one key, and `after` lists one more
/// key in total, still trusts exactly one key, and that key set differs from
/// `before`'s.
pub fn check_root_rotation(before: &RootMetadata, after: &RootMetadata) -> Result<(), String> {
    if before.trusted_root_keys.len() != 1 {
        return Err(format!(
            "expected 1 trusted root key before rotation, got {}",
            before.trusted_root_keys.len()
        ));
    }
    if after.total_keys != before.total_keys + 1 {
        return Err(format!(
            "expected {} keys after rotation, but got {}",
            before.total_keys + 1,
            after.total_keys
        ));
    }
    if after.trusted_root_keys.len() != 1 {
        return Err(format!(
            "expected 1 valid root key, got {}",
            after.trusted_root_keys.len()
        ));
    }
    if after.trusted_root_keys == before.trusted_root_keys {
        return Err("root key has not been rotated".to_string());
    }
    Ok(())
}
