use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Content hashes of indexed files, used to skip re-embedding unchanged files
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HashCache {
    /// repository root -> (relative file path -> sha256 of content)
    pub roots: HashMap<String, HashMap<String, String>>,
}

impl HashCache {
    /// Read the cache file; a missing file is an empty cache
    pub fn load(cache_path: &Path) -> Result<Self, CacheError> {
        let load_err = |reason: String| CacheError::LoadFailed {
            path: cache_path.display().to_string(),
            reason,
        };

        let content = match fs::read_to_string(cache_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No hash cache at {}, starting empty", cache_path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(load_err(e.to_string())),
        };

        let cache: HashCache =
            serde_json::from_str(&content).map_err(|e| load_err(e.to_string()))?;
        tracing::info!("Loaded hash cache with {} repositories", cache.roots.len());
        Ok(cache)
    }

    /// Write the cache file, creating parent directories
    pub fn save(&self, cache_path: &Path) -> Result<(), CacheError> {
        let save_err = |reason: String| CacheError::SaveFailed {
            path: cache_path.display().to_string(),
            reason,
        };

        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_err(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| save_err(e.to_string()))?;
        fs::write(cache_path, content).map_err(|e| save_err(e.to_string()))?;

        tracing::debug!("Saved hash cache to {}", cache_path.display());
        Ok(())
    }

    /// Get file hashes for a repository root
    pub fn get_root(&self, root: &str) -> Option<&HashMap<String, String>> {
        self.roots.get(root)
    }

    /// Replace file hashes for a repository root
    pub fn update_root(&mut self, root: String, hashes: HashMap<String, String>) {
        self.roots.insert(root, hashes);
    }
}

/// Hex-encoded sha256 of file content
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
