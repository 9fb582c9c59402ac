// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Local caching for remote reads. Grounded on
//! `original_source/.../caching/{cache_backend,cache_config,cache_item}.py`.

pub mod eviction;
pub mod filesystem;
pub mod provider_backend;

pub use eviction::CacheItem;
pub use filesystem::FilesystemBackend;
pub use provider_backend::StorageProviderBackend;

use std::io::Read;

use crate::error::Error;
use crate::error::Result;

/// Which concrete [`CacheBackend`] a profile is configured to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheBackendType {
    Filesystem,
    StorageProvider,
}

impl CacheBackendType {
    pub fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "filesystem" => Ok(Self::Filesystem),
            "storage_provider" => Ok(Self::StorageProvider),
            other => Err(Error::config_invalid(format!(
                "invalid cache backend type: {other}. Must be one of: filesystem, storage_provider"
            ))),
        }
    }
}

/// Eviction policy selection plus how often a full sweep runs.
#[derive(Clone, Debug)]
pub struct EvictionPolicyConfig {
    pub policy: String,
    pub refresh_interval_secs: u64,
}

impl Default for EvictionPolicyConfig {
    fn default() -> Self {
        Self {
            policy: eviction::FIFO.to_string(),
            refresh_interval_secs: 300,
        }
    }
}

/// Where cached files live on disk, and which profile's storage provider
/// backs an S3-Express-style cache.
#[derive(Clone, Debug)]
pub struct CacheBackendConfig {
    pub cache_path: String,
    pub storage_provider_profile: Option<String>,
}

impl Default for CacheBackendConfig {
    fn default() -> Self {
        Self {
            cache_path: std::env::temp_dir()
                .join("multistorageclient-cache")
                .to_string_lossy()
                .into_owned(),
            storage_provider_profile: None,
        }
    }
}

/// Full cache configuration for a profile: size budget, etag verification,
/// eviction policy, and backend selection.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub size: String,
    pub use_etag: bool,
    pub eviction_policy: EvictionPolicyConfig,
    pub backend: CacheBackendConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: "10G".to_string(),
            use_etag: true,
            eviction_policy: EvictionPolicyConfig::default(),
            backend: CacheBackendConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Parses `size` (e.g. `"200G"`, `"1.5T"`) into a byte count.
    pub fn size_bytes(&self) -> Result<u64> {
        convert_to_bytes(&self.size)
    }
}

fn convert_to_bytes(size_str: &str) -> Result<u64> {
    let invalid = || Error::config_invalid(format!("invalid cache size string: {size_str}"));
    let unit = size_str.chars().last().ok_or_else(invalid)?;
    let numeric_part = &size_str[..size_str.len() - unit.len_utf8()];
    let size: f64 = numeric_part.parse().map_err(|_| invalid())?;
    let factor: f64 = match unit.to_ascii_uppercase() {
        'M' => 1024f64.powi(2),
        'G' => 1024f64.powi(3),
        'T' => 1024f64.powi(4),
        'P' => 1024f64.powi(5),
        'E' => 1024f64.powi(6),
        _ => return Err(invalid()),
    };
    Ok((size * factor) as u64)
}

/// Splits a cache key of the form `path` or `path:etag` into its parts.
pub fn split_key(key: &str) -> (&str, Option<&str>) {
    match key.split_once(':') {
        Some((path, etag)) => (path, Some(etag)),
        None => (key, None),
    }
}

/// Something an opened cached file can be read from.
pub type CachedReader = Box<dyn Read + Send>;

/// Common interface across local-filesystem and remote-storage-backed
/// caches. Keys are of the form `path` or `path:etag`; when `use_etag()`
/// is true, [`CacheBackend::contains`] also verifies the stored etag.
pub trait CacheBackend: Send + Sync {
    fn use_etag(&self) -> bool;

    fn max_cache_size(&self) -> u64;

    fn read(&self, key: &str) -> Option<Vec<u8>>;

    fn open(&self, key: &str) -> Option<CachedReader>;

    fn set(&self, key: &str, source: CacheSource<'_>) -> Result<()>;

    fn contains(&self, key: &str) -> bool;

    fn delete(&self, key: &str);

    fn cache_size(&self) -> u64;

    /// Scans the cache and evicts entries over budget. Returns `false` when
    /// a concurrent refresh holds the lock and this call backs off.
    fn refresh_cache(&self) -> bool;
}

/// Source data handed to [`CacheBackend::set`]: either a path to an
/// already-materialized file to move into the cache, or an in-memory
/// buffer to write out.
pub enum CacheSource<'a> {
    Path(&'a std::path::Path),
    Bytes(&'a [u8]),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_bytes_parses_unit_suffixes() {
        let cfg = CacheConfig {
            size: "200M".to_string(),
            ..CacheConfig::default()
        };
        assert_eq!(cfg.size_bytes().unwrap(), 200 * 1024 * 1024);
    }

    #[test]
    fn size_bytes_parses_fractional_values() {
        let cfg = CacheConfig {
            size: "1.5G".to_string(),
            ..CacheConfig::default()
        };
        assert_eq!(cfg.size_bytes().unwrap(), (1.5 * 1024f64.powi(3)) as u64);
    }

    #[test]
    fn size_bytes_rejects_bad_unit() {
        let cfg = CacheConfig {
            size: "200X".to_string(),
            ..CacheConfig::default()
        };
        assert!(cfg.size_bytes().is_err());
    }

    #[test]
    fn split_key_separates_path_and_etag() {
        assert_eq!(split_key("a/b.txt:abc123"), ("a/b.txt", Some("abc123")));
        assert_eq!(split_key("a/b.txt"), ("a/b.txt", None));
    }

    #[test]
    fn backend_type_from_str_rejects_unknown() {
        assert!(CacheBackendType::from_str("bogus").is_err());
        assert_eq!(
            CacheBackendType::from_str("FileSystem").unwrap(),
            CacheBackendType::Filesystem
        );
    }
}
