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

//! Storage-provider-backed cache, for substrates like S3 Express where the
//! cache itself lives behind a [`StorageProvider`] rather than local disk.
//! Grounded on
//! `original_source/.../caching/cache_backend.py::StorageProviderBackend`.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use crate::cache::eviction;
use crate::cache::CacheBackend;
use crate::cache::CacheConfig;
use crate::cache::CacheItem;
use crate::cache::CacheSource;
use crate::error::Error;
use crate::provider::PutOptions;
use crate::provider::StorageProvider;

/// Only `no_eviction` is supported today: object-tagging isn't available
/// on every backend this substrate targets, so proactive size-based
/// eviction is left to an out-of-band sweep instead of being modeled here.
pub struct StorageProviderBackend {
    profile: String,
    cache_dir: String,
    max_cache_size: u64,
    use_etag: bool,
    storage_provider: Arc<dyn StorageProvider>,
}

impl StorageProviderBackend {
    pub fn new(
        profile: impl Into<String>,
        cache_config: &CacheConfig,
        storage_provider: Arc<dyn StorageProvider>,
    ) -> crate::error::Result<Self> {
        let policy = cache_config.eviction_policy.policy.to_lowercase();
        if policy != eviction::NO_EVICTION {
            return Err(Error::config_invalid(format!(
                "invalid eviction policy for storage_provider cache backend: {policy}. Only no_eviction is supported"
            )));
        }
        let profile = profile.into();
        let cache_dir = format!("{}/{}", cache_config.backend.cache_path.trim_end_matches('/'), profile);
        Ok(Self {
            profile,
            cache_dir,
            max_cache_size: cache_config.size_bytes()?,
            use_etag: cache_config.use_etag,
            storage_provider,
        })
    }

    fn cache_path(&self, key: &str) -> String {
        let (path, _) = crate::cache::split_key(key);
        format!("{}/{}", self.cache_dir, path)
    }

    /// Scans for objects over the size budget or tagged for deletion and
    /// removes them. Deliberately not wired into a background timer here:
    /// callers on this substrate evict at wider (e.g. hourly) intervals
    /// since most backing stores lack native object tagging either.
    pub fn trigger_eviction(&self) {
        let files: Vec<_> = match self.storage_provider.list_objects(&self.cache_dir, None, None, false) {
            Ok(iter) => iter.filter_map(|r| r.ok()).collect(),
            Err(e) => {
                log::error!("failed to list cache objects for eviction: {e}");
                return;
            }
        };

        let mut current_size = 0u64;
        let mut items = Vec::new();
        for obj in &files {
            if obj.content_length == 0 {
                continue;
            }
            let metadata = match self.storage_provider.get_object_metadata(&obj.key, true) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata
                .metadata
                .as_ref()
                .and_then(|m| m.get("to-be-deleted"))
                .is_some()
            {
                let _ = self.storage_provider.delete_object(&obj.key, Default::default());
                continue;
            }
            current_size += obj.content_length;
            items.push(CacheItem {
                file_path: obj.key.clone().into(),
                file_size: obj.content_length,
                atime: std::time::UNIX_EPOCH,
                mtime: metadata.last_modified.into(),
                hashed_key: obj.key.clone(),
            });
        }

        if current_size <= self.max_cache_size {
            return;
        }

        let policy = eviction::FifoEvictionPolicy;
        for item in policy.sort_items(items) {
            if current_size <= self.max_cache_size {
                break;
            }
            if self
                .storage_provider
                .delete_object(&item.hashed_key, Default::default())
                .is_ok()
            {
                current_size = current_size.saturating_sub(item.file_size);
            }
        }
    }
}

impl CacheBackend for StorageProviderBackend {
    fn use_etag(&self) -> bool {
        self.use_etag
    }

    fn max_cache_size(&self) -> u64 {
        self.max_cache_size
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        if !self.contains(key) {
            return None;
        }
        self.storage_provider.get_object(&self.cache_path(key), None).ok()
    }

    fn open(&self, key: &str) -> Option<crate::cache::CachedReader> {
        let data = self.read(key)?;
        Some(Box::new(Cursor::new(data)))
    }

    fn set(&self, key: &str, source: CacheSource<'_>) -> crate::error::Result<()> {
        let (_, etag) = crate::cache::split_key(key);
        let data = match source {
            CacheSource::Bytes(b) => b.to_vec(),
            CacheSource::Path(p) => std::fs::read(p)?,
        };
        if data.len() as u64 > self.max_cache_size {
            return Err(Error::config_invalid(format!(
                "file size ({} bytes) exceeds maximum cache size ({} bytes)",
                data.len(),
                self.max_cache_size
            )));
        }

        let mut metadata = HashMap::new();
        if let Some(etag) = etag {
            metadata.insert("etag".to_string(), etag.to_string());
        }
        let opts = PutOptions {
            metadata: if metadata.is_empty() { None } else { Some(metadata) },
            ..Default::default()
        };
        self.storage_provider.put_object(&self.cache_path(key), &data, opts)
    }

    fn contains(&self, key: &str) -> bool {
        let (_, source_etag) = crate::cache::split_key(key);
        let metadata = match self.storage_provider.get_object_metadata(&self.cache_path(key), true) {
            Ok(m) => m,
            Err(_) => return false,
        };
        if !self.use_etag {
            return true;
        }
        metadata
            .metadata
            .as_ref()
            .and_then(|m| m.get("etag"))
            .map(|stored| Some(stored.as_str()) == source_etag)
            .unwrap_or(false)
    }

    fn delete(&self, key: &str) {
        let (path, _) = crate::cache::split_key(key);
        let _ = self
            .storage_provider
            .delete_object(&self.cache_path(path), Default::default());
    }

    fn cache_size(&self) -> u64 {
        match self.storage_provider.list_objects(&self.cache_dir, None, None, false) {
            Ok(iter) => iter.filter_map(|r| r.ok()).map(|o| o.content_length).sum(),
            Err(e) => {
                log::error!("failed to compute cache size for profile {}: {e}", self.profile);
                0
            }
        }
    }

    /// Always succeeds: this substrate evicts lazily via
    /// [`Self::trigger_eviction`] rather than on a per-call timer.
    fn refresh_cache(&self) -> bool {
        true
    }
}
