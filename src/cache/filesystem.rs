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

//! Local filesystem cache backend. Grounded on
//! `original_source/.../caching/cache_backend.py::FileSystemBackend`.

use std::fs::File;
use std::io::Read as _;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;

use fs4::FileExt;

use crate::cache::eviction;
use crate::cache::CacheBackend;
use crate::cache::CacheConfig;
use crate::cache::CacheItem;
use crate::cache::CacheSource;

const DEFAULT_FILE_LOCK_TIMEOUT: Duration = Duration::from_secs(600);

/// Caches remote reads under `<cache_path>/<profile>/...`, mirroring the
/// remote key hierarchy on local disk.
pub struct FilesystemBackend {
    profile: String,
    cache_dir: PathBuf,
    cache_path: PathBuf,
    max_cache_size: u64,
    use_etag: bool,
    policy: Box<dyn eviction::EvictionPolicy>,
    policy_name: String,
    refresh_interval: Duration,
    last_refresh: Mutex<Instant>,
    refresh_lock_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(profile: impl Into<String>, cache_config: &CacheConfig) -> crate::error::Result<Self> {
        let profile = profile.into();
        let policy_name = cache_config.eviction_policy.policy.to_lowercase();
        if !matches!(
            policy_name.as_str(),
            eviction::LRU | eviction::FIFO | eviction::RANDOM | eviction::NO_EVICTION
        ) {
            return Err(crate::error::Error::config_invalid(format!(
                "invalid eviction policy: {policy_name}"
            )));
        }
        let policy = eviction::create(&policy_name)?;

        let cache_dir = std::fs::canonicalize(&cache_config.backend.cache_path)
            .unwrap_or_else(|_| PathBuf::from(&cache_config.backend.cache_path));
        let cache_path = cache_dir.join(&profile);
        std::fs::create_dir_all(&cache_path)?;

        let backend = Self {
            max_cache_size: cache_config.size_bytes()?,
            use_etag: cache_config.use_etag,
            policy,
            policy_name,
            refresh_interval: Duration::from_secs(cache_config.eviction_policy.refresh_interval_secs),
            last_refresh: Mutex::new(Instant::now()),
            refresh_lock_path: cache_path.join(".cache_refresh.lock"),
            cache_dir,
            cache_path,
            profile,
        };
        backend.refresh_cache();
        Ok(backend)
    }

    fn cache_file_path(&self, key: &str) -> PathBuf {
        let (path, _) = crate::cache::split_key(key);
        self.cache_path.join(path)
    }

    fn should_refresh(&self) -> bool {
        let last = *self.last_refresh.lock().expect("lock poisoned");
        last.elapsed() > self.refresh_interval
    }

    fn update_access_time(&self, path: &Path) {
        if let Ok(meta) = std::fs::metadata(path) {
            let mtime = meta.modified().unwrap_or(SystemTime::now());
            let _ = filetime::set_file_times(
                path,
                filetime::FileTime::now(),
                filetime::FileTime::from_system_time(mtime),
            );
        }
    }

    fn delete_file(&self, rel_path: &str) {
        let abs_path = self.cache_path.join(rel_path);
        let _ = std::fs::remove_file(&abs_path);
        if let Some(dir) = abs_path.parent() {
            let lock_name = format!(".{}.lock", file_basename(&abs_path));
            let _ = std::fs::remove_file(dir.join(lock_name));
        }
    }

    fn evict_files(&self) {
        log::debug!("starting cache eviction sweep for profile {}", self.profile);
        let mut items = Vec::new();
        for entry in walkdir::WalkDir::new(&self.cache_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(".lock") || name.starts_with('.') {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.cache_path)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();
            if let Some(item) = CacheItem::from_path(entry.path(), rel) {
                if item.file_size > 0 {
                    items.push(item);
                }
            }
        }

        let sorted = self.policy.sort_items(items);
        let mut cache_size: u64 = sorted.iter().map(|i| i.file_size).sum();
        log::debug!("cache size {cache_size}, max allowed {}", self.max_cache_size);

        let mut remaining = sorted;
        remaining.reverse();
        while cache_size > self.max_cache_size {
            let Some(oldest) = remaining.pop() else { break };
            cache_size = cache_size.saturating_sub(oldest.file_size);
            log::debug!("evicting {} ({} bytes)", oldest.hashed_key, oldest.file_size);
            self.delete_file(&oldest.hashed_key);
        }
    }
}

fn file_basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl CacheBackend for FilesystemBackend {
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
        let file_path = self.cache_file_path(key);
        let mut buf = Vec::new();
        File::open(&file_path).ok()?.read_to_end(&mut buf).ok()?;
        self.update_access_time(&file_path);
        Some(buf)
    }

    fn open(&self, key: &str) -> Option<crate::cache::CachedReader> {
        if !self.contains(key) {
            return None;
        }
        let file_path = self.cache_file_path(key);
        let file = File::open(&file_path).ok()?;
        self.update_access_time(&file_path);
        Some(Box::new(file))
    }

    fn set(&self, key: &str, source: CacheSource<'_>) -> crate::error::Result<()> {
        let (_, etag) = crate::cache::split_key(key);
        let file_path = self.cache_file_path(key);
        if let Some(dir) = file_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        match source {
            CacheSource::Path(src) => {
                std::fs::rename(src, &file_path).or_else(|_| {
                    std::fs::copy(src, &file_path).map(|_| ())?;
                    std::fs::remove_file(src)
                })?;
            }
            CacheSource::Bytes(data) => {
                let dir = file_path.parent().unwrap_or(&self.cache_path);
                let mut tmp = tempfile::Builder::new().prefix(".").tempfile_in(dir)?;
                tmp.write_all(data)?;
                tmp.persist(&file_path).map_err(|e| e.error)?;
            }
        }
        set_owner_rw_only(&file_path);

        if let Some(etag) = etag {
            if let Err(e) = xattr::set(&file_path, "user.etag", etag.as_bytes()) {
                log::warn!("failed to set xattr on {}: {e}", file_path.display());
            }
        }

        self.update_access_time(&file_path);

        if self.should_refresh() {
            self.refresh_cache();
        }
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        let (_, source_etag) = crate::cache::split_key(key);
        let file_path = self.cache_file_path(key);
        if !file_path.exists() {
            return false;
        }
        if !self.use_etag {
            return true;
        }
        match xattr::get(&file_path, "user.etag") {
            Ok(Some(stored)) => {
                let stored = String::from_utf8_lossy(&stored);
                Some(stored.as_ref()) == source_etag
            }
            _ => false,
        }
    }

    fn delete(&self, key: &str) {
        let (path, _) = crate::cache::split_key(key);
        self.delete_file(path);
    }

    fn cache_size(&self) -> u64 {
        let mut total = 0u64;
        for entry in walkdir::WalkDir::new(&self.cache_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                let name = entry.file_name().to_string_lossy();
                if name.ends_with(".lock") {
                    continue;
                }
                if let Ok(meta) = entry.metadata() {
                    total += meta.len();
                }
            }
        }
        total
    }

    fn refresh_cache(&self) -> bool {
        if self.policy_name == eviction::NO_EVICTION {
            *self.last_refresh.lock().expect("lock poisoned") = Instant::now();
            return true;
        }

        let Ok(lock_file) = File::create(&self.refresh_lock_path) else {
            return false;
        };
        if lock_file.try_lock_exclusive().is_err() {
            return false;
        }
        self.evict_files();
        let _ = lock_file.unlock();
        *self.last_refresh.lock().expect("lock poisoned") = Instant::now();
        true
    }
}

#[allow(unused)]
pub(crate) const DEFAULT_LOCK_TIMEOUT: Duration = DEFAULT_FILE_LOCK_TIMEOUT;

#[cfg(unix)]
fn set_owner_rw_only(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_owner_rw_only(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> CacheConfig {
        CacheConfig {
            size: "10M".to_string(),
            use_etag: true,
            eviction_policy: crate::cache::EvictionPolicyConfig {
                policy: "fifo".to_string(),
                refresh_interval_secs: 300,
            },
            backend: crate::cache::CacheBackendConfig {
                cache_path: dir.to_string_lossy().into_owned(),
                storage_provider_profile: None,
            },
        }
    }

    #[test]
    fn set_then_read_round_trips_with_etag() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new("default", &config(dir.path())).unwrap();
        backend.set("a/b.txt:etag1", CacheSource::Bytes(b"hello")).unwrap();
        assert!(backend.contains("a/b.txt:etag1"));
        assert!(!backend.contains("a/b.txt:etag2"));
        assert_eq!(backend.read("a/b.txt:etag1").unwrap(), b"hello");
    }

    #[test]
    fn delete_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new("default", &config(dir.path())).unwrap();
        backend.set("x.bin", CacheSource::Bytes(b"data")).unwrap();
        assert!(backend.contains("x.bin"));
        backend.delete("x.bin");
        assert!(!backend.contains("x.bin"));
    }

    #[test]
    fn eviction_sweep_enforces_max_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.size = "10M".to_string();
        let backend = FilesystemBackend::new("default", &cfg).unwrap();
        backend.set("big.bin", CacheSource::Bytes(&vec![0u8; 1024])).unwrap();
        backend.refresh_cache();
        assert!(backend.cache_size() <= backend.max_cache_size());
    }
}
