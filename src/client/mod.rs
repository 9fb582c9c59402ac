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

//! The top-level orchestrator composing a [`StorageProvider`], an optional
//! [`MetadataProvider`], and an optional [`CacheBackend`] into one profile's
//! read/write/list/delete surface. Grounded on
//! `original_source/.../client.py`.

pub mod file;
pub mod retry;

pub use file::ObjectFile;
pub use file::PosixFile;
pub use retry::RetryConfig;

use std::sync::Arc;

use crate::cache::CacheBackend;
use crate::cache::CacheSource;
use crate::error::Error;
use crate::error::Result;
use crate::manifest::MetadataProvider;
use crate::provider::DeleteOptions;
use crate::provider::DownloadSink;
use crate::provider::PutOptions;
use crate::provider::StorageProvider;
use crate::provider::UploadSource;
use crate::types::ObjectMetadata;
use crate::types::Range;

pub const MSC_PROTOCOL: &str = "msc://";

/// Configuration a [`StorageClient`] is built from: which profile it
/// represents and the components backing it.
pub struct StorageClientConfig {
    pub profile: String,
    pub storage_provider: Arc<dyn StorageProvider>,
    pub metadata_provider: Option<Arc<dyn MetadataProvider>>,
    pub cache_backend: Option<Arc<dyn CacheBackend>>,
    pub retry_config: Option<RetryConfig>,
    /// True when `storage_provider` is a POSIX backend — the cache layer is
    /// skipped in that case since the provider already reads straight off
    /// local disk, matching the original's `_is_posix_file_storage_provider`.
    pub is_posix: bool,
}

/// The client applications hold per profile. Composes a storage provider
/// with an optional manifest-backed metadata provider and an optional
/// local cache, applying retry only to `read`/`download_file` as the
/// original does.
pub struct StorageClient {
    profile: String,
    storage_provider: Arc<dyn StorageProvider>,
    metadata_provider: Option<Arc<dyn MetadataProvider>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    retry_config: Option<RetryConfig>,
    is_posix: bool,
}

impl StorageClient {
    pub fn new(config: StorageClientConfig) -> Self {
        Self {
            profile: config.profile,
            storage_provider: config.storage_provider,
            metadata_provider: config.metadata_provider,
            cache_backend: config.cache_backend,
            retry_config: config.retry_config,
            is_posix: config.is_posix,
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn storage_provider(&self) -> &Arc<dyn StorageProvider> {
        &self.storage_provider
    }

    fn is_cache_enabled(&self) -> bool {
        self.cache_backend.is_some() && !self.is_posix
    }

    fn build_cache_path(&self, path: &str) -> Result<String> {
        let cache_backend = match &self.cache_backend {
            Some(c) => c,
            None => return Ok(format!("{path}:None")),
        };
        if !cache_backend.use_etag() {
            return Ok(format!("{path}:None"));
        }

        let etag = if let Some(metadata_provider) = &self.metadata_provider {
            metadata_provider.get_object_metadata(path, false)?.etag
        } else {
            self.storage_provider.get_object_metadata(path, true)?.etag
        };
        Ok(format!("{path}:{}", etag.unwrap_or_else(|| "None".to_string())))
    }

    /// Resolves `path` through the metadata provider when present,
    /// returning an error if it reports the object doesn't exist.
    fn realpath_checked(&self, path: &str) -> Result<String> {
        if let Some(metadata_provider) = &self.metadata_provider {
            match metadata_provider.get_object_metadata(path, true) {
                Ok(_) => Ok(path.to_string()),
                Err(e) if e.kind() == crate::error::ErrorKind::NotFound => {
                    Err(Error::not_found(format!("the file at path '{path}' was not found")))
                }
                Err(e) => Err(e),
            }
        } else {
            Ok(path.to_string())
        }
    }

    pub fn read(&self, path: &str, byte_range: Option<Range>) -> Result<Vec<u8>> {
        retry::with_retry(self.retry_config.as_ref(), "read", || {
            let path = self.realpath_checked(path)?;

            if self.is_cache_enabled() {
                let cache_backend = self.cache_backend.as_ref().expect("checked is_cache_enabled");
                let cache_path = self.build_cache_path(&path)?;
                if let Some(data) = cache_backend.read(&cache_path) {
                    return Ok(match byte_range {
                        Some(range) => {
                            let start = range.offset as usize;
                            let end = (range.end() as usize).min(data.len());
                            data[start.min(data.len())..end].to_vec()
                        }
                        None => data,
                    });
                }
                if byte_range.is_none() {
                    let data = self.storage_provider.get_object(&path, None)?;
                    cache_backend.set(&cache_path, CacheSource::Bytes(&data))?;
                    return Ok(data);
                }
            }

            self.storage_provider.get_object(&path, byte_range)
        })
    }

    pub fn info(&self, path: &str) -> Result<ObjectMetadata> {
        if let Some(metadata_provider) = &self.metadata_provider {
            metadata_provider.get_object_metadata(path, false)
        } else {
            self.storage_provider.get_object_metadata(path, true)
        }
    }

    pub fn download_file(&self, remote_path: &str, local_path: &std::path::Path) -> Result<()> {
        retry::with_retry(self.retry_config.as_ref(), "download_file", || {
            if let Some(metadata_provider) = &self.metadata_provider {
                let real_path = self.realpath_checked(remote_path)?;
                let metadata = metadata_provider.get_object_metadata(remote_path, false)?;
                self.storage_provider
                    .download_file(&real_path, DownloadSink::Path(local_path), Some(&metadata))?;
            } else {
                self.storage_provider
                    .download_file(remote_path, DownloadSink::Path(local_path), None)?;
            }
            Ok(())
        })
    }

    pub fn upload_file(&self, remote_path: &str, local_path: &std::path::Path) -> Result<()> {
        if let Some(metadata_provider) = &self.metadata_provider {
            if metadata_provider.get_object_metadata(remote_path, true).is_ok() {
                return Err(Error::already_exists(format!(
                    "the file at path '{remote_path}' already exists; overwriting is not yet allowed when using a metadata provider"
                )));
            }
        }
        self.storage_provider
            .upload_file(remote_path, UploadSource::Path(local_path))?;
        if let Some(metadata_provider) = &self.metadata_provider {
            let metadata = self.storage_provider.get_object_metadata(remote_path, true)?;
            metadata_provider.add_file(remote_path, metadata)?;
        }
        Ok(())
    }

    pub fn write(&self, path: &str, body: &[u8]) -> Result<()> {
        if let Some(metadata_provider) = &self.metadata_provider {
            if metadata_provider.get_object_metadata(path, true).is_ok() {
                return Err(Error::already_exists(format!(
                    "the file at path '{path}' already exists; overwriting is not yet allowed when using a metadata provider"
                )));
            }
        }
        self.storage_provider.put_object(path, body, PutOptions::default())?;
        if let Some(metadata_provider) = &self.metadata_provider {
            let metadata = self.storage_provider.get_object_metadata(path, true)?;
            metadata_provider.add_file(path, metadata)?;
        }
        Ok(())
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        if let Some(metadata_provider) = &self.metadata_provider {
            metadata_provider.get_object_metadata(path, true).map_err(|e| {
                if e.kind() == crate::error::ErrorKind::NotFound {
                    Error::not_found(format!("the file at path '{path}' was not found"))
                } else {
                    e
                }
            })?;
            metadata_provider.remove_file(path)?;
        }

        self.storage_provider.delete_object(path, DeleteOptions::default())?;

        if self.is_cache_enabled() {
            let cache_backend = self.cache_backend.as_ref().expect("checked is_cache_enabled");
            let cache_path = self.build_cache_path(path)?;
            cache_backend.delete(&cache_path);
        }
        Ok(())
    }

    pub fn glob(&self, pattern: &str, include_url_prefix: bool) -> Result<Vec<String>> {
        let mut results = if let Some(metadata_provider) = &self.metadata_provider {
            metadata_provider.glob(pattern)?
        } else {
            self.storage_provider.glob(pattern)?
        };

        if include_url_prefix {
            let prefix = format!("{MSC_PROTOCOL}{}", self.profile);
            results = results
                .into_iter()
                .map(|path| format!("{}/{}", prefix.trim_end_matches('/'), path.trim_start_matches('/')))
                .collect();
        }
        Ok(results)
    }

    pub fn list(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        end_at: Option<&str>,
    ) -> Result<Vec<ObjectMetadata>> {
        if let Some(metadata_provider) = &self.metadata_provider {
            metadata_provider.list_objects(prefix, start_after, end_at, false)
        } else {
            self.storage_provider
                .list_objects(prefix, start_after, end_at, false)?
                .collect()
        }
    }

    /// Opens a file-like handle at `path`. The original dispatches to a
    /// bare `PosixFile` when the backing provider is itself POSIX, bypassing
    /// the object-store abstraction for a direct file handle; since this
    /// crate's `storage_provider` is a type-erased `Arc<dyn StorageProvider>`
    /// with no path-escape hatch, `open` always returns an [`ObjectFile`]
    /// here — it reads/writes through the same provider either way, just
    /// without that POSIX fast path.
    pub fn open(&self, path: &str, mode: &str) -> Result<ObjectFile<'_>> {
        if let Some(metadata_provider) = &self.metadata_provider {
            let exists = metadata_provider.get_object_metadata(path, true).is_ok();
            if mode.contains('w') && exists {
                return Err(Error::already_exists(format!("the file at path '{path}' already exists")));
            }
            if mode.contains('r') && !exists {
                return Err(Error::not_found(format!("the file at path '{path}' was not found")));
            }
        }
        ObjectFile::open(self, path, mode)
    }

    pub fn is_file(&self, path: &str) -> bool {
        if let Some(metadata_provider) = &self.metadata_provider {
            metadata_provider.get_object_metadata(path, true).is_ok()
        } else {
            self.storage_provider.is_file(path)
        }
    }

    pub fn is_empty(&self, path: &str) -> Result<bool> {
        let mut objects = self.storage_provider.list_objects(path, None, None, false)?;
        Ok(objects.next().is_none())
    }

    pub fn commit_updates(&self, prefix: Option<&str>) -> Result<()> {
        let Some(metadata_provider) = &self.metadata_provider else {
            return Ok(());
        };
        if let Some(prefix) = prefix {
            for obj in self.storage_provider.list_objects(prefix, None, None, false)? {
                let obj = obj?;
                let fullpath = format!("{}/{}", prefix.trim_end_matches('/'), obj.key);
                metadata_provider.add_file(&fullpath, obj)?;
            }
        }
        metadata_provider.commit_updates()
    }
}
