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

//! The normalized storage operation contract (spec §4.1) and the
//! [`BaseStorageProvider`] wrapper that gives every concrete backend
//! `base_path` rewriting, listing-key stripping, and glob expansion for free.

#[cfg(feature = "services-ais")]
pub mod ais;
#[cfg(feature = "services-azure")]
pub mod azure;
#[cfg(feature = "services-fs")]
pub mod posix;

#[cfg(any(feature = "services-s3", feature = "services-s8k"))]
pub mod s3;

#[cfg(feature = "services-gcs")]
pub mod gcs;
#[cfg(feature = "services-oci")]
pub mod oci;

use std::collections::HashMap;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::types::ObjectMetadata;
use crate::types::Range;
use crate::util;

/// Options accepted by [`StorageProvider::put_object`].
#[derive(Default, Clone, Debug)]
pub struct PutOptions {
    pub metadata: Option<HashMap<String, String>>,
    /// Succeed only if the object's current ETag matches.
    pub if_match: Option<String>,
    /// `Some("*")` requests create-if-absent.
    pub if_none_match: Option<String>,
}

impl PutOptions {
    pub fn if_none_match_any() -> Self {
        Self {
            if_none_match: Some("*".to_string()),
            ..Default::default()
        }
    }
}

/// Options accepted by [`StorageProvider::delete_object`].
#[derive(Default, Clone, Debug)]
pub struct DeleteOptions {
    pub if_match: Option<String>,
}

/// Source for [`StorageProvider::upload_file`]: either a local file to move/
/// stream from, or an arbitrary reader.
pub enum UploadSource<'a> {
    Path(&'a Path),
    Reader(&'a mut dyn Read),
}

/// Sink for [`StorageProvider::download_file`]: either a local file path or
/// an arbitrary writer.
pub enum DownloadSink<'a> {
    Path(&'a Path),
    Writer(&'a mut dyn Write),
}

/// The normalized, synchronous operation set every backend exposes.
///
/// Every path argument is relative to the provider's configured `base_path`;
/// see [`BaseStorageProvider`] for the wrapper that performs that rewriting
/// so concrete backends only ever see fully-qualified paths.
pub trait StorageProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn put_object(&self, path: &str, body: &[u8], opts: PutOptions) -> Result<()>;

    fn get_object(&self, path: &str, byte_range: Option<Range>) -> Result<Vec<u8>>;

    fn copy_object(&self, src_path: &str, dest_path: &str) -> Result<u64>;

    fn delete_object(&self, path: &str, opts: DeleteOptions) -> Result<()>;

    fn get_object_metadata(&self, path: &str, strict: bool) -> Result<ObjectMetadata>;

    #[allow(clippy::type_complexity)]
    fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        end_at: Option<&str>,
        include_directories: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectMetadata>> + Send>>;

    fn upload_file(&self, remote_path: &str, source: UploadSource<'_>) -> Result<u64>;

    fn download_file(
        &self,
        remote_path: &str,
        sink: DownloadSink<'_>,
        metadata: Option<&ObjectMetadata>,
    ) -> Result<u64>;

    fn glob(&self, pattern: &str) -> Result<Vec<String>>;

    fn is_file(&self, path: &str) -> bool {
        match self.get_object_metadata(path, true) {
            Ok(meta) => !meta.is_directory(),
            Err(_) => false,
        }
    }
}

/// The hooks a concrete backend implements. Every path has already been
/// rewritten through `base_path` by [`BaseStorageProvider`]; backends never
/// see logical (caller-facing) paths.
///
/// Grounded on `original_source/.../providers/base.py`'s private
/// `_put_object`/`_get_object`/... methods.
pub trait ProviderBackend: Send + Sync {
    fn provider_name(&self) -> &'static str;

    fn put_object(&self, path: &str, body: &[u8], opts: &PutOptions) -> Result<()>;

    fn get_object(&self, path: &str, byte_range: Option<Range>) -> Result<Vec<u8>>;

    fn copy_object(&self, src_path: &str, dest_path: &str) -> Result<u64>;

    fn delete_object(&self, path: &str, opts: &DeleteOptions) -> Result<()>;

    fn get_object_metadata(&self, path: &str, strict: bool) -> Result<ObjectMetadata>;

    #[allow(clippy::type_complexity)]
    fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        end_at: Option<&str>,
        include_directories: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectMetadata>> + Send>>;

    fn upload_file(&self, remote_path: &str, source: UploadSource<'_>) -> Result<u64>;

    fn download_file(
        &self,
        remote_path: &str,
        sink: DownloadSink<'_>,
        metadata: Option<&ObjectMetadata>,
    ) -> Result<u64>;
}

/// Wraps a [`ProviderBackend`] with `base_path` rewriting, listing-key
/// stripping, and glob expansion, so backends only implement the raw
/// per-object operations.
pub struct BaseStorageProvider<B> {
    base_path: String,
    backend: B,
}

impl<B: ProviderBackend> BaseStorageProvider<B> {
    pub fn new(base_path: impl Into<String>, backend: B) -> Self {
        Self {
            base_path: base_path.into(),
            backend,
        }
    }

    fn realpath(&self, path: &str) -> String {
        util::join_base_path(&self.base_path, path)
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: ProviderBackend> StorageProvider for BaseStorageProvider<B> {
    fn provider_name(&self) -> &str {
        self.backend.provider_name()
    }

    fn put_object(&self, path: &str, body: &[u8], opts: PutOptions) -> Result<()> {
        let path = self.realpath(path);
        self.backend.put_object(&path, body, &opts)
    }

    fn get_object(&self, path: &str, byte_range: Option<Range>) -> Result<Vec<u8>> {
        let path = self.realpath(path);
        self.backend.get_object(&path, byte_range)
    }

    fn copy_object(&self, src_path: &str, dest_path: &str) -> Result<u64> {
        let src_path = self.realpath(src_path);
        let dest_path = self.realpath(dest_path);
        self.backend.copy_object(&src_path, &dest_path)
    }

    fn delete_object(&self, path: &str, opts: DeleteOptions) -> Result<()> {
        let path = self.realpath(path);
        self.backend.delete_object(&path, &opts)
    }

    fn get_object_metadata(&self, path: &str, strict: bool) -> Result<ObjectMetadata> {
        let path = self.realpath(path);
        self.backend.get_object_metadata(&path, strict)
    }

    fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        end_at: Option<&str>,
        include_directories: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectMetadata>> + Send>> {
        if let (Some(a), Some(b)) = (start_after, end_at) {
            if a >= b {
                return Err(Error::new(
                    ErrorKind::ConfigInvalid,
                    format!("start_after ({a}) must be before end_at ({b})"),
                ));
            }
        }

        let real_prefix = self.realpath(prefix);
        let inner = self
            .backend
            .list_objects(&real_prefix, start_after, end_at, include_directories)?;

        if self.base_path.is_empty() {
            return Ok(inner);
        }

        let (_, base_prefix) = util::split_path(&self.base_path);
        let base_prefix = base_prefix.to_string();
        let stripped = inner.map(move |item| {
            item.map(|mut object| {
                if !base_prefix.is_empty() {
                    if let Some(idx) = object.key.find(base_prefix.as_str()) {
                        object.key.replace_range(idx..idx + base_prefix.len(), "");
                    }
                }
                object.key = object.key.trim_start_matches('/').to_string();
                object
            })
        });
        Ok(Box::new(stripped))
    }

    fn upload_file(&self, remote_path: &str, source: UploadSource<'_>) -> Result<u64> {
        let remote_path = self.realpath(remote_path);
        self.backend.upload_file(&remote_path, source)
    }

    fn download_file(
        &self,
        remote_path: &str,
        sink: DownloadSink<'_>,
        metadata: Option<&ObjectMetadata>,
    ) -> Result<u64> {
        let remote_path = self.realpath(remote_path);
        self.backend.download_file(&remote_path, sink, metadata)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let prefix = util::extract_prefix_from_glob(pattern);
        if !self.base_path.is_empty() {
            let keys: Vec<String> = self
                .list_objects(&prefix, None, None, false)?
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .map(|o| o.key)
                .collect();
            util::glob_match(&keys, pattern)
        } else {
            let (bucket, pattern) = util::split_path(pattern);
            let bucket = bucket.to_string();
            let keys: Vec<String> = self
                .list_objects(&prefix, None, None, false)?
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .map(|o| o.key)
                .collect();
            Ok(util::glob_match(&keys, pattern)?
                .into_iter()
                .map(|k| format!("{bucket}/{k}"))
                .collect())
        }
    }

    fn is_file(&self, path: &str) -> bool {
        match self.get_object_metadata(path, true) {
            Ok(meta) => !meta.is_directory(),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(_) => false,
        }
    }
}

/// Multipart upload defaults (spec §4.1 "Multipart thresholds").
#[derive(Copy, Clone, Debug)]
pub struct MultipartConfig {
    pub threshold_bytes: u64,
    pub part_size_bytes: u64,
    pub max_concurrency: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: 512 * 1024 * 1024,
            part_size_bytes: 256 * 1024 * 1024,
            max_concurrency: 16,
        }
    }
}

/// Builder contract for constructing a provider from a string-keyed config
/// map, mirroring the teacher's `Builder` trait shape (`SCHEME`, `from_map`,
/// `build`). Used by [`crate::registry`] to register provider constructors
/// without runtime reflection.
pub trait Builder: Default {
    const SCHEME: crate::types::Scheme;
    type Provider: StorageProvider + 'static;

    fn from_map(map: HashMap<String, String>) -> Result<Self>
    where
        Self: Sized;

    fn build(self) -> Result<Self::Provider>;
}
