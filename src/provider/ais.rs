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

//! NVIDIA AIStore backend.
//!
//! Grounded on spec.md §4.1 ("no copy, no conditional ops, no native
//! start-after; client-side filtering enforces contract"). AIStore exposes
//! a plain REST API with no request-signing scheme, so this backend skips
//! the `reqsign` stack the cloud providers use.

use std::collections::HashMap;
use std::io::Read;
use std::io::Write;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::provider::BaseStorageProvider;
use crate::provider::Builder;
use crate::provider::DeleteOptions;
use crate::provider::DownloadSink;
use crate::provider::ProviderBackend;
use crate::provider::PutOptions;
use crate::provider::UploadSource;
use crate::types::ObjectMetadata;
use crate::types::Range;
use crate::types::Scheme;

pub struct AisBackend {
    bucket: String,
    endpoint: String,
    client: Client,
}

impl AisBackend {
    /// `key` arrives as `<bucket>/<rest>` (see
    /// `BaseStorageProvider::realpath`); the bucket is already part of the
    /// request URL, so strip it back off.
    fn strip_bucket<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(&self.bucket)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(key)
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/v1/objects/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket,
            self.strip_bucket(key)
        )
    }

    fn classify(&self, status: StatusCode, operation: &'static str, key: &str) -> Error {
        let kind = match status {
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            _ => ErrorKind::Unexpected,
        };
        Error::new(kind, format!("AIStore {operation} failed"))
            .with_operation(operation)
            .with_context("bucket", self.bucket.clone())
            .with_context("key", key.to_string())
            .with_context("status_code", status.as_u16().to_string())
            .with_retryable(status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS)
    }
}

impl ProviderBackend for AisBackend {
    fn provider_name(&self) -> &'static str {
        "ais"
    }

    fn put_object(&self, path: &str, body: &[u8], opts: &PutOptions) -> Result<()> {
        if opts.if_match.is_some() || opts.if_none_match.is_some() {
            return Err(Error::unsupported("AIStore does not support conditional writes")
                .with_operation("put_object"));
        }
        let resp = self
            .client
            .put(self.object_url(path))
            .body(body.to_vec())
            .send()
            .map_err(|e| Error::retryable("AIStore PUT request failed").set_source(e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(self.classify(resp.status(), "put_object", path))
        }
    }

    fn get_object(&self, path: &str, byte_range: Option<Range>) -> Result<Vec<u8>> {
        let mut req = self.client.get(self.object_url(path));
        if let Some(range) = byte_range {
            req = req.header(
                reqwest::header::RANGE,
                format!("bytes={}-{}", range.offset, range.end().saturating_sub(1)),
            );
        }
        let resp = req
            .send()
            .map_err(|e| Error::retryable("AIStore GET request failed").set_source(e))?;
        let status = resp.status();
        if status.is_success() {
            resp.bytes()
                .map(|b| b.to_vec())
                .map_err(|e| Error::retryable("failed reading AIStore response body").set_source(e))
        } else {
            Err(self.classify(status, "get_object", path))
        }
    }

    fn copy_object(&self, _src_path: &str, _dest_path: &str) -> Result<u64> {
        Err(Error::unsupported("AIStore does not support server-side copy").with_operation("copy_object"))
    }

    fn delete_object(&self, path: &str, opts: &DeleteOptions) -> Result<()> {
        if opts.if_match.is_some() {
            return Err(Error::unsupported("AIStore does not support conditional deletes")
                .with_operation("delete_object"));
        }
        let resp = self
            .client
            .delete(self.object_url(path))
            .send()
            .map_err(|e| Error::retryable("AIStore DELETE request failed").set_source(e))?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(self.classify(resp.status(), "delete_object", path))
        }
    }

    fn get_object_metadata(&self, path: &str, _strict: bool) -> Result<ObjectMetadata> {
        let resp = self
            .client
            .head(self.object_url(path))
            .send()
            .map_err(|e| Error::retryable("AIStore HEAD request failed").set_source(e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(self.classify(status, "get_object_metadata", path));
        }
        let content_length = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(ObjectMetadata::new(path, content_length, chrono::Utc::now()))
    }

    fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        end_at: Option<&str>,
        include_directories: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectMetadata>> + Send>> {
        // AIStore has no native start-after cursor, so the whole prefix is
        // listed and start_after/end_at are enforced client-side, per
        // spec.md §4.1.
        let url = format!(
            "{}/v1/buckets/{}?prefix={}",
            self.endpoint.trim_end_matches('/'),
            self.bucket,
            percent_encoding::utf8_percent_encode(self.strip_bucket(prefix), percent_encoding::NON_ALPHANUMERIC)
        );
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::retryable("AIStore LIST request failed").set_source(e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(self.classify(status, "list_objects", prefix));
        }

        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Entry {
            name: String,
            size: u64,
        }
        let entries: Vec<Entry> = resp
            .json()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to parse AIStore list response").set_source(e))?;

        let start_after = start_after.map(|s| s.to_string());
        let end_at = end_at.map(|s| s.to_string());
        let mut seen_dirs = std::collections::HashSet::new();
        let mut out = Vec::new();

        let mut sorted = entries;
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in sorted {
            if let Some(sa) = &start_after {
                if &entry.name <= sa {
                    continue;
                }
            }
            if let Some(end) = &end_at {
                if &entry.name > end {
                    break;
                }
            }
            if include_directories {
                if let Some(rest) = entry.name.strip_prefix(prefix) {
                    if let Some(slash) = rest.find('/') {
                        let dir_key = format!("{prefix}{}", &rest[..slash]);
                        if seen_dirs.insert(dir_key.clone()) {
                            out.push(ObjectMetadata::directory(
                                dir_key,
                                chrono::DateTime::<chrono::Utc>::MIN_UTC,
                            ));
                        }
                        continue;
                    }
                }
            }
            out.push(ObjectMetadata::new(entry.name, entry.size, chrono::Utc::now()));
        }

        Ok(Box::new(out.into_iter().map(Ok)))
    }

    fn upload_file(&self, remote_path: &str, source: UploadSource<'_>) -> Result<u64> {
        let body = match source {
            UploadSource::Path(p) => std::fs::read(p)?,
            UploadSource::Reader(r) => {
                let mut buf = Vec::new();
                r.read_to_end(&mut buf)?;
                buf
            }
        };
        let len = body.len() as u64;
        self.put_object(remote_path, &body, &PutOptions::default())?;
        Ok(len)
    }

    fn download_file(
        &self,
        remote_path: &str,
        sink: DownloadSink<'_>,
        _metadata: Option<&ObjectMetadata>,
    ) -> Result<u64> {
        let body = self.get_object(remote_path, None)?;
        let len = body.len() as u64;
        match sink {
            DownloadSink::Path(p) => {
                if let Some(dir) = p.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                std::fs::write(p, &body)?;
            }
            DownloadSink::Writer(w) => w.write_all(&body)?,
        }
        Ok(len)
    }
}

/// Builder for the AIStore provider.
#[derive(Default)]
pub struct AisBuilder {
    base_path: Option<String>,
    endpoint: Option<String>,
}

impl AisBuilder {
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

impl Builder for AisBuilder {
    const SCHEME: Scheme = Scheme::Ais;
    type Provider = BaseStorageProvider<AisBackend>;

    fn from_map(mut map: HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            base_path: map.remove("base_path"),
            endpoint: map.remove("endpoint"),
        })
    }

    fn build(self) -> Result<Self::Provider> {
        let base_path = self
            .base_path
            .ok_or_else(|| Error::config_invalid("missing base_path").with_operation("Builder::build"))?;
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::config_invalid("missing endpoint").with_operation("Builder::build"))?;
        let (bucket, _) = crate::util::split_path(&base_path);

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| Error::new(ErrorKind::ConfigInvalid, "failed to build HTTP client").set_source(e))?;

        let backend = AisBackend {
            bucket: bucket.to_string(),
            endpoint,
            client,
        };
        Ok(BaseStorageProvider::new(base_path, backend))
    }
}
