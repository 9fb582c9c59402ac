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

//! Google Cloud Storage backend.
//!
//! Grounded directly on the teacher's `core/src/services/gcs/backend.rs`:
//! same `GoogleCredentialLoader`/`GoogleTokenLoader`/`GoogleSigner` signing
//! stack, the same `GetObjectJsonResponse`-style `#[serde(rename_all =
//! "camelCase")]` JSON body, adapted to blocking dispatch. Spec.md §4.1
//! documents GCS's load-bearing quirk: ETags are generation numbers, and a
//! non-numeric `if_match` is a `Runtime` error, not `PreconditionFailed`.

use std::collections::HashMap;
use std::io::Read;
use std::io::Write;

use reqsign::GoogleCredentialLoader;
use reqsign::GoogleSigner;
use reqsign::GoogleTokenLoader;
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

/// JSON body of a GCS object resource, as returned by `objects.get`/`.list`.
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct GetObjectJsonResponse {
    name: String,
    size: String,
    updated: String,
    generation: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ListObjectsJsonResponse {
    items: Vec<GetObjectJsonResponse>,
    prefixes: Vec<String>,
}

pub struct GcsBackend {
    bucket: String,
    client: Client,
    signer: GoogleSigner,
    cred_loader: GoogleCredentialLoader,
    token_loader: GoogleTokenLoader,
}

impl GcsBackend {
    /// `key` arrives as `<bucket>/<rest>` (see `BaseStorageProvider::realpath`);
    /// the bucket is already part of the request URL, so strip it back off.
    fn strip_bucket<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(&self.bucket)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(key)
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o/{}",
            self.bucket,
            percent_encoding::utf8_percent_encode(self.strip_bucket(key), percent_encoding::NON_ALPHANUMERIC)
        )
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.bucket,
            percent_encoding::utf8_percent_encode(self.strip_bucket(key), percent_encoding::NON_ALPHANUMERIC)
        )
    }

    fn download_url(&self, key: &str) -> String {
        format!("{}?alt=media", self.object_url(key))
    }

    fn sign(&self, req: &mut reqwest::blocking::Request) -> Result<()> {
        let cred = if let Some(cred) = self
            .cred_loader
            .load()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to load GCS credential").set_source(e))?
        {
            cred
        } else {
            self.token_loader
                .load()
                .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to load GCS token").set_source(e))?
                .ok_or_else(|| Error::config_invalid("no GCS credentials available"))?
        };
        self.signer
            .sign(req, &cred)
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to sign GCS request").set_source(e))
    }

    fn classify(&self, status: StatusCode, operation: &'static str, key: &str) -> Error {
        let kind = match status {
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::PRECONDITION_FAILED => ErrorKind::PreconditionFailed,
            _ => ErrorKind::Unexpected,
        };
        Error::new(kind, format!("GCS {operation} failed"))
            .with_operation(operation)
            .with_context("bucket", self.bucket.clone())
            .with_context("key", key.to_string())
            .with_context("status_code", status.as_u16().to_string())
            .with_retryable(status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS)
    }

    fn object_to_metadata(obj: &GetObjectJsonResponse) -> ObjectMetadata {
        let last_modified = chrono::DateTime::parse_from_rfc3339(&obj.updated)
            .map(|d| d.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now());
        let mut meta = ObjectMetadata::new(obj.name.clone(), obj.size.parse().unwrap_or(0), last_modified);
        meta.etag = Some(obj.generation.clone());
        meta
    }
}

impl ProviderBackend for GcsBackend {
    fn provider_name(&self) -> &'static str {
        "gcs"
    }

    fn put_object(&self, path: &str, body: &[u8], opts: &PutOptions) -> Result<()> {
        let mut req = self
            .client
            .post(self.upload_url(path))
            .body(body.to_vec())
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build GCS upload request").set_source(e))?;

        // GCS conditional writes use generation-number query parameters, not
        // If-Match headers; a non-numeric if_match is a documented provider
        // quirk (spec.md §4.1) that surfaces as Runtime, not PreconditionFailed.
        if let Some(generation) = &opts.if_match {
            if generation.parse::<u64>().is_err() {
                return Err(Error::new(
                    ErrorKind::Unexpected,
                    format!("GCS if_match must be a numeric generation, got {generation}"),
                )
                .with_operation("put_object"));
            }
            let url = format!("{}&ifGenerationMatch={generation}", req.url());
            *req.url_mut() = url.parse().expect("valid URL");
        }
        if opts.if_none_match.is_some() {
            let url = format!("{}&ifGenerationMatch=0", req.url());
            *req.url_mut() = url.parse().expect("valid URL");
        }

        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("GCS upload request failed").set_source(e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(self.classify(resp.status(), "put_object", path))
        }
    }

    fn get_object(&self, path: &str, byte_range: Option<Range>) -> Result<Vec<u8>> {
        let mut req = self
            .client
            .get(self.download_url(path))
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build GCS download request").set_source(e))?;
        if let Some(range) = byte_range {
            let header = format!("bytes={}-{}", range.offset, range.end().saturating_sub(1));
            req.headers_mut()
                .insert(reqwest::header::RANGE, header.parse().expect("valid header value"));
        }
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("GCS download request failed").set_source(e))?;
        let status = resp.status();
        if status.is_success() {
            resp.bytes()
                .map(|b| b.to_vec())
                .map_err(|e| Error::retryable("failed reading GCS response body").set_source(e))
        } else {
            Err(self.classify(status, "get_object", path))
        }
    }

    fn copy_object(&self, src_path: &str, dest_path: &str) -> Result<u64> {
        let meta = self.get_object_metadata(src_path, true)?;
        let url = format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o/{}/copyTo/b/{}/o/{}",
            self.bucket,
            percent_encoding::utf8_percent_encode(self.strip_bucket(src_path), percent_encoding::NON_ALPHANUMERIC),
            self.bucket,
            percent_encoding::utf8_percent_encode(self.strip_bucket(dest_path), percent_encoding::NON_ALPHANUMERIC)
        );
        let mut req = self
            .client
            .post(url)
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build GCS copy request").set_source(e))?;
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("GCS copy request failed").set_source(e))?;
        if resp.status().is_success() {
            Ok(meta.content_length)
        } else {
            Err(self.classify(resp.status(), "copy_object", src_path))
        }
    }

    fn delete_object(&self, path: &str, opts: &DeleteOptions) -> Result<()> {
        let mut url = self.object_url(path);
        if let Some(generation) = &opts.if_match {
            url = format!("{url}?ifGenerationMatch={generation}");
        }
        let mut req = self
            .client
            .delete(url)
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build GCS delete request").set_source(e))?;
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("GCS delete request failed").set_source(e))?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(self.classify(resp.status(), "delete_object", path))
        }
    }

    fn get_object_metadata(&self, path: &str, _strict: bool) -> Result<ObjectMetadata> {
        let mut req = self
            .client
            .get(self.object_url(path))
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build GCS metadata request").set_source(e))?;
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("GCS metadata request failed").set_source(e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(self.classify(status, "get_object_metadata", path));
        }
        let body: GetObjectJsonResponse = resp
            .json()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to parse GCS metadata response").set_source(e))?;
        Ok(Self::object_to_metadata(&body))
    }

    fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        end_at: Option<&str>,
        include_directories: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectMetadata>> + Send>> {
        let mut url = format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o?prefix={}&startOffset={}",
            self.bucket,
            percent_encoding::utf8_percent_encode(self.strip_bucket(prefix), percent_encoding::NON_ALPHANUMERIC),
            percent_encoding::utf8_percent_encode(start_after.unwrap_or(""), percent_encoding::NON_ALPHANUMERIC)
        );
        if include_directories {
            url.push_str("&delimiter=%2F");
        }
        let mut req = self
            .client
            .get(url)
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build GCS list request").set_source(e))?;
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("GCS list request failed").set_source(e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(self.classify(status, "list_objects", prefix));
        }
        let parsed: ListObjectsJsonResponse = resp
            .json()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to parse GCS list response").set_source(e))?;

        // GCS's `startOffset` is already an exclusive-or-inclusive boundary
        // depending on version; filter defensively client-side to guarantee
        // the `start_after` exclusive contract regardless.
        let start_after = start_after.map(|s| s.to_string());
        let end_at = end_at.map(|s| s.to_string());
        let mut entries = Vec::new();

        if include_directories {
            for p in parsed.prefixes {
                entries.push(ObjectMetadata::directory(
                    p.trim_end_matches('/').to_string(),
                    chrono::DateTime::<chrono::Utc>::MIN_UTC,
                ));
            }
        }

        for item in parsed.items {
            if let Some(sa) = &start_after {
                if &item.name <= sa {
                    continue;
                }
            }
            if let Some(end) = &end_at {
                if &item.name > end {
                    break;
                }
            }
            entries.push(Self::object_to_metadata(&item));
        }

        Ok(Box::new(entries.into_iter().map(Ok)))
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

/// Builder for the GCS provider.
#[derive(Default)]
pub struct GcsBuilder {
    base_path: Option<String>,
    credential: Option<String>,
}

impl GcsBuilder {
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Raw contents of a GCS service account credential JSON file.
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }
}

impl Builder for GcsBuilder {
    const SCHEME: Scheme = Scheme::Gcs;
    type Provider = BaseStorageProvider<GcsBackend>;

    fn from_map(mut map: HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            base_path: map.remove("base_path"),
            credential: map.remove("credential"),
        })
    }

    fn build(self) -> Result<Self::Provider> {
        let base_path = self
            .base_path
            .ok_or_else(|| Error::config_invalid("missing base_path").with_operation("Builder::build"))?;
        let (bucket, _) = crate::util::split_path(&base_path);

        let mut cred_loader = GoogleCredentialLoader::default();
        if let Some(cred) = &self.credential {
            cred_loader = cred_loader.with_content(cred);
        }
        let token_loader = GoogleTokenLoader::new(reqwest::Client::new()).with_scope("storage");
        let signer = GoogleSigner::new("storage");

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| Error::new(ErrorKind::ConfigInvalid, "failed to build HTTP client").set_source(e))?;

        let backend = GcsBackend {
            bucket: bucket.to_string(),
            client,
            signer,
            cred_loader,
            token_loader,
        };
        Ok(BaseStorageProvider::new(base_path, backend))
    }
}
