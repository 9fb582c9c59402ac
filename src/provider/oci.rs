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

//! Oracle Cloud Infrastructure Object Storage backend.
//!
//! Grounded on spec.md §4.1 ("uses its `UploadManager` for multipart;
//! recognizes its service-error JSON to map 412/429/404") and
//! `original_source/.../providers/oci.py`'s error-body shape
//! (`{"code": ..., "message": ...}`).

use std::collections::HashMap;
use std::io::Read;
use std::io::Write;

use reqsign::OracleConfig;
use reqsign::OracleLoader;
use reqsign::OracleSigner;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::provider::BaseStorageProvider;
use crate::provider::Builder;
use crate::provider::DeleteOptions;
use crate::provider::DownloadSink;
use crate::provider::MultipartConfig;
use crate::provider::ProviderBackend;
use crate::provider::PutOptions;
use crate::provider::UploadSource;
use crate::types::ObjectMetadata;
use crate::types::Range;
use crate::types::Scheme;

/// OCI's JSON error body shape: `{"code": "...", "message": "..."}`.
#[derive(Debug, Deserialize, Default)]
struct OciServiceError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreateMultipartUploadResponse {
    #[serde(rename = "uploadId")]
    upload_id: String,
}

#[derive(Debug, Serialize)]
struct CommitMultipartUploadRequest {
    #[serde(rename = "partsToCommit")]
    parts_to_commit: Vec<CommitPart>,
}

#[derive(Debug, Serialize)]
struct CommitPart {
    #[serde(rename = "partNum")]
    part_num: u32,
    etag: String,
}

pub struct OciBackend {
    namespace: String,
    bucket: String,
    region: String,
    client: Client,
    signer: OracleSigner,
    loader: OracleLoader,
    multipart: MultipartConfig,
}

impl OciBackend {
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
            "https://objectstorage.{}.oraclecloud.com/n/{}/b/{}/o/{}",
            self.region,
            self.namespace,
            self.bucket,
            percent_encoding::utf8_percent_encode(self.strip_bucket(key), percent_encoding::NON_ALPHANUMERIC)
        )
    }

    fn sign(&self, req: &mut reqwest::blocking::Request) -> Result<()> {
        let cred = self
            .loader
            .load()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to load OCI credentials").set_source(e))?
            .ok_or_else(|| Error::config_invalid("no OCI credentials available"))?;
        self.signer
            .sign(req, &cred)
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to sign OCI request").set_source(e))
    }

    fn classify(&self, status: StatusCode, body: &str, operation: &'static str, key: &str) -> Error {
        let kind = match status {
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::PRECONDITION_FAILED => ErrorKind::PreconditionFailed,
            StatusCode::TOO_MANY_REQUESTS => ErrorKind::Unexpected,
            _ => ErrorKind::Unexpected,
        };
        let parsed: OciServiceError = serde_json::from_str(body).unwrap_or_default();
        Error::new(kind, format!("OCI {operation} failed: {}", parsed.message))
            .with_operation(operation)
            .with_context("bucket", self.bucket.clone())
            .with_context("key", key.to_string())
            .with_context("status_code", status.as_u16().to_string())
            .with_context("service_code", parsed.code)
            .with_retryable(status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
    }

    fn multipart_url(&self, key: &str) -> String {
        format!(
            "https://objectstorage.{}.oraclecloud.com/n/{}/b/{}/u/{}",
            self.region,
            self.namespace,
            self.bucket,
            percent_encoding::utf8_percent_encode(self.strip_bucket(key), percent_encoding::NON_ALPHANUMERIC)
        )
    }

    fn create_multipart_upload(&self, key: &str) -> Result<String> {
        let mut req = self
            .client
            .post(format!("{}?uploads", self.multipart_url(key)))
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build CreateMultipartUpload request").set_source(e))?;
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("OCI CreateMultipartUpload request failed").set_source(e))?;
        let status = resp.status();
        let body_text = resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(self.classify(status, &body_text, "create_multipart_upload", key));
        }
        let parsed: CreateMultipartUploadResponse = serde_json::from_str(&body_text)
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to parse CreateMultipartUpload response").set_source(e))?;
        Ok(parsed.upload_id)
    }

    fn upload_part(&self, key: &str, upload_id: &str, part_number: u32, data: &[u8]) -> Result<String> {
        let url = format!(
            "{}?partNumber={}&uploadId={}",
            self.multipart_url(key),
            part_number,
            percent_encoding::utf8_percent_encode(upload_id, percent_encoding::NON_ALPHANUMERIC)
        );
        let mut req = self
            .client
            .put(url)
            .body(data.to_vec())
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build UploadPart request").set_source(e))?;
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("OCI UploadPart request failed").set_source(e))?;
        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().unwrap_or_default();
            return Err(self.classify(status, &body_text, "upload_part", key));
        }
        resp.headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::new(ErrorKind::Unexpected, "UploadPart response missing ETag").with_operation("upload_part"))
    }

    fn commit_multipart_upload(&self, key: &str, upload_id: &str, parts: &[(u32, String)]) -> Result<()> {
        let request = CommitMultipartUploadRequest {
            parts_to_commit: parts
                .iter()
                .map(|(part_num, etag)| CommitPart {
                    part_num: *part_num,
                    etag: etag.clone(),
                })
                .collect(),
        };
        let url = format!(
            "{}?uploadId={}",
            self.multipart_url(key),
            percent_encoding::utf8_percent_encode(upload_id, percent_encoding::NON_ALPHANUMERIC)
        );
        let mut req = self
            .client
            .post(url)
            .json(&request)
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build CommitMultipartUpload request").set_source(e))?;
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("OCI CommitMultipartUpload request failed").set_source(e))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body_text = resp.text().unwrap_or_default();
            Err(self.classify(status, &body_text, "commit_multipart_upload", key))
        }
    }

    fn abort_multipart_upload(&self, key: &str, upload_id: &str) {
        let url = format!(
            "{}?uploadId={}",
            self.multipart_url(key),
            percent_encoding::utf8_percent_encode(upload_id, percent_encoding::NON_ALPHANUMERIC)
        );
        let Ok(mut req) = self.client.delete(url).build() else {
            return;
        };
        if self.sign(&mut req).is_ok() {
            let _ = self.client.execute(req);
        }
    }

    /// Mirrors OCI's `UploadManager`: splits `body` into
    /// `self.multipart.part_size_bytes`-sized parts and uploads up to
    /// `self.multipart.max_concurrency` at a time, per spec.md §4.1.
    fn multipart_put(&self, key: &str, body: &[u8]) -> Result<()> {
        let upload_id = self.create_multipart_upload(key)?;
        let part_size = self.multipart.part_size_bytes.max(1) as usize;
        let indexed: Vec<(usize, &[u8])> = body.chunks(part_size).enumerate().collect();
        let max_concurrency = self.multipart.max_concurrency.max(1);

        let mut parts: Vec<(u32, String)> = Vec::with_capacity(indexed.len());
        let mut failure: Option<Error> = None;

        'batches: for batch in indexed.chunks(max_concurrency) {
            let batch_results: Vec<Result<(u32, String)>> = std::thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|(idx, data)| {
                        let idx = *idx;
                        let data = *data;
                        scope.spawn(move || {
                            let part_number = (idx + 1) as u32;
                            self.upload_part(key, &upload_id, part_number, data)
                                .map(|etag| (part_number, etag))
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join().unwrap_or_else(|_| {
                            Err(Error::new(ErrorKind::Unexpected, "multipart part upload thread panicked")
                                .with_operation("upload_part"))
                        })
                    })
                    .collect()
            });

            for result in batch_results {
                match result {
                    Ok(part) => parts.push(part),
                    Err(e) => {
                        failure = Some(e);
                        break 'batches;
                    }
                }
            }
        }

        if let Some(e) = failure {
            self.abort_multipart_upload(key, &upload_id);
            return Err(e);
        }

        parts.sort_by_key(|(number, _)| *number);
        self.commit_multipart_upload(key, &upload_id, &parts)
    }
}

impl ProviderBackend for OciBackend {
    fn provider_name(&self) -> &'static str {
        "oci"
    }

    fn put_object(&self, path: &str, body: &[u8], opts: &PutOptions) -> Result<()> {
        let mut req = self
            .client
            .put(self.object_url(path))
            .body(body.to_vec())
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build OCI PUT request").set_source(e))?;
        if let Some(etag) = &opts.if_match {
            req.headers_mut()
                .insert("if-match", etag.parse().expect("valid header value"));
        }
        if opts.if_none_match.is_some() {
            req.headers_mut().insert("if-none-match", "*".parse().unwrap());
        }
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("OCI PUT request failed").set_source(e))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body_text = resp.text().unwrap_or_default();
            Err(self.classify(status, &body_text, "put_object", path))
        }
    }

    fn get_object(&self, path: &str, byte_range: Option<Range>) -> Result<Vec<u8>> {
        let mut req = self
            .client
            .get(self.object_url(path))
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build OCI GET request").set_source(e))?;
        if let Some(range) = byte_range {
            let header = format!("bytes={}-{}", range.offset, range.end().saturating_sub(1));
            req.headers_mut()
                .insert(reqwest::header::RANGE, header.parse().expect("valid header value"));
        }
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("OCI GET request failed").set_source(e))?;
        let status = resp.status();
        if status.is_success() {
            resp.bytes()
                .map(|b| b.to_vec())
                .map_err(|e| Error::retryable("failed reading OCI response body").set_source(e))
        } else {
            let body_text = resp.text().unwrap_or_default();
            Err(self.classify(status, &body_text, "get_object", path))
        }
    }

    fn copy_object(&self, src_path: &str, dest_path: &str) -> Result<u64> {
        let meta = self.get_object_metadata(src_path, true)?;
        let body = self.get_object(src_path, None)?;
        self.put_object(dest_path, &body, &PutOptions::default())?;
        Ok(meta.content_length)
    }

    fn delete_object(&self, path: &str, opts: &DeleteOptions) -> Result<()> {
        let mut req = self
            .client
            .delete(self.object_url(path))
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build OCI DELETE request").set_source(e))?;
        if let Some(etag) = &opts.if_match {
            req.headers_mut()
                .insert("if-match", etag.parse().expect("valid header value"));
        }
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("OCI DELETE request failed").set_source(e))?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let body_text = resp.text().unwrap_or_default();
            Err(self.classify(resp.status(), &body_text, "delete_object", path))
        }
    }

    fn get_object_metadata(&self, path: &str, _strict: bool) -> Result<ObjectMetadata> {
        let mut req = self
            .client
            .head(self.object_url(path))
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build OCI HEAD request").set_source(e))?;
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("OCI HEAD request failed").set_source(e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(self.classify(status, "", "get_object_metadata", path));
        }
        let headers = resp.headers();
        let content_length = headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let etag = headers
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        let mut meta = ObjectMetadata::new(path, content_length, chrono::Utc::now());
        meta.etag = etag;
        Ok(meta)
    }

    fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        end_at: Option<&str>,
        include_directories: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectMetadata>> + Send>> {
        let mut url = format!(
            "https://objectstorage.{}.oraclecloud.com/n/{}/b/{}/o?prefix={}&fields=name,size,timeModified",
            self.region,
            self.namespace,
            self.bucket,
            percent_encoding::utf8_percent_encode(self.strip_bucket(prefix), percent_encoding::NON_ALPHANUMERIC)
        );
        if let Some(sa) = start_after {
            url.push_str(&format!(
                "&start={}",
                percent_encoding::utf8_percent_encode(sa, percent_encoding::NON_ALPHANUMERIC)
            ));
        }
        if include_directories {
            url.push_str("&delimiter=%2F");
        }
        let mut req = self
            .client
            .get(url)
            .build()
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to build OCI LIST request").set_source(e))?;
        self.sign(&mut req)?;
        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::retryable("OCI LIST request failed").set_source(e))?;
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(self.classify(status, &body, "list_objects", prefix));
        }

        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Obj {
            name: String,
            size: u64,
            #[serde(rename = "timeModified")]
            time_modified: String,
        }
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Listing {
            objects: Vec<Obj>,
            prefixes: Vec<String>,
        }
        let parsed: Listing = serde_json::from_str(&body)
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to parse OCI list response").set_source(e))?;

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
        for obj in parsed.objects {
            if let Some(end) = &end_at {
                if &obj.name > end {
                    break;
                }
            }
            let last_modified = chrono::DateTime::parse_from_rfc3339(&obj.time_modified)
                .map(|d| d.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now());
            entries.push(ObjectMetadata::new(obj.name, obj.size, last_modified));
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
        if len > self.multipart.threshold_bytes {
            log::debug!(
                "upload {remote_path} ({len} bytes) exceeds multipart threshold ({} bytes); \
                 uploading via UploadManager's CreateMultipartUpload/UploadPart/CommitMultipartUpload",
                self.multipart.threshold_bytes
            );
            self.multipart_put(remote_path, &body)?;
        } else {
            self.put_object(remote_path, &body, &PutOptions::default())?;
        }
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

/// Builder for the OCI provider.
#[derive(Default)]
pub struct OciBuilder {
    base_path: Option<String>,
    namespace: Option<String>,
    region: Option<String>,
}

impl OciBuilder {
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

impl Builder for OciBuilder {
    const SCHEME: Scheme = Scheme::Oci;
    type Provider = BaseStorageProvider<OciBackend>;

    fn from_map(mut map: HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            base_path: map.remove("base_path"),
            namespace: map.remove("namespace"),
            region: map.remove("region"),
        })
    }

    fn build(self) -> Result<Self::Provider> {
        let base_path = self
            .base_path
            .ok_or_else(|| Error::config_invalid("missing base_path").with_operation("Builder::build"))?;
        let namespace = self
            .namespace
            .ok_or_else(|| Error::config_invalid("missing namespace").with_operation("Builder::build"))?;
        let region = self
            .region
            .ok_or_else(|| Error::config_invalid("missing region").with_operation("Builder::build"))?;
        let (bucket, _) = crate::util::split_path(&base_path);

        let config = OracleConfig::default();
        let loader = OracleLoader::new(config);
        let signer = OracleSigner::new();

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| Error::new(ErrorKind::ConfigInvalid, "failed to build HTTP client").set_source(e))?;

        let backend = OciBackend {
            namespace,
            bucket: bucket.to_string(),
            region,
            client,
            signer,
            loader,
            multipart: MultipartConfig::default(),
        };
        Ok(BaseStorageProvider::new(base_path, backend))
    }
}
