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

//! Manifest-backed metadata, an alternative to live listing for datasets
//! whose object count makes per-call `list_objects` calls to the backing
//! store too slow. Grounded on
//! `original_source/.../providers/manifest_metadata.py`.

pub mod generator;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::provider::StorageProvider;
use crate::types::ObjectMetadata;

pub const DEFAULT_MANIFEST_BASE_DIR: &str = ".msc_manifests";
pub const MANIFEST_INDEX_FILENAME: &str = "msc_manifest_index.json";
pub const MANIFEST_PARTS_CHILD_DIR: &str = "parts";
pub const MANIFEST_PART_PREFIX: &str = "msc_manifest_part";
pub const MANIFEST_PART_SUFFIX: &str = ".jsonl";
pub const SEQUENCE_PADDING: usize = 6;

/// Alternate source of object listings/metadata, queried instead of a live
/// `StorageProvider::list_objects` call. Implemented by
/// [`ManifestMetadataProvider`] today.
pub trait MetadataProvider: Send + Sync {
    fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        end_at: Option<&str>,
        include_directories: bool,
    ) -> Result<Vec<ObjectMetadata>>;

    fn get_object_metadata(&self, path: &str, include_pending: bool) -> Result<ObjectMetadata>;

    fn glob(&self, pattern: &str) -> Result<Vec<String>>;

    fn is_writable(&self) -> bool;

    fn add_file(&self, path: &str, metadata: ObjectMetadata) -> Result<()>;

    fn remove_file(&self, path: &str) -> Result<()>;

    fn commit_updates(&self) -> Result<()>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestPartReference {
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub parts: Vec<ManifestPartReference>,
}

impl Manifest {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to serialize manifest").set_source(e))
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to parse manifest index").set_source(e))
    }
}

/// Wire shape of a single JSON-lines row in a manifest part file: identical
/// to [`ObjectMetadata`] except `content_length` is named `size_bytes`,
/// matching the original's `_metadata_to_manifest_dict`.
#[derive(Serialize, Deserialize)]
struct ManifestPartRow {
    key: String,
    size_bytes: u64,
    last_modified: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "type", default = "default_row_type")]
    object_type: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    storage_class: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

fn default_row_type() -> String {
    "file".to_string()
}

impl From<&ObjectMetadata> for ManifestPartRow {
    fn from(m: &ObjectMetadata) -> Self {
        Self {
            key: m.key.clone(),
            size_bytes: m.content_length,
            last_modified: m.last_modified,
            object_type: m.r#type.clone(),
            content_type: m.content_type.clone(),
            etag: m.etag.clone(),
            storage_class: m.storage_class.clone(),
            metadata: m.metadata.clone(),
        }
    }
}

impl From<ManifestPartRow> for ObjectMetadata {
    fn from(row: ManifestPartRow) -> Self {
        ObjectMetadata {
            key: row.key,
            content_length: row.size_bytes,
            last_modified: row.last_modified,
            r#type: row.object_type,
            content_type: row.content_type,
            etag: row.etag,
            storage_class: row.storage_class,
            metadata: row.metadata,
        }
    }
}

struct State {
    files: HashMap<String, ObjectMetadata>,
    pending_adds: HashMap<String, ObjectMetadata>,
    pending_removes: Vec<String>,
}

/// Serves listings and metadata lookups from a manifest file tree instead
/// of querying the backing storage provider directly; optionally supports
/// buffered mutations committed as a fresh manifest snapshot.
pub struct ManifestMetadataProvider {
    storage_provider: Arc<dyn StorageProvider>,
    manifest_path: String,
    writable: bool,
    state: RwLock<State>,
}

impl ManifestMetadataProvider {
    pub fn new(storage_provider: Arc<dyn StorageProvider>, manifest_path: impl Into<String>, writable: bool) -> Result<Self> {
        let manifest_path = manifest_path.into();
        let files = Self::load_manifest(storage_provider.as_ref(), &manifest_path)?;
        Ok(Self {
            storage_provider,
            manifest_path,
            writable,
            state: RwLock::new(State {
                files,
                pending_adds: HashMap::new(),
                pending_removes: Vec::new(),
            }),
        })
    }

    fn find_manifest_file(storage_provider: &dyn StorageProvider, manifest_path: &str) -> Result<Option<String>> {
        if storage_provider.is_file(manifest_path) {
            return Ok(Some(manifest_path.to_string()));
        }
        let index_candidate = join(manifest_path, MANIFEST_INDEX_FILENAME);
        if storage_provider.is_file(&index_candidate) {
            return Ok(Some(index_candidate));
        }

        let mut search_path = manifest_path.to_string();
        if !manifest_path.split('/').any(|seg| seg == DEFAULT_MANIFEST_BASE_DIR) {
            search_path = join(manifest_path, DEFAULT_MANIFEST_BASE_DIR);
        }

        let pattern = join(&join(&search_path, "*"), MANIFEST_INDEX_FILENAME);
        let mut candidates = storage_provider.glob(&pattern)?;
        candidates.sort();
        Ok(candidates.pop())
    }

    fn load_manifest(
        storage_provider: &dyn StorageProvider,
        manifest_path: &str,
    ) -> Result<HashMap<String, ObjectMetadata>> {
        let mut files = HashMap::new();
        let resolved = match Self::find_manifest_file(storage_provider, manifest_path)? {
            Some(p) => p,
            None => {
                log::warn!("no manifest found at '{manifest_path}'");
                return Ok(files);
            }
        };

        let content = storage_provider.get_object(&resolved, None)?;
        let base = parent_dir(&resolved);
        let extension = resolved.rsplit('.').next().unwrap_or("");

        if extension != "json" {
            return Err(Error::unsupported(format!("manifest file type {extension} is not supported")));
        }

        let manifest = Manifest::from_json(&content)?;
        if manifest.version != "1" {
            return Err(Error::config_invalid(format!(
                "manifest version {} is not supported",
                manifest.version
            )));
        }

        for part_ref in &manifest.parts {
            let remote_path = if part_ref.path.starts_with('/') {
                part_ref.path.clone()
            } else {
                join(base, &part_ref.path)
            };
            let part_content = storage_provider.get_object(&remote_path, None)?;
            for line in String::from_utf8_lossy(&part_content).lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let row: ManifestPartRow = serde_json::from_str(line).map_err(|e| {
                    Error::new(ErrorKind::Unexpected, "failed to parse manifest part line").set_source(e)
                })?;
                let metadata: ObjectMetadata = row.into();
                files.insert(metadata.key.clone(), metadata);
            }
        }
        Ok(files)
    }

    fn write_manifest_files(&self, object_metadata: &[ObjectMetadata]) -> Result<()> {
        let base_path_parts: Vec<&str> = self.manifest_path.split('/').collect();
        let manifest_base_path = if let Some(idx) = base_path_parts.iter().position(|p| *p == DEFAULT_MANIFEST_BASE_DIR) {
            let mut prefix = base_path_parts[..idx].join("/");
            if self.manifest_path.starts_with('/') && !prefix.starts_with('/') {
                prefix = format!("/{prefix}");
            }
            prefix
        } else {
            self.manifest_path.clone()
        };

        let current_time = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S+00:00").to_string();
        let manifest_folder = join(&join(&manifest_base_path, DEFAULT_MANIFEST_BASE_DIR), &current_time);

        let part_sequence_number = 1;
        let manifest_part_file_path = format!(
            "{MANIFEST_PARTS_CHILD_DIR}/{MANIFEST_PART_PREFIX}{part_sequence_number:0width$}{MANIFEST_PART_SUFFIX}",
            width = SEQUENCE_PADDING
        );

        let manifest = Manifest {
            version: "1".to_string(),
            parts: vec![ManifestPartReference {
                path: manifest_part_file_path.clone(),
            }],
        };

        let part_content = object_metadata
            .iter()
            .map(|m| {
                serde_json::to_string(&ManifestPartRow::from(m))
                    .map_err(|e| Error::new(ErrorKind::Unexpected, "failed to serialize manifest row").set_source(e))
            })
            .collect::<Result<Vec<_>>>()?
            .join("\n");

        self.storage_provider.put_object(
            &join(&manifest_folder, &manifest_part_file_path),
            part_content.as_bytes(),
            Default::default(),
        )?;

        let manifest_file_path = join(&manifest_folder, MANIFEST_INDEX_FILENAME);
        self.storage_provider
            .put_object(&manifest_file_path, manifest.to_json()?.as_bytes(), Default::default())?;

        Ok(())
    }
}

fn join(base: &str, child: &str) -> String {
    if base.is_empty() {
        child.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), child)
    }
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

impl MetadataProvider for ManifestMetadataProvider {
    fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        end_at: Option<&str>,
        include_directories: bool,
    ) -> Result<Vec<ObjectMetadata>> {
        if let (Some(a), Some(b)) = (start_after, end_at) {
            if a >= b {
                return Err(Error::config_invalid(format!(
                    "start_after ({a}) must be before end_at ({b})"
                )));
            }
        }

        let prefix = if !prefix.is_empty() && !prefix.ends_with('/') {
            format!("{prefix}/")
        } else {
            prefix.to_string()
        };

        let state = self.state.read().expect("lock poisoned");
        let mut keys: Vec<&String> = state
            .files
            .keys()
            .filter(|k| {
                k.starts_with(&prefix)
                    && start_after.map(|sa| sa < k.as_str()).unwrap_or(true)
                    && end_at.map(|ea| k.as_str() <= ea).unwrap_or(true)
            })
            .collect();
        keys.sort();

        let mut out = Vec::new();
        let mut pending_directory: Option<ObjectMetadata> = None;

        for key in keys {
            if include_directories {
                let relative = key[prefix.len()..].trim_start_matches('/');
                let subdirectory = relative.split_once('/').map(|(d, _)| d);

                if let Some(subdirectory) = subdirectory {
                    let directory_name = format!("{prefix}{subdirectory}/");
                    let obj_metadata = &state.files[key];

                    match &mut pending_directory {
                        Some(pending) if pending.key == directory_name => {
                            if obj_metadata.last_modified > pending.last_modified {
                                pending.last_modified = obj_metadata.last_modified;
                            }
                        }
                        Some(pending) => {
                            out.push(pending.clone());
                            pending_directory = Some(ObjectMetadata::directory(
                                directory_name,
                                obj_metadata.last_modified,
                            ));
                        }
                        None => {
                            pending_directory = Some(ObjectMetadata::directory(
                                directory_name,
                                obj_metadata.last_modified,
                            ));
                        }
                    }
                    continue;
                }
            }

            let mut obj = state.files[key].clone();
            obj.key = key.clone();
            out.push(obj);
        }

        if include_directories {
            if let Some(pending) = pending_directory {
                out.push(pending);
            }
        }
        Ok(out)
    }

    fn get_object_metadata(&self, path: &str, include_pending: bool) -> Result<ObjectMetadata> {
        let state = self.state.read().expect("lock poisoned");
        if let Some(meta) = state.files.get(path) {
            if include_pending && state.pending_removes.iter().any(|p| p == path) {
                return Err(Error::not_found(format!("object {path} does not exist")));
            }
            return Ok(meta.clone());
        }
        if include_pending {
            if let Some(meta) = state.pending_adds.get(path) {
                return Ok(meta.clone());
            }
        }
        Err(Error::not_found(format!("object {path} does not exist")))
    }

    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let all_keys: Vec<String> = self.list_objects("", None, None, false)?.into_iter().map(|o| o.key).collect();
        crate::util::glob_match(&all_keys, pattern)
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn add_file(&self, path: &str, metadata: ObjectMetadata) -> Result<()> {
        if !self.is_writable() {
            return Err(Error::unsupported(format!(
                "manifest update support not enabled in configuration. Attempted to add {path}"
            )));
        }
        self.state
            .write()
            .expect("lock poisoned")
            .pending_adds
            .insert(path.to_string(), metadata);
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        if !self.is_writable() {
            return Err(Error::unsupported(format!(
                "manifest update support not enabled in configuration. Attempted to remove {path}"
            )));
        }
        let mut state = self.state.write().expect("lock poisoned");
        if !state.files.contains_key(path) {
            return Err(Error::not_found(format!("object {path} does not exist")));
        }
        state.pending_removes.push(path.to_string());
        Ok(())
    }

    fn commit_updates(&self) -> Result<()> {
        let object_metadata = {
            let mut state = self.state.write().expect("lock poisoned");
            if state.pending_adds.is_empty() && state.pending_removes.is_empty() {
                return Ok(());
            }

            if !state.pending_adds.is_empty() {
                let adds = std::mem::take(&mut state.pending_adds);
                state.files.extend(adds);
            }
            for path in std::mem::take(&mut state.pending_removes) {
                state.files.remove(&path);
            }

            state.files.values().cloned().collect::<Vec<_>>()
        };

        self.write_manifest_files(&object_metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_through_json() {
        let manifest = Manifest {
            version: "1".to_string(),
            parts: vec![ManifestPartReference {
                path: "parts/msc_manifest_part000001.jsonl".to_string(),
            }],
        };
        let json = manifest.to_json().unwrap();
        let parsed = Manifest::from_json(json.as_bytes()).unwrap();
        assert_eq!(parsed.version, "1");
        assert_eq!(parsed.parts[0].path, manifest.parts[0].path);
    }

    #[test]
    fn join_handles_empty_base() {
        assert_eq!(join("", "x"), "x");
        assert_eq!(join("a/b", "x"), "a/b/x");
        assert_eq!(join("a/b/", "x"), "a/b/x");
    }

    #[test]
    fn parent_dir_strips_last_segment() {
        assert_eq!(parent_dir("a/b/c.json"), "a/b");
        assert_eq!(parent_dir("c.json"), "");
    }
}
