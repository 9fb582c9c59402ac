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

//! Builds a manifest snapshot from a live listing of a data storage
//! provider, for later consumption via [`super::ManifestMetadataProvider`].
//! Grounded on `original_source/.../generators/manifest_metadata.py`.

use std::sync::Arc;

use crate::error::Result;
use crate::manifest::ManifestMetadataProvider;
use crate::manifest::MetadataProvider;
use crate::manifest::DEFAULT_MANIFEST_BASE_DIR;
use crate::provider::StorageProvider;

/// Walks `data_provider`'s full object listing and writes a fresh manifest
/// snapshot through `manifest_provider`.
///
/// `data_provider`'s base path should point at the data root (e.g. the
/// dataset's bucket/prefix); `manifest_provider` should point at the
/// manifest destination root.
pub fn generate_and_write_manifest(
    data_provider: &dyn StorageProvider,
    manifest_provider: Arc<dyn StorageProvider>,
) -> Result<()> {
    let manifest_metadata_provider = ManifestMetadataProvider::new(manifest_provider, "", true)?;

    for object_metadata in data_provider.list_objects("", None, None, false)? {
        let object_metadata = object_metadata?;
        if object_metadata.key.split('/').any(|seg| seg == DEFAULT_MANIFEST_BASE_DIR) {
            continue;
        }
        manifest_metadata_provider.add_file(&object_metadata.key, object_metadata)?;
    }

    manifest_metadata_provider.commit_updates()
}
