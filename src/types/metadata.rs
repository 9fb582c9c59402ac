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

use std::collections::HashMap;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// Metadata describing a single object or synthetic directory entry.
///
/// Grounded on `original_source/.../types.py`'s `ObjectMetadata` dataclass.
/// `type` distinguishes real objects (`"file"`) from the synthetic
/// directory entries `list_objects` synthesizes when `include_directories`
/// is requested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
    #[serde(default = "default_type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

fn default_type() -> String {
    "file".to_string()
}

impl ObjectMetadata {
    pub fn new(key: impl Into<String>, content_length: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            content_length,
            last_modified,
            r#type: default_type(),
            content_type: None,
            etag: None,
            storage_class: None,
            metadata: None,
        }
    }

    /// Builds a synthetic `"directory"` entry, as `list_objects` does for
    /// implied prefixes when directory emulation is requested.
    pub fn directory(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            content_length: 0,
            last_modified,
            r#type: "directory".to_string(),
            content_type: None,
            etag: None,
            storage_class: None,
            metadata: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.r#type == "directory"
    }

    /// Parses an `ObjectMetadata` from a loosely typed JSON map, as manifest
    /// part files and backend JSON responses supply it.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::new(crate::error::ErrorKind::Unexpected, "invalid object metadata").set_source(e))
    }

    /// Serializes to the wire representation used by manifest part files:
    /// RFC 3339 millisecond timestamp, `None` fields omitted.
    pub fn to_value(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).expect("ObjectMetadata always serializes");
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "last_modified".to_string(),
                serde_json::Value::String(self.last_modified.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        value
    }
}

/// A byte range for a partial read, `[offset, offset + size)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub offset: u64,
    pub size: u64,
}

impl Range {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_entries_are_tagged() {
        let md = ObjectMetadata::directory("a/b/", Utc::now());
        assert!(md.is_directory());
        assert_eq!(md.content_length, 0);
    }

    #[test]
    fn file_entries_default_to_file_type() {
        let md = ObjectMetadata::new("a/b.txt", 10, Utc::now());
        assert!(!md.is_directory());
        assert_eq!(md.r#type, "file");
    }

    #[test]
    fn range_end_is_exclusive_upper_bound() {
        let r = Range::new(10, 5);
        assert_eq!(r.end(), 15);
    }
}
