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

//! A unified object storage client that presents POSIX, S3, Azure, GCS,
//! OCI, and AIStore behind a single profile-addressed API.
//!
//! A profile pairs a [`provider::StorageProvider`] with optional caching
//! ([`cache`]), an optional manifest-backed metadata shortcut
//! ([`manifest`]) that avoids live listing for huge datasets, and optional
//! cross-process write coordination ([`hint`]). [`client::StorageClient`]
//! composes these into the surface applications actually call.
//!
//! ```no_run
//! use std::sync::Arc;
//! use msc::client::{StorageClient, StorageClientConfig};
//! use msc::provider::posix::PosixBuilder;
//! use msc::provider::Builder;
//!
//! # fn main() -> msc::error::Result<()> {
//! let provider = PosixBuilder::default().base_path("/var/lib/msc-data").build()?;
//! let client = StorageClient::new(StorageClientConfig {
//!     profile: "default".to_string(),
//!     storage_provider: Arc::new(provider),
//!     metadata_provider: None,
//!     cache_backend: None,
//!     retry_config: None,
//!     is_posix: true,
//! });
//! client.write("hello.txt", b"hello world")?;
//! assert_eq!(client.read("hello.txt", None)?, b"hello world");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod error;
pub mod hint;
pub mod manifest;
pub mod provider;
pub mod registry;
pub mod telemetry;
pub mod types;
mod util;

pub use client::StorageClient;
pub use client::StorageClientConfig;
pub use error::Error;
pub use error::Result;
pub use registry::Registry;
