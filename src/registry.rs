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

//! Config-driven provider construction, keyed by [`Scheme`] rather than by
//! runtime reflection (which Rust has no equivalent of). Every compiled-in
//! backend registers a constructor closure; a profile config picks one by
//! name the same way the teacher's `services!` dispatch picks an
//! `Accessor` impl by its `Scheme`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use crate::error::Error;
use crate::error::Result;
use crate::provider::Builder;
use crate::provider::StorageProvider;
use crate::types::Scheme;

type Constructor = Box<dyn Fn(HashMap<String, String>) -> Result<Arc<dyn StorageProvider>> + Send + Sync>;

/// Holds one constructor per compiled-in [`Scheme`], built once at process
/// startup via [`Registry::with_defaults`] and consulted by profile setup
/// code to turn a config map into a live [`StorageProvider`].
pub struct Registry {
    constructors: RwLock<HashMap<Scheme, Constructor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// Registers every backend compiled in under this build's feature flags.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        #[cfg(feature = "services-fs")]
        registry.register::<crate::provider::posix::PosixBuilder>();
        #[cfg(feature = "services-s3")]
        registry.register::<crate::provider::s3::S3Builder>();
        #[cfg(feature = "services-s8k")]
        registry.register::<crate::provider::s3::S8kBuilder>();
        #[cfg(feature = "services-azure")]
        registry.register::<crate::provider::azure::AzureBuilder>();
        #[cfg(feature = "services-gcs")]
        registry.register::<crate::provider::gcs::GcsBuilder>();
        #[cfg(feature = "services-oci")]
        registry.register::<crate::provider::oci::OciBuilder>();
        #[cfg(feature = "services-ais")]
        registry.register::<crate::provider::ais::AisBuilder>();
        registry
    }

    /// Registers the builder `B` under its `SCHEME`, overwriting any prior
    /// registration for that scheme. Exposed publicly so a caller can
    /// register a `Scheme::Custom` backend of their own.
    pub fn register<B: Builder + 'static>(&self) {
        let ctor: Constructor = Box::new(|map| {
            let builder = B::from_map(map)?;
            let provider = builder.build()?;
            Ok(Arc::new(provider) as Arc<dyn StorageProvider>)
        });
        self.constructors.write().expect("lock poisoned").insert(B::SCHEME, ctor);
    }

    /// Builds a provider for `scheme` from a config map, or an error if no
    /// constructor is registered for it (typically because its feature flag
    /// is disabled in this build).
    pub fn build(&self, scheme: Scheme, config: HashMap<String, String>) -> Result<Arc<dyn StorageProvider>> {
        let constructors = self.constructors.read().expect("lock poisoned");
        let ctor = constructors
            .get(&scheme)
            .ok_or_else(|| Error::config_invalid(format!("no storage provider registered for scheme '{scheme}'")))?;
        ctor(config)
    }

    pub fn is_registered(&self, scheme: Scheme) -> bool {
        self.constructors.read().expect("lock poisoned").contains_key(&scheme)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "services-fs")]
    #[test]
    fn default_registry_has_posix_registered() {
        let registry = Registry::with_defaults();
        assert!(registry.is_registered(Scheme::Fs));
    }

    #[test]
    fn build_rejects_unregistered_scheme() {
        let registry = Registry::new();
        assert!(registry.build(Scheme::Fs, HashMap::new()).is_err());
    }

    #[test]
    fn register_overwrites_prior_entry() {
        let registry = Registry::new();
        #[cfg(feature = "services-fs")]
        {
            registry.register::<crate::provider::posix::PosixBuilder>();
            registry.register::<crate::provider::posix::PosixBuilder>();
            assert!(registry.is_registered(Scheme::Fs));
        }
    }
}
