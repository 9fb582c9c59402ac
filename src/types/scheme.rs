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

use std::collections::HashSet;
use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use crate::error::Error;
use crate::error::Result;

/// Identifies which storage backend a profile's URI/config addresses.
///
/// Mirrors the teacher's own `Scheme` enum shape (one variant per backend
/// family, a `Custom` escape hatch, `non_exhaustive` so new backends don't
/// break downstream matches), narrowed to the six backends this crate
/// implements.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Scheme {
    /// Local or network-mounted POSIX filesystem.
    Fs,
    /// AWS S3 and S3-compatible stores.
    S3,
    /// SwiftStack / S8K, an S3-compatible store with its own quirks.
    S8k,
    /// Azure Blob Storage.
    Azure,
    /// Google Cloud Storage.
    Gcs,
    /// Oracle Cloud Infrastructure Object Storage.
    Oci,
    /// NVIDIA AIStore.
    Ais,
    /// A backend registered at runtime under a caller-chosen name.
    Custom(&'static str),
}

impl Scheme {
    /// Returns the set of schemes compiled into this build, gated by feature flags.
    pub fn enabled() -> HashSet<Scheme> {
        #[allow(unused_mut)]
        let mut set = HashSet::new();
        #[cfg(feature = "services-fs")]
        set.insert(Scheme::Fs);
        #[cfg(feature = "services-s3")]
        set.insert(Scheme::S3);
        #[cfg(feature = "services-s8k")]
        set.insert(Scheme::S8k);
        #[cfg(feature = "services-azure")]
        set.insert(Scheme::Azure);
        #[cfg(feature = "services-gcs")]
        set.insert(Scheme::Gcs);
        #[cfg(feature = "services-oci")]
        set.insert(Scheme::Oci);
        #[cfg(feature = "services-ais")]
        set.insert(Scheme::Ais);
        set
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Scheme::Fs
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", <&'static str>::from(*self))
    }
}

impl From<Scheme> for &'static str {
    fn from(s: Scheme) -> Self {
        match s {
            Scheme::Fs => "file",
            Scheme::S3 => "s3",
            Scheme::S8k => "s8k",
            Scheme::Azure => "azure",
            Scheme::Gcs => "gs",
            Scheme::Oci => "oci",
            Scheme::Ais => "ais",
            Scheme::Custom(s) => s,
        }
    }
}

impl From<Scheme> for String {
    fn from(s: Scheme) -> Self {
        <&'static str>::from(s).to_string()
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "file" | "fs" | "posix" => Ok(Scheme::Fs),
            "s3" => Ok(Scheme::S3),
            "s8k" | "swiftstack" => Ok(Scheme::S8k),
            "azure" | "az" | "abs" => Ok(Scheme::Azure),
            "gs" | "gcs" => Ok(Scheme::Gcs),
            "oci" => Ok(Scheme::Oci),
            "ais" | "aistore" => Ok(Scheme::Ais),
            _ => Err(Error::config_invalid(format!("unknown scheme: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_roundtrips_through_display() {
        for s in [
            Scheme::Fs,
            Scheme::S3,
            Scheme::S8k,
            Scheme::Azure,
            Scheme::Gcs,
            Scheme::Oci,
            Scheme::Ais,
        ] {
            let parsed: Scheme = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn from_str_rejects_unknown() {
        assert!("not-a-scheme".parse::<Scheme>().is_err());
    }

    #[test]
    fn from_str_is_case_insensitive_and_accepts_aliases() {
        assert_eq!("FILE".parse::<Scheme>().unwrap(), Scheme::Fs);
        assert_eq!("gcs".parse::<Scheme>().unwrap(), Scheme::Gcs);
        assert_eq!("aistore".parse::<Scheme>().unwrap(), Scheme::Ais);
    }
}
