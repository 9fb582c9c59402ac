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
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Credentials needed to authenticate against a storage backend.
///
/// `expiration`, when present, is an ISO 8601 timestamp; see [`Credentials::is_expired`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub token: Option<String>,
    pub expiration: Option<String>,
    #[serde(default)]
    pub custom_fields: HashMap<String, Value>,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            token: None,
            expiration: None,
            custom_fields: HashMap::new(),
        }
    }

    /// Whether these credentials have passed their expiration time. Credentials
    /// with no `expiration` never expire.
    pub fn is_expired(&self) -> bool {
        let Some(expiration) = &self.expiration else {
            return false;
        };
        match DateTime::parse_from_rfc3339(expiration) {
            Ok(expiry) => expiry.with_timezone(&Utc) <= Utc::now(),
            Err(_) => false,
        }
    }

    pub fn get_custom_field(&self, key: &str) -> Option<&Value> {
        self.custom_fields.get(key)
    }
}

/// Supplies and refreshes [`Credentials`] for a provider.
///
/// Grounded on `original_source/.../types.py`'s `CredentialsProvider` ABC;
/// kept as a plain trait rather than the teacher's loader-struct pattern
/// since this crate has no config layer to wire a loader through.
pub trait CredentialsProvider: Send + Sync {
    /// Returns the currently cached credentials.
    fn get_credentials(&self) -> crate::error::Result<Credentials>;

    /// Refreshes the cached credentials if expired or about to expire.
    fn refresh_credentials(&self) -> crate::error::Result<()>;
}

/// A [`CredentialsProvider`] that always returns a fixed, never-expiring set
/// of credentials. Useful for static API keys and in tests.
#[derive(Clone, Debug)]
pub struct StaticCredentialsProvider {
    credentials: Credentials,
}

impl StaticCredentialsProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialsProvider for StaticCredentialsProvider {
    fn get_credentials(&self) -> crate::error::Result<Credentials> {
        Ok(self.credentials.clone())
    }

    fn refresh_credentials(&self) -> crate::error::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_expiration_never_expires() {
        let creds = Credentials::new("ak", "sk");
        assert!(!creds.is_expired());
    }

    #[test]
    fn past_expiration_is_expired() {
        let mut creds = Credentials::new("ak", "sk");
        creds.expiration = Some("2000-01-01T00:00:00Z".to_string());
        assert!(creds.is_expired());
    }

    #[test]
    fn future_expiration_is_not_expired() {
        let mut creds = Credentials::new("ak", "sk");
        creds.expiration = Some("2999-01-01T00:00:00Z".to_string());
        assert!(!creds.is_expired());
    }
}
