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

use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Kinds of errors that can be returned by a [`crate::provider::StorageProvider`],
/// cache backend, metadata provider, or distributed hint.
///
/// # Notes
///
/// - `ErrorKind` is `non_exhaustive`: new variants may be added without a major
///   version bump.
/// - Whether an error is retryable is tracked separately via [`Error::is_retryable`],
///   since the same backend status code can be retryable in one call and terminal
///   in another (e.g. 404 on `get_object` vs. 404 on `delete_object`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The requested object does not exist.
    NotFound,
    /// An overwrite was attempted where one is not permitted (metadata-provider-gated writes).
    AlreadyExists,
    /// A conditional operation (`if_match`/`if_none_match`) did not hold.
    PreconditionFailed,
    /// Reserved for conditional-read semantics where the resource has not changed.
    NotModified,
    /// The backend does not support the requested operation (e.g. AIS conditional writes).
    Unsupported,
    /// The caller passed an invalid configuration (e.g. a missing `base_path` or bucket).
    ConfigInvalid,
    /// The backend rejected the request for lack of permission.
    PermissionDenied,
    /// A distributed hint was expected to be held, but a conflicting holder was observed.
    DistributedHintConflict,
    /// Everything else. Always wraps the lower-level backend error with context.
    Unexpected,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::PreconditionFailed => "PreconditionFailed",
            ErrorKind::NotModified => "NotModified",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::DistributedHintConflict => "DistributedHintConflict",
            ErrorKind::Unexpected => "Unexpected",
        };
        write!(f, "{s}")
    }
}

/// The crate's uniform error type.
///
/// Every backend maps its own error representation (HTTP status, OS error, etc.)
/// into one of these so callers see the same variant set regardless of which
/// storage provider produced it (spec: "User-visible failures... uniform across
/// backends: the error variant is stable").
pub struct Error {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    operation: Option<&'static str>,
    context: Vec<(&'static str, String)>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Creates a new error of the given kind with a human-readable message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: false,
            operation: None,
            context: Vec::new(),
            source: None,
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns whether the retry wrapper should retry the operation that produced
    /// this error (429/503/timeouts/incomplete reads per spec §4.1 "Error classification").
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Marks this error as retryable. Used for transient errors: timeouts, 429, 503,
    /// connection resets, incomplete reads.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Records which high-level operation produced this error (`"Builder::build"`,
    /// `"put_object"`, etc.), shown in `Display` output.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Attaches a key/value of identifying context (bucket, key, request id, status code).
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attaches the lower-level error this one wraps.
    pub fn set_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")?;
        if let Some(source) = &self.source {
            write!(f, "\n\nCaused by:\n{source}")?;
        }
        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.message)?;
        if let Some(op) = self.operation {
            write!(f, ", operation: {op}")?;
        }
        for (k, v) in &self.context {
            write!(f, ", {k}: {v}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted => ErrorKind::Unexpected,
            _ => ErrorKind::Unexpected,
        };
        let retryable = matches!(
            err.kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
        );
        Error::new(kind, err.to_string())
            .with_retryable(retryable)
            .set_source(err)
    }
}

/// Convenience constructors matching the taxonomy in spec.md §7.
impl Error {
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::AlreadyExists, message)
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::PreconditionFailed, message)
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Unexpected, message).with_retryable(true)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Unsupported, message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn distributed_hint_conflict(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::DistributedHintConflict, message)
    }
}
