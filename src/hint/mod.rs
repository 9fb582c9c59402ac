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

//! A distributed hint, following the DynamoDB lock client protocol
//! (see <https://aws.amazon.com/blogs/database/building-distributed-locks-with-the-dynamodb-lock-client>).
//! Grounded on `original_source/.../caching/distributed_hint.py`.
//!
//! Used to coordinate a single writer across processes/hosts without a
//! dedicated lock service: the hint is just an object at `<hint_prefix>/hint`
//! whose ETag is used as a compare-and-swap token, refreshed by a background
//! heartbeat thread while held.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;

use crate::error::Error;
use crate::error::ErrorKind;
use crate::provider::DeleteOptions;
use crate::provider::PutOptions;
use crate::provider::StorageProvider;
use crate::types::ObjectMetadata;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_BUFFER: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;
pub const HINT_DATA_VERSION: &str = "1.0";

/// Why [`DistributedHint::try_acquire`] failed to obtain the hint.
///
/// Kept distinct from [`ErrorKind`] because a caller may want to treat
/// "someone else holds this" (retry later, or give up) very differently
/// from a transport error talking to the storage provider, even though
/// both ultimately surface as [`ErrorKind::DistributedHintConflict`] when
/// converted to an [`Error`] via [`From<HintError> for Error`].
#[derive(Debug)]
pub enum HintError {
    /// Another actor holds the hint and the takeover attempt lost the
    /// compare-and-swap race.
    AlreadyHeld,
    /// A lower-level error occurred reading or writing the hint object.
    Transport(Error),
}

impl std::fmt::Display for HintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HintError::AlreadyHeld => write!(f, "hint is held by another actor"),
            HintError::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for HintError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HintError::AlreadyHeld => None,
            HintError::Transport(e) => Some(e),
        }
    }
}

impl From<HintError> for Error {
    fn from(err: HintError) -> Self {
        match err {
            HintError::AlreadyHeld => Error::distributed_hint_conflict("hint is held by another actor"),
            HintError::Transport(e) => e,
        }
    }
}

#[derive(Serialize)]
struct HintData {
    timestamp: String,
}

struct HintObject {
    metadata: ObjectMetadata,
}

struct HeartbeatHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

/// Coordinates a single logical owner for a resource across processes by
/// compare-and-swapping an object's ETag, refreshed by a background
/// heartbeat while held. Not a lease in the cryptographic sense: a
/// sufficiently long pause (GC, suspend) can let another actor take over
/// the hint while this one still believes it holds it; spec'd behavior
/// accepts that window as the cost of doing this without a lock service.
pub struct DistributedHint {
    storage_provider: Arc<dyn StorageProvider>,
    object_key: String,
    heartbeat_interval: Duration,
    heartbeat_lifespan: Duration,
    hint_object: Mutex<Option<HintObject>>,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
}

impl DistributedHint {
    pub fn new(storage_provider: Arc<dyn StorageProvider>, hint_prefix: &str) -> crate::error::Result<Self> {
        Self::with_intervals(
            storage_provider,
            hint_prefix,
            DEFAULT_HEARTBEAT_INTERVAL,
            DEFAULT_HEARTBEAT_BUFFER,
        )
    }

    /// Rejects an AIStore-backed provider up front: the hint's correctness
    /// depends on CAS (`if_match`/`if_none_match`), which AIS's
    /// `StorageProvider::put_object` doesn't support (spec.md §9).
    pub fn with_intervals(
        storage_provider: Arc<dyn StorageProvider>,
        hint_prefix: &str,
        heartbeat_interval: Duration,
        heartbeat_buffer: Duration,
    ) -> crate::error::Result<Self> {
        if storage_provider.provider_name() == "ais" {
            return Err(Error::unsupported(
                "distributed hint requires a CAS-capable storage provider; AIStore does not support if_match/if_none_match",
            )
            .with_operation("DistributedHint::new"));
        }
        Ok(Self {
            storage_provider,
            object_key: format!("{}/hint", hint_prefix.trim_end_matches('/')),
            heartbeat_interval,
            heartbeat_lifespan: heartbeat_interval + heartbeat_buffer,
            hint_object: Mutex::new(None),
            heartbeat: Mutex::new(None),
        })
    }

    fn hint_data() -> Vec<u8> {
        let data = HintData {
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        serde_json::to_vec(&data).expect("HintData always serializes")
    }

    fn start_heartbeat_thread(self: &Arc<Self>) {
        let stop = Arc::new(AtomicBool::new(false));
        let this = Arc::clone(self);
        let thread_stop = Arc::clone(&stop);

        let join = std::thread::Builder::new()
            .name("distributed-hint-heartbeat".to_string())
            .spawn(move || this.heartbeat_loop(thread_stop))
            .expect("failed to spawn heartbeat thread");

        *self.heartbeat.lock().expect("lock poisoned") = Some(HeartbeatHandle {
            stop,
            join: Some(join),
        });
    }

    fn heartbeat_loop(&self, stop: Arc<AtomicBool>) {
        let mut consecutive_errors = 0u32;

        loop {
            if wait_or_stop(&stop, self.heartbeat_interval) {
                log::debug!("stop requested, stopping hint heartbeat for {}", self.object_key);
                break;
            }

            let current_etag = {
                let guard = self.hint_object.lock().expect("lock poisoned");
                match guard.as_ref() {
                    Some(hint) => hint.metadata.etag.clone(),
                    None => {
                        log::debug!("no hint object, stopping heartbeat for {}", self.object_key);
                        break;
                    }
                }
            };

            let opts = PutOptions {
                if_match: current_etag,
                ..Default::default()
            };
            match self.storage_provider.put_object(&self.object_key, &Self::hint_data(), opts) {
                Ok(()) => match self.storage_provider.get_object_metadata(&self.object_key, true) {
                    Ok(metadata) => {
                        *self.hint_object.lock().expect("lock poisoned") = Some(HintObject { metadata });
                        consecutive_errors = 0;
                    }
                    Err(e) => {
                        log::error!("error refreshing hint metadata for {}: {e}", self.object_key);
                        consecutive_errors += 1;
                    }
                },
                Err(e) if e.kind() == ErrorKind::PreconditionFailed => {
                    log::warn!("heartbeat failed due to ETag mismatch for {} — another actor may have taken the hint", self.object_key);
                    break;
                }
                Err(e) => {
                    log::error!("error in hint heartbeat for {}: {e}", self.object_key);
                    consecutive_errors += 1;
                }
            }

            if consecutive_errors >= DEFAULT_MAX_CONSECUTIVE_ERRORS {
                log::error!("too many consecutive errors in heartbeat for {}, stopping", self.object_key);
                break;
            }
            if consecutive_errors > 0 {
                let backoff = Duration::from_secs_f64((1.0 * 2f64.powi(consecutive_errors as i32 - 1)).min(30.0));
                if wait_or_stop(&stop, backoff) {
                    break;
                }
            }
        }
    }

    fn acquire_hint_with_condition(
        self: &Arc<Self>,
        if_match: Option<String>,
        if_none_match: Option<String>,
    ) -> Result<(), HintError> {
        log::debug!(
            "putting hint {} with if_match={if_match:?} if_none_match={if_none_match:?}",
            self.object_key
        );
        let opts = PutOptions {
            if_match,
            if_none_match,
            ..Default::default()
        };
        match self.storage_provider.put_object(&self.object_key, &Self::hint_data(), opts) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::PreconditionFailed => {
                log::warn!("failed to acquire hint {} — precondition failed", self.object_key);
                return Err(HintError::AlreadyHeld);
            }
            Err(e) => {
                log::error!("error acquiring hint {}: {e}", self.object_key);
                return Err(HintError::Transport(e));
            }
        }

        match self.storage_provider.get_object_metadata(&self.object_key, true) {
            Ok(metadata) => {
                log::debug!("acquired hint {} with etag {:?}", self.object_key, metadata.etag);
                *self.hint_object.lock().expect("lock poisoned") = Some(HintObject { metadata });
                self.start_heartbeat_thread();
                Ok(())
            }
            Err(e) => {
                log::error!("failed to read back hint metadata for {}: {e}", self.object_key);
                Err(HintError::Transport(e))
            }
        }
    }

    /// Acquires the hint, blocking for the heartbeat lifespan if another
    /// actor currently appears to hold it, then attempting takeover.
    /// Returns [`HintError::AlreadyHeld`] if the takeover loses the
    /// compare-and-swap race, or [`HintError::Transport`] on a lower-level
    /// failure talking to the storage provider.
    pub fn try_acquire(self: &Arc<Self>) -> Result<(), HintError> {
        if self.hint_object.lock().expect("lock poisoned").is_some() {
            return Ok(());
        }

        match self.storage_provider.get_object_metadata(&self.object_key, true) {
            Ok(existing) => {
                log::debug!(
                    "waiting for heartbeat lifespan: {:?} before taking over {}",
                    self.heartbeat_lifespan,
                    self.object_key
                );
                std::thread::sleep(self.heartbeat_lifespan);
                log::debug!("trying to take over existing hint {} with etag {:?}", self.object_key, existing.etag);
                self.acquire_hint_with_condition(existing.etag, None)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("no existing hint found, creating new hint {}", self.object_key);
                self.acquire_hint_with_condition(None, Some("*".to_string()))
            }
            Err(e) => {
                log::error!("error checking for existing hint {}: {e}", self.object_key);
                Err(HintError::Transport(e))
            }
        }
    }

    /// Convenience wrapper over [`DistributedHint::try_acquire`] for callers
    /// that only care whether the hint was obtained.
    pub fn acquire(self: &Arc<Self>) -> bool {
        self.try_acquire().is_ok()
    }

    /// Releases the hint: stops the heartbeat thread, then deletes the
    /// object conditioned on the ETag this instance last wrote.
    pub fn release(&self) {
        let hint = self.hint_object.lock().expect("lock poisoned").take();
        let Some(hint) = hint else { return };

        if let Some(mut handle) = self.heartbeat.lock().expect("lock poisoned").take() {
            handle.stop.store(true, Ordering::SeqCst);
            if let Some(join) = handle.join.take() {
                let _ = join.join();
            }
        }

        let opts = DeleteOptions { if_match: hint.metadata.etag };
        if let Err(e) = self.storage_provider.delete_object(&self.object_key, opts) {
            log::warn!("failed to delete hint {} on release: {e}", self.object_key);
        } else {
            log::debug!("released hint {}", self.object_key);
        }
    }
}

impl Drop for DistributedHint {
    fn drop(&mut self) {
        let hint = self.hint_object.lock().expect("lock poisoned").take();
        let Some(hint) = hint else { return };
        if let Some(mut handle) = self.heartbeat.lock().expect("lock poisoned").take() {
            handle.stop.store(true, Ordering::SeqCst);
            if let Some(join) = handle.join.take() {
                let _ = join.join();
            }
        }
        let opts = DeleteOptions { if_match: hint.metadata.etag };
        let _ = self.storage_provider.delete_object(&self.object_key, opts);
    }
}

fn wait_or_stop(stop: &AtomicBool, duration: Duration) -> bool {
    let step = Duration::from_millis(50);
    let mut waited = Duration::ZERO;
    while waited < duration {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        std::thread::sleep(step.min(duration - waited));
        waited += step;
    }
    stop.load(Ordering::SeqCst)
}
