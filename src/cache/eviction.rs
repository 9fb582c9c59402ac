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

//! Cache eviction ordering strategies. Grounded on
//! `original_source/.../caching/eviction_policy.py`.

use std::path::PathBuf;
use std::time::SystemTime;

use rand::seq::SliceRandom;

use crate::error::Error;
use crate::error::Result;

pub const LRU: &str = "lru";
pub const FIFO: &str = "fifo";
pub const RANDOM: &str = "random";
pub const NO_EVICTION: &str = "no_eviction";

/// A single file tracked by the filesystem cache's eviction sweep.
/// Equality and hashing are by `hashed_key` only, matching the original's
/// `CacheItem.__eq__`/`__hash__`.
#[derive(Clone, Debug)]
pub struct CacheItem {
    pub file_path: PathBuf,
    pub file_size: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub hashed_key: String,
}

impl CacheItem {
    /// Builds a `CacheItem` from a file on disk, or `None` if the file
    /// vanished between directory walk and `stat` (races are tolerated,
    /// not errors, matching the original's try/except around `os.stat`).
    pub fn from_path(path: &std::path::Path, hashed_key: impl Into<String>) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            file_path: path.to_path_buf(),
            file_size: meta.len(),
            atime: meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            hashed_key: hashed_key.into(),
        })
    }
}

impl PartialEq for CacheItem {
    fn eq(&self, other: &Self) -> bool {
        self.hashed_key == other.hashed_key
    }
}

impl Eq for CacheItem {}

impl std::hash::Hash for CacheItem {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hashed_key.hash(state);
    }
}

/// Orders cache items for eviction: sweeps delete from the front of the
/// returned list until the cache is back under budget.
pub trait EvictionPolicy: Send + Sync {
    fn sort_items(&self, items: Vec<CacheItem>) -> Vec<CacheItem>;
}

/// Evicts the least-recently-accessed file first.
pub struct LruEvictionPolicy;

impl EvictionPolicy for LruEvictionPolicy {
    fn sort_items(&self, mut items: Vec<CacheItem>) -> Vec<CacheItem> {
        items.sort_by_key(|i| i.atime);
        items
    }
}

/// Evicts the oldest-written file first.
pub struct FifoEvictionPolicy;

impl EvictionPolicy for FifoEvictionPolicy {
    fn sort_items(&self, mut items: Vec<CacheItem>) -> Vec<CacheItem> {
        items.sort_by_key(|i| i.mtime);
        items
    }
}

/// Shuffles eviction order but always preserves the most recently written
/// file, so a just-cached object is never evicted by the same sweep.
pub struct RandomEvictionPolicy;

impl EvictionPolicy for RandomEvictionPolicy {
    fn sort_items(&self, mut items: Vec<CacheItem>) -> Vec<CacheItem> {
        if items.len() <= 1 {
            return items;
        }
        items.sort_by_key(|i| i.mtime);
        let newest = items.pop().expect("checked len > 1");
        items.shuffle(&mut rand::thread_rng());
        items.push(newest);
        items
    }
}

/// No eviction: the sweep only updates bookkeeping, never deletes.
pub struct NoEvictionPolicy;

impl EvictionPolicy for NoEvictionPolicy {
    fn sort_items(&self, _items: Vec<CacheItem>) -> Vec<CacheItem> {
        Vec::new()
    }
}

/// Constructs an [`EvictionPolicy`] from its configured name.
pub fn create(policy_type: &str) -> Result<Box<dyn EvictionPolicy>> {
    match policy_type.to_lowercase().as_str() {
        LRU => Ok(Box::new(LruEvictionPolicy)),
        FIFO => Ok(Box::new(FifoEvictionPolicy)),
        RANDOM => Ok(Box::new(RandomEvictionPolicy)),
        NO_EVICTION => Ok(Box::new(NoEvictionPolicy)),
        other => Err(Error::config_invalid(format!(
            "unsupported eviction policy: {other}. Must be one of: lru, fifo, random, no_eviction"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn item(name: &str, atime_secs: u64, mtime_secs: u64) -> CacheItem {
        CacheItem {
            file_path: PathBuf::from(name),
            file_size: 1,
            atime: SystemTime::UNIX_EPOCH + Duration::from_secs(atime_secs),
            mtime: SystemTime::UNIX_EPOCH + Duration::from_secs(mtime_secs),
            hashed_key: name.to_string(),
        }
    }

    #[test]
    fn fifo_orders_by_mtime_ascending() {
        let items = vec![item("a", 0, 30), item("b", 0, 10), item("c", 0, 20)];
        let sorted = FifoEvictionPolicy.sort_items(items);
        let names: Vec<_> = sorted.iter().map(|i| i.hashed_key.clone()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn lru_orders_by_atime_ascending() {
        let items = vec![item("a", 30, 0), item("b", 10, 0), item("c", 20, 0)];
        let sorted = LruEvictionPolicy.sort_items(items);
        let names: Vec<_> = sorted.iter().map(|i| i.hashed_key.clone()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn random_preserves_newest_mtime_at_the_end() {
        let items = vec![item("a", 0, 5), item("b", 0, 50), item("c", 0, 25)];
        let sorted = RandomEvictionPolicy.sort_items(items);
        assert_eq!(sorted.last().unwrap().hashed_key, "b");
    }

    #[test]
    fn no_eviction_never_selects_anything() {
        let items = vec![item("a", 0, 1)];
        assert!(NoEvictionPolicy.sort_items(items).is_empty());
    }

    #[test]
    fn create_rejects_unknown_policy() {
        assert!(create("bogus").is_err());
    }
}
