/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::errors::{LockError, LockResult};
use crate::node::LockNode;

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Key space of one in-process node, entries expire on their own
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current value of `key`, `None` once it has expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        Self::evict_if_expired(&mut entries, key);
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Remaining ttl of `key`.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut entries = self.entries.lock();
        Self::evict_if_expired(&mut entries, key);
        entries
            .get(key)
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now()))
    }

    fn evict_if_expired(entries: &mut HashMap<String, MemoryEntry>, key: &str) {
        if entries.get(key).is_some_and(|entry| entry.expires_at <= Instant::now()) {
            entries.remove(key);
        }
    }

    fn deadline(ttl: Duration) -> LockResult<Instant> {
        Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| LockError::ConfigError(format!("Ttl {:?} is out of range", ttl)))
    }

    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        let expires_at = Self::deadline(ttl)?;
        let mut entries = self.entries.lock();
        Self::evict_if_expired(&mut entries, key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> bool {
        let mut entries = self.entries.lock();
        Self::evict_if_expired(&mut entries, key);
        match entries.get(key) {
            Some(entry) if entry.value == expected => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Expiry only moves forward, a shorter ttl leaves the key as it is.
    fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> LockResult<bool> {
        let expires_at = Self::deadline(ttl)?;
        let mut entries = self.entries.lock();
        Self::evict_if_expired(&mut entries, key);
        match entries.get_mut(key) {
            Some(entry) if entry.value == expected => {
                entry.expires_at = entry.expires_at.max(expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-process lock node with fault injection.
///
/// Several nodes may share one [`MemoryStore`] to model different clients
/// reaching the same server over different network paths.
pub struct MemoryNode {
    name: String,
    store: Arc<MemoryStore>,
    available: AtomicBool,
    delay_ms: AtomicU64,
    calls: AtomicUsize,
}

impl MemoryNode {
    pub fn new(name: &str) -> Self {
        Self::with_store(name, MemoryStore::new())
    }

    pub fn with_store(name: &str, store: Arc<MemoryStore>) -> Self {
        Self {
            name: name.to_string(),
            store,
            available: AtomicBool::new(true),
            delay_ms: AtomicU64::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    /// An unavailable node fails every call immediately.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Latency added before every call reaches the store.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::Release);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    async fn enter(&self) -> LockResult<()> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        if !self.available.load(Ordering::Acquire) {
            return Err(LockError::NodeUnreachable(self.name.clone()));
        }
        let delay = self.delay_ms.load(Ordering::Acquire);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl LockNode for MemoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_ms: u64) -> LockResult<bool> {
        self.enter().await?;
        self.store.set_if_absent(key, value, Duration::from_millis(ttl_ms))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> LockResult<bool> {
        self.enter().await?;
        Ok(self.store.compare_and_delete(key, expected))
    }

    async fn compare_and_expire(&self, key: &str, expected: &str, new_ttl_ms: u64) -> LockResult<bool> {
        self.enter().await?;
        self.store.compare_and_expire(key, expected, Duration::from_millis(new_ttl_ms))
    }

    async fn ping(&self) -> LockResult<()> {
        self.enter().await
    }
}
