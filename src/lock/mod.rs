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

mod acquire;
mod extend;
mod fanout;
mod red_lock;
mod registry;
mod release;
mod watchdog;

pub use red_lock::*;
pub use watchdog::*;

use std::fmt;
use std::time::{Duration, Instant};
use crate::util::get_lock_id;
use crate::RedLockConfig;

/// Token written to the nodes for one acquisition, unique for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockId(String);

impl LockId {
    pub(crate) fn generate() -> Self {
        LockId(get_lock_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// === Held lock state, as recorded in the registry ===
#[derive(Debug, Clone)]
pub struct Lock {
    pub resource: String,
    pub lock_id: LockId,
    /// Drift-adjusted validity granted by the last acquisition or extension
    pub ttl: Duration,
    pub acquired_at: Instant,
    pub expires_at: Instant,
    pub nodes_acquired: usize,
    pub total_nodes: usize,
}

impl Lock {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn remaining_time(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// What a caller holds after a successful acquisition.
///
/// The handle is only a key: whether the lock is still held is decided by the
/// registry of the [`AsyncRedLock`] that issued it.
#[derive(Debug, Clone)]
pub struct LockHandle {
    lock_id: LockId,
    resource: String,
    validity: Duration,
    nodes_acquired: usize,
    total_nodes: usize,
    attempts: u32,
}

impl LockHandle {
    pub(crate) fn new(lock: &Lock, attempts: u32) -> Self {
        Self {
            lock_id: lock.lock_id.clone(),
            resource: lock.resource.clone(),
            validity: lock.ttl,
            nodes_acquired: lock.nodes_acquired,
            total_nodes: lock.total_nodes,
            attempts,
        }
    }

    pub fn lock_id(&self) -> &LockId {
        &self.lock_id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Validity at acquisition time, always below the requested ttl.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    pub fn nodes_acquired(&self) -> usize {
        self.nodes_acquired
    }

    pub fn total_nodes(&self) -> usize {
        self.total_nodes
    }

    /// Attempt number that succeeded, starting at 1.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Parameters of one acquisition, defaults come from [`RedLockConfig`]
#[derive(Debug, Clone)]
pub struct LockRequest {
    pub resource: String,
    pub ttl: Duration,
    pub retry_count: u32,
    pub retry_base_delay: Duration,
    pub retry_jitter: Duration,
    pub retry_max_delay: Duration,
    pub drift_factor: f64,
}

impl LockRequest {
    pub fn new(resource: &str, ttl: Duration, config: &RedLockConfig) -> Self {
        Self {
            resource: resource.to_string(),
            ttl,
            retry_count: config.retry_count,
            retry_base_delay: config.retry_base_delay,
            retry_jitter: config.retry_jitter,
            retry_max_delay: config.retry_max_delay,
            drift_factor: config.drift_factor,
        }
    }

    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    pub fn with_retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = delay;
        self
    }

    pub fn with_drift_factor(mut self, factor: f64) -> Self {
        self.drift_factor = factor;
        self
    }
}
