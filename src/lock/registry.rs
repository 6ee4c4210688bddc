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

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::lock::{Lock, LockId};

/// Result of looking a lock id up
#[derive(Debug)]
pub(crate) enum Lookup {
    Held(Lock),
    /// Was present but passed its expiry, the entry has been dropped
    Expired,
    Absent,
}

/// Locks held by this process, keyed by lock id.
///
/// Expired entries are dropped whenever they are looked at, so an entry that
/// can be observed is always a live, quorum-acquired lock.
#[derive(Default)]
pub(crate) struct LockRegistry {
    locks: Mutex<HashMap<LockId, Lock>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, lock: Lock) {
        self.locks.lock().insert(lock.lock_id.clone(), lock);
    }

    pub fn get(&self, lock_id: &LockId) -> Lookup {
        let mut locks = self.locks.lock();
        match locks.get(lock_id) {
            None => Lookup::Absent,
            Some(lock) if lock.is_expired() => {
                debug!(resource = %lock.resource, lock_id = %lock_id, "Dropping locally expired lock");
                locks.remove(lock_id);
                Lookup::Expired
            }
            Some(lock) => Lookup::Held(lock.clone()),
        }
    }

    /// Removes the entry, reporting whether it was still live.
    pub fn take(&self, lock_id: &LockId) -> Lookup {
        match self.locks.lock().remove(lock_id) {
            None => Lookup::Absent,
            Some(lock) if lock.is_expired() => Lookup::Expired,
            Some(lock) => Lookup::Held(lock),
        }
    }

    /// Moves the expiry of a live entry to `started + validity` if that is
    /// later than the current one. Returns false when no live entry exists.
    pub fn advance(&self, lock_id: &LockId, started: Instant, validity: Duration) -> bool {
        let mut locks = self.locks.lock();
        let Some(lock) = locks.get_mut(lock_id) else {
            return false;
        };
        if lock.is_expired() {
            locks.remove(lock_id);
            return false;
        }
        let expires_at = started + validity;
        if expires_at > lock.expires_at {
            lock.expires_at = expires_at;
            lock.ttl = validity;
        }
        true
    }

    pub fn is_valid(&self, lock_id: &LockId) -> bool {
        matches!(self.get(lock_id), Lookup::Held(_))
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, lock| lock.expires_at > now);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }
}
