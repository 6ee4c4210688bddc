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

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lock::acquire::compare_and_delete_all;
use crate::lock::registry::Lookup;
use crate::lock::{AsyncRedLock, LockHandle};
use crate::util::node_call_timeout;

impl AsyncRedLock {
    /// Drops the registry entry and deletes the key on every node still
    /// holding this lock id. True if the lock was held when called.
    pub(crate) async fn release_with_cancel(&self, handle: &LockHandle, cancel: &CancellationToken) -> bool {
        let lock = match self.registry.take(handle.lock_id()) {
            Lookup::Held(lock) => lock,
            Lookup::Expired => {
                debug!(resource = %handle.resource(), lock_id = %handle.lock_id(), "Release of an expired lock");
                return false;
            }
            Lookup::Absent => return false,
        };

        let call_timeout = node_call_timeout(self.config.node_timeout, lock.ttl);
        match compare_and_delete_all(&self.nodes, &lock.resource, &lock.lock_id, call_timeout, cancel).await {
            Ok(replies) => {
                self.log_unreachable(&lock.resource, &replies);
                debug!(
                    resource = %lock.resource,
                    lock_id = %lock.lock_id,
                    deleted = replies.confirmed(),
                    total = lock.total_nodes,
                    "Lock released"
                );
            }
            Err(e) => {
                // Remaining keys expire on their own
                warn!(resource = %lock.resource, lock_id = %lock.lock_id, error = %e, "Lock release interrupted");
            }
        }
        true
    }
}
