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

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lock::fanout::fan_out;
use crate::lock::registry::Lookup;
use crate::lock::{AsyncRedLock, LockHandle};
use crate::util::{calculate_drift, calculate_validity, node_call_timeout, num_milliseconds, MAX_LOCK_TTL};

impl AsyncRedLock {
    /// Lengthens the node ttl to at least `additional_ttl` on a quorum of nodes
    /// and moves the local expiry forward. Never revives an expired lock.
    pub(crate) async fn extend_with_cancel(
        &self,
        handle: &LockHandle,
        additional_ttl: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let lock = match self.registry.get(handle.lock_id()) {
            Lookup::Held(lock) => lock,
            Lookup::Expired | Lookup::Absent => return false,
        };
        if additional_ttl.as_millis() == 0 {
            return false;
        }
        if additional_ttl > MAX_LOCK_TTL {
            warn!(resource = %lock.resource, lock_id = %lock.lock_id, ttl = ?additional_ttl, "Extension ttl above ceiling");
            return false;
        }

        let ttl_ms = num_milliseconds(&additional_ttl);
        let call_timeout = node_call_timeout(self.config.node_timeout, additional_ttl);
        let start = Instant::now();
        let calls = self
            .nodes
            .iter()
            .map(|node| node.compare_and_expire(&lock.resource, lock.lock_id.as_str(), ttl_ms));
        let replies = match fan_out(calls, call_timeout, cancel).await {
            Ok(replies) => replies,
            Err(e) => {
                debug!(resource = %lock.resource, lock_id = %lock.lock_id, error = %e, "Lock extension interrupted");
                return false;
            }
        };
        self.log_unreachable(&lock.resource, &replies);

        let extended = replies.confirmed();
        let drift = calculate_drift(additional_ttl, self.config.drift_factor, self.config.drift_fixed);
        let validity = calculate_validity(additional_ttl, start.elapsed(), drift);
        if extended < self.quorum() || validity.is_zero() {
            debug!(
                resource = %lock.resource,
                lock_id = %lock.lock_id,
                extended,
                total = lock.total_nodes,
                "Lock extension rejected"
            );
            return false;
        }

        let advanced = self.registry.advance(&lock.lock_id, start, validity);
        debug!(resource = %lock.resource, lock_id = %lock.lock_id, extended, validity = ?validity, advanced, "Lock extended");
        advanced
    }
}

#[cfg(test)]
mod tests {
    use crate::{AsyncRedLock, LockNode, MemoryNode, RedLockConfig, MAX_LOCK_TTL};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    fn setup(count: usize) -> (Vec<Arc<MemoryNode>>, AsyncRedLock) {
        let nodes: Vec<Arc<MemoryNode>> = (0..count).map(|i| Arc::new(MemoryNode::new(&format!("node-{}", i)))).collect();
        let dyn_nodes = nodes.iter().map(|n| n.clone() as Arc<dyn LockNode>).collect();
        (nodes, AsyncRedLock::new(dyn_nodes, RedLockConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn test_extend_moves_expiry_forward() {
        let (nodes, redlock) = setup(3);
        let handle = redlock.acquire_lock("orders", Duration::from_millis(300), 1, Duration::ZERO).await.unwrap();
        let before = redlock.get_lock_info(&handle).unwrap().expires_at;

        assert!(redlock.extend_lock(&handle, Duration::from_secs(10)).await);
        let after = redlock.get_lock_info(&handle).unwrap();
        assert!(after.expires_at > before);
        assert!(after.ttl < Duration::from_secs(10));
        assert!(nodes[0].store().ttl("orders").unwrap() > Duration::from_secs(5));

        // Outlives the original ttl
        sleep(Duration::from_millis(400)).await;
        assert!(redlock.is_valid(&handle));
    }

    #[tokio::test]
    async fn test_extend_requires_quorum() {
        let (nodes, redlock) = setup(3);
        let handle = redlock.acquire_lock("orders", Duration::from_secs(1), 1, Duration::ZERO).await.unwrap();
        let before = redlock.get_lock_info(&handle).unwrap().expires_at;
        nodes[0].set_available(false);
        nodes[1].set_available(false);

        assert!(!redlock.extend_lock(&handle, Duration::from_secs(10)).await);
        let after = redlock.get_lock_info(&handle).unwrap();
        assert_eq!(after.expires_at, before);
    }

    #[tokio::test]
    async fn test_shorter_extension_keeps_node_ttl() {
        let (nodes, redlock) = setup(3);
        let handle = redlock.acquire_lock("orders", Duration::from_secs(10), 1, Duration::ZERO).await.unwrap();

        assert!(redlock.extend_lock(&handle, Duration::from_millis(100)).await);
        sleep(Duration::from_millis(200)).await;
        assert!(redlock.is_valid(&handle));
        for node in &nodes {
            assert_eq!(node.store().get("orders").as_deref(), Some(handle.lock_id().as_str()));
        }
    }

    #[tokio::test]
    async fn test_extend_above_ceiling_is_rejected() {
        let (nodes, redlock) = setup(3);
        let handle = redlock.acquire_lock("orders", Duration::from_secs(1), 1, Duration::ZERO).await.unwrap();
        let calls_before = nodes[0].call_count();

        assert!(!redlock.extend_lock(&handle, Duration::MAX).await);
        assert!(!redlock.extend_lock(&handle, MAX_LOCK_TTL + Duration::from_secs(1)).await);
        assert_eq!(nodes[0].call_count(), calls_before);
        assert!(redlock.is_valid(&handle));
    }

    #[tokio::test]
    async fn test_extend_after_expiry_does_not_resurrect() {
        let (nodes, redlock) = setup(3);
        let handle = redlock.acquire_lock("orders", Duration::from_millis(50), 1, Duration::ZERO).await.unwrap();
        sleep(Duration::from_millis(80)).await;
        let calls_before = nodes[0].call_count();

        assert!(!redlock.extend_lock(&handle, Duration::from_secs(10)).await);
        assert_eq!(nodes[0].call_count(), calls_before);
        assert!(!redlock.is_valid(&handle));
        assert!(redlock.get_lock_info(&handle).is_none());
    }

    #[tokio::test]
    async fn test_extend_after_release_is_noop() {
        let (_nodes, redlock) = setup(3);
        let handle = redlock.acquire_lock("orders", Duration::from_secs(1), 1, Duration::ZERO).await.unwrap();
        assert!(redlock.release_lock(&handle).await);
        assert!(!redlock.extend_lock(&handle, Duration::from_secs(10)).await);
        assert_eq!(redlock.held_locks(), 0);
    }
}
