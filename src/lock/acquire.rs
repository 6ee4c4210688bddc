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

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::lock::fanout::{fan_out, FanOut, NodeReply};
use crate::lock::{AsyncRedLock, Lock, LockHandle, LockId, LockRequest};
use crate::util::{
    backoff_delay, calculate_drift, calculate_quorum, calculate_validity, node_call_timeout, num_milliseconds, MAX_LOCK_TTL,
};
use crate::{LockError, LockNode, LockResult};

impl AsyncRedLock {
    /// Runs attempts until one reaches quorum, backing off exponentially in
    /// between. Only quorum and drift failures are retried.
    pub(crate) async fn acquire_with_retry(&self, request: &LockRequest, cancel: &CancellationToken) -> LockResult<LockHandle> {
        Self::validate_request(request)?;

        let max_attempts = request.retry_count.max(1);
        let total = self.nodes.len();
        let mut last_error = LockError::QuorumNotReached {
            acquired: 0,
            total,
            quorum: calculate_quorum(total),
            attempts: 0,
        };

        for attempt in 1..=max_attempts {
            match self.try_acquire_once(request, cancel).await {
                Ok(lock) => {
                    info!(
                        resource = %lock.resource,
                        lock_id = %lock.lock_id,
                        acquired = lock.nodes_acquired,
                        total = lock.total_nodes,
                        validity = ?lock.ttl,
                        attempt,
                        "Lock acquired"
                    );
                    return Ok(LockHandle::new(&lock, attempt));
                }
                Err(e) if e.is_retryable() => {
                    debug!(resource = %request.resource, attempt, error = %e, "Lock attempt failed");
                    last_error = e;
                }
                Err(e) => return Err(e),
            }

            if attempt < max_attempts {
                let delay = backoff_delay(
                    attempt,
                    request.retry_base_delay,
                    request.retry_jitter,
                    request.retry_max_delay,
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(LockError::Cancelled),
                    _ = sleep(delay) => {}
                }
            }
        }

        warn!(resource = %request.resource, attempts = max_attempts, error = %last_error, "Failed to acquire lock");
        Err(match last_error {
            LockError::QuorumNotReached { acquired, total, quorum, .. } => LockError::QuorumNotReached {
                acquired,
                total,
                quorum,
                attempts: max_attempts,
            },
            other => other,
        })
    }

    fn validate_request(request: &LockRequest) -> LockResult<()> {
        if request.ttl.as_millis() == 0 {
            return Err(LockError::ConfigError("Lock ttl must be at least 1ms".to_string()));
        }
        if request.ttl > MAX_LOCK_TTL {
            return Err(LockError::ConfigError(format!(
                "Lock ttl {:?} exceeds the {:?} ceiling",
                request.ttl, MAX_LOCK_TTL
            )));
        }
        if !(0.0..1.0).contains(&request.drift_factor) {
            return Err(LockError::ConfigError(format!(
                "Drift factor must be in [0, 1), got {}",
                request.drift_factor
            )));
        }
        Ok(())
    }

    /// Single-attempt lock acquisition
    async fn try_acquire_once(&self, request: &LockRequest, cancel: &CancellationToken) -> LockResult<Lock> {
        let lock_id = LockId::generate();
        let total = self.nodes.len();
        let quorum = calculate_quorum(total);
        let ttl_ms = num_milliseconds(&request.ttl);
        let call_timeout = node_call_timeout(self.config.node_timeout, request.ttl);
        let start = Instant::now();

        let calls = self
            .nodes
            .iter()
            .map(|node| node.set_if_absent(&request.resource, lock_id.as_str(), ttl_ms));
        let replies = match fan_out(calls, call_timeout, cancel).await {
            Ok(replies) => replies,
            Err(e) => {
                // Which nodes granted the key is unknown once the calls are dropped
                self.spawn_cleanup(&request.resource, &lock_id, call_timeout);
                return Err(e);
            }
        };

        let acquired = replies.confirmed();
        let elapsed = start.elapsed();
        let drift = calculate_drift(request.ttl, request.drift_factor, self.config.drift_fixed);
        let validity = calculate_validity(request.ttl, elapsed, drift);
        self.log_unreachable(&request.resource, &replies);

        if acquired >= quorum && !validity.is_zero() {
            let lock = Lock {
                resource: request.resource.clone(),
                lock_id,
                ttl: validity,
                acquired_at: start,
                expires_at: start + validity,
                nodes_acquired: acquired,
                total_nodes: total,
            };
            self.registry.insert(lock.clone());
            return Ok(lock);
        }

        let granted = replies.confirmed_indices();
        if !granted.is_empty() {
            let nodes: Vec<Arc<dyn LockNode>> = granted.iter().map(|&i| self.nodes[i].clone()).collect();
            let deleted = compare_and_delete_all(&nodes, &request.resource, &lock_id, call_timeout, &CancellationToken::new())
                .await
                .map(|r| r.confirmed())
                .unwrap_or(0);
            debug!(resource = %request.resource, granted = granted.len(), deleted, "Cleaned up partial lock");
        }

        debug!(
            resource = %request.resource,
            acquired,
            unreachable = replies.unreachable(),
            total,
            elapsed = ?elapsed,
            "Lock attempt below quorum or out of time"
        );
        if acquired >= quorum {
            Err(LockError::ClockDriftExceeded { acquired, total })
        } else {
            Err(LockError::QuorumNotReached { acquired, total, quorum, attempts: 1 })
        }
    }

    /// Best-effort delete on every node, detached so a cancelled caller
    /// returns immediately.
    fn spawn_cleanup(&self, resource: &str, lock_id: &LockId, call_timeout: Duration) {
        let nodes = self.nodes.clone();
        let resource = resource.to_string();
        let lock_id = lock_id.clone();
        tokio::spawn(async move {
            let _ = compare_and_delete_all(&nodes, &resource, &lock_id, call_timeout, &CancellationToken::new()).await;
        });
    }

    pub(crate) fn log_unreachable(&self, resource: &str, replies: &FanOut) {
        for (node, reply) in self.nodes.iter().zip(&replies.replies) {
            match reply {
                NodeReply::Failed(e) => debug!(resource, node = node.name(), error = %e, "Lock node call failed"),
                NodeReply::TimedOut => debug!(resource, node = node.name(), "Lock node call timed out"),
                NodeReply::Confirmed | NodeReply::Refused => {}
            }
        }
    }
}

/// Compare-and-delete `lock_id` under `resource` on every node in `nodes`.
pub(crate) async fn compare_and_delete_all(
    nodes: &[Arc<dyn LockNode>],
    resource: &str,
    lock_id: &LockId,
    call_timeout: Duration,
    cancel: &CancellationToken,
) -> LockResult<FanOut> {
    let calls = nodes
        .iter()
        .map(|node| node.compare_and_delete(resource, lock_id.as_str()));
    fan_out(calls, call_timeout, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryNode, RedLockConfig};

    fn redlock_with(nodes: &[Arc<MemoryNode>], config: RedLockConfig) -> AsyncRedLock {
        let nodes = nodes.iter().map(|n| n.clone() as Arc<dyn LockNode>).collect();
        AsyncRedLock::new(nodes, config).unwrap()
    }

    fn memory_nodes(count: usize) -> Vec<Arc<MemoryNode>> {
        (0..count).map(|i| Arc::new(MemoryNode::new(&format!("node-{}", i)))).collect()
    }

    fn fast_config() -> RedLockConfig {
        RedLockConfig::default()
            .with_retry_base_delay(Duration::from_millis(5))
            .with_retry_jitter(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_single_attempt_on_healthy_nodes() {
        let nodes = memory_nodes(3);
        let redlock = redlock_with(&nodes, fast_config());
        let request = redlock.request("orders", Duration::from_secs(5));

        let lock = redlock.try_acquire_once(&request, &CancellationToken::new()).await.unwrap();
        assert_eq!(lock.nodes_acquired, 3);
        assert!(lock.ttl < Duration::from_secs(5));
        for node in &nodes {
            assert_eq!(node.store().get("orders").as_deref(), Some(lock.lock_id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_failed_attempt_cleans_up_granted_nodes() {
        let nodes = memory_nodes(5);
        nodes[0].set_available(false);
        nodes[1].set_available(false);
        nodes[2].set_available(false);
        let redlock = redlock_with(&nodes, fast_config());
        let request = redlock.request("orders", Duration::from_secs(5));

        let err = redlock.try_acquire_once(&request, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, LockError::QuorumNotReached { acquired: 2, total: 5, quorum: 3, .. }));
        assert!(nodes[3].store().get("orders").is_none());
        assert!(nodes[4].store().get("orders").is_none());
        assert_eq!(redlock.held_locks(), 0);
    }

    #[tokio::test]
    async fn test_drift_consuming_ttl_fails_with_cleanup() {
        let nodes = memory_nodes(3);
        // 10ms ttl with 2ms fixed drift and a 9ms factor leaves nothing
        let redlock = redlock_with(&nodes, fast_config());
        let request = redlock.request("orders", Duration::from_millis(10)).with_drift_factor(0.9);

        let err = redlock.try_acquire_once(&request, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, LockError::ClockDriftExceeded { acquired: 3, total: 3 }));
        for node in &nodes {
            assert!(node.store().get("orders").is_none());
        }
    }

    #[tokio::test]
    async fn test_retries_until_exhausted() {
        let nodes = memory_nodes(3);
        nodes[0].set_available(false);
        nodes[1].set_available(false);
        let redlock = redlock_with(&nodes, fast_config());
        let request = redlock.request("orders", Duration::from_secs(1)).with_retry_count(4);

        let err = redlock.acquire(&request).await.unwrap_err();
        assert!(matches!(err, LockError::QuorumNotReached { acquired: 1, attempts: 4, .. }));
        assert_eq!(nodes[2].call_count(), 8);
    }

    #[tokio::test]
    async fn test_retry_succeeds_once_holder_releases() {
        let nodes = memory_nodes(3);
        let redlock = redlock_with(&nodes, fast_config());
        let holder = redlock.acquire_lock("orders", Duration::from_millis(60), 1, Duration::ZERO).await.unwrap();

        let request = redlock
            .request("orders", Duration::from_secs(1))
            .with_retry_count(10)
            .with_retry_base_delay(Duration::from_millis(20))
            .with_retry_max_delay(Duration::from_millis(40));
        let handle = redlock.acquire(&request).await.unwrap();

        assert!(handle.attempts() > 1);
        assert_ne!(handle.lock_id(), holder.lock_id());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let nodes = memory_nodes(3);
        let redlock = redlock_with(&nodes, fast_config());
        let request = redlock.request("orders", Duration::ZERO);
        assert!(matches!(redlock.acquire(&request).await, Err(LockError::ConfigError(_))));
        assert_eq!(nodes[0].call_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_ttl_is_rejected() {
        let nodes = memory_nodes(3);
        let redlock = redlock_with(&nodes, fast_config());

        let err = redlock.acquire_lock("orders", Duration::MAX, 1, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, LockError::ConfigError(_)));
        let err = redlock
            .acquire_lock("orders", MAX_LOCK_TTL + Duration::from_millis(1), 1, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::ConfigError(_)));
        assert_eq!(nodes[0].call_count(), 0);

        let handle = redlock.acquire_lock("orders", MAX_LOCK_TTL, 1, Duration::ZERO).await.unwrap();
        assert!(redlock.is_valid(&handle));
    }

    #[tokio::test]
    async fn test_cancel_during_fan_out_cleans_up_granted_nodes() {
        let nodes = memory_nodes(3);
        // The slow node is still in flight when the caller gives up
        nodes[2].set_delay(Duration::from_millis(40));
        let redlock = redlock_with(&nodes, fast_config());
        let request = redlock.request("orders", Duration::from_secs(10)).with_retry_count(1);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = redlock.acquire_with_cancel(&request, &cancel).await;
        assert!(matches!(result, Err(LockError::Cancelled)));
        assert_eq!(redlock.held_locks(), 0);

        sleep(Duration::from_millis(150)).await;
        for node in &nodes {
            assert!(node.store().get("orders").is_none());
        }
        let other = redlock.acquire_lock("orders", Duration::from_secs(1), 1, Duration::ZERO).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let nodes = memory_nodes(3);
        nodes[0].set_available(false);
        nodes[1].set_available(false);
        let redlock = redlock_with(&nodes, fast_config());
        let request = redlock
            .request("orders", Duration::from_secs(1))
            .with_retry_count(5)
            .with_retry_base_delay(Duration::from_secs(10))
            .with_retry_max_delay(Duration::from_secs(10));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = redlock.acquire_with_cancel(&request, &cancel).await;
        assert!(matches!(result, Err(LockError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
