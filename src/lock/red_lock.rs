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

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lock::registry::LockRegistry;
use crate::lock::{AsyncLockWatchdog, Lock, LockHandle, LockRequest};
use crate::util::calculate_quorum;
use crate::{AsyncRedisNode, LockError, LockNode, LockResult, RedLockConfig};

/// === AsyncRedLock (quorum lock over independent nodes) ===
///
/// Cloning is cheap and clones share the same registry, so a lock acquired
/// through one clone can be extended or released through another.
#[derive(Clone)]
pub struct AsyncRedLock {
    pub(crate) nodes: Vec<Arc<dyn LockNode>>,
    pub(crate) config: Arc<RedLockConfig>,
    pub(crate) registry: Arc<LockRegistry>,
}

impl AsyncRedLock {
    pub fn new(nodes: Vec<Arc<dyn LockNode>>, config: RedLockConfig) -> LockResult<Self> {
        config.validate()?;
        RedLockConfig::check_node_count(nodes.len())?;

        Ok(Self {
            nodes,
            config: Arc::new(config),
            registry: Arc::new(LockRegistry::new()),
        })
    }

    /// One Redis node per configured endpoint.
    pub fn from_config(config: RedLockConfig) -> LockResult<Self> {
        let nodes = config
            .nodes
            .iter()
            .map(|node| AsyncRedisNode::new(node, &config).map(|n| Arc::new(n) as Arc<dyn LockNode>))
            .collect::<LockResult<Vec<_>>>()?;
        Self::new(nodes, config)
    }

    pub fn config(&self) -> &RedLockConfig {
        &self.config
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn quorum(&self) -> usize {
        calculate_quorum(self.nodes.len())
    }

    /// A request for `resource` with the configured retry and drift defaults.
    pub fn request(&self, resource: &str, ttl: Duration) -> LockRequest {
        LockRequest::new(resource, ttl, &self.config)
    }

    /// Like [`request`](Self::request) with the configured `default_ttl`.
    pub fn default_request(&self, resource: &str) -> LockRequest {
        self.request(resource, self.config.default_ttl)
    }

    /// Acquires `resource` for the configured `default_ttl`.
    pub async fn lock(&self, resource: &str) -> LockResult<LockHandle> {
        self.acquire(&self.default_request(resource)).await
    }

    pub async fn acquire_lock(
        &self,
        resource: &str,
        ttl: Duration,
        retry_count: u32,
        retry_base_delay: Duration,
    ) -> LockResult<LockHandle> {
        let request = self
            .request(resource, ttl)
            .with_retry_count(retry_count)
            .with_retry_base_delay(retry_base_delay);
        self.acquire(&request).await
    }

    pub async fn acquire(&self, request: &LockRequest) -> LockResult<LockHandle> {
        self.acquire_with_retry(request, &CancellationToken::new()).await
    }

    /// Like [`acquire`](Self::acquire), aborting node calls and backoff as
    /// soon as `cancel` fires.
    pub async fn acquire_with_cancel(&self, request: &LockRequest, cancel: &CancellationToken) -> LockResult<LockHandle> {
        self.acquire_with_retry(request, cancel).await
    }

    /// A single attempt, `Ok(None)` when the lock is held elsewhere.
    pub async fn try_lock(&self, resource: &str, ttl: Duration) -> LockResult<Option<LockHandle>> {
        let request = self.request(resource, ttl).with_retry_count(1);
        match self.acquire(&request).await {
            Ok(handle) => Ok(Some(handle)),
            Err(e) if e.is_retryable() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn release_lock(&self, handle: &LockHandle) -> bool {
        self.release_with_cancel(handle, &CancellationToken::new()).await
    }

    pub async fn release_lock_with_cancel(&self, handle: &LockHandle, cancel: &CancellationToken) -> bool {
        self.release_with_cancel(handle, cancel).await
    }

    pub async fn extend_lock(&self, handle: &LockHandle, additional_ttl: Duration) -> bool {
        self.extend_with_cancel(handle, additional_ttl, &CancellationToken::new()).await
    }

    pub async fn extend_lock_with_cancel(
        &self,
        handle: &LockHandle,
        additional_ttl: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        self.extend_with_cancel(handle, additional_ttl, cancel).await
    }

    /// Local check against the registry, no node is contacted.
    pub fn is_valid(&self, handle: &LockHandle) -> bool {
        self.registry.is_valid(handle.lock_id())
    }

    /// Snapshot of the registry entry behind `handle`.
    pub fn get_lock_info(&self, handle: &LockHandle) -> Option<Lock> {
        match self.registry.get(handle.lock_id()) {
            super::registry::Lookup::Held(lock) => Some(lock),
            _ => None,
        }
    }

    pub fn held_locks(&self) -> usize {
        self.registry.len()
    }

    pub fn purge_expired(&self) -> usize {
        self.registry.purge_expired()
    }

    /// Get the number of nodes answering a ping
    pub async fn healthy_node_count(&self) -> usize {
        let pings = self
            .nodes
            .iter()
            .map(|node| tokio::time::timeout(self.config.node_timeout, node.ping()));
        futures::future::join_all(pings)
            .await
            .into_iter()
            .filter(|result| matches!(result, Ok(Ok(()))))
            .count()
    }

    /// Extends `handle` to `ttl` every `interval` until stopped or an
    /// extension fails.
    pub fn start_watchdog(&self, handle: &LockHandle, ttl: Duration, interval: Duration) -> LockResult<AsyncLockWatchdog> {
        if interval.is_zero() || interval >= ttl {
            return Err(LockError::ConfigError(format!(
                "Watchdog interval {:?} must be non-zero and shorter than ttl {:?}",
                interval, ttl
            )));
        }
        Ok(AsyncLockWatchdog::start(self.clone(), handle.clone(), ttl, interval))
    }

    /// Acquire with the configured retries, run `operation`, release.
    ///
    /// The lock is released on every exit path. A panic inside `operation`
    /// is resumed once the release has finished.
    pub async fn with_lock<F, Fut, T>(&self, resource: &str, ttl: Duration, operation: F) -> LockResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let handle = self.acquire(&self.request(resource, ttl)).await?;
        let guard = ReleaseGuard::new(self.clone(), handle);

        let outcome = AssertUnwindSafe(async move { operation().await }).catch_unwind().await;
        guard.release().await;

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// [`with_lock`](Self::with_lock) with a watchdog extending the lock for
    /// as long as `operation` runs.
    pub async fn with_lock_auto_extend<F, Fut, T>(&self, resource: &str, ttl: Duration, operation: F) -> LockResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let interval = self.config.watchdog_interval.unwrap_or(ttl / 3);
        let handle = self.acquire(&self.request(resource, ttl)).await?;
        let guard = ReleaseGuard::new(self.clone(), handle.clone());
        let mut watchdog = match self.start_watchdog(&handle, ttl, interval) {
            Ok(watchdog) => watchdog,
            Err(e) => {
                guard.release().await;
                return Err(e);
            }
        };

        let outcome = AssertUnwindSafe(async move { operation().await }).catch_unwind().await;
        watchdog.stop().await;
        guard.release().await;

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Releases the lock when dropped without an explicit release, e.g. when the
/// future running the protected operation is dropped.
struct ReleaseGuard {
    redlock: AsyncRedLock,
    handle: Option<LockHandle>,
}

impl ReleaseGuard {
    fn new(redlock: AsyncRedLock, handle: LockHandle) -> Self {
        Self { redlock, handle: Some(handle) }
    }

    async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            if !self.redlock.release_lock(&handle).await {
                debug!(resource = %handle.resource(), lock_id = %handle.lock_id(), "Lock was no longer held at release");
            }
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let redlock = self.redlock.clone();
                runtime.spawn(async move {
                    redlock.release_lock(&handle).await;
                });
            }
            Err(_) => {
                // Nodes will expire the key on their own
                warn!(resource = %handle.resource(), "No runtime to release dropped lock");
                self.redlock.registry.take(handle.lock_id());
            }
        }
    }
}
