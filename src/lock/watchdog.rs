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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lock::{AsyncRedLock, LockHandle};

/// Background task extending one lock on a fixed interval.
///
/// It stops on the first failed extension, on [`stop`](Self::stop), or when
/// dropped.
pub struct AsyncLockWatchdog {
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    extensions: Arc<AtomicU64>,
}

impl AsyncLockWatchdog {
    pub(crate) fn start(redlock: AsyncRedLock, handle: LockHandle, ttl: Duration, renew_interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let extensions = Arc::new(AtomicU64::new(0));

        let task_handle = tokio::spawn({
            let cancel = cancel.clone();
            let extensions = extensions.clone();
            async move {
                let mut interval = interval_at(Instant::now() + renew_interval, renew_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            if !redlock.extend_lock_with_cancel(&handle, ttl, &cancel).await {
                                if !cancel.is_cancelled() {
                                    warn!(resource = %handle.resource(), lock_id = %handle.lock_id(), "Watchdog failed to extend lock, stopping");
                                }
                                break;
                            }
                            extensions.fetch_add(1, Ordering::AcqRel);
                        }
                    }
                }
                debug!(resource = %handle.resource(), lock_id = %handle.lock_id(), "Watchdog stopped");
            }
        });

        Self {
            cancel,
            task_handle: Some(task_handle),
            extensions,
        }
    }

    /// Number of successful extensions so far.
    pub fn extension_count(&self) -> u64 {
        self.extensions.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the task and waits for it to finish.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for AsyncLockWatchdog {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
