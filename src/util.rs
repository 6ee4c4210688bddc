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
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use rand::Rng;
use uuid::Uuid;

static LOCK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Longest ttl accepted for a lock or an extension (one week).
pub const MAX_LOCK_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Unique value written to every node for one acquisition attempt:
/// `{counter}-{unix millis}-{uuid}`.
pub fn get_lock_id() -> String {
    let sequence = LOCK_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}-{}-{}", sequence, millis, Uuid::new_v4().simple())
}

pub fn num_milliseconds(duration: &Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

/// `round(ttl_ms * drift_factor) + fixed`
pub fn calculate_drift(ttl: Duration, drift_factor: f64, fixed: Duration) -> Duration {
    let drift_ms = (ttl.as_millis() as f64 * drift_factor).round() as u64;
    Duration::from_millis(drift_ms) + fixed
}

/// Time left once the round trip and the drift margin are paid for.
pub fn calculate_validity(ttl: Duration, elapsed: Duration, drift: Duration) -> Duration {
    ttl.saturating_sub(elapsed).saturating_sub(drift)
}

pub fn calculate_quorum(n: usize) -> usize {
    n / 2 + 1
}

/// Per-node call timeout: `min(node_timeout, ttl / 10)`, at least 1ms.
pub fn node_call_timeout(node_timeout: Duration, ttl: Duration) -> Duration {
    node_timeout.min(ttl / 10).max(Duration::from_millis(1))
}

pub fn jitter_delay(base_delay: Duration, jitter_ms: u64) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter = rng.gen_range(0..=jitter_ms);
    if rng.gen_bool(0.5) {
        base_delay + Duration::from_millis(jitter)
    } else {
        base_delay - Duration::from_millis(jitter).min(base_delay)
    }
}

/// Backoff before retry number `attempt` (1-based):
/// `base * 2^(attempt-1) ± jitter`, capped at `max_delay`.
pub fn backoff_delay(attempt: u32, base_delay: Duration, jitter: Duration, max_delay: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    let exponential = base_delay.checked_mul(factor).unwrap_or(max_delay).min(max_delay);
    jitter_delay(exponential, num_milliseconds(&jitter)).min(max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_quorum() {
        assert_eq!(calculate_quorum(1), 1);
        assert_eq!(calculate_quorum(2), 2);
        assert_eq!(calculate_quorum(3), 2);
        assert_eq!(calculate_quorum(4), 3);
        assert_eq!(calculate_quorum(5), 3);
    }

    #[test]
    fn test_drift_rounds_and_adds_fixed() {
        let fixed = Duration::from_millis(2);
        assert_eq!(calculate_drift(Duration::from_millis(10_000), 0.01, fixed), Duration::from_millis(102));
        assert_eq!(calculate_drift(Duration::from_millis(150), 0.01, fixed), Duration::from_millis(4));
        assert_eq!(calculate_drift(Duration::from_millis(140), 0.01, fixed), Duration::from_millis(3));
    }

    #[test]
    fn test_validity_saturates() {
        let ttl = Duration::from_millis(100);
        assert_eq!(
            calculate_validity(ttl, Duration::from_millis(10), Duration::from_millis(5)),
            Duration::from_millis(85)
        );
        assert_eq!(
            calculate_validity(ttl, Duration::from_millis(99), Duration::from_millis(5)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_node_call_timeout() {
        let node_timeout = Duration::from_millis(50);
        assert_eq!(node_call_timeout(node_timeout, Duration::from_secs(10)), node_timeout);
        assert_eq!(node_call_timeout(node_timeout, Duration::from_millis(200)), Duration::from_millis(20));
        assert_eq!(node_call_timeout(node_timeout, Duration::from_millis(5)), Duration::from_millis(1));
    }

    #[test]
    fn test_lock_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| get_lock_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);
        assert_eq!(backoff_delay(1, base, Duration::ZERO, max), Duration::from_millis(100));
        assert_eq!(backoff_delay(2, base, Duration::ZERO, max), Duration::from_millis(200));
        assert_eq!(backoff_delay(3, base, Duration::ZERO, max), Duration::from_millis(400));
        assert_eq!(backoff_delay(10, base, Duration::ZERO, max), max);
        assert_eq!(backoff_delay(200, base, Duration::ZERO, max), max);
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        let base = Duration::from_millis(100);
        let jitter = Duration::from_millis(30);
        for _ in 0..200 {
            let delay = backoff_delay(2, base, jitter, Duration::from_secs(5));
            assert!(delay >= Duration::from_millis(170) && delay <= Duration::from_millis(230));
        }
    }
}
