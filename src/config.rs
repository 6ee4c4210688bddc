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

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::errors::{LockError, LockResult};
use crate::util::MAX_LOCK_TTL;

/// One independent lock node endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    /// Redis url, e.g. `redis://10.0.0.1:6379`
    pub url: String,
    /// User name
    pub username: Option<String>,
    /// Password for `AUTH`
    pub password: Option<String>,
    /// Database number
    pub database: Option<i64>,
}

impl NodeConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            username: None,
            password: None,
            database: None,
        }
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_database(mut self, db: i64) -> Self {
        self.database = Some(db);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedLockConfig {
    /// Independent lock nodes, an odd count of at least 3 is recommended
    pub nodes: Vec<NodeConfig>,
    /// Connection pool size per node
    pub pool_size: u32,
    /// Upper bound for opening a pooled connection
    pub connection_timeout: Duration,
    /// Upper bound for a single node call, further capped at ttl / 10
    pub node_timeout: Duration,
    /// Lock expiration time used when the caller does not pass one
    pub default_ttl: Duration,
    /// Gets the number of lock retries
    pub retry_count: u32,
    /// Base delay of the exponential backoff
    pub retry_base_delay: Duration,
    /// Uniform jitter applied around every backoff delay
    pub retry_jitter: Duration,
    /// Ceiling for a single backoff delay
    pub retry_max_delay: Duration,
    /// Clock offset factor
    pub drift_factor: f64,
    /// Fixed drift margin added on top of the proportional one
    pub drift_fixed: Duration,
    /// Auto-extension period, ttl / 3 when unset
    pub watchdog_interval: Option<Duration>,
}

impl Default for RedLockConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            pool_size: 10,
            connection_timeout: Duration::from_secs(3),
            node_timeout: Duration::from_millis(50),
            default_ttl: Duration::from_secs(30),
            retry_count: 3,
            retry_base_delay: Duration::from_millis(200),
            retry_jitter: Duration::from_millis(50),
            retry_max_delay: Duration::from_secs(2),
            drift_factor: 0.01,
            drift_fixed: Duration::from_millis(2),
            watchdog_interval: None,
        }
    }
}

impl RedLockConfig {
    pub fn new(node_urls: &[&str]) -> Self {
        Self {
            nodes: node_urls.iter().map(|url| NodeConfig::new(url)).collect(),
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON, missing fields take their default.
    pub fn from_json(json: &str) -> LockResult<Self> {
        let config: RedLockConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
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

    pub fn with_drift_fixed(mut self, fixed: Duration) -> Self {
        self.drift_fixed = fixed;
        self
    }

    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = Some(interval);
        self
    }

    /// Checks the settings that do not depend on the node implementation.
    pub fn validate(&self) -> LockResult<()> {
        if self.pool_size == 0 {
            return Err(LockError::ConfigError("Pool size cannot be zero".to_string()));
        }
        if self.node_timeout.is_zero() {
            return Err(LockError::ConfigError("Node timeout cannot be zero".to_string()));
        }
        if self.default_ttl.as_millis() == 0 || self.default_ttl > MAX_LOCK_TTL {
            return Err(LockError::ConfigError(format!(
                "Default ttl must be between 1ms and {:?}, got {:?}",
                MAX_LOCK_TTL, self.default_ttl
            )));
        }
        if !(0.0..1.0).contains(&self.drift_factor) {
            return Err(LockError::ConfigError(format!(
                "Drift factor must be in [0, 1), got {}",
                self.drift_factor
            )));
        }
        if self.nodes.iter().any(|node| node.url.is_empty()) {
            return Err(LockError::ConfigError("Node url cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Node count checks shared by every node implementation.
    pub(crate) fn check_node_count(count: usize) -> LockResult<()> {
        if count == 0 {
            return Err(LockError::NoNodeError);
        }
        if count < 3 {
            warn!(nodes = count, "Fewer than 3 lock nodes, a single failure blocks acquisition");
        } else if count % 2 == 0 {
            warn!(nodes = count, "Even number of lock nodes adds no fault tolerance");
        }
        Ok(())
    }
}
