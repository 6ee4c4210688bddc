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


use redis::RedisError;
use thiserror::Error;

pub type LockResult<T> = std::result::Result<T, LockError>;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Redis error: {0}")]
    RedisError(#[from] RedisError),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("No lock nodes provided")]
    NoNodeError,

    #[error("Lock node {0} unreachable")]
    NodeUnreachable(String),

    #[error("Lock node {0} timed out")]
    NodeTimeout(String),

    #[error("Quorum not reached: {acquired}/{total} nodes (quorum {quorum}) after {attempts} attempt(s)")]
    QuorumNotReached {
        acquired: usize,
        total: usize,
        quorum: usize,
        attempts: u32,
    },

    #[error("Clock drift exceeded validity: {acquired}/{total} nodes acquired but no time left")]
    ClockDriftExceeded { acquired: usize, total: usize },

    #[error("Lock has expired locally")]
    LockExpiredLocally,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Async runtime error: {0}")]
    AsyncError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl LockError {
    /// Whether the retry scheduler should run another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LockError::QuorumNotReached { .. } | LockError::ClockDriftExceeded { .. }
        )
    }
}

impl From<deadpool::managed::PoolError<RedisError>> for LockError {
    fn from(err: deadpool::managed::PoolError<RedisError>) -> Self {
        LockError::PoolError(err.to_string())
    }
}

impl From<deadpool::managed::BuildError> for LockError {
    fn from(err: deadpool::managed::BuildError) -> Self {
        LockError::PoolError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for LockError {
    fn from(err: tokio::task::JoinError) -> Self {
        LockError::AsyncError(err.to_string())
    }
}

impl From<serde_json::Error> for LockError {
    fn from(err: serde_json::Error) -> Self {
        LockError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_quorum_failures_are_retryable() {
        let quorum = LockError::QuorumNotReached { acquired: 2, total: 5, quorum: 3, attempts: 1 };
        assert!(quorum.is_retryable());
        assert!(LockError::ClockDriftExceeded { acquired: 3, total: 5 }.is_retryable());
        assert!(!LockError::Cancelled.is_retryable());
        assert!(!LockError::NodeUnreachable("n1".to_string()).is_retryable());
    }

    #[test]
    fn test_quorum_error_message_carries_counts() {
        let err = LockError::QuorumNotReached { acquired: 2, total: 5, quorum: 3, attempts: 3 };
        assert_eq!(
            err.to_string(),
            "Quorum not reached: 2/5 nodes (quorum 3) after 3 attempt(s)"
        );
    }
}
