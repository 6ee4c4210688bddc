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

mod memory;
mod redis_node;

pub use memory::*;
pub use redis_node::*;

use async_trait::async_trait;
use crate::LockResult;

/// Client for one independent lock node.
///
/// Every primitive must be a single atomic round trip on the node side. An
/// `Err` means the node could not answer; `Ok(false)` means it answered and
/// refused.
#[async_trait]
pub trait LockNode: Send + Sync {
    /// Identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Store `value` under `key` with a `ttl_ms` expiry, only if `key` is absent.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_ms: u64) -> LockResult<bool>;

    /// Delete `key` only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> LockResult<bool>;

    /// Reset the expiry of `key` to `new_ttl_ms` only if it currently holds `expected`.
    async fn compare_and_expire(&self, key: &str, expected: &str, new_ttl_ms: u64) -> LockResult<bool>;

    async fn ping(&self) -> LockResult<()>;
}
