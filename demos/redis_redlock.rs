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

use quorum_redlock::{AsyncRedLock, LockResult, RedLockConfig};
use std::time::Duration;

#[tokio::main]
async fn main() -> LockResult<()> {
    tracing_subscriber::fmt().with_env_filter("quorum_redlock=debug").init();

    // 1. Three independent Redis servers
    let config = RedLockConfig::new(&[
        "redis://127.0.0.1:6379",
        "redis://127.0.0.1:6380",
        "redis://127.0.0.1:6381",
    ])
    .with_retry_count(5);

    // 2. Create the lock manager
    let redlock = AsyncRedLock::from_config(config)?;
    println!("Healthy nodes: {}/{}", redlock.healthy_node_count().await, redlock.node_count());

    // 3. Explicit acquire / extend / release
    let handle = redlock
        .acquire_lock("demo:invoices", Duration::from_secs(10), 3, Duration::from_millis(100))
        .await?;
    println!(
        "Acquired {} on {}/{} nodes, valid for {:?}",
        handle.lock_id(),
        handle.nodes_acquired(),
        handle.total_nodes(),
        handle.validity()
    );
    println!("Extended: {}", redlock.extend_lock(&handle, Duration::from_secs(20)).await);
    println!("Released: {}", redlock.release_lock(&handle).await);

    // 4. Scoped usage with automatic extension
    let rows = redlock
        .with_lock_auto_extend("demo:report", Duration::from_secs(3), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            128
        })
        .await?;
    println!("Report built with {} rows", rows);

    Ok(())
}
