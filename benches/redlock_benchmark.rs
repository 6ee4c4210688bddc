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

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use quorum_redlock::{AsyncRedLock, LockNode, MemoryNode, RedLockConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn create_redlock(node_count: usize) -> AsyncRedLock {
    let nodes = (0..node_count)
        .map(|i| Arc::new(MemoryNode::new(&format!("bench-node-{}", i))) as Arc<dyn LockNode>)
        .collect();
    AsyncRedLock::new(nodes, RedLockConfig::default().with_retry_count(1)).unwrap()
}

fn bench_lock(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("acquire_release");

    for node_count in [3usize, 5, 7] {
        let redlock = create_redlock(node_count);
        let redlock = &redlock;
        group.bench_with_input(BenchmarkId::from_parameter(node_count), &node_count, |b, _| {
            b.to_async(&runtime).iter(|| async move {
                let handle = redlock
                    .acquire_lock("bench:lock", Duration::from_secs(10), 1, Duration::ZERO)
                    .await
                    .unwrap();
                redlock.release_lock(&handle).await;
            });
        });
    }
    group.finish();
}

fn bench_extend(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let redlock = create_redlock(5);
    let handle = runtime
        .block_on(redlock.acquire_lock("bench:extend", Duration::from_secs(60), 1, Duration::ZERO))
        .unwrap();

    let (redlock, handle) = (&redlock, &handle);
    c.bench_function("extend", |b| {
        b.to_async(&runtime).iter(|| async move {
            redlock.extend_lock(handle, Duration::from_secs(60)).await;
        });
    });
}

criterion_group!(benches, bench_lock, bench_extend);
criterion_main!(benches);
