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

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::errors::{LockError, LockResult};

/// How one node answered a fan-out call
#[derive(Debug)]
pub(crate) enum NodeReply {
    Confirmed,
    Refused,
    Failed(LockError),
    TimedOut,
}

/// Replies of every node, in node order
#[derive(Debug)]
pub(crate) struct FanOut {
    pub replies: Vec<NodeReply>,
}

impl FanOut {
    pub fn confirmed(&self) -> usize {
        self.replies
            .iter()
            .filter(|reply| matches!(reply, NodeReply::Confirmed))
            .count()
    }

    /// Nodes that did not answer at all, either by error or timeout
    pub fn unreachable(&self) -> usize {
        self.replies
            .iter()
            .filter(|reply| matches!(reply, NodeReply::Failed(_) | NodeReply::TimedOut))
            .count()
    }

    pub fn confirmed_indices(&self) -> Vec<usize> {
        self.replies
            .iter()
            .enumerate()
            .filter_map(|(i, reply)| matches!(reply, NodeReply::Confirmed).then_some(i))
            .collect()
    }
}

/// Runs one call per node concurrently and waits for all of them.
///
/// Each call is bounded by `call_timeout`. The calls are polled in place, so
/// none of them outlives this function; cancelling `cancel` drops every call
/// still in flight and returns [`LockError::Cancelled`].
pub(crate) async fn fan_out<I, F>(calls: I, call_timeout: Duration, cancel: &CancellationToken) -> LockResult<FanOut>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = LockResult<bool>>,
{
    let calls = calls.into_iter().map(|call| async move {
        match timeout(call_timeout, call).await {
            Ok(Ok(true)) => NodeReply::Confirmed,
            Ok(Ok(false)) => NodeReply::Refused,
            Ok(Err(e)) => NodeReply::Failed(e),
            Err(_) => NodeReply::TimedOut,
        }
    });

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LockError::Cancelled),
        replies = join_all(calls) => Ok(FanOut { replies }),
    }
}
