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

use deadpool::managed::{Metrics, RecycleError, RecycleResult};
use deadpool::Runtime;
use async_trait::async_trait;
use redis::{Client, IntoConnectionInfo};
use std::time::Duration;
use tracing::debug;

use crate::config::{NodeConfig, RedLockConfig};
use crate::errors::{LockError, LockResult};
use crate::node::LockNode;
use crate::scripts;

type AsyncRedisPool = deadpool::managed::Pool<AsyncRedisNodeManager>;

/// Pool manager producing multiplexed connections to one node
pub struct AsyncRedisNodeManager {
    client: Client,
}

impl deadpool::managed::Manager for AsyncRedisNodeManager {
    type Type = redis::aio::MultiplexedConnection;
    type Error = redis::RedisError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(&self, conn: &mut Self::Type, _metrics: &Metrics) -> RecycleResult<Self::Error> {
        // Check that the connection is still valid
        let pong: Result<String, _> = redis::cmd("PING").query_async(conn).await;
        match pong {
            Ok(pong) if pong == "PONG" => Ok(()),
            Ok(_) => Err(RecycleError::Message("Invalid PONG response".into())),
            Err(e) => Err(RecycleError::Backend(e)),
        }
    }
}

/// A Redis server acting as one independent lock node
pub struct AsyncRedisNode {
    name: String,
    pool: AsyncRedisPool,
}

impl AsyncRedisNode {
    pub fn new(node: &NodeConfig, config: &RedLockConfig) -> LockResult<Self> {
        let client = Self::create_client(node)?;
        let pool = deadpool::managed::Pool::builder(AsyncRedisNodeManager { client })
            .max_size(config.pool_size as usize)
            .timeouts(deadpool::managed::Timeouts {
                wait: Some(config.connection_timeout),
                create: Some(config.connection_timeout),
                recycle: Some(Duration::from_secs(5)),
            })
            .runtime(Runtime::Tokio1)
            .build()?;

        debug!(node = %node.url, pool_size = config.pool_size, "Redis lock node created");
        Ok(Self { name: node.url.clone(), pool })
    }

    fn create_client(node: &NodeConfig) -> LockResult<Client> {
        let mut info = node.url.as_str().into_connection_info()?;
        if let Some(username) = &node.username {
            info.redis.username = Some(username.clone());
        }
        if let Some(password) = &node.password {
            info.redis.password = Some(password.clone());
        }
        if let Some(db) = node.database {
            info.redis.db = db;
        }
        Ok(Client::open(info)?)
    }

    async fn get_connection(&self) -> LockResult<deadpool::managed::Object<AsyncRedisNodeManager>> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl LockNode for AsyncRedisNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_ms: u64) -> LockResult<bool> {
        let mut conn = self.get_connection().await?;
        let result: i64 = scripts::SET_IF_ABSENT_SCRIPT
            .key(key)
            .arg(value)
            .arg(ttl_ms)
            .invoke_async(&mut *conn)
            .await?;
        Ok(result == 1)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> LockResult<bool> {
        let mut conn = self.get_connection().await?;
        let result: i64 = scripts::COMPARE_AND_DELETE_SCRIPT
            .key(key)
            .arg(expected)
            .invoke_async(&mut *conn)
            .await?;
        Ok(result == 1)
    }

    async fn compare_and_expire(&self, key: &str, expected: &str, new_ttl_ms: u64) -> LockResult<bool> {
        let mut conn = self.get_connection().await?;
        let result: i64 = scripts::COMPARE_AND_EXPIRE_SCRIPT
            .key(key)
            .arg(expected)
            .arg(new_ttl_ms)
            .invoke_async(&mut *conn)
            .await?;
        Ok(result == 1)
    }

    async fn ping(&self) -> LockResult<()> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut *conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(LockError::NodeUnreachable(self.name.clone()))
        }
    }
}
