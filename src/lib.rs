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


//! Quorum-based distributed lock manager (Redlock).
//!
//! A lock on a resource is held when a majority of independent, non-replicated
//! nodes accepted the same unique lock id within the drift-adjusted ttl.
//!
//! ```rust,no_run
//! use quorum_redlock::{AsyncRedLock, LockResult, RedLockConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> LockResult<()> {
//! let config = RedLockConfig::new(&["redis://10.0.0.1:6379", "redis://10.0.0.2:6379", "redis://10.0.0.3:6379"]);
//! let redlock = AsyncRedLock::from_config(config)?;
//!
//! let total = redlock
//!     .with_lock("invoices", Duration::from_secs(10), || async { 1 + 1 })
//!     .await?;
//! assert_eq!(total, 2);
//! # Ok(())
//! # }
//! ```

mod config;
mod errors;
mod util;
mod lock;
mod node;
mod scripts;

pub use config::*;
pub use errors::*;
pub use util::*;
pub use lock::*;
pub use node::*;
