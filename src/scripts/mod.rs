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


use once_cell::sync::Lazy;
use redis::Script;

/// Set-if-absent with expiry, returns 1 when the key was created
pub static SET_IF_ABSENT_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(r#"
        local key = KEYS[1]
        local lock_id = ARGV[1]
        local ttl = ARGV[2]

        -- Only an absent key may be taken
        if redis.call('exists', key) == 0 then
            redis.call('set', key, lock_id, 'PX', ttl)
            return 1
        end

        return 0  -- Held by another lock id
    "#)
});

/// Compare-and-delete, returns 1 when the key held `lock_id` and was removed
pub static COMPARE_AND_DELETE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(r#"
        local key = KEYS[1]
        local lock_id = ARGV[1]

        if redis.call('get', key) == lock_id then
            return redis.call('del', key)
        end

        return 0  -- Expired or taken over by another lock id
    "#)
});

/// Compare-and-expire, returns 1 when the key held `lock_id`. The ttl is
/// only ever lengthened.
pub static COMPARE_AND_EXPIRE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(r#"
        local key = KEYS[1]
        local lock_id = ARGV[1]
        local new_ttl = tonumber(ARGV[2])

        if redis.call('get', key) == lock_id then
            -- A shorter ttl would let the key lapse before the holder's validity
            if redis.call('pttl', key) < new_ttl then
                redis.call('pexpire', key, new_ttl)
            end
            return 1
        end

        return 0
    "#)
});
