// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 访问计数模块
//!
//! 按解析后的资源路径统计成功的 GET 次数。计数流程是
//! “读取旧值 → 等待 `COUNTER_DELAY` → 写回旧值加一”，中间的等待用于放大竞争窗口。
//!
//! 两种实现在启动时二选一：
//! - [`LockedCounter`]：整个读-等待-写过程持有同一把锁，不会丢失任何一次计数。
//! - [`RacyCounter`]：每一次单独的读或写都是原子的，但整个序列不是，
//!   并发的工作者可能在读与写之间交错，从而丢失更新。这是刻意保留的行为。

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use crate::param::COUNTER_DELAY;

/// 计数更新能力。实现会阻塞当前线程，异步上下文中应通过 `spawn_blocking` 调用。
pub trait HitCounter: Send + Sync {
    /// 为 `key` 的计数加一。
    fn increment(&self, key: &str);

    /// 读取 `key` 的当前计数，未出现过的键为 0。
    fn hits(&self, key: &str) -> u64;
}

/// 根据 `use_locks` 选择计数实现。
pub fn counter_for(use_locks: bool) -> Arc<dyn HitCounter> {
    if use_locks {
        Arc::new(LockedCounter::new())
    } else {
        Arc::new(RacyCounter::new())
    }
}

fn lock_map(map: &Mutex<HashMap<String, u64>>) -> MutexGuard<'_, HashMap<String, u64>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct LockedCounter {
    counts: Mutex<HashMap<String, u64>>,
    delay: Duration,
}

impl LockedCounter {
    pub fn new() -> Self {
        Self::with_delay(COUNTER_DELAY)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            delay,
        }
    }
}

impl Default for LockedCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl HitCounter for LockedCounter {
    fn increment(&self, key: &str) {
        let mut counts = lock_map(&self.counts);
        let old = counts.get(key).copied().unwrap_or(0);
        thread::sleep(self.delay);
        counts.insert(key.to_string(), old + 1);
    }

    fn hits(&self, key: &str) -> u64 {
        lock_map(&self.counts).get(key).copied().unwrap_or(0)
    }
}

pub struct RacyCounter {
    counts: Mutex<HashMap<String, u64>>,
    delay: Duration,
}

impl RacyCounter {
    pub fn new() -> Self {
        Self::with_delay(COUNTER_DELAY)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            delay,
        }
    }
}

impl Default for RacyCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl HitCounter for RacyCounter {
    fn increment(&self, key: &str) {
        // 读与写之间不持有锁
        let old = self.hits(key);
        thread::sleep(self.delay);
        lock_map(&self.counts).insert(key.to_string(), old + 1);
    }

    fn hits(&self, key: &str) -> u64 {
        lock_map(&self.counts).get(key).copied().unwrap_or(0)
    }
}
