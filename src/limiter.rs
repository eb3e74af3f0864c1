// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 限流模块
//!
//! 以客户端 IP 为键的滑动窗口限流器。每个 IP 保存窗口内的请求时间戳，
//! 窗口内的数量达到上限时拒绝请求且不记录本次时间戳。
//!
//! 限流状态无论是否开启 `use_locks` 都始终由互斥锁保护。
//! 不同 IP 的条目在进程生命周期内不会被淘汰。

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::param::RATE_LIMIT_WINDOW;

pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    history: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(capacity: usize) -> Self {
        Self::with_window(capacity, RATE_LIMIT_WINDOW)
    }

    pub fn with_window(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// 判断来自 `client_ip` 的请求是否被放行，放行时记录当前时间。
    pub fn check(&self, client_ip: &str) -> bool {
        self.check_at(client_ip, Instant::now())
    }

    /// 以给定时间点执行 [`RateLimiter::check`]。
    pub fn check_at(&self, client_ip: &str, now: Instant) -> bool {
        // 锁中毒只可能来自其他线程的 panic，时间戳列表本身仍然是一致的
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let timestamps = history.entry(client_ip.to_string()).or_default();

        while let Some(&oldest) = timestamps.front() {
            if now.saturating_duration_since(oldest) < self.window {
                break;
            }
            timestamps.pop_front();
        }

        if timestamps.len() >= self.capacity {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前被记录的不同 IP 数量。
    pub fn tracked_clients(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
