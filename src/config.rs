// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use log::{error, warn};
use serde_derive::Deserialize;

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::param::{DEFAULT_PORT, DEFAULT_PORT_ATTEMPTS, DEFAULT_RATE_LIMIT, DEFAULT_WORKERS};

/// 服务器运行参数。
///
/// 启动时创建一次，之后只读，由分发器持有并以 `Arc` 共享给每个工作者。
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_www_root")]
    www_root: PathBuf,
    #[serde(default = "default_workers")]
    workers: usize,
    #[serde(default)]
    simulate_work: bool,
    #[serde(default)]
    use_locks: bool,
    #[serde(default = "default_rate_limit")]
    rate_limit: usize,
    #[serde(default)]
    runtime_threads: usize,
    #[serde(default = "default_port_attempts")]
    port_attempts: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_www_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_rate_limit() -> usize {
    DEFAULT_RATE_LIMIT
}

fn default_port_attempts() -> u16 {
    DEFAULT_PORT_ATTEMPTS
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            www_root: default_www_root(),
            workers: default_workers(),
            simulate_work: false,
            use_locks: false,
            rate_limit: default_rate_limit(),
            runtime_threads: 0,
            port_attempts: default_port_attempts(),
        }
    }

    /// 从 TOML 文件读取配置。
    ///
    /// 文件不存在或无法读取时返回错误；内容无法解析时记录日志并退回默认配置。
    /// 返回前会调用 [`Config::normalize`]。
    pub fn from_toml(filename: &str) -> io::Result<Self> {
        let text = fs::read_to_string(filename)?;
        let raw_config = match Self::parse(&text) {
            Ok(c) => c,
            Err(e) => {
                error!("无法从配置文件{}构建配置对象，使用默认配置：{}", filename, e);
                Config::new()
            }
        };
        raw_config.normalize()
    }

    /// 解析 TOML 文本，不做任何修正。
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// 修正非法取值并把根目录规范化为绝对路径。
    pub fn normalize(mut self) -> io::Result<Self> {
        if self.workers == 0 {
            warn!("workers被设置为0，该值将被改为{}", DEFAULT_WORKERS);
            self.workers = DEFAULT_WORKERS;
        }
        if self.runtime_threads == 0 {
            self.runtime_threads = num_cpus::get();
        }
        if self.port_attempts == 0 {
            self.port_attempts = 1;
        }
        self.www_root = fs::canonicalize(&self.www_root)?;
        if !self.www_root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} 不是一个目录", self.www_root.display()),
            ));
        }
        Ok(self)
    }
}

impl Config {
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_www_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.www_root = root.as_ref().to_path_buf();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_simulate_work(mut self, simulate_work: bool) -> Self {
        self.simulate_work = simulate_work;
        self
    }

    pub fn with_use_locks(mut self, use_locks: bool) -> Self {
        self.use_locks = use_locks;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: usize) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

impl Config {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn www_root(&self) -> &Path {
        &self.www_root
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn simulate_work(&self) -> bool {
        self.simulate_work
    }

    pub fn use_locks(&self) -> bool {
        self.use_locks
    }

    pub fn rate_limit(&self) -> usize {
        self.rate_limit
    }

    pub fn runtime_threads(&self) -> usize {
        self.runtime_threads
    }

    pub fn port_attempts(&self) -> u16 {
        self.port_attempts
    }
}
