// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 集中存放服务器用到的协议常量、时间参数以及查表数据：
//! - 状态码及其原因短语（Reason Phrase）。
//! - 文件后缀到 MIME 类型的映射表。
//! - HTTP 方法的强类型枚举。

use lazy_static::lazy_static;
use std::{collections::HashMap, fmt, time::Duration};

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "hitserver";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 请求头结束标记
pub const HEADER_END: &[u8] = b"\r\n\r\n";

/// 从套接字读取请求头时每次读取的字节数
pub const READ_CHUNK_SIZE: usize = 1024;

/// 请求头的最大字节数，超过后按格式错误处理
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// 分块传输时每个分块读取的文件字节数
pub const FILE_CHUNK_SIZE: usize = 1024;

/// 读文件任务与发送方之间最多缓存的分块数
pub const FRAME_QUEUE_DEPTH: usize = 8;

/// 读取请求头的超时时间
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// 限流滑动窗口的长度
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(1);

/// 计数器读写之间人为插入的延迟，用于放大竞争窗口
pub const COUNTER_DELAY: Duration = Duration::from_millis(1);

/// 开启 simulate_work 时每个请求额外休眠的时长
pub const SIMULATED_WORK: Duration = Duration::from_secs(1);

/// 默认的工作者数量
pub const DEFAULT_WORKERS: usize = 10;

/// 默认的限流值（每个 IP 每秒请求数）
pub const DEFAULT_RATE_LIMIT: usize = 5;

/// 默认监听端口
pub const DEFAULT_PORT: u16 = 65432;

/// 端口被占用时向后探测的次数
pub const DEFAULT_PORT_ATTEMPTS: u16 = 100;

lazy_static! {
    /// 本服务器会产生的状态码与其原因短语。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(200, "OK");
        map.insert(400, "Bad Request");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(429, "Too Many Requests");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 MIME 类型的映射表。
    ///
    /// 文本类型在写入响应头时会追加 `charset=utf-8`，这里只保存纯类型。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("avif", "image/avif");
        map.insert("bin", "application/octet-stream");
        map.insert("bmp", "image/bmp");
        map.insert("css", "text/css");
        map.insert("csv", "text/csv");
        map.insert("gif", "image/gif");
        map.insert("gz", "application/gzip");
        map.insert("htm", "text/html");
        map.insert("html", "text/html");
        map.insert("ico", "image/x-icon");
        map.insert("jpeg", "image/jpeg");
        map.insert("jpg", "image/jpeg");
        map.insert("js", "text/javascript");
        map.insert("json", "application/json");
        map.insert("md", "text/markdown");
        map.insert("mjs", "text/javascript");
        map.insert("mp3", "audio/mpeg");
        map.insert("mp4", "video/mp4");
        map.insert("pdf", "application/pdf");
        map.insert("png", "image/png");
        map.insert("py", "text/x-python");
        map.insert("rs", "text/x-rust");
        map.insert("svg", "image/svg+xml");
        map.insert("tar", "application/x-tar");
        map.insert("txt", "text/plain");
        map.insert("wasm", "application/wasm");
        map.insert("webp", "image/webp");
        map.insert("woff2", "font/woff2");
        map.insert("xml", "text/xml");
        map.insert("zip", "application/zip");
        map
    };
}

/// HTTP 请求方法。
///
/// 服务器只真正处理 `Get`，其余方法在路径解析之后统一得到 405。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpRequestMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
    /// 任何其他方法名，原样保留用于日志
    Other(String),
}

impl HttpRequestMethod {
    /// 按请求行中的方法名构造枚举，大小写敏感。
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Head => write!(f, "HEAD"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Options => write!(f, "OPTIONS"),
            Self::Patch => write!(f, "PATCH"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}
