// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 定义服务器在单个连接的生命周期中可能遇到的全部失败情况。
//!
//! ## 分类
//! - **请求级错误**：每一种都会被映射为一个 HTTP 状态码，只影响当前连接。
//! - **传输级错误**：请求尚未能被安全解析，连接被直接放弃，不发送任何响应。
//! - **启动错误**：只在服务器启动阶段出现，交由二进制入口处理。

use std::fmt;

/// 服务器处理连接过程中发生的异常类型。
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exception {
    /// 请求行无法拆分为 方法/目标/版本 三段。对应 `400 Bad Request`。
    MalformedRequest,
    /// 资源存在但不可读。对应 `403 Forbidden`。
    PermissionDenied,
    /// 解析后的路径不存在。对应 `404 Not Found`。
    NotFound,
    /// 除 GET 以外的任何方法。对应 `405 Method Not Allowed`。
    UnsupportedMethod,
    /// 客户端在滑动窗口内的请求数已达上限。对应 `429 Too Many Requests`。
    RateLimited,
    /// 对端在请求头完整到达之前关闭了连接。
    ConnectionClosed,
    /// 读取请求头超时。
    ReadTimeout,
    /// 读写套接字时发生 I/O 错误。
    TransportFailed,
    /// 在给定的端口范围内没有可绑定的端口。
    NoAvailablePort,
}

use Exception::*;

impl Exception {
    /// 将异常映射为 HTTP 状态码。
    ///
    /// 传输级与启动错误没有对应的状态码，返回 `None`，调用方应直接放弃连接。
    pub fn status_code(&self) -> Option<u16> {
        match self {
            MalformedRequest => Some(400),
            PermissionDenied => Some(403),
            NotFound => Some(404),
            UnsupportedMethod => Some(405),
            RateLimited => Some(429),
            ConnectionClosed | ReadTimeout | TransportFailed | NoAvailablePort => None,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRequest => write!(f, "Malformed request line (400)"),
            PermissionDenied => write!(f, "Permission denied (403)"),
            NotFound => write!(f, "File not found (404)"),
            UnsupportedMethod => write!(f, "Unsupported request method (405)"),
            RateLimited => write!(f, "Too many requests (429)"),
            ConnectionClosed => write!(f, "Connection closed by peer before headers were complete"),
            ReadTimeout => write!(f, "Timed out while reading request headers"),
            TransportFailed => write!(f, "Socket I/O failed"),
            NoAvailablePort => write!(f, "No available port in the requested range"),
        }
    }
}

impl std::error::Error for Exception {}
