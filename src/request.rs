// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求读取与解析模块
//!
//! 1. [`read_head`] 从套接字按固定大小分块读取，直到看到请求头结束标记。
//! 2. [`Request::try_from`] 只解析请求行，其余请求头一律忽略。

use std::time::Duration;

use log::{debug, error, warn};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    exception::Exception,
    param::{HttpRequestMethod, CRLF, HEADER_END, MAX_HEAD_SIZE, READ_CHUNK_SIZE},
};

/// 读取请求头的原始字节。
///
/// 每次读取 `READ_CHUNK_SIZE` 字节并累积，直到缓冲区中出现 `\r\n\r\n`。
/// 单次读取超过 `timeout` 视为 [`Exception::ReadTimeout`]；
/// 对端先关闭连接视为 [`Exception::ConnectionClosed`]。
/// 两种情况下调用方都不应发送任何响应。
/// 累积超过 `MAX_HEAD_SIZE` 仍未结束视为 [`Exception::MalformedRequest`]。
pub async fn read_head<R>(reader: &mut R, timeout: Duration, id: u128) -> Result<Vec<u8>, Exception>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = match tokio::time::timeout(timeout, reader.read(&mut chunk)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                error!("[ID{}]读取请求头时遇到错误：{}", id, e);
                return Err(Exception::TransportFailed);
            }
            Err(_) => return Err(Exception::ReadTimeout),
        };
        if n == 0 {
            return Err(Exception::ConnectionClosed);
        }

        // 结束标记可能跨越两次读取，向前多看 3 个字节即可
        let from = buffer.len().saturating_sub(HEADER_END.len() - 1);
        buffer.extend_from_slice(&chunk[..n]);
        if contains_header_end(&buffer[from..]) {
            break;
        }
        if buffer.len() > MAX_HEAD_SIZE {
            warn!("[ID{}]请求头超过{}字节仍未结束", id, MAX_HEAD_SIZE);
            return Err(Exception::MalformedRequest);
        }
    }
    debug!("[ID{}]请求头接收完毕，共{}字节", id, buffer.len());
    Ok(buffer)
}

fn contains_header_end(buffer: &[u8]) -> bool {
    buffer.windows(HEADER_END.len()).any(|w| w == HEADER_END)
}

/// 一个连接上的请求。请求头完整读取后创建，响应写完、连接关闭后销毁。
#[derive(Debug, Clone)]
pub struct Request {
    method: HttpRequestMethod,
    /// 请求行中的原始目标字符串，尚未解码
    target: String,
    version: String,
    client_ip: String,
}

impl Request {
    /// 从原始请求头字节构建 `Request`。
    ///
    /// 请求行按 ISO-8859-1 解码（每个字节对应一个字符），因此解码本身不会失败；
    /// 按空白拆分后必须恰好得到 方法/目标/版本 三段，否则返回
    /// [`Exception::MalformedRequest`]。
    pub fn try_from(buffer: &[u8], client_ip: &str, id: u128) -> Result<Self, Exception> {
        let first_line = first_line_latin1(buffer);
        let parts: Vec<&str> = first_line.split_whitespace().collect();

        let [method, target, version] = parts.as_slice() else {
            error!("[ID{}]HTTP请求行格式不正确：{:?}", id, first_line);
            return Err(Exception::MalformedRequest);
        };

        Ok(Self {
            method: HttpRequestMethod::parse(method),
            target: target.to_string(),
            version: version.to_string(),
            client_ip: client_ip.to_string(),
        })
    }
}

fn first_line_latin1(buffer: &[u8]) -> String {
    let crlf = CRLF.as_bytes();
    let end = buffer
        .windows(crlf.len())
        .position(|w| w == crlf)
        .unwrap_or(buffer.len());
    buffer[..end].iter().map(|&b| b as char).collect()
}

impl Request {
    pub fn method(&self) -> &HttpRequestMethod {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }
}
