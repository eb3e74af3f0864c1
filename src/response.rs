// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use crate::{
    counter::HitCounter,
    exception::Exception,
    param::*,
    util::HtmlBuilder,
};

use bytes::Bytes;
use chrono::prelude::*;
use log::error;

use std::{io, path::Path};

const HTML_UTF8: &str = "text/html; charset=utf-8";

#[derive(Debug, Clone)]
pub struct Response {
    status_code: u16,
    information: String,
    content_type: String,
    /// `None` 表示正文长度未知，使用分块传输
    content_length: Option<u64>,
    date: DateTime<Utc>,
    server_name: String,
    content: Option<Bytes>,
}

impl Response {
    fn new() -> Self {
        Self {
            status_code: 200,
            information: "OK".to_string(),
            content_type: HTML_UTF8.to_string(),
            content_length: Some(0),
            date: Utc::now(),
            server_name: SERVER_NAME.to_string(),
            content: None,
        }
    }

    fn with_html(mut self, html: String) -> Self {
        let bytes = Bytes::from(html);
        self.content_length = Some(bytes.len() as u64);
        self.content = Some(bytes);
        self
    }

    /// 错误响应，正文是只包含状态行的 HTML 页面。
    pub fn from_status_code(code: u16) -> Self {
        let mut response = Self::new();
        response.set_code(code);
        response.with_html(HtmlBuilder::from_status_code(code).build())
    }

    /// 为请求级异常构建响应。传输级异常没有响应，返回 `None`。
    pub fn from_exception(e: Exception) -> Option<Self> {
        e.status_code().map(Self::from_status_code)
    }

    /// 目录列表响应，正文长度已知。
    pub fn from_dir(dir: &Path, root: &Path, counter: &dyn HitCounter) -> io::Result<Self> {
        let html = HtmlBuilder::from_dir(dir, root, counter)?.build();
        Ok(Self::new().with_html(html))
    }

    /// 文件响应只包含响应头，正文由调用方以分块方式发送。
    pub fn from_file(path: &Path) -> Self {
        let mut response = Self::new();
        response.content_type = guess_content_type(path);
        response.content_length = None;
        response
    }

    fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&reason) => reason.to_string(),
            None => {
                error!("非法的状态码：{}。这条错误说明代码编写出现了错误。", code);
                "Unknown".to_string()
            }
        };
        self
    }

    /// 状态行与响应头，以空行结尾。
    pub fn header_bytes(&self) -> Vec<u8> {
        let length_line = match self.content_length {
            Some(len) => format!("Content-Length: {}{}", len, CRLF),
            None => format!("Transfer-Encoding: chunked{}", CRLF),
        };
        let status_code: &str = &self.status_code.to_string();
        let date: &str = &format_date(&self.date);
        [
            "HTTP/1.1 ",
            status_code,
            " ",
            self.information.as_str(),
            CRLF,
            "Server: ",
            self.server_name.as_str(),
            CRLF,
            "Date: ",
            date,
            CRLF,
            "Content-Type: ",
            self.content_type.as_str(),
            CRLF,
            length_line.as_str(),
            CRLF,
        ]
        .concat()
        .into_bytes()
    }

    /// 响应头加上已知长度的正文。分块响应只返回响应头。
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header_bytes();
        if let Some(c) = &self.content {
            bytes.extend_from_slice(c);
        }
        bytes
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn is_chunked(&self) -> bool {
        self.content_length.is_none()
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// 按扩展名推断 `Content-Type`，文本类型追加 `charset=utf-8`。
fn guess_content_type(path: &Path) -> String {
    let mime = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .and_then(|ext| MIME_TYPES.get(ext.as_str()).copied())
        .unwrap_or("application/octet-stream");
    if mime.starts_with("text/") {
        format!("{}; charset=utf-8", mime)
    } else {
        mime.to_string()
    }
}
