// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 分块传输编码
//!
//! [`ChunkedEncoder`] 从任意 `Read` 惰性地产生分块帧：
//! 每次读取最多 `chunk_size` 字节，编码为 `<十六进制长度>\r\n<数据>\r\n`，
//! 读到末尾后产生终止块 `0\r\n\r\n`。
//!
//! 迭代器是一次性的：终止块或错误之后只会返回 `None`，底层读取器在此时立即被释放。

use std::io::{self, Read};

use bytes::{BufMut, Bytes, BytesMut};

use crate::param::{CRLF, FILE_CHUNK_SIZE};

/// 终止块
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

pub struct ChunkedEncoder<R> {
    reader: Option<R>,
    buffer: Vec<u8>,
}

impl<R: Read> ChunkedEncoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, FILE_CHUNK_SIZE)
    }

    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader: Some(reader),
            buffer: vec![0u8; chunk_size.max(1)],
        }
    }
}

impl<R: Read> Iterator for ChunkedEncoder<R> {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let n = match read_full(reader, &mut self.buffer) {
            Ok(n) => n,
            Err(e) => {
                self.reader = None;
                return Some(Err(e));
            }
        };
        if n == 0 {
            self.reader = None;
            return Some(Ok(Bytes::from_static(LAST_CHUNK)));
        }
        Some(Ok(frame(&self.buffer[..n])))
    }
}

/// 尽量读满缓冲区，只有到达末尾时才会返回不足一块的长度。
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn frame(data: &[u8]) -> Bytes {
    let size = format!("{:X}", data.len());
    let mut out = BytesMut::with_capacity(size.len() + data.len() + 2 * CRLF.len());
    out.put_slice(size.as_bytes());
    out.put_slice(CRLF.as_bytes());
    out.put_slice(data);
    out.put_slice(CRLF.as_bytes());
    out.freeze()
}

/// 把分块编码的正文还原为原始字节。格式错误时返回 `None`。
pub fn dechunk(mut body: &[u8]) -> Option<Vec<u8>> {
    let crlf = CRLF.as_bytes();
    let mut out = Vec::new();
    loop {
        let line_end = body.windows(2).position(|w| w == crlf)?;
        let size_text = std::str::from_utf8(&body[..line_end]).ok()?;
        let size = usize::from_str_radix(size_text.trim(), 16).ok()?;
        body = &body[line_end + 2..];
        if size == 0 {
            return body.starts_with(crlf).then_some(out);
        }
        if body.len() < size + 2 || &body[size..size + 2] != crlf {
            return None;
        }
        out.extend_from_slice(&body[..size]);
        body = &body[size + 2..];
    }
}
