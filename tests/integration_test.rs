// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::{collections::HashMap, fs, net::SocketAddr, path::Path, sync::Arc, time::Duration};

use hitserver::{chunked::dechunk, Config, Server};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// 在临时端口上启动服务器，返回监听地址与服务器句柄。
async fn start_server(root: &Path, rate_limit: usize) -> (SocketAddr, Arc<Server>) {
    let config = Config::new()
        .with_www_root(root)
        .with_workers(16)
        .with_use_locks(true)
        .with_rate_limit(rate_limit)
        .normalize()
        .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(Server::new(config));
    tokio::spawn(Arc::clone(&server).serve(listener));
    (addr, server)
}

async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut buffer = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buffer))
        .await
        .expect("服务器没有在5秒内关闭连接")
        .unwrap();
    buffer
}

async fn get(addr: SocketAddr, target: &str) -> (u16, HashMap<String, String>, Vec<u8>) {
    let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", target);
    parse_response(&send_raw(addr, request.as_bytes()).await)
}

fn parse_response(raw: &[u8]) -> (u16, HashMap<String, String>, Vec<u8>) {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("响应中没有空行");
    let head = String::from_utf8_lossy(&raw[..split]).to_string();
    let body = raw[split + 4..].to_vec();

    let mut lines = head.split("\r\n");
    let status_code = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let headers = lines
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    (status_code, headers, body)
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("hello.txt"), b"hello world\n").unwrap();
    fs::write(dir.path().join("t\u{e9}st.txt"), "accent\n").unwrap();
    fs::create_dir(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs").join("a&b.html"), b"<p>a</p>").unwrap();
    dir
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_get_file_is_chunked_and_exact() {
    let dir = fixture();
    let content: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 251) as u8).collect();
    fs::write(dir.path().join("data.bin"), &content).unwrap();
    let (addr, _server) = start_server(dir.path(), 1000).await;

    let (status, headers, body) = get(addr, "/data.bin").await;
    assert_eq!(status, 200);
    assert_eq!(headers.get("Transfer-Encoding").map(String::as_str), Some("chunked"));
    assert!(!headers.contains_key("Content-Length"));
    assert_eq!(headers.get("Content-Type").map(String::as_str), Some("application/octet-stream"));
    assert!(headers.contains_key("Server"));
    assert!(headers.get("Date").unwrap().ends_with("GMT"));
    assert_eq!(dechunk(&body).unwrap(), content);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_get_empty_file() {
    let dir = fixture();
    fs::write(dir.path().join("empty.txt"), b"").unwrap();
    let (addr, _server) = start_server(dir.path(), 1000).await;

    let (status, headers, body) = get(addr, "/empty.txt").await;
    assert_eq!(status, 200);
    assert_eq!(
        headers.get("Content-Type").map(String::as_str),
        Some("text/plain; charset=utf-8")
    );
    assert_eq!(body, b"0\r\n\r\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_percent_encoded_name() {
    let dir = fixture();
    let (addr, _server) = start_server(dir.path(), 1000).await;

    let (status, _headers, body) = get(addr, "/t%C3%A9st.txt").await;
    assert_eq!(status, 200);
    assert_eq!(dechunk(&body).unwrap(), b"accent\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_directory_listing() {
    let dir = fixture();
    let (addr, server) = start_server(dir.path(), 1000).await;

    get(addr, "/hello.txt").await;
    get(addr, "/hello.txt").await;

    let (status, headers, body) = get(addr, "/").await;
    assert_eq!(status, 200);
    let length: usize = headers.get("Content-Length").unwrap().parse().unwrap();
    assert_eq!(length, body.len());

    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("Directory listing for /"));
    assert!(html.contains(r#"<a href="docs/">docs/</a> (0 hits)"#));
    assert!(html.contains(r#"<a href="hello.txt">hello.txt</a> (2 hits)"#));
    assert!(html.contains("<a href=\"t%C3%A9st.txt\">t\u{e9}st.txt</a> (0 hits)"));

    let docs = html.find("docs/").unwrap();
    let hello = html.find("hello.txt").unwrap();
    let accent = html.find("t%C3%A9st.txt").unwrap();
    assert!(docs < hello && hello < accent);

    let root = fs::canonicalize(dir.path()).unwrap();
    assert_eq!(server.hits(&root), 1);
    assert_eq!(server.hits(&root.join("hello.txt")), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subdirectory_listing_escapes_names() {
    let dir = fixture();
    let (addr, _server) = start_server(dir.path(), 1000).await;

    let (status, _headers, body) = get(addr, "/docs/").await;
    assert_eq!(status, 200);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("Directory listing for /docs"));
    assert!(html.contains(r#"<a href="a%26b.html">a&amp;b.html</a> (0 hits)"#));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_not_found() {
    let dir = fixture();
    let (addr, _server) = start_server(dir.path(), 1000).await;

    let (status, headers, body) = get(addr, "/nonexistent-file-12345.html").await;
    assert_eq!(status, 404);
    assert_eq!(
        headers.get("Content-Type").map(String::as_str),
        Some("text/html; charset=utf-8")
    );
    assert!(String::from_utf8_lossy(&body).contains("404 Not Found"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_method_not_allowed() {
    let dir = fixture();
    let (addr, server) = start_server(dir.path(), 1000).await;

    for request in [
        &b"POST /hello.txt HTTP/1.1\r\n\r\n"[..],
        &b"HEAD /hello.txt HTTP/1.1\r\n\r\n"[..],
        &b"DELETE /missing HTTP/1.1\r\n\r\n"[..],
    ] {
        let (status, _headers, _body) = parse_response(&send_raw(addr, request).await);
        assert_eq!(status, 405);
    }
    let root = fs::canonicalize(dir.path()).unwrap();
    assert_eq!(server.hits(&root.join("hello.txt")), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bad_request() {
    let dir = fixture();
    let (addr, _server) = start_server(dir.path(), 1000).await;

    for request in [&b"GARBAGE\r\n\r\n"[..], &b"GET / HTTP/1.1 extra\r\n\r\n"[..]] {
        let (status, _headers, body) = parse_response(&send_raw(addr, request).await);
        assert_eq!(status, 400);
        assert!(String::from_utf8_lossy(&body).contains("400 Bad Request"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_headers_split_across_writes() {
    let dir = fixture();
    let (addr, _server) = start_server(dir.path(), 1000).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET /hello.txt HT").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.write_all(b"TP/1.1\r\nHost: x\r\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.write_all(b"\r\n").await.unwrap();

    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await.unwrap();
    let (status, _headers, body) = parse_response(&buffer);
    assert_eq!(status, 200);
    assert_eq!(dechunk(&body).unwrap(), b"hello world\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_peer_closing_early_gets_no_response() {
    let dir = fixture();
    let (addr, _server) = start_server(dir.path(), 1000).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
    stream.shutdown().await.unwrap();

    let mut buffer = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buffer))
        .await
        .unwrap()
        .unwrap();
    assert!(buffer.is_empty());

    // 服务器仍然正常工作
    let (status, _, _) = get(addr, "/hello.txt").await;
    assert_eq!(status, 200);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreadable_file_is_forbidden() {
    use std::os::unix::fs::PermissionsExt;

    let dir = fixture();
    let secret = dir.path().join("secret.txt");
    fs::write(&secret, b"top secret").unwrap();
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&secret).is_ok() {
        // 以 root 运行时权限位不生效
        return;
    }
    let (addr, _server) = start_server(dir.path(), 1000).await;

    let (status, _headers, body) = get(addr, "/secret.txt").await;
    assert_eq!(status, 403);
    assert!(String::from_utf8_lossy(&body).contains("403 Forbidden"));

    // 权限检查先于方法检查
    let (status, _, _) = parse_response(&send_raw(addr, b"POST /secret.txt HTTP/1.1\r\n\r\n").await);
    assert_eq!(status, 403);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fifo_does_not_stall_workers() {
    use std::{ffi::CString, os::unix::ffi::OsStrExt};

    let dir = fixture();
    let fifo = dir.path().join("pipe");
    let c_path = CString::new(fifo.as_os_str().as_bytes()).unwrap();
    assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) }, 0);
    let (addr, _server) = start_server(dir.path(), 1000).await;

    // 请求数多于运行时工作线程数，任何一个卡住都会拖垮后面的请求
    let handles: Vec<_> = (0..4)
        .map(|_| tokio::spawn(async move { get(addr, "/pipe").await.0 }))
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 404);
    }

    let (status, _, body) = tokio::time::timeout(Duration::from_secs(3), get(addr, "/hello.txt"))
        .await
        .expect("FIFO 请求之后服务器不再响应");
    assert_eq!(status, 200);
    assert_eq!(dechunk(&body).unwrap(), b"hello world\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_oversized_head_is_rejected() {
    let dir = fixture();
    let (addr, _server) = start_server(dir.path(), 1000).await;

    let mut request = b"GET /hello.txt HTTP/1.1\r\n".to_vec();
    let filler = format!("X-Filler: {}\r\n", "a".repeat(1000));
    while request.len() <= hitserver::param::MAX_HEAD_SIZE {
        request.extend_from_slice(filler.as_bytes());
    }

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // 服务器可能在读完之前就回复并关闭，写入失败不影响判断
    let _ = stream.write_all(&request).await;
    let mut buffer = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buffer)).await;
    // 未读完的数据可能让内核以 RST 关闭连接，此时客户端收不到任何内容
    if !buffer.is_empty() {
        assert!(buffer.starts_with(b"HTTP/1.1 400 Bad Request"));
    }

    let (status, _, _) = get(addr, "/hello.txt").await;
    assert_eq!(status, 200);
}
