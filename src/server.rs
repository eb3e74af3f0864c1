// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接接收与分发
//!
//! [`Server::serve`] 运行唯一的接收循环，每个连接交给一个独立任务处理。
//! 同时处理中的连接数由容量为 `workers` 的信号量限制，
//! 工作者全忙时新连接在队列中等待，不会阻塞接收循环。
//!
//! 单个连接内的处理顺序固定为：
//! 读请求头 → 限流 → 解析请求行 → 解析路径 → 权限检查 → (模拟工作) →
//! 方法检查 → 存在性检查 → 计数 → 构建并发送响应 → 关闭连接。

use std::{
    fs::{self, File},
    io,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::{mpsc, Semaphore},
};

use crate::{
    chunked::ChunkedEncoder,
    config::Config,
    counter::{counter_for, HitCounter},
    exception::Exception,
    limiter::RateLimiter,
    param::{HttpRequestMethod, FRAME_QUEUE_DEPTH, READ_TIMEOUT, SIMULATED_WORK},
    path::{check_readable, PathResolver},
    request::{read_head, Request},
    response::Response,
};

/// 一次请求的处理结果。
enum Outcome {
    /// 正文已完整生成的响应
    Page(Response),
    /// 响应头加上需要分块发送的文件
    File(Response, PathBuf),
}

/// 已解析路径在文件系统中的类型。FIFO、设备等既不是目录也不是普通文件。
enum Kind {
    Dir,
    File,
    Missing,
}

impl Kind {
    fn of(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Kind::Dir,
            Ok(meta) if meta.is_file() => Kind::File,
            _ => Kind::Missing,
        }
    }
}

pub struct Server {
    config: Config,
    resolver: Arc<PathResolver>,
    limiter: RateLimiter,
    counter: Arc<dyn HitCounter>,
}

impl Server {
    /// `config` 应当已经过 [`Config::normalize`]，根目录为绝对路径。
    pub fn new(config: Config) -> Self {
        let resolver = Arc::new(PathResolver::new(config.www_root()));
        let limiter = RateLimiter::new(config.rate_limit());
        let counter = counter_for(config.use_locks());
        Self {
            config,
            resolver,
            limiter,
            counter,
        }
    }

    /// 已解析路径的当前访问计数。
    pub fn hits(&self, path: &Path) -> u64 {
        self.counter.hits(&path.to_string_lossy())
    }

    /// 接收循环。除非进程被中断，否则不会返回。
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        let workers = Arc::new(Semaphore::new(self.config.workers()));
        let mut id: u128 = 0;

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("接受连接失败：{}", e);
                    continue;
                }
            };
            debug!("[ID{}]新的连接：{}", id, addr);

            let server = Arc::clone(&self);
            let workers = Arc::clone(&workers);
            tokio::spawn(async move {
                // 信号量从不关闭，acquire 只会成功
                let Ok(_permit) = workers.acquire_owned().await else {
                    return;
                };
                server.handle_connection(stream, addr, id).await;
            });
            id += 1;
        }
    }

    /// 处理单个连接，直到响应写完或连接被放弃。
    pub async fn handle_connection(&self, mut stream: TcpStream, addr: SocketAddr, id: u128) {
        let head = match read_head(&mut stream, READ_TIMEOUT, id).await {
            Ok(head) => head,
            Err(Exception::ConnectionClosed) => {
                debug!("[ID{}]客户端在请求头完整之前关闭了连接", id);
                return;
            }
            Err(e) => {
                warn!("[ID{}]放弃连接{}：{}", id, addr, e);
                // 过长的请求头仍然可以回复 400，超时和传输错误则直接断开
                if let Some(response) = Response::from_exception(e) {
                    let _ = stream.write_all(&response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
                return;
            }
        };

        let start_time = Instant::now();
        let client_ip = addr.ip().to_string();
        let admitted = self.admit(&head, &client_ip, id);
        let outcome = match &admitted {
            Ok(request) => self.process(request, id).await,
            Err(e) => Err(*e),
        };
        let request = admitted.ok();
        let request = request.as_ref();

        let result = match outcome {
            Ok(Outcome::Page(response)) => {
                log_outcome(id, &client_ip, request, response.status_code(), &start_time);
                stream.write_all(&response.as_bytes()).await.map_err(|e| {
                    error!("[ID{}]发送响应失败：{}", id, e);
                    Exception::TransportFailed
                })
            }
            Ok(Outcome::File(response, path)) => {
                log_outcome(id, &client_ip, request, response.status_code(), &start_time);
                send_file(&mut stream, &response, path, id).await
            }
            Err(e) => match Response::from_exception(e) {
                Some(response) => {
                    log_outcome(id, &client_ip, request, response.status_code(), &start_time);
                    stream.write_all(&response.as_bytes()).await.map_err(|e| {
                        error!("[ID{}]发送错误响应失败：{}", id, e);
                        Exception::TransportFailed
                    })
                }
                None => Err(e),
            },
        };

        if result.is_ok() {
            let _ = stream.shutdown().await;
        }
        debug!(
            "[ID{}]连接关闭，用时{}ms",
            id,
            start_time.elapsed().as_millis()
        );
    }

    /// 限流与请求行解析。限流先于一切，即使请求最终会失败也占用一个名额。
    fn admit(&self, head: &[u8], client_ip: &str, id: u128) -> Result<Request, Exception> {
        if !self.limiter.check(client_ip) {
            warn!("[ID{}]{}超出限流（{}次/秒）", id, client_ip, self.limiter.capacity());
            return Err(Exception::RateLimited);
        }

        let request = Request::try_from(head, client_ip, id)?;
        debug!("[ID{}]{} {} {}", id, request.method(), request.target(), request.version());
        Ok(request)
    }

    /// 所有同步文件系统调用都在阻塞线程池中执行，不占用异步工作线程。
    async fn process(&self, request: &Request, id: u128) -> Result<Outcome, Exception> {
        let resolver = Arc::clone(&self.resolver);
        let target = request.target().to_string();
        let path = blocking(id, move || -> Result<PathBuf, Exception> {
            let path = resolver.resolve(&target, id);
            if path.exists() {
                check_readable(&path)?;
            }
            Ok(path)
        })
        .await??;

        if self.config.simulate_work() {
            tokio::time::sleep(SIMULATED_WORK).await;
        }

        if *request.method() != HttpRequestMethod::Get {
            return Err(Exception::UnsupportedMethod);
        }

        let inspected = path.clone();
        let kind = blocking(id, move || Kind::of(&inspected)).await?;
        if let Kind::Missing = kind {
            return Err(Exception::NotFound);
        }

        self.record_hit(&path, id).await;

        match kind {
            Kind::Dir => {
                let counter = Arc::clone(&self.counter);
                let root = self.resolver.root().to_path_buf();
                let dir = path.clone();
                let built = blocking(id, move || Response::from_dir(&dir, &root, counter.as_ref())).await?;
                match built {
                    Ok(response) => Ok(Outcome::Page(response)),
                    Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                        Err(Exception::PermissionDenied)
                    }
                    Err(e) => {
                        warn!("[ID{}]无法列出目录{}：{}", id, path.display(), e);
                        Err(Exception::NotFound)
                    }
                }
            }
            _ => Ok(Outcome::File(Response::from_file(&path), path)),
        }
    }

    async fn record_hit(&self, path: &Path, id: u128) {
        let counter = Arc::clone(&self.counter);
        let key = path.to_string_lossy().into_owned();
        // 任务失败时 blocking 已记录日志，计数丢失不影响响应
        let _ = blocking(id, move || counter.increment(&key)).await;
    }
}

/// 在阻塞线程池中执行 `f`。任务 panic 视为传输失败。
async fn blocking<T, F>(id: u128, f: F) -> Result<T, Exception>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("[ID{}]阻塞任务失败：{}", id, e);
        Exception::TransportFailed
    })
}

/// 发送响应头，然后逐个发送分块。
///
/// 文件在阻塞线程池中读取并编码，分块经有界通道交给当前任务写出。
/// 写出失败时通道接收端被丢弃，读文件的任务随之停止。
async fn send_file(
    stream: &mut TcpStream,
    response: &Response,
    path: PathBuf,
    id: u128,
) -> Result<(), Exception> {
    let transport = |e: io::Error| {
        error!("[ID{}]发送文件{}失败：{}", id, path.display(), e);
        Exception::TransportFailed
    };

    stream.write_all(&response.header_bytes()).await.map_err(transport)?;

    let (tx, mut rx) = mpsc::channel::<io::Result<Bytes>>(FRAME_QUEUE_DEPTH);
    let source = path.clone();
    tokio::task::spawn_blocking(move || {
        let file = match File::open(&source) {
            Ok(file) => file,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        };
        for frame in ChunkedEncoder::new(file) {
            if tx.blocking_send(frame).is_err() {
                break;
            }
        }
    });

    let mut total = 0usize;
    while let Some(frame) = rx.recv().await {
        let frame = frame.map_err(transport)?;
        total += frame.len();
        stream.write_all(&frame).await.map_err(transport)?;
    }
    stream.flush().await.map_err(transport)?;
    debug!("[ID{}]分块传输完成，共发送{}字节", id, total);
    Ok(())
}

fn log_outcome(id: u128, client_ip: &str, request: Option<&Request>, status: u16, start_time: &Instant) {
    info!(
        "[ID{}] {}",
        id,
        access_line(client_ip, request, status, start_time.elapsed().as_millis())
    );
}

/// 每个请求一行访问日志。限流或解析失败时方法与目标记为 `-`。
fn access_line(client_ip: &str, request: Option<&Request>, status: u16, elapsed_ms: u128) -> String {
    let (method, target) = match request {
        Some(request) => (request.method().to_string(), request.target()),
        None => ("-".to_string(), "-"),
    };
    format!("{} \"{} {}\" {} {}ms", client_ip, method, target, status, elapsed_ms)
}

/// 从 `start` 开始依次尝试绑定 `attempts` 个端口，返回第一个绑定成功的监听器。
pub async fn bind_with_probe(host: &str, start: u16, attempts: u16) -> Result<TcpListener, Exception> {
    for offset in 0..attempts {
        let Some(port) = start.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                if port != start {
                    warn!("端口{}已被占用，改用端口{}", start, port);
                }
                return Ok(listener);
            }
            Err(e) => debug!("无法绑定{}:{}：{}", host, port, e),
        }
    }
    error!(
        "在{}-{}范围内找不到可用端口",
        start,
        start.saturating_add(attempts.saturating_sub(1))
    );
    Err(Exception::NoAvailablePort)
}
