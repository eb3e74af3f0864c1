// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 并发静态文件服务器
//!
//! 启动流程：
//! 1. 初始化 log4rs 日志，配置文件缺失时退回到只输出到控制台。
//! 2. 读取 TOML 配置（第一个命令行参数可以指定路径）。
//! 3. 按配置构建多线程 Tokio 运行时。
//! 4. 从配置的端口开始探测可用端口并监听。
//! 5. 进入接收循环，直到进程被中断。

use std::{process, sync::Arc};

use hitserver::{server::bind_with_probe, Config, Server};
use log::{error, info, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};
use tokio::runtime::Builder;

const DEFAULT_CONFIG: &str = "config/development.toml";
const LOG_CONFIG: &str = "config/log4rs.yaml";

fn main() {
    init_logging();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = match Config::from_toml(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("无法载入配置文件{}：{}", config_path, e);
            process::exit(1);
        }
    };
    info!("配置文件已载入：{}", config_path);

    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.runtime_threads())
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("无法创建运行时：{}", e);
            process::exit(1);
        }
    };

    runtime.block_on(async move {
        let listener =
            match bind_with_probe(config.host(), config.port(), config.port_attempts()).await {
                Ok(l) => l,
                Err(e) => {
                    error!("{}", e);
                    process::exit(1);
                }
            };
        let port = listener
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(config.port());

        info!(
            "Serving HTTP on {} port {} (http://{}:{}/) ...",
            config.host(),
            port,
            config.host(),
            port
        );
        info!("www root: {}", config.www_root().display());
        info!("工作者数量：{}", config.workers());
        info!(
            "simulate_work: {}, use_locks: {}",
            config.simulate_work(),
            config.use_locks()
        );
        info!("限流：每个IP每秒{}个请求", config.rate_limit());

        let server = Arc::new(Server::new(config));
        server.serve(listener).await;
    });
}

fn init_logging() {
    if log4rs::init_file(LOG_CONFIG, Default::default()).is_ok() {
        return;
    }
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {m}{n}",
        )))
        .build();
    let config = log4rs::config::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));
    match config {
        Ok(c) => {
            if let Err(e) = log4rs::init_config(c) {
                eprintln!("无法初始化日志：{}", e);
            }
        }
        Err(e) => eprintln!("无法构建日志配置：{}", e),
    }
}
