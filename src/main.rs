// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 静态文件服务器入口
//!
//! 解析命令行、初始化日志、加载并校验配置，然后在 Tokio 多线程运行时上
//! 运行监听循环。每个连接处理一个请求，响应后关闭。

use serve::config::{AuthConfig, Config, Toggle};
use serve::exception::Exception;
use serve::handler::{self, ServeContext};
use serve::param::MAX_HEAD_SIZE;
use serve::request::Request;
use serve::response::Response;

use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Config as LogConfig, Root},
    encode::pattern::PatternEncoder,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    runtime::Builder,
    signal,
};

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::Path,
    sync::Arc,
    time::Instant,
};

#[derive(Parser, Debug)]
#[command(name = "serve", version, about = "Static file serving and directory listing")]
struct Cli {
    /// 要提供服务的目录，覆盖配置文件中的 public
    directory: Option<String>,

    /// 配置文件路径（.toml，或 serve.json 风格的 .json）
    #[arg(short, long)]
    config: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    listen: Option<u16>,

    /// 单页应用模式：所有找不到的路径都返回 index.html
    #[arg(short, long)]
    single: bool,

    /// 开启 CORS
    #[arg(short = 'C', long)]
    cors: bool,

    /// 允许跟随符号链接
    #[arg(short = 'S', long)]
    symlinks: bool,

    #[arg(long)]
    no_etag: bool,

    #[arg(long)]
    no_compression: bool,

    #[arg(long)]
    no_request_logging: bool,

    /// 开启基本认证，凭据来自 SERVE_USER / SERVE_PASSWORD
    #[arg(short = 'u', long)]
    auth: bool,

    #[arg(long, env = "SERVE_USER", hide_env_values = true, hide = true)]
    user: Option<String>,

    #[arg(long, env = "SERVE_PASSWORD", hide_env_values = true, hide = true)]
    password: Option<String>,

    /// Cache-Control 的 max-age（秒），0 表示禁止缓存
    #[arg(long)]
    cache: Option<u64>,

    /// 额外的忽略片段，逗号分隔
    #[arg(long, value_delimiter = ',')]
    ignore: Vec<String>,

    #[arg(long, default_value = "config/log4rs.yaml")]
    log_config: String,
}

fn init_logging(path: &str) {
    if Path::new(path).exists() {
        match log4rs::init_file(path, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("无法从{}初始化日志: {}，改用控制台输出", path, e),
        }
    }
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {m}{n}",
        )))
        .build();
    let built = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));
    match built {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("无法初始化日志: {}", e);
            }
        }
        Err(e) => eprintln!("日志配置无效: {}", e),
    }
}

fn load_config(cli: &Cli) -> Result<Config, Exception> {
    let mut config = match &cli.config {
        Some(path) if path.ends_with(".json") => Config::from_json(path)?,
        Some(path) => Config::from_toml(path)?,
        None => {
            let default = "config/development.toml";
            if Path::new(default).exists() {
                Config::from_toml(default)?
            } else {
                Config::new().with_public(".")
            }
        }
    };

    if let Some(directory) = &cli.directory {
        config = config.with_public(directory);
    }
    if let Some(port) = cli.listen {
        config = config.with_port(port);
    }
    if cli.single {
        config = config.with_single(true);
    }
    if cli.cors {
        config = config.with_cors(true);
    }
    if cli.symlinks {
        config = config.with_symlinks(true);
    }
    if cli.no_etag {
        config = config.with_etag(false);
    }
    if cli.no_compression {
        config = config.with_compression(false);
    }
    if cli.no_request_logging {
        config = config.with_request_logging(false);
    }
    if cli.cache.is_some() {
        config = config.with_cache_max_age(cli.cache);
    }
    if !cli.ignore.is_empty() {
        config = config.with_ignored(&cli.ignore);
    }
    if cli.auth {
        match (&cli.user, &cli.password) {
            (Some(username), Some(password)) => {
                config = config.with_auth(Some(AuthConfig {
                    username: username.clone(),
                    password: password.clone(),
                }));
            }
            _ => {
                return Err(Exception::Configuration(
                    "开启认证需要设置SERVE_USER和SERVE_PASSWORD".to_string(),
                ))
            }
        }
    }

    config.validate()?;
    Ok(config)
}

fn main() {
    let cli = Cli::parse();

    init_logging(&cli.log_config);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    info!("配置文件已载入");
    info!("www root: {}", config.public());
    if let Toggle::Paths(paths) = config.clean_urls() {
        debug!("cleanUrls只对{:?}生效", paths);
    }

    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads().max(1))
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建异步运行时: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config)) {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Exception> {
    let port = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    info!("服务端将在{}:{}上监听Socket连接", address, port);

    let listener = TcpListener::bind(SocketAddrV4::new(address, port)).await?;
    let context = Arc::new(ServeContext::new(config, port)?);
    info!("内置资源前缀: {}", context.asset_prefix());
    info!("端口{}绑定完成", port);

    let mut id: u128 = 0;
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("接受连接失败: {}", e);
                        continue;
                    }
                };
                debug!("[ID{}]TCP连接已建立: {}", id, addr);
                let context = Arc::clone(&context);
                tokio::spawn(async move {
                    handle_connection(stream, addr, id, context).await;
                });
                id += 1;
            }
            _ = signal::ctrl_c() => {
                info!("收到停机信号，正在退出...");
                break;
            }
        }
    }
    Ok(())
}

enum Head {
    Complete(Vec<u8>),
    Closed,
    TooLarge,
}

/// 读取请求头直到空行，长度不超过 [`MAX_HEAD_SIZE`]
async fn read_head(stream: &mut TcpStream) -> std::io::Result<Head> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(if buffer.is_empty() {
                Head::Closed
            } else {
                Head::Complete(buffer)
            });
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
            return Ok(Head::Complete(buffer));
        }
        if buffer.len() > MAX_HEAD_SIZE {
            return Ok(Head::TooLarge);
        }
    }
}

async fn handle_connection(mut stream: TcpStream, addr: SocketAddr, id: u128, context: Arc<ServeContext>) {
    let start_time = Instant::now();

    let buffer = match read_head(&mut stream).await {
        Ok(Head::Complete(buffer)) => buffer,
        Ok(Head::Closed) => return,
        Ok(Head::TooLarge) => {
            warn!("[ID{}]请求头超过{}字节，返回431", id, MAX_HEAD_SIZE);
            let _ = stream.write_all(&Response::from_status_code(431).as_bytes()).await;
            return;
        }
        Err(e) => {
            error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
            return;
        }
    };
    debug!("[ID{}]HTTP请求接收完毕", id);

    let request = match Request::try_from(&buffer, id) {
        Ok(request) => request,
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败: {}", id, e);
            let _ = stream
                .write_all(&Response::from_status_code(e.status_code()).as_bytes())
                .await;
            return;
        }
    };

    let response = handler::handle(&request, &context, id).await;
    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );

    if context.config().request_logging() {
        info!(
            "[ID{}] {} {} {} {} {} {}ms {}",
            id,
            addr,
            request.version(),
            request.method(),
            request.target(),
            response.status_code(),
            start_time.elapsed().as_millis(),
            request.user_agent(),
        );
    }

    match response.write_to(&mut stream, context.config().chunk_size()).await {
        Ok(sent) => debug!("[ID{}]响应发送完毕，响应体{}字节", id, sent),
        Err(e) => {
            error!("[ID{}]发送响应失败，中止连接: {}", id, e);
            return;
        }
    }
    let _ = stream.shutdown().await;
}
