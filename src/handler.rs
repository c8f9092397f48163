// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求处理流水线
//!
//! 方法检查 → 认证闸门 → 决策状态机 → 组装 `Response` → 响应头规则、CORS、压缩。
//!
//! [`ServeContext`] 在启动时构建一次，之后只读，所有连接任务通过 `Arc` 共享。

use bytes::Bytes;
use log::{debug, error, warn};
use rand::Rng;

use crate::auth::{self, Authenticator, BasicAuth};
use crate::cache::cors_headers;
use crate::config::Config;
use crate::decider::{Decided, ResponseDecider, ResponseDecision};
use crate::exception::Exception;
use crate::param::{HttpRequestMethod, ALLOWED_METHODS};
use crate::request::Request;
use crate::response::{should_skip_compression, Response};
use crate::util::HtmlBuilder;

const ASSET_PREFIX_LEN: usize = 24;

/// 一次服务会话的全部只读状态
pub struct ServeContext {
    config: Config,
    decider: ResponseDecider,
    authenticator: Option<Box<dyn Authenticator>>,
    asset_prefix: String,
}

/// 每个进程随机生成的内置资源路径前缀
pub fn random_asset_prefix() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    let token: String = (0..ASSET_PREFIX_LEN)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect();
    format!("/{}", token)
}

impl ServeContext {
    pub fn new(config: Config, port: u16) -> Result<Self, Exception> {
        Self::with_asset_prefix(config, port, &random_asset_prefix())
    }

    pub fn with_asset_prefix(config: Config, port: u16, asset_prefix: &str) -> Result<Self, Exception> {
        let decider = ResponseDecider::from_config(&config, asset_prefix, port)?;
        let authenticator = config
            .auth()
            .map(|a| Box::new(BasicAuth::from_config(a)) as Box<dyn Authenticator>);
        Ok(Self {
            config,
            decider,
            authenticator,
            asset_prefix: asset_prefix.to_string(),
        })
    }

    /// 替换认证协作者
    pub fn with_authenticator(mut self, authenticator: Box<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn decider(&self) -> &ResponseDecider {
        &self.decider
    }

    pub fn asset_prefix(&self) -> &str {
        &self.asset_prefix
    }
}

fn allow_header() -> String {
    ALLOWED_METHODS
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 处理单个请求，总会得到一个响应。文件系统故障在这里被映射为 500。
pub async fn handle(request: &Request, ctx: &ServeContext, id: u128) -> Response {
    let method = request.method();

    let mut response = if !ALLOWED_METHODS.contains(&method) {
        warn!("[ID{}]不支持的请求方法{}，返回405", id, method);
        let mut response = Response::from_status_code(Exception::UnsupportedMethod.status_code());
        response.set_header("Allow", &allow_header());
        response
    } else if method == HttpRequestMethod::Options {
        debug!("[ID{}]请求方法为OPTIONS", id);
        let mut response = Response::new();
        response.set_code(204).set_header("Allow", &allow_header());
        response
    } else if let Err(e) = gate(request, ctx) {
        warn!("[ID{}]认证失败，返回{}", id, e.status_code());
        let mut response = Response::from_status_code(e.status_code());
        response.set_header("WWW-Authenticate", &auth::challenge());
        response
    } else {
        match ctx.decider.decide(request, id).await {
            Ok(decided) => build(decided, request, ctx, id).await,
            Err(e) => {
                error!("[ID{}]处理{}时发生错误: {}", id, request.path(), e);
                Response::from_status_code(e.status_code())
            }
        }
    };

    if (400..500).contains(&response.status_code()) {
        warn!("[ID{}]{} {} -> {}", id, method, request.path(), response.status_code());
    }
    if ctx.config.cors() {
        response.set_headers(&cors_headers());
    }
    if method == HttpRequestMethod::Head {
        response.head_only();
    }
    response
}

fn gate(request: &Request, ctx: &ServeContext) -> Result<(), Exception> {
    match &ctx.authenticator {
        Some(authenticator) => auth::check(authenticator.as_ref(), request.authorization()),
        None => Ok(()),
    }
}

async fn build(decided: Decided, request: &Request, ctx: &ServeContext, id: u128) -> Response {
    let Decided {
        decision,
        extra_headers,
        ..
    } = decided;
    let config = &ctx.config;

    let mut response = match decision {
        ResponseDecision::ServeFile {
            path,
            stats,
            content_type,
            cache,
        } => {
            if cache.not_modified() {
                let mut response = Response::new();
                response.set_code(304).set_headers(&cache.headers);
                response
            } else {
                let range = request.range();
                let mut response = Response::from_file(path, stats.size, &content_type, range);
                response.set_headers(&cache.headers);
                let compressible = config.compression()
                    && range.is_none()
                    && !request.accept_encoding().is_empty()
                    && stats.size <= config.streaming_threshold()
                    && !should_skip_compression(&content_type);
                if compressible {
                    if let Err(e) = response.buffer_file().await {
                        error!("[ID{}]读取文件失败: {}", id, e);
                        return Response::from_status_code(Exception::Filesystem(e).status_code());
                    }
                    response.compress(request.accept_encoding());
                }
                response
            }
        }
        ResponseDecision::ServeEmbedded { content, content_type } => {
            let mut response = Response::new();
            response.set_body(Bytes::from_static(content), &content_type);
            if config.compression() && !should_skip_compression(&content_type) {
                response.compress(request.accept_encoding());
            }
            response
        }
        ResponseDecision::ServeListing { directory, listing } => {
            debug!("[ID{}]生成目录列表: {}", id, directory.display());
            let mut response = if request.wants_json() {
                match listing.to_json() {
                    Ok(json) => Response::from_json(json),
                    Err(e) => {
                        error!("[ID{}]序列化目录列表失败: {}", id, e);
                        return Response::from_status_code(500);
                    }
                }
            } else {
                Response::from_html(200, HtmlBuilder::from_listing(&listing, &ctx.asset_prefix).build())
            };
            if config.compression() {
                response.compress(request.accept_encoding());
            }
            response
        }
        ResponseDecision::Redirect {
            location,
            status_code,
        } => Response::redirect(&location, status_code),
        ResponseDecision::NotFound { body } => {
            let mut response = match body {
                Some(html) => Response::from_html(404, html),
                None => Response::from_status_code(404),
            };
            if config.compression() {
                response.compress(request.accept_encoding());
            }
            response
        }
        ResponseDecision::BadRequest => Response::from_status_code(400),
    };

    response.set_headers(&extra_headers);
    response
}
