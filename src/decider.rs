// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 响应决策模块
//!
//! 请求处理的核心状态机：
//!
//! ```text
//! Start -> {Redirected, Resolving}
//!       -> {ServingFile, ServingIndex, ServingListing, NotFound, BadRequest}
//!       -> Done
//! ```
//!
//! 输入是请求、只读配置和文件系统的当前状态，输出是一个 [`ResponseDecision`]。
//! 预期内的情况（越界、忽略、不存在）全部在这里折算为固定形状的决定，
//! 只有非预期的文件系统故障才以 `Err` 形式交给调用方。
//!
//! 重写规则只在请求路径直接解析不到任何实体时才参与：单页应用模式注入的
//! `**` 规则位于重写表头部，若无条件生效，所有静态资源都会被改写到首页。

use log::debug;
use std::path::{Path, PathBuf};

use crate::cache::{CacheNegotiator, FileStats, Negotiation};
use crate::config::Config;
use crate::exception::Exception;
use crate::listing::{DirectoryLister, Listing};
use crate::param::{embedded_asset, INDEX_FILE, MIME_TYPES, NOT_FOUND_FILE};
use crate::request::Request;
use crate::resolver::{decode_path, Containment, Inspection, PathKind, PathResolver, Resolution};
use crate::rules::{PathToggle, RuleEngine, RuleOutcome};
use crate::util::href_for;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecisionState {
    Start,
    Redirected,
    Resolving,
    ServingFile,
    ServingIndex,
    ServingListing,
    NotFound,
    BadRequest,
    Done,
}

#[derive(Debug)]
pub enum ResponseDecision {
    ServeFile {
        path: PathBuf,
        stats: FileStats,
        content_type: String,
        cache: Negotiation,
    },
    /// 编译进二进制的内置资源
    ServeEmbedded {
        content: &'static [u8],
        content_type: String,
    },
    ServeListing {
        directory: PathBuf,
        listing: Listing,
    },
    Redirect {
        location: String,
        status_code: u16,
    },
    /// `body` 为服务根目录下自定义 `404.html` 的内容
    NotFound {
        body: Option<String>,
    },
    BadRequest,
}

/// 一次决策的完整结果
#[derive(Debug)]
pub struct Decided {
    /// 进入 `Done` 之前的最后一个状态
    pub state: DecisionState,
    pub decision: ResponseDecision,
    /// 响应头规则贡献的额外头部
    pub extra_headers: Vec<(String, String)>,
}

/// 按扩展名查询 MIME 类型，查不到时单页模式返回 HTML、其余情况返回纯文本
pub fn content_type_for(path: &Path, single: bool) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match MIME_TYPES.get(ext.as_str()) {
        Some(mime) => mime.to_string(),
        None if single => "text/html; charset=utf-8".to_string(),
        None => "text/plain; charset=utf-8".to_string(),
    }
}

pub struct ResponseDecider {
    resolver: PathResolver,
    rules: RuleEngine,
    lister: DirectoryLister,
    negotiator: CacheNegotiator,
    clean_urls: PathToggle,
    directory_listing: PathToggle,
    trailing_slash: Option<bool>,
    port: u16,
}

/// 单次决策过程中的状态记录
struct Machine {
    id: u128,
    state: DecisionState,
}

impl Machine {
    fn to(&mut self, next: DecisionState) {
        debug!("[ID{}]决策状态 {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

impl ResponseDecider {
    pub fn new(
        resolver: PathResolver,
        rules: RuleEngine,
        lister: DirectoryLister,
        config: &Config,
        port: u16,
    ) -> Result<Self, Exception> {
        let negotiator = CacheNegotiator::from_config(config, rules.is_single());
        Ok(Self {
            resolver,
            rules,
            lister,
            negotiator,
            clean_urls: PathToggle::compile(config.clean_urls())?,
            directory_listing: PathToggle::compile(config.directory_listing())?,
            trailing_slash: config.trailing_slash(),
            port,
        })
    }

    pub fn from_config(config: &Config, asset_prefix: &str, port: u16) -> Result<Self, Exception> {
        let resolver = PathResolver::from_config(config, asset_prefix)?;
        let rules = RuleEngine::from_config(config)?;
        let lister = DirectoryLister::new(
            resolver.root().to_path_buf(),
            config.ignored_files().to_vec(),
            config.unlisted(),
            config.symlinks(),
        )?;
        Self::new(resolver, rules, lister, config, port)
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn is_single(&self) -> bool {
        self.rules.is_single()
    }

    pub async fn decide(&self, request: &Request, id: u128) -> Result<Decided, Exception> {
        let mut machine = Machine {
            id,
            state: DecisionState::Start,
        };

        let decoded = match decode_path(request.path()) {
            Ok(decoded) => decoded,
            Err(_) => {
                debug!("[ID{}]路径解码失败: {}", id, request.path());
                machine.to(DecisionState::BadRequest);
                return Ok(Self::finish(machine, ResponseDecision::BadRequest, Vec::new()));
            }
        };

        let outcome = self.rules.apply(&decoded);
        if let Some(redirect) = &outcome.redirect {
            machine.to(DecisionState::Redirected);
            let decision = ResponseDecision::Redirect {
                location: redirect.location.clone(),
                status_code: redirect.status_code,
            };
            return Ok(Self::finish(machine, decision, Vec::new()));
        }

        machine.to(DecisionState::Resolving);
        let decision = self.resolve(&mut machine, request, &decoded, &outcome).await?;
        Ok(Self::finish(machine, decision, outcome.extra_headers))
    }

    fn finish(mut machine: Machine, decision: ResponseDecision, extra_headers: Vec<(String, String)>) -> Decided {
        let state = machine.state;
        machine.to(DecisionState::Done);
        Decided {
            state,
            decision,
            extra_headers,
        }
    }

    async fn resolve(
        &self,
        machine: &mut Machine,
        request: &Request,
        decoded: &str,
        outcome: &RuleOutcome,
    ) -> Result<ResponseDecision, Exception> {
        let direct = self.resolver.resolve(decoded);
        if let Some(decision) = self.reject(machine, &direct).await? {
            return Ok(decision);
        }

        if direct.containment == Containment::AssetRequest {
            return self.serve_asset(machine, request, &direct).await;
        }

        let inspection = self.resolver.inspect(&direct.filesystem_path).await?;

        match inspection.kind {
            PathKind::File => self.serve_file(machine, &direct.filesystem_path, inspection, request),
            PathKind::Directory => self.directory(machine, request, &direct, true).await,
            PathKind::Missing => self.fallback(machine, request, &direct, outcome).await,
        }
    }

    /// 越界与忽略检查
    async fn reject(
        &self,
        machine: &mut Machine,
        resolution: &Resolution,
    ) -> Result<Option<ResponseDecision>, Exception> {
        if resolution.containment == Containment::Escaped {
            debug!("[ID{}]路径越出服务根目录", machine.id);
            machine.to(DecisionState::BadRequest);
            return Ok(Some(ResponseDecision::BadRequest));
        }
        if resolution.matched_ignore {
            debug!("[ID{}]路径{}命中忽略规则", machine.id, resolution.request_path);
            return self.not_found(machine).await.map(Some);
        }
        Ok(None)
    }

    /// cleanUrls、目录索引等由请求路径派生出的候选文件同样受忽略规则约束
    fn derived_is_ignored(&self, machine: &Machine, derived_path: &str) -> bool {
        let ignored = self.resolver.is_ignored(derived_path);
        if ignored {
            debug!("[ID{}]派生路径{}命中忽略规则", machine.id, derived_path);
        }
        ignored
    }

    /// 内置资源：未配置资源目录时从二进制中取，否则读取该目录
    async fn serve_asset(
        &self,
        machine: &mut Machine,
        request: &Request,
        resolution: &Resolution,
    ) -> Result<ResponseDecision, Exception> {
        if self.resolver.assets_dir().is_none() {
            let name = resolution.filesystem_path.to_string_lossy();
            return match embedded_asset(&name) {
                Some(content) => {
                    machine.to(DecisionState::ServingFile);
                    Ok(ResponseDecision::ServeEmbedded {
                        content,
                        content_type: content_type_for(&resolution.filesystem_path, false),
                    })
                }
                None => self.not_found(machine).await,
            };
        }
        let inspection = self.resolver.inspect(&resolution.filesystem_path).await?;
        match inspection.kind {
            PathKind::File => self.serve_file(machine, &resolution.filesystem_path, inspection, request),
            _ => self.not_found(machine).await,
        }
    }

    async fn fallback(
        &self,
        machine: &mut Machine,
        request: &Request,
        direct: &Resolution,
        outcome: &RuleOutcome,
    ) -> Result<ResponseDecision, Exception> {
        let path = &direct.request_path;
        if self.clean_urls.applies_to(path) && !path.ends_with('/') && !path.ends_with(".html") {
            let mut candidate = direct.filesystem_path.clone().into_os_string();
            candidate.push(".html");
            let candidate = PathBuf::from(candidate);
            let inspection = self.resolver.inspect(&candidate).await?;
            if inspection.kind == PathKind::File {
                if self.derived_is_ignored(machine, &format!("{}.html", path)) {
                    return self.not_found(machine).await;
                }
                debug!("[ID{}]cleanUrls命中{}", machine.id, candidate.display());
                return self.serve_file(machine, &candidate, inspection, request);
            }
        }

        if let Some(rewrite) = &outcome.rewrite {
            if rewrite.single_page {
                return self.serve_index(machine, request).await;
            }
            let target = self.resolver.resolve(&rewrite.path);
            if let Some(decision) = self.reject(machine, &target).await? {
                return Ok(decision);
            }
            let inspection = self.resolver.inspect(&target.filesystem_path).await?;
            match inspection.kind {
                PathKind::File => {
                    return self.serve_file(machine, &target.filesystem_path, inspection, request)
                }
                PathKind::Directory => return self.directory(machine, request, &target, false).await,
                PathKind::Missing => {}
            }
        }

        if self.is_single() {
            return self.serve_index(machine, request).await;
        }
        self.not_found(machine).await
    }

    async fn directory(
        &self,
        machine: &mut Machine,
        request: &Request,
        resolution: &Resolution,
        reached_directly: bool,
    ) -> Result<ResponseDecision, Exception> {
        let path = &resolution.request_path;
        if reached_directly && path != "/" {
            if let Some(location) = self.slash_redirect(request, path) {
                machine.to(DecisionState::Redirected);
                return Ok(ResponseDecision::Redirect {
                    location,
                    status_code: 302,
                });
            }
        }

        let index = resolution.filesystem_path.join(INDEX_FILE);
        let inspection = self.resolver.inspect(&index).await?;
        if inspection.kind == PathKind::File {
            if self.derived_is_ignored(machine, &format!("{}/{}", path.trim_end_matches('/'), INDEX_FILE)) {
                return self.not_found(machine).await;
            }
            return self.serve_file(machine, &index, inspection, request);
        }

        if self.directory_listing.applies_to(path) && !self.lister.hides(path) {
            machine.to(DecisionState::ServingListing);
            let listing = self.lister.list(&resolution.filesystem_path, self.port).await?;
            return Ok(ResponseDecision::ServeListing {
                directory: resolution.filesystem_path.clone(),
                listing,
            });
        }

        if self.is_single() {
            return self.serve_index(machine, request).await;
        }
        self.not_found(machine).await
    }

    /// 目录 URL 的结尾斜杠规范化。未配置时与 `true` 相同，总是补上斜杠。
    ///
    /// `Location` 由规范化后的路径重新编码得到，总是以单个 `/` 开头，
    /// 不会被浏览器当作指向其他主机的 `//host` 形式。
    fn slash_redirect(&self, request: &Request, path: &str) -> Option<String> {
        let location = match (self.trailing_slash, path.ends_with('/')) {
            (None | Some(true), false) => format!("{}/", path),
            (Some(false), true) => {
                let trimmed = path.trim_end_matches('/');
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.to_string()
            }
            _ => return None,
        };
        let location = href_for(&location);
        Some(match request.query() {
            Some(query) => format!("{}?{}", location, query),
            None => location,
        })
    }

    async fn serve_index(&self, machine: &mut Machine, request: &Request) -> Result<ResponseDecision, Exception> {
        let index = self.resolver.root().join(INDEX_FILE);
        let inspection = self.resolver.inspect(&index).await?;
        if self.derived_is_ignored(machine, &format!("/{}", INDEX_FILE)) {
            return self.not_found(machine).await;
        }
        if inspection.kind != PathKind::File {
            debug!("[ID{}]单页应用模式下根目录缺少{}", machine.id, INDEX_FILE);
            return self.not_found(machine).await;
        }
        machine.to(DecisionState::ServingIndex);
        Ok(self.file_decision(&index, inspection, request))
    }

    fn serve_file(
        &self,
        machine: &mut Machine,
        path: &Path,
        inspection: Inspection,
        request: &Request,
    ) -> Result<ResponseDecision, Exception> {
        machine.to(DecisionState::ServingFile);
        Ok(self.file_decision(path, inspection, request))
    }

    fn file_decision(&self, path: &Path, inspection: Inspection, request: &Request) -> ResponseDecision {
        let stats = match &inspection.metadata {
            Some(meta) => FileStats::from_metadata(meta),
            None => FileStats {
                size: 0,
                modified: std::time::UNIX_EPOCH,
                dev: 0,
                ino: 0,
            },
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let cache = self.negotiator.negotiate(&stats, &file_name, request);
        ResponseDecision::ServeFile {
            path: path.to_path_buf(),
            stats,
            content_type: content_type_for(path, self.is_single()),
            cache,
        }
    }

    async fn not_found(&self, machine: &mut Machine) -> Result<ResponseDecision, Exception> {
        machine.to(DecisionState::NotFound);
        let custom = self.resolver.root().join(NOT_FOUND_FILE);
        let body = match self.resolver.inspect(&custom).await?.kind {
            PathKind::File => {
                let bytes = tokio::fs::read(&custom).await?;
                Some(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => None,
        };
        Ok(ResponseDecision::NotFound { body })
    }
}
