use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::exception::Exception;
use crate::param::{DEFAULT_IGNORED_FILES, STATUS_CODES};
use crate::rules::Pattern;

/// `cleanUrls` / `directoryListing` 的取值：要么整体开关，要么是一组启用该功能的路径 glob。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Toggle {
    Enabled(bool),
    Paths(Vec<String>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RewriteRule {
    pub source: String,
    pub destination: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RedirectRule {
    pub source: String,
    pub destination: String,
    #[serde(rename = "type", alias = "status_code", default = "default_redirect_type")]
    pub status_code: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HeaderRule {
    pub source: String,
    pub headers: Vec<HeaderEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

/// 单页应用模式注入到 rewrites 表头部的合成规则
pub const SINGLE_PAGE_SOURCE: &str = "**";
pub const SINGLE_PAGE_DESTINATION: &str = "/index.html";

/// 服务会话的完整配置。
///
/// 启动时由 TOML（服务器参数与规则）或 `serve.json`（仅规则，键名沿用驼峰写法）
/// 加载，经过一次 [`Config::validate`] 后在整个进程生命周期内只读。
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_public")]
    public: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    local: bool,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_streaming_threshold")]
    streaming_threshold: u64,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default = "default_true")]
    compression: bool,
    #[serde(default = "default_true", alias = "requestLogging")]
    request_logging: bool,

    #[serde(default = "default_disabled", alias = "cleanUrls")]
    clean_urls: Toggle,
    #[serde(default)]
    rewrites: Vec<RewriteRule>,
    #[serde(default)]
    redirects: Vec<RedirectRule>,
    #[serde(default)]
    headers: Vec<HeaderRule>,
    #[serde(default = "default_enabled", alias = "directoryListing")]
    directory_listing: Toggle,
    #[serde(default)]
    unlisted: Vec<String>,
    #[serde(default, alias = "trailingSlash")]
    trailing_slash: Option<bool>,
    #[serde(default, alias = "renderSingle")]
    render_single: bool,
    #[serde(default)]
    symlinks: bool,
    #[serde(default = "default_true")]
    etag: bool,
    #[serde(default, alias = "cache", alias = "cacheControlMaxAge")]
    cache_control_max_age: Option<u64>,
    #[serde(default = "default_ignored_files", alias = "ignoredFiles")]
    ignored_files: Vec<String>,
    #[serde(default, alias = "corsEnabled")]
    cors: bool,
    #[serde(default)]
    auth: Option<AuthConfig>,
    #[serde(default, alias = "assetsDir")]
    assets_dir: Option<String>,
}

fn default_public() -> String {
    ".".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_streaming_threshold() -> u64 {
    1048576 // 1MB
}

fn default_chunk_size() -> usize {
    262144 // 256KB
}

fn default_true() -> bool {
    true
}

fn default_disabled() -> Toggle {
    Toggle::Enabled(false)
}

fn default_enabled() -> Toggle {
    Toggle::Enabled(true)
}

fn default_redirect_type() -> u16 {
    301
}

fn default_ignored_files() -> Vec<String> {
    DEFAULT_IGNORED_FILES.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            public: default_public(),
            port: default_port(),
            local: false,
            worker_threads: 0,
            streaming_threshold: default_streaming_threshold(),
            chunk_size: default_chunk_size(),
            compression: true,
            request_logging: true,
            clean_urls: default_disabled(),
            rewrites: Vec::new(),
            redirects: Vec::new(),
            headers: Vec::new(),
            directory_listing: default_enabled(),
            unlisted: Vec::new(),
            trailing_slash: None,
            render_single: false,
            symlinks: false,
            etag: true,
            cache_control_max_age: None,
            ignored_files: default_ignored_files(),
            cors: false,
            auth: None,
            assets_dir: None,
        }
    }

    /// 从 TOML 文件加载配置。文件缺失或格式错误都会作为配置错误返回，不再静默回退到默认值。
    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let str_val = fs::read_to_string(filename)
            .map_err(|e| Exception::Configuration(format!("无法读取{}: {}", filename, e)))?;
        let raw_config: Config = toml::from_str(&str_val)
            .map_err(|e| Exception::Configuration(format!("无法解析{}: {}", filename, e)))?;
        debug!("已从{}载入配置", filename);
        Ok(raw_config.normalized())
    }

    /// 从 `serve.json` 风格的 JSON 文件加载配置。
    pub fn from_json(filename: &str) -> Result<Self, Exception> {
        let str_val = fs::read_to_string(filename)
            .map_err(|e| Exception::Configuration(format!("无法读取{}: {}", filename, e)))?;
        Self::from_json_str(&str_val)
    }

    pub fn from_json_str(json: &str) -> Result<Self, Exception> {
        let raw_config: Config = serde_json::from_str(json)
            .map_err(|e| Exception::Configuration(format!("JSON 配置无效: {}", e)))?;
        Ok(raw_config.normalized())
    }

    fn normalized(mut self) -> Self {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.chunk_size == 0 {
            warn!("chunk_size被设置为0，将改为默认值{}", default_chunk_size());
            self.chunk_size = default_chunk_size();
        }
        if self.render_single {
            self.inject_single_page_rule();
        }
        self
    }

    fn inject_single_page_rule(&mut self) {
        let already = self
            .rewrites
            .first()
            .is_some_and(|r| r.source == SINGLE_PAGE_SOURCE && r.destination == SINGLE_PAGE_DESTINATION);
        if !already {
            self.rewrites.insert(
                0,
                RewriteRule {
                    source: SINGLE_PAGE_SOURCE.to_string(),
                    destination: SINGLE_PAGE_DESTINATION.to_string(),
                },
            );
        }
    }

    /// 启动阶段的唯一一次校验：规则能编译、重定向码是 3xx、根目录存在。
    pub fn validate(&self) -> Result<(), Exception> {
        let sources = self
            .rewrites
            .iter()
            .map(|r| r.source.as_str())
            .chain(self.redirects.iter().map(|r| r.source.as_str()))
            .chain(self.headers.iter().map(|r| r.source.as_str()))
            .chain(self.unlisted.iter().map(|s| s.as_str()));
        for source in sources {
            Pattern::compile(source)?;
        }
        for toggle in [&self.clean_urls, &self.directory_listing] {
            if let Toggle::Paths(globs) = toggle {
                for g in globs {
                    Pattern::compile(g)?;
                }
            }
        }
        for redirect in &self.redirects {
            let code = redirect.status_code;
            // 304 不携带 Location
            if !(300..400).contains(&code) || code == 304 || !STATUS_CODES.contains_key(&code) {
                return Err(Exception::Configuration(format!(
                    "重定向{}的状态码{}不是受支持的3xx",
                    redirect.source, redirect.status_code
                )));
            }
        }
        for rule in &self.headers {
            for entry in &rule.headers {
                if entry.key.is_empty() || entry.key.contains([':', '\r', '\n']) || entry.value.contains(['\r', '\n']) {
                    return Err(Exception::Configuration(format!("非法的响应头: {}", entry.key)));
                }
            }
        }
        let public = Path::new(&self.public);
        if !public.is_dir() {
            return Err(Exception::Configuration(format!("服务目录{}不存在", self.public)));
        }
        Ok(())
    }
}

// --- 供命令行覆盖使用的构造方法 ---

impl Config {
    pub fn with_public(mut self, public: &str) -> Self {
        self.public = public.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_single(mut self, single: bool) -> Self {
        self.render_single = single;
        if single {
            self.inject_single_page_rule();
        }
        self
    }

    pub fn with_clean_urls(mut self, clean_urls: Toggle) -> Self {
        self.clean_urls = clean_urls;
        self
    }

    pub fn with_rewrite(mut self, source: &str, destination: &str) -> Self {
        self.rewrites.push(RewriteRule {
            source: source.to_string(),
            destination: destination.to_string(),
        });
        self
    }

    pub fn with_redirect(mut self, source: &str, destination: &str, status_code: u16) -> Self {
        self.redirects.push(RedirectRule {
            source: source.to_string(),
            destination: destination.to_string(),
            status_code,
        });
        self
    }

    pub fn with_header_rule(mut self, source: &str, headers: &[(&str, &str)]) -> Self {
        self.headers.push(HeaderRule {
            source: source.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| HeaderEntry {
                    key: k.to_string(),
                    value: v.to_string(),
                })
                .collect(),
        });
        self
    }

    pub fn with_directory_listing(mut self, listing: Toggle) -> Self {
        self.directory_listing = listing;
        self
    }

    pub fn with_unlisted(mut self, unlisted: Vec<String>) -> Self {
        self.unlisted = unlisted;
        self
    }

    pub fn with_trailing_slash(mut self, trailing_slash: Option<bool>) -> Self {
        self.trailing_slash = trailing_slash;
        self
    }

    pub fn with_symlinks(mut self, symlinks: bool) -> Self {
        self.symlinks = symlinks;
        self
    }

    pub fn with_etag(mut self, etag: bool) -> Self {
        self.etag = etag;
        self
    }

    pub fn with_cache_max_age(mut self, max_age: Option<u64>) -> Self {
        self.cache_control_max_age = max_age;
        self
    }

    /// 追加额外的忽略片段，默认片段保留
    pub fn with_ignored(mut self, extra: &[String]) -> Self {
        for item in extra {
            if !item.is_empty() && !self.ignored_files.contains(item) {
                self.ignored_files.push(item.clone());
            }
        }
        self
    }

    pub fn with_cors(mut self, cors: bool) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_request_logging(mut self, request_logging: bool) -> Self {
        self.request_logging = request_logging;
        self
    }

    pub fn with_auth(mut self, auth: Option<AuthConfig>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_streaming_threshold(mut self, threshold: u64) -> Self {
        self.streaming_threshold = threshold;
        self
    }

    pub fn with_assets_dir(mut self, assets_dir: &str) -> Self {
        self.assets_dir = Some(assets_dir.to_string());
        self
    }
}

impl Config {
    pub fn public(&self) -> &str {
        &self.public
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn streaming_threshold(&self) -> u64 {
        self.streaming_threshold
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn compression(&self) -> bool {
        self.compression
    }

    pub fn request_logging(&self) -> bool {
        self.request_logging
    }

    pub fn clean_urls(&self) -> &Toggle {
        &self.clean_urls
    }

    pub fn rewrites(&self) -> &[RewriteRule] {
        &self.rewrites
    }

    pub fn redirects(&self) -> &[RedirectRule] {
        &self.redirects
    }

    pub fn headers(&self) -> &[HeaderRule] {
        &self.headers
    }

    pub fn directory_listing(&self) -> &Toggle {
        &self.directory_listing
    }

    pub fn unlisted(&self) -> &[String] {
        &self.unlisted
    }

    pub fn trailing_slash(&self) -> Option<bool> {
        self.trailing_slash
    }

    pub fn render_single(&self) -> bool {
        self.render_single
    }

    pub fn symlinks(&self) -> bool {
        self.symlinks
    }

    pub fn etag(&self) -> bool {
        self.etag
    }

    pub fn cache_control_max_age(&self) -> Option<u64> {
        self.cache_control_max_age
    }

    pub fn ignored_files(&self) -> &[String] {
        &self.ignored_files
    }

    pub fn cors(&self) -> bool {
        self.cors
    }

    pub fn auth(&self) -> Option<&AuthConfig> {
        self.auth.as_ref()
    }

    /// 显式配置的内置资源目录。未配置时使用编译进二进制的资源。
    pub fn assets_dir(&self) -> Option<PathBuf> {
        self.assets_dir.as_ref().map(PathBuf::from)
    }
}
