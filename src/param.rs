// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 静态文件服务器在各个组件之间共享的常量：
//! - HTTP 状态码及原因短语（Reason Phrase）。
//! - 以扩展名为键的静态 MIME 类型表。
//! - 默认忽略列表、CORS 头、单页应用缓存时长等固定策略值。
//! - HTTP 方法、版本及编码格式的强类型枚举。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "serve";

/// HTTP 协议规定的换行符
pub const CRLF: &str = "\r\n";

/// 请求头的最大长度，超过该值的请求直接判定为非法
pub const MAX_HEAD_SIZE: usize = 8192;

/// 目录索引文件名
pub const INDEX_FILE: &str = "index.html";

/// 自定义 404 页面的文件名（相对于服务根目录）
pub const NOT_FOUND_FILE: &str = "404.html";

/// 单页应用模式下静态资源的固定缓存时长（1 天）
pub const SPA_ASSET_MAX_AGE: u64 = 86400;

/// 未显式配置时默认屏蔽的路径片段
pub const DEFAULT_IGNORED_FILES: [&str; 2] = [".DS_Store", ".git/"];

/// 开启 CORS 时附加的 `Access-Control-Allow-Headers` 取值
pub const CORS_ALLOW_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept, Range";

/// 基本认证的质询域
pub const AUTH_REALM: &str = "User Visible Realm";

/// 列表页样式表，编译进二进制
const STYLE_CSS: &[u8] = include_bytes!("../assets/style.css");

/// 按资源命名空间下的相对路径查找内置资源
pub fn embedded_asset(name: &str) -> Option<&'static [u8]> {
    match name {
        "style.css" => Some(STYLE_CSS),
        _ => None,
    }
}

lazy_static! {
    /// 服务器允许处理的 HTTP 方法，其余方法一律返回 405。
    pub static ref ALLOWED_METHODS: Vec<HttpRequestMethod> = vec![
        HttpRequestMethod::Get,
        HttpRequestMethod::Head,
        HttpRequestMethod::Options,
    ];
}

lazy_static! {
    /// 本服务器可能产生的状态码与原因短语。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = [
        (200, "OK"),
        (204, "No Content"),
        (206, "Partial Content"),
        (300, "Multiple Choices"),
        (301, "Moved Permanently"),
        (302, "Found"),
        (303, "See Other"),
        (304, "Not Modified"),
        (307, "Temporary Redirect"),
        (308, "Permanent Redirect"),
        (400, "Bad Request"),
        (401, "Unauthorized"),
        (403, "Forbidden"),
        (404, "Not Found"),
        (405, "Method Not Allowed"),
        (416, "Range Not Satisfiable"),
        (431, "Request Header Fields Too Large"),
        (500, "Internal Server Error"),
        (505, "HTTP Version Not Supported"),
    ]
    .into_iter()
    .collect();
}

lazy_static! {
    /// 文件扩展名（小写、不含点）到 `Content-Type` 的静态映射表。
    ///
    /// 表中查不到的扩展名由调用方按单页模式决定兜底类型。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = [
        ("aac", "audio/aac"),
        ("avi", "video/x-msvideo"),
        ("avif", "image/avif"),
        ("bin", "application/octet-stream"),
        ("bmp", "image/bmp"),
        ("bz2", "application/x-bzip2"),
        ("css", "text/css; charset=utf-8"),
        ("csv", "text/csv; charset=utf-8"),
        ("doc", "application/msword"),
        ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        ("eot", "application/vnd.ms-fontobject"),
        ("epub", "application/epub+zip"),
        ("gif", "image/gif"),
        ("gz", "application/gzip"),
        ("htm", "text/html; charset=utf-8"),
        ("html", "text/html; charset=utf-8"),
        ("ico", "image/x-icon"),
        ("ics", "text/calendar"),
        ("jar", "application/java-archive"),
        ("jpeg", "image/jpeg"),
        ("jpg", "image/jpeg"),
        ("js", "application/javascript; charset=utf-8"),
        ("json", "application/json; charset=utf-8"),
        ("jsonld", "application/ld+json"),
        ("map", "application/json; charset=utf-8"),
        ("md", "text/markdown; charset=utf-8"),
        ("mjs", "application/javascript; charset=utf-8"),
        ("mkv", "video/x-matroska"),
        ("mp3", "audio/mpeg"),
        ("mp4", "video/mp4"),
        ("mpeg", "video/mpeg"),
        ("oga", "audio/ogg"),
        ("ogv", "video/ogg"),
        ("opus", "audio/opus"),
        ("otf", "font/otf"),
        ("pdf", "application/pdf"),
        ("png", "image/png"),
        ("rar", "application/vnd.rar"),
        ("rtf", "application/rtf"),
        ("sh", "application/x-sh"),
        ("svg", "image/svg+xml"),
        ("tar", "application/x-tar"),
        ("tif", "image/tiff"),
        ("tiff", "image/tiff"),
        ("ttf", "font/ttf"),
        ("txt", "text/plain; charset=utf-8"),
        ("wasm", "application/wasm"),
        ("wav", "audio/wav"),
        ("weba", "audio/webm"),
        ("webm", "video/webm"),
        ("webmanifest", "application/manifest+json"),
        ("webp", "image/webp"),
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
        ("xhtml", "application/xhtml+xml"),
        ("xls", "application/vnd.ms-excel"),
        ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        ("xml", "text/xml; charset=utf-8"),
        ("yaml", "text/yaml; charset=utf-8"),
        ("yml", "text/yaml; charset=utf-8"),
        ("zip", "application/zip"),
        ("7z", "application/x-7z-compressed"),
    ]
    .into_iter()
    .collect();
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    V1_0,
    V1_1,
}

/// HTTP 请求方法。不在 [`ALLOWED_METHODS`] 中的方法仍可被解析，由处理器返回 405。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Delete,
    Patch,
    /// 其它任何合法 token
    Other,
}

/// 压缩中间件支持的内容编码
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpEncoding {
    Gzip,
    Deflate,
    Br,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            HttpRequestMethod::Get => "GET",
            HttpRequestMethod::Head => "HEAD",
            HttpRequestMethod::Options => "OPTIONS",
            HttpRequestMethod::Post => "POST",
            HttpRequestMethod::Put => "PUT",
            HttpRequestMethod::Delete => "DELETE",
            HttpRequestMethod::Patch => "PATCH",
            HttpRequestMethod::Other => "OTHER",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for HttpEncoding {
    /// `Content-Encoding` 头所使用的标识符
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpEncoding::Gzip => write!(f, "gzip"),
            HttpEncoding::Deflate => write!(f, "deflate"),
            HttpEncoding::Br => write!(f, "br"),
        }
    }
}
