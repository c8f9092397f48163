// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 缓存协商模块
//!
//! 根据文件元数据计算 `ETag` / `Last-Modified`，对照条件请求头决定 200 还是 304，
//! 并按配置设置 `Cache-Control`。

use chrono::{DateTime, Utc};
use log::debug;
use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::param::{CORS_ALLOW_HEADERS, INDEX_FILE, SPA_ASSET_MAX_AGE};
use crate::request::Request;

/// 缓存协商所需的文件状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStats {
    pub size: u64,
    pub modified: SystemTime,
    pub dev: u64,
    pub ino: u64,
}

impl FileStats {
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            size: meta.len(),
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            size: meta.len(),
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
            dev: 0,
            ino: 0,
        }
    }

    fn mtime_millis(&self) -> u128 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }

    fn mtime_secs(&self) -> i64 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// 协商结果：状态码只会是 200 或 304
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiation {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
}

impl Negotiation {
    pub fn not_modified(&self) -> bool {
        self.status_code == 304
    }
}

#[derive(Debug, Clone)]
pub struct CacheNegotiator {
    etag: bool,
    max_age: Option<u64>,
    single: bool,
}

/// HTTP-date，例如 `Wed, 21 Oct 2015 07:28:00 GMT`
pub fn format_http_date(time: SystemTime) -> String {
    let date: DateTime<Utc> = time.into();
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `If-None-Match` 是否命中给定的 ETag，支持 `*`、逗号列表和弱校验前缀
fn etag_matches(header: &str, etag: &str) -> bool {
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

impl CacheNegotiator {
    pub fn new(etag: bool, max_age: Option<u64>, single: bool) -> Self {
        Self {
            etag,
            max_age,
            single,
        }
    }

    pub fn from_config(config: &Config, single: bool) -> Self {
        Self::new(config.etag(), config.cache_control_max_age(), single)
    }

    /// 由设备号、inode 与毫秒级修改时间组成的强校验 ETag
    pub fn etag_for(stats: &FileStats) -> String {
        format!("\"{}-{}-{}\"", stats.dev, stats.ino, stats.mtime_millis())
    }

    fn cache_control(&self, file_name: &str) -> Option<String> {
        if self.single && file_name == INDEX_FILE {
            return Some("public, max-age=0".to_string());
        }
        match self.max_age {
            Some(0) => Some("no-cache, no-store, must-revalidate".to_string()),
            Some(n) => Some(format!("public, max-age={}", n)),
            None if self.single => Some(format!("public, max-age={}", SPA_ASSET_MAX_AGE)),
            None => None,
        }
    }

    pub fn negotiate(&self, stats: &FileStats, file_name: &str, request: &Request) -> Negotiation {
        let mut headers = Vec::new();
        let last_modified = format_http_date(stats.modified);

        let fresh = if self.etag {
            let etag = Self::etag_for(stats);
            let fresh = request
                .if_none_match()
                .is_some_and(|header| etag_matches(header, &etag));
            headers.push(("ETag".to_string(), etag));
            fresh
        } else {
            request
                .if_modified_since()
                .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
                .is_some_and(|client| client.timestamp() >= stats.mtime_secs())
        };
        headers.push(("Last-Modified".to_string(), last_modified));
        if let Some(value) = self.cache_control(file_name) {
            headers.push(("Cache-Control".to_string(), value));
        }

        if fresh {
            debug!("{}未修改，返回304", file_name);
        }
        Negotiation {
            status_code: if fresh { 304 } else { 200 },
            headers,
        }
    }
}

/// 开启 CORS 时附加到每个响应上的头部
pub fn cors_headers() -> Vec<(String, String)> {
    vec![
        ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        (
            "Access-Control-Allow-Headers".to_string(),
            CORS_ALLOW_HEADERS.to_string(),
        ),
    ]
}
