// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路径解析模块
//!
//! 把请求路径映射为服务根目录下的候选文件系统路径，并判定两件事：
//! 路径是否仍在根目录之内（包含性），以及是否命中了忽略规则。
//!
//! 包含性检查分两步完成。第一步纯词法：解码一次、按 `/` 切分并折叠 `.` 与 `..`，
//! 越过根目录即判定为 [`Containment::Escaped`]，全程不访问文件系统。
//! 第二步在 [`PathResolver::inspect`] 中进行：不允许跟随符号链接时，
//! 把真实路径规范化后再与根目录比较，以拦截借助符号链接的逃逸。

use log::debug;
use percent_encoding::percent_decode_str;
use std::fs::Metadata;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::exception::Exception;

/// 词法包含性判定结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Containment {
    Contained,
    /// 落在内置资源命名空间下，映射到资源目录而非服务根目录
    AssetRequest,
    Escaped,
}

/// 文件系统上的实体类型
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathKind {
    File,
    Directory,
    Missing,
}

/// 单次请求的解析结果，只在本次请求内有效。
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// 解码并规范化后的请求路径，总以 `/` 开头
    pub request_path: String,
    pub filesystem_path: PathBuf,
    pub containment: Containment,
    pub matched_ignore: bool,
}

/// 对文件系统实体的一次探测
#[derive(Debug)]
pub struct Inspection {
    pub kind: PathKind,
    pub metadata: Option<Metadata>,
}

impl Inspection {
    fn missing() -> Self {
        Self {
            kind: PathKind::Missing,
            metadata: None,
        }
    }
}

pub struct PathResolver {
    root: PathBuf,
    /// 显式配置的资源目录；为 `None` 时资源请求解析为内置资源名
    assets_dir: Option<PathBuf>,
    asset_prefix: String,
    ignored_files: Vec<String>,
    symlinks: bool,
}

/// 对请求路径做唯一一次百分号解码。
///
/// 解码结果不是合法 UTF-8、含有控制字符（包括 `\0`），或者再解码一次会发生变化
/// （双重编码），都视为畸形请求。
pub fn decode_path(raw: &str) -> Result<String, Exception> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| Exception::MalformedRequest)?
        .into_owned();
    if decoded.chars().any(|c| c.is_control()) {
        return Err(Exception::MalformedRequest);
    }
    if percent_decode_str(&decoded).decode_utf8_lossy() != decoded {
        return Err(Exception::MalformedRequest);
    }
    if !decoded.starts_with('/') {
        return Err(Exception::MalformedRequest);
    }
    Ok(decoded)
}

/// 词法规范化：`\` 同样视为分隔符，`..` 越过根目录时返回 `None`。
fn normalize_segments(path: &str) -> Option<Vec<&str>> {
    let mut segments = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }
    Some(segments)
}

/// 文件不存在、路径中间某段不是目录等情况一律按「不存在」处理
fn is_missing(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::NotFound | ErrorKind::NotADirectory | ErrorKind::InvalidInput
    )
}

impl PathResolver {
    pub fn new(
        root: PathBuf,
        assets_dir: Option<PathBuf>,
        asset_prefix: &str,
        ignored_files: Vec<String>,
        symlinks: bool,
    ) -> Self {
        Self {
            root,
            assets_dir,
            asset_prefix: asset_prefix.trim_matches('/').to_string(),
            ignored_files,
            symlinks,
        }
    }

    /// 根目录在会话开始时规范化一次，之后所有包含性比较都基于这个绝对路径。
    pub fn from_config(config: &Config, asset_prefix: &str) -> Result<Self, Exception> {
        let root = std::fs::canonicalize(config.public()).map_err(|e| {
            Exception::Configuration(format!("无法规范化服务目录{}: {}", config.public(), e))
        })?;
        let assets_dir = config
            .assets_dir()
            .map(|dir| std::fs::canonicalize(&dir).unwrap_or(dir));
        debug!("服务根目录: {}", root.display());
        Ok(Self::new(
            root,
            assets_dir,
            asset_prefix,
            config.ignored_files().to_vec(),
            config.symlinks(),
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn assets_dir(&self) -> Option<&Path> {
        self.assets_dir.as_deref()
    }

    /// 内置资源命名空间的 URL 前缀，形如 `/Xy12...`
    pub fn asset_prefix(&self) -> String {
        format!("/{}", self.asset_prefix)
    }

    /// 任一忽略片段是解码后路径的子串即命中
    pub fn is_ignored(&self, decoded_path: &str) -> bool {
        self.ignored_files
            .iter()
            .any(|fragment| decoded_path.contains(fragment.as_str()))
    }

    /// 解析已解码的请求路径。纯词法操作，不访问文件系统。
    pub fn resolve(&self, decoded_path: &str) -> Resolution {
        let matched_ignore = self.is_ignored(decoded_path);
        let segments = match normalize_segments(decoded_path) {
            Some(segments) => segments,
            None => {
                return Resolution {
                    request_path: decoded_path.to_string(),
                    filesystem_path: self.root.clone(),
                    containment: Containment::Escaped,
                    matched_ignore,
                }
            }
        };

        let mut request_path = format!("/{}", segments.join("/"));
        if !segments.is_empty() && decoded_path.ends_with('/') {
            request_path.push('/');
        }

        let is_asset = !self.asset_prefix.is_empty()
            && segments.len() > 1
            && segments[0] == self.asset_prefix;
        let embedded = PathBuf::new();
        let (base, rest) = if is_asset {
            (self.assets_dir.as_ref().unwrap_or(&embedded), &segments[1..])
        } else {
            (&self.root, &segments[..])
        };

        let mut filesystem_path = base.clone();
        for segment in rest {
            filesystem_path.push(segment);
        }

        let containment = if !filesystem_path.starts_with(base) {
            Containment::Escaped
        } else if is_asset {
            Containment::AssetRequest
        } else {
            Containment::Contained
        };

        Resolution {
            request_path,
            filesystem_path,
            containment,
            matched_ignore,
        }
    }

    /// 探测文件系统实体。
    ///
    /// 不允许跟随符号链接时，链接本身视为不存在，且规范化后的真实路径必须仍在
    /// 根目录（或资源目录）之内。失效的链接同样视为不存在。
    /// 只有非预期的 I/O 故障才会作为错误返回。
    pub async fn inspect(&self, path: &Path) -> Result<Inspection, Exception> {
        let base = match &self.assets_dir {
            Some(dir) if path.starts_with(dir) => dir,
            _ => &self.root,
        };

        if !self.symlinks {
            let link_meta = match tokio::fs::symlink_metadata(path).await {
                Ok(meta) => meta,
                Err(e) if is_missing(&e) => return Ok(Inspection::missing()),
                Err(e) => return Err(Exception::Filesystem(e)),
            };
            if link_meta.file_type().is_symlink() {
                debug!("{}是符号链接，按不存在处理", path.display());
                return Ok(Inspection::missing());
            }
            let real = match tokio::fs::canonicalize(path).await {
                Ok(real) => real,
                Err(e) if is_missing(&e) => return Ok(Inspection::missing()),
                Err(e) => return Err(Exception::Filesystem(e)),
            };
            if !real.starts_with(base) {
                debug!("{}经符号链接指向根目录之外", path.display());
                return Ok(Inspection::missing());
            }
        }

        let metadata = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if is_missing(&e) => return Ok(Inspection::missing()),
            Err(e) => return Err(Exception::Filesystem(e)),
        };
        let kind = if metadata.is_dir() {
            PathKind::Directory
        } else {
            PathKind::File
        };
        Ok(Inspection {
            kind,
            metadata: Some(metadata),
        })
    }
}
