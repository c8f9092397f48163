// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 目录列表模块
//!
//! 枚举目录的直接子项并分类，生成供视图渲染的数据结构。
//! 条目保持文件系统枚举顺序，不做任何排序。

use log::debug;
use serde_derive::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::exception::Exception;
use crate::rules::Pattern;
use crate::util::format_file_size;

/// 列表中的一个条目。序列化时只输出 JSON 视图约定的字段。
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ListingEntry {
    /// 条目名，目录名带有结尾的 `/`
    #[serde(rename = "base")]
    pub name: String,
    #[serde(skip)]
    pub is_directory: bool,
    /// 不带点的扩展名，没有扩展名的文件记为 `txt`，目录为空
    #[serde(rename = "ext")]
    pub extension: String,
    /// 相对服务根目录的路径，不以 `/` 开头
    #[serde(rename = "relative")]
    pub relative_path: String,
    /// 只有文件才有大小
    #[serde(rename = "size")]
    pub size_human: Option<String>,
    pub title: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Breadcrumb {
    pub name: String,
    pub url: String,
}

/// 渲染一个目录列表所需的全部数据
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    /// 形如 `site/sub/` 的展示路径
    pub directory: String,
    pub entries: Vec<ListingEntry>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub port: u16,
    pub version: &'static str,
}

#[derive(Serialize)]
struct JsonListing<'a> {
    files: &'a [ListingEntry],
}

impl Listing {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&JsonListing {
            files: &self.entries,
        })
    }
}

pub struct DirectoryLister {
    root: PathBuf,
    ignored_files: Vec<String>,
    unlisted: Vec<Pattern>,
    symlinks: bool,
}

fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_string(),
        _ => "txt".to_string(),
    }
}

impl DirectoryLister {
    pub fn new(
        root: PathBuf,
        ignored_files: Vec<String>,
        unlisted: &[String],
        symlinks: bool,
    ) -> Result<Self, Exception> {
        let unlisted = unlisted
            .iter()
            .map(|u| Pattern::compile(u))
            .collect::<Result<Vec<_>, Exception>>()?;
        Ok(Self {
            root,
            ignored_files,
            unlisted,
            symlinks,
        })
    }

    fn hidden_by_unlisted(&self, name: &str, url_path: &str) -> bool {
        self.unlisted
            .iter()
            .any(|p| p.is_match(name) || p.is_match(url_path))
    }

    /// 请求路径本身是否属于 unlisted，若是则不为其生成列表
    pub fn hides(&self, request_path: &str) -> bool {
        let trimmed = request_path.trim_end_matches('/');
        let name = trimmed.rsplit('/').next().unwrap_or("");
        !trimmed.is_empty() && self.hidden_by_unlisted(name, trimmed)
    }

    fn is_ignored(&self, url_path: &str) -> bool {
        self.ignored_files
            .iter()
            .any(|fragment| url_path.contains(fragment.as_str()))
    }

    /// 列出 `directory` 的直接子项。
    ///
    /// 失效的符号链接直接跳过；不允许跟随符号链接时，链接条目也不出现在列表中。
    pub async fn list(&self, directory: &Path, port: u16) -> Result<Listing, Exception> {
        let sub = directory.strip_prefix(&self.root).unwrap_or(Path::new(""));
        let sub_segments: Vec<String> = sub
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let sub_path = sub_segments.join("/");

        let mut entries = Vec::new();
        if !sub_segments.is_empty() {
            let parent = &sub_segments[..sub_segments.len() - 1];
            let parent_url = if parent.is_empty() {
                "/".to_string()
            } else {
                format!("/{}/", parent.join("/"))
            };
            entries.push(ListingEntry {
                name: "..".to_string(),
                is_directory: true,
                extension: String::new(),
                relative_path: parent.join("/"),
                size_human: None,
                title: parent_url,
            });
        }

        let mut reader = tokio::fs::read_dir(directory).await?;
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await?;
            if file_type.is_symlink() && !self.symlinks {
                continue;
            }
            let metadata = match tokio::fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("跳过失效的符号链接{}", entry.path().display());
                    continue;
                }
                Err(e) => return Err(Exception::Filesystem(e)),
            };

            let relative_path = if sub_path.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", sub_path, name)
            };
            let is_directory = metadata.is_dir();
            let url_path = if is_directory {
                format!("/{}/", relative_path)
            } else {
                format!("/{}", relative_path)
            };
            if self.is_ignored(&url_path) || self.hidden_by_unlisted(&name, url_path.trim_end_matches('/')) {
                continue;
            }

            let (display, extension, size_human) = if is_directory {
                (format!("{}/", name), String::new(), None)
            } else {
                (name.clone(), extension_of(&name), Some(format_file_size(metadata.len())))
            };
            entries.push(ListingEntry {
                title: display.clone(),
                name: display,
                is_directory,
                extension,
                relative_path,
                size_human,
            });
        }

        let root_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string());
        let mut breadcrumbs = vec![Breadcrumb {
            name: root_name.clone(),
            url: "/".to_string(),
        }];
        let mut cumulative = String::from("/");
        for segment in &sub_segments {
            cumulative.push_str(segment);
            cumulative.push('/');
            breadcrumbs.push(Breadcrumb {
                name: segment.clone(),
                url: cumulative.clone(),
            });
        }

        let directory_display = if sub_path.is_empty() {
            format!("{}/", root_name.trim_end_matches('/'))
        } else {
            format!("{}/{}/", root_name.trim_end_matches('/'), sub_path)
        };

        Ok(Listing {
            directory: directory_display,
            entries,
            breadcrumbs,
            port,
            version: env!("CARGO_PKG_VERSION"),
        })
    }
}
