// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 定义请求处理与启动阶段可能出现的各类异常。
//!
//! 绝大多数异常（越界路径、被忽略的文件、不存在的资源）在决策阶段就被
//! 折算成固定形状的响应，只有文件系统故障会一路传播到处理器，由处理器
//! 映射为 500 并记录日志。配置错误只会在启动时出现。

use std::{fmt, io};

/// 服务器处理请求过程中发生的异常类型。
#[derive(Debug)]
pub enum Exception {
    /// 请求报文无法解析：非 UTF-8、请求行残缺、请求头过长，或路径解码后含控制字符
    /// 以及二次编码。对应 `400 Bad Request`。
    MalformedRequest,
    /// 使用了服务器不处理的 HTTP 方法。对应 `405 Method Not Allowed`。
    UnsupportedMethod,
    /// 使用了不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 解析后的路径越出了服务根目录。对应 `400 Bad Request`，响应体不泄露真实路径。
    ContainmentViolation,
    /// 命中了忽略规则。对应 `404 Not Found`。
    IgnoredResource,
    /// 资源不存在且没有任何回退规则可用。对应 `404 Not Found`。
    MissingResource,
    /// 缺少或携带了错误的认证凭据。对应 `401 Unauthorized`。
    AuthenticationRequired,
    /// 权限不足、读取失败等意外的文件系统故障。对应 `500`，不重试。
    Filesystem(io::Error),
    /// 配置文件格式错误或规则无法编译，只在启动时出现。
    Configuration(String),
}

use Exception::*;

impl Exception {
    /// 该异常对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            MalformedRequest | ContainmentViolation => 400,
            UnsupportedMethod => 405,
            UnsupportedHttpVersion => 505,
            IgnoredResource | MissingResource => 404,
            AuthenticationRequired => 401,
            Filesystem(_) | Configuration(_) => 500,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRequest => write!(f, "Malformed request"),
            UnsupportedMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            ContainmentViolation => write!(f, "Path escapes the served root (400)"),
            IgnoredResource => write!(f, "Path matches an ignore rule (404)"),
            MissingResource => write!(f, "File not found (404)"),
            AuthenticationRequired => write!(f, "Authentication required (401)"),
            Filesystem(e) => write!(f, "Filesystem error: {}", e),
            Configuration(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Filesystem(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Exception {
    fn from(e: io::Error) -> Self {
        Filesystem(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ContainmentViolation.status_code(), 400);
        assert_eq!(IgnoredResource.status_code(), 404);
        assert_eq!(MissingResource.status_code(), 404);
        assert_eq!(AuthenticationRequired.status_code(), 401);
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(Exception::from(io).status_code(), 500);
    }

    #[test]
    fn test_display_does_not_leak_paths() {
        assert_eq!(ContainmentViolation.to_string(), "Path escapes the served root (400)");
    }
}
