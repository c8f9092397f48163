// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 基本认证模块
//!
//! 在决策状态机之前执行的认证闸门。未配置用户名与密码时不启用。

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};

use crate::config::AuthConfig;
use crate::exception::Exception;
use crate::param::AUTH_REALM;

/// 从 `Authorization: Basic ...` 头中解出的凭据
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn from_header(header: &str) -> Option<Self> {
        let (scheme, encoded) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> bool;
}

/// 与配置中唯一一组用户名密码比对
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(&auth.username, &auth.password)
    }
}

impl Authenticator for BasicAuth {
    fn authenticate(&self, credentials: &Credentials) -> bool {
        credentials.username == self.username && credentials.password == self.password
    }
}

/// 校验 `Authorization` 头，失败时返回 [`Exception::AuthenticationRequired`]
pub fn check(authenticator: &dyn Authenticator, header: Option<&str>) -> Result<(), Exception> {
    match header.and_then(Credentials::from_header) {
        Some(credentials) if authenticator.authenticate(&credentials) => Ok(()),
        _ => Err(Exception::AuthenticationRequired),
    }
}

/// 401 响应携带的质询头取值
pub fn challenge() -> String {
    format!("Basic realm=\"{}\"", AUTH_REALM)
}
