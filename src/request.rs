// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 将从 TCP 流中读到的请求头字节解析为强类型的 `Request` 结构体：
//! 1. 请求行（Request-Line）的解析（方法、目标、版本），目标中的查询串被单独剥离。
//! 2. 全部标头以小写名保存，常用标头另有访问器。
//! 3. 范围请求（Range Requests）的解析。
//! 4. 内容协商（Content Negotiation）相关的编码解析。
//!
//! 服务器只提供只读的静态内容，请求体（Body）一律忽略。

use crate::{exception::Exception, param::*};
use log::error;

/// 单一字节范围，对应 `Range: bytes=...` 的两种写法。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ByteRange {
    /// `bytes=start-` 或 `bytes=start-end`
    From(u64, Option<u64>),
    /// `bytes=-n`，即最后 n 个字节
    Suffix(u64),
}

impl ByteRange {
    /// 对照文件大小求出闭区间 `(start, end)`，范围无法满足时返回 `None`。
    pub fn resolve(&self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        match *self {
            ByteRange::From(start, end) => {
                if start >= size {
                    return None;
                }
                let end = end.map_or(size - 1, |e| e.min(size - 1));
                Some((start, end))
            }
            ByteRange::Suffix(0) => None,
            ByteRange::Suffix(n) => Some((size.saturating_sub(n), size - 1)),
        }
    }

    fn parse(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes=")?;
        // 多段范围不支持，整体忽略
        if spec.contains(',') {
            return None;
        }
        let (start, end) = spec.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());
        if start.is_empty() {
            return end.parse::<u64>().ok().map(ByteRange::Suffix);
        }
        let start = start.parse::<u64>().ok()?;
        if end.is_empty() {
            return Some(ByteRange::From(start, None));
        }
        let end = end.parse::<u64>().ok()?;
        if end < start {
            return None;
        }
        Some(ByteRange::From(start, Some(end)))
    }
}

/// 表示一个完整的 HTTP 请求元数据。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 请求行中的原始目标（包含查询字符串，尚未解码）
    target: String,
    /// 去掉查询字符串后的路径（尚未解码）
    path: String,
    query: Option<String>,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 全部标头，名称已转为小写，保持原始顺序
    headers: Vec<(String, String)>,
    /// 客户端支持的压缩编码列表（按解析顺序排列）
    accept_encoding: Vec<HttpEncoding>,
    /// 范围请求参数；格式不合法的 `Range` 头按未携带处理
    range: Option<ByteRange>,
}

fn parse_method(token: &str) -> Option<HttpRequestMethod> {
    let method = match token.to_uppercase().as_str() {
        "GET" => HttpRequestMethod::Get,
        "HEAD" => HttpRequestMethod::Head,
        "OPTIONS" => HttpRequestMethod::Options,
        "POST" => HttpRequestMethod::Post,
        "PUT" => HttpRequestMethod::Put,
        "DELETE" => HttpRequestMethod::Delete,
        "PATCH" => HttpRequestMethod::Patch,
        other if !other.is_empty() && other.chars().all(|c| c.is_ascii_alphabetic()) => {
            HttpRequestMethod::Other
        }
        _ => return None,
    };
    Some(method)
}

fn parse_accept_encoding(value: &str) -> Vec<HttpEncoding> {
    let mut encodings = Vec::new();
    for item in value.split(',') {
        let mut params = item.split(';');
        let name = params.next().unwrap_or("").trim().to_lowercase();
        let refused = params.any(|p| {
            p.trim()
                .strip_prefix("q=")
                .and_then(|q| q.parse::<f32>().ok())
                .is_some_and(|q| q == 0.0)
        });
        if refused {
            continue;
        }
        let encoding = match name.as_str() {
            "gzip" => HttpEncoding::Gzip,
            "deflate" => HttpEncoding::Deflate,
            "br" => HttpEncoding::Br,
            _ => continue,
        };
        if !encodings.contains(&encoding) {
            encodings.push(encoding);
        }
    }
    encodings
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的请求头数据。
    /// * `id` - 全局请求 ID，用于在多线程环境下追踪日志。
    ///
    /// # 错误处理
    /// 报文不是 UTF-8、请求行残缺时返回 `MalformedRequest`；协议版本不是
    /// HTTP/1.0 或 HTTP/1.1 时返回 `UnsupportedHttpVersion`。
    /// 不认识的方法照常解析，由处理器决定是否返回 405。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::MalformedRequest);
            }
        };
        let head = match request_string.find("\r\n\r\n") {
            Some(end) => &request_string[..end],
            None => request_string,
        };

        let mut request_lines = head.split(CRLF);
        let first_line = request_lines.next().unwrap_or("");
        let first_line_parts: Vec<&str> = first_line.split_whitespace().collect();
        if first_line_parts.len() != 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, first_line);
            return Err(Exception::MalformedRequest);
        }

        let method = match parse_method(first_line_parts[0]) {
            Some(m) => m,
            None => {
                error!("[ID{}]无法识别的HTTP请求方法：{}", id, first_line_parts[0]);
                return Err(Exception::MalformedRequest);
            }
        };

        let version_str = first_line_parts[2].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let target = first_line_parts[1].to_string();
        if !target.starts_with('/') && target != "*" {
            error!("[ID{}]不支持的请求目标：{}", id, target);
            return Err(Exception::MalformedRequest);
        }
        let without_fragment = target.split('#').next().unwrap_or("");
        let (path, query) = match without_fragment.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (without_fragment.to_string(), None),
        };

        let mut headers = Vec::new();
        for line in request_lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_lowercase(), value.trim().to_string()));
            }
        }

        let find = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        let accept_encoding = find("accept-encoding")
            .map(parse_accept_encoding)
            .unwrap_or_default();
        let range = find("range").and_then(ByteRange::parse);

        Ok(Self {
            method,
            target,
            path,
            query,
            version,
            headers,
            accept_encoding,
            range,
        })
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取 HTTP 协议版本
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取不含查询串的原始请求路径
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 请求行中的完整目标
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 按名称（大小写不敏感）查找标头
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    /// 获取客户端支持的压缩算法列表
    pub fn accept_encoding(&self) -> &[HttpEncoding] {
        &self.accept_encoding
    }

    /// 获取客户端接受的文件 MIME 类型
    pub fn accept(&self) -> Option<&str> {
        self.header("accept")
    }

    /// 客户端是否要求 JSON 形式的目录列表
    pub fn wants_json(&self) -> bool {
        self.accept().is_some_and(|a| a.contains("application/json"))
    }

    /// 获取 Range 请求的分片范围
    pub fn range(&self) -> Option<ByteRange> {
        self.range
    }

    pub fn if_none_match(&self) -> Option<&str> {
        self.header("if-none-match")
    }

    pub fn if_modified_since(&self) -> Option<&str> {
        self.header("if-modified-since")
    }

    pub fn authorization(&self) -> Option<&str> {
        self.header("authorization")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 验证常规 GET 请求的解析，包括 Path 和 Headers
    #[test]
    fn test_parse_get_request() {
        let request_str = "GET / HTTP/1.1\r\nHost: localhost:3000\r\nUser-Agent: Test-Browser\r\nAccept-Encoding: gzip, deflate, br\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Get);
        assert_eq!(request.path(), "/");
        assert_eq!(request.user_agent(), "Test-Browser");
        assert_eq!(
            request.accept_encoding(),
            &[HttpEncoding::Gzip, HttpEncoding::Deflate, HttpEncoding::Br]
        );
    }

    /// 验证 HEAD 请求与 HTTP/1.0
    #[test]
    fn test_parse_head_request_http10() {
        let request_str = "HEAD /index.html HTTP/1.0\r\nHost: localhost:3000\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Head);
        assert_eq!(request.path(), "/index.html");
        assert_eq!(*request.version(), HttpVersion::V1_0);
    }

    /// 验证 OPTIONS 请求（常用于 CORS 预检）
    #[test]
    fn test_parse_options_request() {
        let request_str = "OPTIONS * HTTP/1.1\r\nHost: localhost:3000\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Options);
        assert_eq!(request.path(), "*");
    }

    /// 其它方法仍然可以解析，由上层返回 405
    #[test]
    fn test_other_methods_are_parsed() {
        let request = Request::try_from(b"DELETE /resource HTTP/1.1\r\n\r\n", 0).unwrap();
        assert_eq!(request.method(), HttpRequestMethod::Delete);
        let request = Request::try_from(b"PROPFIND / HTTP/1.1\r\n\r\n", 0).unwrap();
        assert_eq!(request.method(), HttpRequestMethod::Other);
    }

    /// 确保不支持的版本（如 HTTP/2.0）被正确拒绝
    #[test]
    fn test_unsupported_http_version() {
        let result = Request::try_from(b"GET / HTTP/2.0\r\nHost: localhost:3000\r\n\r\n", 0);

        assert!(matches!(result, Err(Exception::UnsupportedHttpVersion)));
    }

    /// 验证 UTF-8 编码检查与残缺请求行
    #[test]
    fn test_malformed() {
        assert!(matches!(
            Request::try_from(&[0xFF, 0xFE, 0xFD], 0),
            Err(Exception::MalformedRequest)
        ));
        assert!(matches!(
            Request::try_from(b"GET /\r\n\r\n", 0),
            Err(Exception::MalformedRequest)
        ));
        assert!(matches!(
            Request::try_from(b"GET relative HTTP/1.1\r\n\r\n", 0),
            Err(Exception::MalformedRequest)
        ));
    }

    /// 验证 Header 字段名是否大小写不敏感
    #[test]
    fn test_case_insensitive_headers() {
        let request_str = "GET / HTTP/1.1\r\nhost: localhost:3000\r\nuser-agent: Test\r\naccept-encoding: gzip\r\nIF-NONE-MATCH: \"1-2-3\"\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.user_agent(), "Test");
        assert_eq!(request.header("Host"), Some("localhost:3000"));
        assert_eq!(request.if_none_match(), Some("\"1-2-3\""));
        assert!(request.accept_encoding().contains(&HttpEncoding::Gzip));
    }

    /// 测试缺失编码标头以及 q=0 拒绝的编码
    #[test]
    fn test_encoding_negotiation() {
        let request = Request::try_from(b"GET / HTTP/1.1\r\nHost: localhost:3000\r\n\r\n", 0).unwrap();
        assert!(request.accept_encoding().is_empty());

        let request =
            Request::try_from(b"GET / HTTP/1.1\r\nAccept-Encoding: gzip;q=0, br;q=0.5\r\n\r\n", 0).unwrap();
        assert_eq!(request.accept_encoding(), &[HttpEncoding::Br]);
    }

    /// 查询串与路径分离
    #[test]
    fn test_path_with_query_string() {
        let request_str = "GET /page?id=123&name=test HTTP/1.1\r\nHost: localhost:3000\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.path(), "/page");
        assert_eq!(request.query(), Some("id=123&name=test"));
        assert_eq!(request.target(), "/page?id=123&name=test");

        let request = Request::try_from(b"GET /doc.html#intro HTTP/1.1\r\n\r\n", 0).unwrap();
        assert_eq!(request.path(), "/doc.html");
        assert_eq!(request.query(), None);
    }

    /// 验证请求方法的小写兼容性处理
    #[test]
    fn test_lowercase_method() {
        let request = Request::try_from(b"get / HTTP/1.1\r\nHost: localhost:3000\r\n\r\n", 0).unwrap();

        assert_eq!(request.method(), HttpRequestMethod::Get);
    }

    #[test]
    fn test_range_parsing() {
        let parse = |h: &str| {
            let raw = format!("GET /a HTTP/1.1\r\nRange: {}\r\n\r\n", h);
            Request::try_from(raw.as_bytes(), 0).unwrap().range()
        };
        assert_eq!(parse("bytes=0-99"), Some(ByteRange::From(0, Some(99))));
        assert_eq!(parse("bytes=100-"), Some(ByteRange::From(100, None)));
        assert_eq!(parse("bytes=-20"), Some(ByteRange::Suffix(20)));
        assert_eq!(parse("bytes=5-1"), None);
        assert_eq!(parse("bytes=0-1,4-5"), None);
        assert_eq!(parse("items=0-1"), None);
    }

    #[test]
    fn test_range_resolution() {
        assert_eq!(ByteRange::From(0, Some(99)).resolve(10), Some((0, 9)));
        assert_eq!(ByteRange::From(10, None).resolve(10), None);
        assert_eq!(ByteRange::Suffix(4).resolve(10), Some((6, 9)));
        assert_eq!(ByteRange::Suffix(40).resolve(10), Some((0, 9)));
        assert_eq!(ByteRange::Suffix(0).resolve(10), None);
        assert_eq!(ByteRange::From(0, None).resolve(0), None);
    }

    #[test]
    fn test_wants_json() {
        let request =
            Request::try_from(b"GET /dir/ HTTP/1.1\r\nAccept: application/json, */*\r\n\r\n", 0).unwrap();
        assert!(request.wants_json());
    }
}
