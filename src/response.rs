// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应模块
//!
//! 响应体分为三类：空响应体、完全缓冲在内存中的字节（目录列表、错误页），
//! 以及按字节范围从文件流式读取的内容。文件句柄只在 [`Response::write_to`]
//! 内部打开，任何退出路径上都会随作用域结束而释放。

use crate::{
    cache::format_http_date,
    param::*,
    request::ByteRange,
    util::HtmlBuilder,
};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::Bytes;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use std::{
    io::{self, SeekFrom, Write},
    path::PathBuf,
    time::SystemTime,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Bytes(Bytes),
    /// 文件中从 `offset` 开始的 `length` 个字节
    File {
        path: PathBuf,
        offset: u64,
        length: u64,
    },
}

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    headers: Vec<(String, String)>,
    body: Body,
    head_only: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            headers: Vec::new(),
            body: Body::Empty,
            head_only: false,
        }
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(info) => info.to_string(),
            None => {
                error!("非法的状态码：{}", code);
                "Unknown".to_string()
            }
        };
        self
    }

    pub fn set_version(&mut self, version: HttpVersion) -> &mut Self {
        self.version = version;
        self
    }

    /// 设置响应头，同名（大小写不敏感）的旧值被替换
    pub fn set_header(&mut self, key: &str, value: &str) -> &mut Self {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(existing) => existing.1 = value.to_string(),
            None => self.headers.push((key.to_string(), value.to_string())),
        }
        self
    }

    pub fn set_headers(&mut self, headers: &[(String, String)]) -> &mut Self {
        for (k, v) in headers {
            self.set_header(k, v);
        }
        self
    }

    pub fn remove_header(&mut self, key: &str) -> &mut Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self
    }

    pub fn set_body(&mut self, body: Bytes, content_type: &str) -> &mut Self {
        self.body = Body::Bytes(body);
        self.set_header("Content-Type", content_type);
        self
    }

    /// 仅发送响应头（HEAD 请求）
    pub fn head_only(&mut self) -> &mut Self {
        self.head_only = true;
        self
    }

    /// 由状态码生成带有简单 HTML 页面的响应
    pub fn from_status_code(code: u16) -> Self {
        let html = HtmlBuilder::from_status_code(code, None).build();
        Self::from_html(code, html)
    }

    pub fn from_html(code: u16, html: String) -> Self {
        let mut response = Self::new();
        response
            .set_code(code)
            .set_body(Bytes::from(html), "text/html; charset=utf-8");
        response
    }

    pub fn from_json(json: String) -> Self {
        let mut response = Self::new();
        response.set_body(Bytes::from(json), "application/json; charset=utf-8");
        response
    }

    pub fn redirect(location: &str, code: u16) -> Self {
        let mut response = Self::new();
        response.set_code(code).set_header("Location", location);
        response
    }

    /// 文件响应。携带合法 Range 时返回 206，范围无法满足时返回 416。
    pub fn from_file(path: PathBuf, size: u64, content_type: &str, range: Option<ByteRange>) -> Self {
        let mut response = Self::new();
        response.set_header("Content-Type", content_type);
        response.set_header("Accept-Ranges", "bytes");
        match range {
            None => {
                response.body = Body::File {
                    path,
                    offset: 0,
                    length: size,
                };
            }
            Some(range) => match range.resolve(size) {
                Some((start, end)) => {
                    response
                        .set_code(206)
                        .set_header("Content-Range", &format!("bytes {}-{}/{}", start, end, size));
                    response.body = Body::File {
                        path,
                        offset: start,
                        length: end - start + 1,
                    };
                }
                None => {
                    response
                        .set_code(416)
                        .set_header("Content-Range", &format!("bytes */{}", size));
                }
            },
        }
        response
    }

    /// 把文件响应体读入内存，供压缩使用
    pub async fn buffer_file(&mut self) -> io::Result<()> {
        if let Body::File { path, offset, length } = &self.body {
            let mut file = tokio::fs::File::open(path).await?;
            file.seek(SeekFrom::Start(*offset)).await?;
            let mut buffer = Vec::with_capacity(*length as usize);
            file.take(*length).read_to_end(&mut buffer).await?;
            self.body = Body::Bytes(Bytes::from(buffer));
        }
        Ok(())
    }

    /// 对缓冲的响应体进行内容编码。已压缩的媒体类型与流式响应体不处理。
    pub fn compress(&mut self, accept_encoding: &[HttpEncoding]) -> &mut Self {
        let data = match &self.body {
            Body::Bytes(data) if !data.is_empty() => data.clone(),
            _ => return self,
        };
        let skip = self
            .header("Content-Type")
            .map_or(true, should_skip_compression);
        if skip || self.header("Content-Encoding").is_some() {
            return self;
        }
        let mode = match decide_encoding(accept_encoding) {
            Some(mode) => mode,
            None => return self,
        };
        match compress(data.to_vec(), mode) {
            Ok(compressed) => {
                self.body = Body::Bytes(Bytes::from(compressed));
                self.set_header("Content-Encoding", &mode.to_string());
                self.set_header("Vary", "Accept-Encoding");
            }
            Err(e) => error!("压缩响应体失败：{}", e),
        }
        self
    }

    pub fn content_length(&self) -> u64 {
        match &self.body {
            Body::Empty => 0,
            Body::Bytes(b) => b.len() as u64,
            Body::File { length, .. } => *length,
        }
    }

    fn carries_length(&self) -> bool {
        self.status_code != 204 && self.status_code != 304
    }

    /// 状态行与全部响应头
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        );
        for (key, value) in &self.headers {
            head.push_str(&[key.as_str(), ": ", value.as_str(), CRLF].concat());
        }
        if self.carries_length() {
            head.push_str(&["Content-Length: ", &self.content_length().to_string(), CRLF].concat());
        }
        head.push_str(&["Date: ", &format_http_date(SystemTime::now()), CRLF].concat());
        head.push_str(&["Server: ", SERVER_NAME, CRLF].concat());
        head.push_str(&["Connection: close", CRLF].concat());
        head.push_str(CRLF);
        head.into_bytes()
    }

    /// 缓冲响应的完整字节。文件响应体不在此处读取，只输出响应头。
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut bytes = self.head_bytes();
        if let (false, Body::Bytes(b)) = (self.head_only, &self.body) {
            bytes.extend_from_slice(b);
        }
        bytes
    }

    /// 把响应写入连接，文件按 `chunk_size` 分块读取。返回写出的响应体字节数。
    ///
    /// 响应头发出后若读取文件失败，直接返回错误，由调用方中止连接。
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W, chunk_size: usize) -> io::Result<u64> {
        writer.write_all(&self.head_bytes()).await?;
        if self.head_only || !self.carries_length() {
            writer.flush().await?;
            return Ok(0);
        }
        let sent = match &self.body {
            Body::Empty => 0,
            Body::Bytes(b) => {
                writer.write_all(b).await?;
                b.len() as u64
            }
            Body::File { path, offset, length } => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(*offset)).await?;
                let mut remaining = *length;
                let mut buffer = vec![0u8; chunk_size.max(1)];
                while remaining > 0 {
                    let want = remaining.min(buffer.len() as u64) as usize;
                    let n = file.read(&mut buffer[..want]).await?;
                    if n == 0 {
                        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "文件在传输过程中被截断"));
                    }
                    writer.write_all(&buffer[..n]).await?;
                    remaining -= n as u64;
                }
                debug!("流式传输完成，共发送 {} 字节", length);
                *length
            }
        };
        writer.flush().await?;
        Ok(sent)
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn is_head_only(&self) -> bool {
        self.head_only
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::File { .. })
    }
}

fn compress(data: Vec<u8>, mode: HttpEncoding) -> io::Result<Vec<u8>> {
    let original_size = data.len();
    let result = match mode {
        HttpEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        HttpEncoding::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        HttpEncoding::Br => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
    };

    if let Ok(ref compressed) = result {
        debug!(
            "压缩完成: {}, 原始大小: {} bytes, 压缩后: {} bytes",
            mode,
            original_size,
            compressed.len()
        );
    }

    result
}

/// 本身已经压缩过的媒体类型不再压缩
pub fn should_skip_compression(mime_type: &str) -> bool {
    let skip_types = [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/avif",
        "image/x-icon",
        "video/",
        "audio/",
        "application/zip",
        "application/vnd.rar",
        "application/x-7z-compressed",
        "application/gzip",
        "application/x-bzip2",
        "application/pdf",
        "font/woff",
        "font/woff2",
        "application/vnd.ms-fontobject",
    ];

    skip_types
        .iter()
        .any(|&skip_type| mime_type.starts_with(skip_type))
}

fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    [HttpEncoding::Gzip, HttpEncoding::Br, HttpEncoding::Deflate]
        .into_iter()
        .find(|e| accept_encoding.contains(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn head_text(response: &Response) -> String {
        String::from_utf8(response.head_bytes()).unwrap()
    }

    #[test]
    fn test_decide_encoding() {
        assert_eq!(decide_encoding(&[HttpEncoding::Deflate, HttpEncoding::Gzip]), Some(HttpEncoding::Gzip));
        assert_eq!(decide_encoding(&[HttpEncoding::Deflate, HttpEncoding::Br]), Some(HttpEncoding::Br));
        assert_eq!(decide_encoding(&[]), None);
    }

    #[test]
    fn test_compress_gzip_round_trip() {
        let data = b"Hello, World! Hello, World! Hello, World!".to_vec();
        let compressed = compress(data.clone(), HttpEncoding::Gzip).unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(&compressed[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_compress_brotli_and_deflate() {
        let data = "repeat ".repeat(200).into_bytes();
        assert!(compress(data.clone(), HttpEncoding::Br).unwrap().len() < data.len());
        assert!(compress(data.clone(), HttpEncoding::Deflate).unwrap().len() < data.len());
    }

    #[test]
    fn test_should_skip_compression() {
        assert!(should_skip_compression("image/png"));
        assert!(should_skip_compression("video/mp4"));
        assert!(!should_skip_compression("text/html; charset=utf-8"));
        assert!(!should_skip_compression("application/javascript; charset=utf-8"));
    }

    #[test]
    fn test_response_compress_sets_headers() {
        let mut response = Response::from_html(200, "<p>hi</p>".repeat(100));
        response.compress(&[HttpEncoding::Gzip]);
        assert_eq!(response.header("Content-Encoding"), Some("gzip"));
        assert_eq!(response.header("Vary"), Some("Accept-Encoding"));
        assert!(response.content_length() < 900);
    }

    #[test]
    fn test_streaming_body_is_not_compressed() {
        let mut response = Response::from_file(PathBuf::from("/x.txt"), 100, "text/plain", None);
        response.compress(&[HttpEncoding::Gzip]);
        assert!(response.header("Content-Encoding").is_none());
        assert!(response.is_streaming());
    }

    #[test]
    fn test_head_bytes_basic() {
        let response = Response::from_status_code(404);
        let text = head_text(&response);
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(text.contains(&format!("Content-Length: {}\r\n", response.content_length())));
        assert!(text.contains("Server: serve\r\n"));
        assert!(text.contains("Date: "));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut response = Response::new();
        response.set_header("Cache-Control", "a").set_header("cache-control", "b");
        assert_eq!(response.headers().len(), 1);
        assert_eq!(response.header("CACHE-CONTROL"), Some("b"));
    }

    #[test]
    fn test_range_responses() {
        let r = Response::from_file(PathBuf::from("/f"), 10, "text/plain", Some(ByteRange::From(2, Some(5))));
        assert_eq!(r.status_code(), 206);
        assert_eq!(r.header("Content-Range"), Some("bytes 2-5/10"));
        assert_eq!(r.content_length(), 4);

        let r = Response::from_file(PathBuf::from("/f"), 10, "text/plain", Some(ByteRange::From(20, None)));
        assert_eq!(r.status_code(), 416);
        assert_eq!(r.header("Content-Range"), Some("bytes */10"));
        assert_eq!(r.content_length(), 0);
    }

    #[test]
    fn test_not_modified_has_no_length() {
        let mut response = Response::new();
        response.set_code(304);
        assert!(!head_text(&response).contains("Content-Length"));
    }

    #[tokio::test]
    async fn test_write_file_range() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let response = Response::from_file(path, 10, "application/octet-stream", Some(ByteRange::Suffix(3)));
        let mut out = Vec::new();
        let sent = response.write_to(&mut out, 2).await.unwrap();
        assert_eq!(sent, 3);
        assert!(out.ends_with(b"\r\n\r\n789"));
    }

    #[tokio::test]
    async fn test_head_only_writes_no_body() {
        let mut response = Response::from_html(200, "body".to_string());
        response.head_only();
        let mut out = Vec::new();
        response.write_to(&mut out, 16).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_buffer_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let mut response = Response::from_file(path, 11, "text/plain", None);
        response.buffer_file().await.unwrap();
        assert_eq!(response.body(), &Body::Bytes(Bytes::from_static(b"hello world")));
    }
}
