// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod serve_tests {
    //! # 端到端处理测试
    //!
    //! 直接驱动 `handler::handle`，在 `tempfile` 生成的目录树上验证完整的
    //! 请求 → 决策 → 响应流程，响应通过 `write_to` 写入内存缓冲区后再检查。

    use std::fs;
    use std::io::Read;
    use std::path::Path;

    use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
    use flate2::read::GzDecoder;
    use serve::config::{AuthConfig, Config, Toggle};
    use serve::handler::{handle, ServeContext};
    use serve::request::Request;
    use serve::response::Response;
    use tempfile::TempDir;

    const ASSETS: &str = "/__serve_assets";

    /// 场景目录：`a.txt`（10 字节）与空目录 `sub/`
    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        dir
    }

    fn context(dir: &Path, config: Config) -> ServeContext {
        let config = config.with_public(dir.to_str().unwrap());
        config.validate().unwrap();
        ServeContext::with_asset_prefix(config, 3000, ASSETS).unwrap()
    }

    fn request(method: &str, path: &str, headers: &[(&str, &str)]) -> Request {
        let mut raw = format!("{} {} HTTP/1.1\r\nHost: localhost\r\n", method, path);
        for (k, v) in headers {
            raw.push_str(&format!("{}: {}\r\n", k, v));
        }
        raw.push_str("\r\n");
        Request::try_from(raw.as_bytes(), 0).unwrap()
    }

    async fn send(ctx: &ServeContext, method: &str, path: &str, headers: &[(&str, &str)]) -> (Response, Vec<u8>) {
        let response = handle(&request(method, path, headers), ctx, 0).await;
        let mut out = Vec::new();
        response.write_to(&mut out, 4).await.unwrap();
        let split = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        let body = out[split..].to_vec();
        (response, body)
    }

    async fn get(ctx: &ServeContext, path: &str) -> (Response, Vec<u8>) {
        send(ctx, "GET", path, &[]).await
    }

    #[tokio::test]
    async fn scenario_from_empty_sub_directory_to_missing_file() {
        let dir = site();
        let ctx = context(dir.path(), Config::new());

        let (r, _) = get(&ctx, "/sub").await;
        assert_eq!(r.status_code(), 302);
        assert_eq!(r.header("Location"), Some("/sub/"));

        let (r, body) = send(&ctx, "GET", "/sub/", &[("Accept", "application/json")]).await;
        assert_eq!(r.status_code(), 200);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let files = json["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["base"], "..");

        let (r, body) = get(&ctx, "/a.txt").await;
        assert_eq!(r.status_code(), 200);
        assert!(r.header("Content-Type").unwrap().starts_with("text/plain"));
        assert_eq!(r.content_length(), 10);
        assert_eq!(body, b"0123456789");

        let (r, _) = get(&ctx, "/missing").await;
        assert_eq!(r.status_code(), 404);
    }

    #[tokio::test]
    async fn html_listing_links_asset_stylesheet() {
        let dir = site();
        let ctx = context(dir.path(), Config::new());
        let (r, body) = get(&ctx, "/").await;
        assert_eq!(r.status_code(), 200);
        let html = String::from_utf8(body).unwrap();
        assert!(html.contains(&format!("{}/style.css", ASSETS)));
        assert!(html.contains(r#"href="/a.txt""#));
        assert!(html.contains(r#"href="/sub/""#));

        let (r, body) = get(&ctx, &format!("{}/style.css", ASSETS)).await;
        assert_eq!(r.status_code(), 200);
        assert!(r.header("Content-Type").unwrap().starts_with("text/css"));
        assert!(!body.is_empty());
    }

    #[tokio::test]
    async fn assets_dir_overrides_embedded_stylesheet() {
        let dir = site();
        let assets = TempDir::new().unwrap();
        fs::write(assets.path().join("style.css"), b"body{color:red}").unwrap();
        let config = Config::new()
            .with_compression(false)
            .with_assets_dir(assets.path().to_str().unwrap());
        let ctx = context(dir.path(), config);

        let (r, body) = get(&ctx, &format!("{}/style.css", ASSETS)).await;
        assert_eq!(r.status_code(), 200);
        assert_eq!(body, b"body{color:red}");

        let (r, _) = get(&ctx, &format!("{}/missing.css", ASSETS)).await;
        assert_eq!(r.status_code(), 404);
    }

    #[tokio::test]
    async fn cache_round_trip_with_etag() {
        let dir = site();
        let ctx = context(dir.path(), Config::new());

        let (first, _) = get(&ctx, "/a.txt").await;
        assert_eq!(first.status_code(), 200);
        let etag = first.header("ETag").unwrap().to_string();
        assert!(first.header("Last-Modified").is_some());

        let (second, body) = send(&ctx, "GET", "/a.txt", &[("If-None-Match", &etag)]).await;
        assert_eq!(second.status_code(), 304);
        assert!(body.is_empty());
        assert_eq!(second.header("ETag"), Some(etag.as_str()));
    }

    #[tokio::test]
    async fn cache_round_trip_with_last_modified() {
        let dir = site();
        let ctx = context(dir.path(), Config::new().with_etag(false));

        let (first, _) = get(&ctx, "/a.txt").await;
        assert!(first.header("ETag").is_none());
        let last_modified = first.header("Last-Modified").unwrap().to_string();

        let (second, body) = send(&ctx, "GET", "/a.txt", &[("If-Modified-Since", &last_modified)]).await;
        assert_eq!(second.status_code(), 304);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn cache_control_from_configuration() {
        let dir = site();
        let ctx = context(dir.path(), Config::new().with_cache_max_age(Some(0)));
        let (r, _) = get(&ctx, "/a.txt").await;
        assert_eq!(r.header("Cache-Control"), Some("no-cache, no-store, must-revalidate"));

        let ctx = context(dir.path(), Config::new().with_cache_max_age(Some(3600)));
        let (r, _) = get(&ctx, "/a.txt").await;
        assert_eq!(r.header("Cache-Control"), Some("public, max-age=3600"));
    }

    #[tokio::test]
    async fn single_page_fallback_serves_uncached_index() {
        let dir = site();
        fs::write(dir.path().join("index.html"), b"<div id=app></div>").unwrap();
        fs::write(dir.path().join("app.js"), b"console.log(1)").unwrap();
        let ctx = context(dir.path(), Config::new().with_single(true));

        for path in ["/dashboard", "/users/42/settings", "/deep/a/b/c"] {
            let (r, body) = get(&ctx, path).await;
            assert_eq!(r.status_code(), 200, "{}", path);
            assert_eq!(body, b"<div id=app></div>");
            assert_eq!(r.header("Cache-Control"), Some("public, max-age=0"));
        }

        let (r, _) = get(&ctx, "/").await;
        assert_eq!(r.header("Cache-Control"), Some("public, max-age=0"));

        let (r, body) = get(&ctx, "/app.js").await;
        assert_eq!(body, b"console.log(1)");
        assert_eq!(r.header("Cache-Control"), Some("public, max-age=86400"));
    }

    #[tokio::test]
    async fn single_page_unknown_extension_is_html() {
        let dir = site();
        fs::write(dir.path().join("index.html"), b"x").unwrap();
        fs::write(dir.path().join("LICENSE"), b"MIT").unwrap();

        let ctx = context(dir.path(), Config::new().with_single(true));
        let (r, _) = get(&ctx, "/LICENSE").await;
        assert!(r.header("Content-Type").unwrap().starts_with("text/html"));

        let ctx = context(dir.path(), Config::new());
        let (r, _) = get(&ctx, "/LICENSE").await;
        assert!(r.header("Content-Type").unwrap().starts_with("text/plain"));
    }

    #[tokio::test]
    async fn ignored_files_are_not_found_even_when_encoded() {
        let dir = site();
        fs::write(dir.path().join("test.txt"), b"hidden").unwrap();
        let ctx = context(dir.path(), Config::new().with_ignored(&["test.txt".to_string()]));

        for path in ["/test.txt", "/t%65st.txt", "/%74%65%73%74.txt", "/sub/../test.txt"] {
            let (r, body) = get(&ctx, path).await;
            assert_eq!(r.status_code(), 404, "{}", path);
            assert!(!String::from_utf8_lossy(&body).contains("hidden"));
        }
    }

    #[tokio::test]
    async fn custom_not_found_page() {
        let dir = site();
        fs::write(dir.path().join("404.html"), b"<h1>gone</h1>").unwrap();
        let ctx = context(dir.path(), Config::new());
        let (r, body) = get(&ctx, "/nowhere").await;
        assert_eq!(r.status_code(), 404);
        assert_eq!(body, b"<h1>gone</h1>");
    }

    #[tokio::test]
    async fn trailing_slash_redirect_reaches_fixed_point() {
        let dir = site();
        for (policy, from, to) in [(None, "/sub", "/sub/"), (Some(true), "/sub", "/sub/"), (Some(false), "/sub/", "/sub")] {
            let ctx = context(dir.path(), Config::new().with_trailing_slash(policy));
            let (r, _) = get(&ctx, from).await;
            assert_eq!(r.status_code(), 302);
            let location = r.header("Location").unwrap().to_string();
            assert_eq!(location, to);

            let (again, _) = get(&ctx, &location).await;
            assert_eq!(again.status_code(), 200, "{:?}", policy);
        }
    }

    #[tokio::test]
    async fn trailing_slash_redirect_keeps_query() {
        let dir = site();
        let ctx = context(dir.path(), Config::new());
        let (r, _) = get(&ctx, "/sub?view=grid").await;
        assert_eq!(r.header("Location"), Some("/sub/?view=grid"));
    }

    #[tokio::test]
    async fn listing_preserves_enumeration_order() {
        let dir = site();
        for name in ["zeta.txt", "alpha.txt", "mid", "Beta.md"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let ctx = context(dir.path(), Config::new());
        let (_, body) = send(&ctx, "GET", "/", &[("Accept", "application/json")]).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let actual: Vec<String> = json["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["base"].as_str().unwrap().to_string())
            .collect();

        let expected: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap())
            .map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                if e.path().is_dir() {
                    format!("{}/", name)
                } else {
                    name
                }
            })
            .collect();
        assert_eq!(actual, expected);
        assert!(!actual.contains(&"..".to_string()));
    }

    #[tokio::test]
    async fn directory_listing_can_be_limited() {
        let dir = site();
        fs::create_dir(dir.path().join("public")).unwrap();
        let ctx = context(
            dir.path(),
            Config::new().with_directory_listing(Toggle::Paths(vec!["/public/**".to_string()])),
        );
        assert_eq!(get(&ctx, "/public/").await.0.status_code(), 200);
        assert_eq!(get(&ctx, "/sub/").await.0.status_code(), 404);

        let ctx = context(dir.path(), Config::new().with_unlisted(vec!["sub".to_string()]));
        assert_eq!(get(&ctx, "/sub/").await.0.status_code(), 404);
    }

    #[tokio::test]
    async fn clean_urls_resolve_html_files() {
        let dir = site();
        fs::write(dir.path().join("about.html"), b"about").unwrap();
        let ctx = context(dir.path(), Config::new().with_clean_urls(Toggle::Enabled(true)));
        let (r, body) = get(&ctx, "/about").await;
        assert_eq!(r.status_code(), 200);
        assert_eq!(body, b"about");

        let ctx = context(dir.path(), Config::new());
        assert_eq!(get(&ctx, "/about").await.0.status_code(), 404);
    }

    #[tokio::test]
    async fn redirects_rewrites_and_headers() {
        let dir = site();
        let ctx = context(
            dir.path(),
            Config::new()
                .with_redirect("/old/:page", "/new/:page", 308)
                .with_rewrite("/files/*", "/$1")
                .with_header_rule("**/*.txt", &[("X-Kind", "text"), ("Cache-Control", "max-age=5")])
                .with_header_rule("/files/**", &[("X-Kind", "rewritten")]),
        );

        let (r, _) = get(&ctx, "/old/about").await;
        assert_eq!(r.status_code(), 308);
        assert_eq!(r.header("Location"), Some("/new/about"));
        assert!(r.header("X-Kind").is_none());

        let (r, body) = get(&ctx, "/files/a.txt").await;
        assert_eq!(r.status_code(), 200);
        assert_eq!(body, b"0123456789");
        // 后出现的规则覆盖同名头部；Cache-Control 来自第一条规则
        assert_eq!(r.header("X-Kind"), Some("rewritten"));
        assert_eq!(r.header("Cache-Control"), Some("max-age=5"));

        let (r, _) = get(&ctx, "/a.txt").await;
        assert_eq!(r.header("X-Kind"), Some("text"));
    }

    #[tokio::test]
    async fn cors_headers_on_every_response() {
        let dir = site();
        let ctx = context(dir.path(), Config::new().with_cors(true));
        for path in ["/a.txt", "/missing", "/sub"] {
            let (r, _) = get(&ctx, path).await;
            assert_eq!(r.header("Access-Control-Allow-Origin"), Some("*"), "{}", path);
            assert_eq!(
                r.header("Access-Control-Allow-Headers"),
                Some("Origin, X-Requested-With, Content-Type, Accept, Range")
            );
        }
        let (r, _) = send(&ctx, "OPTIONS", "/a.txt", &[]).await;
        assert_eq!(r.status_code(), 204);
        assert_eq!(r.header("Access-Control-Allow-Origin"), Some("*"));
    }

    #[tokio::test]
    async fn range_requests() {
        let dir = site();
        let ctx = context(dir.path(), Config::new());

        let (r, body) = send(&ctx, "GET", "/a.txt", &[("Range", "bytes=2-5")]).await;
        assert_eq!(r.status_code(), 206);
        assert_eq!(r.header("Content-Range"), Some("bytes 2-5/10"));
        assert_eq!(body, b"2345");

        let (r, body) = send(&ctx, "GET", "/a.txt", &[("Range", "bytes=-3")]).await;
        assert_eq!(r.status_code(), 206);
        assert_eq!(body, b"789");

        let (r, body) = send(&ctx, "GET", "/a.txt", &[("Range", "bytes=50-")]).await;
        assert_eq!(r.status_code(), 416);
        assert_eq!(r.header("Content-Range"), Some("bytes */10"));
        assert!(body.is_empty());

        let (r, _) = get(&ctx, "/a.txt").await;
        assert_eq!(r.header("Accept-Ranges"), Some("bytes"));
    }

    #[tokio::test]
    async fn head_has_headers_but_no_body() {
        let dir = site();
        let ctx = context(dir.path(), Config::new());
        let (r, body) = send(&ctx, "HEAD", "/a.txt", &[]).await;
        assert_eq!(r.status_code(), 200);
        assert_eq!(r.content_length(), 10);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn unsupported_methods() {
        let dir = site();
        let ctx = context(dir.path(), Config::new());
        for method in ["POST", "PUT", "DELETE"] {
            let (r, _) = send(&ctx, method, "/a.txt", &[]).await;
            assert_eq!(r.status_code(), 405);
            assert_eq!(r.header("Allow"), Some("GET, HEAD, OPTIONS"));
        }
        // 只读服务器不会修改目录树
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn basic_auth_gate() {
        let dir = site();
        let ctx = context(
            dir.path(),
            Config::new().with_auth(Some(AuthConfig {
                username: "admin".to_string(),
                password: "hunter2".to_string(),
            })),
        );

        let (r, _) = get(&ctx, "/a.txt").await;
        assert_eq!(r.status_code(), 401);
        assert_eq!(r.header("WWW-Authenticate"), Some("Basic realm=\"User Visible Realm\""));

        let wrong = format!("Basic {}", BASE64_STANDARD.encode("admin:nope"));
        let (r, _) = send(&ctx, "GET", "/a.txt", &[("Authorization", &wrong)]).await;
        assert_eq!(r.status_code(), 401);

        let right = format!("Basic {}", BASE64_STANDARD.encode("admin:hunter2"));
        let (r, body) = send(&ctx, "GET", "/a.txt", &[("Authorization", &right)]).await;
        assert_eq!(r.status_code(), 200);
        assert_eq!(body, b"0123456789");
    }

    #[tokio::test]
    async fn small_text_files_are_compressed() {
        let dir = site();
        let text = "compress me ".repeat(64);
        fs::write(dir.path().join("big.txt"), &text).unwrap();
        let ctx = context(dir.path(), Config::new());

        let (r, body) = send(&ctx, "GET", "/big.txt", &[("Accept-Encoding", "gzip")]).await;
        assert_eq!(r.header("Content-Encoding"), Some("gzip"));
        assert_eq!(r.content_length(), body.len() as u64);
        let mut decoded = String::new();
        GzDecoder::new(&body[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, text);

        let ctx = context(dir.path(), Config::new().with_compression(false));
        let (r, _) = send(&ctx, "GET", "/big.txt", &[("Accept-Encoding", "gzip")]).await;
        assert!(r.header("Content-Encoding").is_none());

        let ctx = context(dir.path(), Config::new().with_streaming_threshold(16));
        let (r, body) = send(&ctx, "GET", "/big.txt", &[("Accept-Encoding", "gzip")]).await;
        assert!(r.header("Content-Encoding").is_none());
        assert_eq!(body, text.as_bytes());
    }

    #[tokio::test]
    async fn serve_json_configuration_drives_rules() {
        let dir = site();
        fs::write(dir.path().join("index.html"), b"shell").unwrap();
        let json = r#"{
            "cleanUrls": false,
            "renderSingle": true,
            "redirects": [{ "source": "/docs", "destination": "https://example.com/docs", "type": 301 }],
            "headers": [{ "source": "**", "headers": [{ "key": "X-Frame-Options", "value": "DENY" }] }]
        }"#;
        let ctx = context(dir.path(), Config::from_json_str(json).unwrap());

        let (r, _) = get(&ctx, "/docs").await;
        assert_eq!(r.status_code(), 301);
        assert_eq!(r.header("Location"), Some("https://example.com/docs"));

        let (r, body) = get(&ctx, "/client/route").await;
        assert_eq!(body, b"shell");
        assert_eq!(r.header("X-Frame-Options"), Some("DENY"));
    }
}
