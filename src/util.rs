use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::{listing::Listing, param::STATUS_CODES};

/// 将 URL 路径段写入 href 时需要转义的字符
const HREF_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'%')
    .add(b'\'')
    .add(b'/');

pub struct HtmlBuilder {
    title: String,
    css: String,
    stylesheet: Option<String>,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = match note {
            Some(n) => n,
            None => STATUS_CODES.get(&code).copied().unwrap_or("Unknown Status"),
        };
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code,
            escape_html(description)
        );
        Self {
            title,
            css,
            stylesheet: None,
            body,
        }
    }

    /// 目录列表页。样式表由内置资源命名空间提供，链接全部使用绝对路径。
    pub fn from_listing(listing: &Listing, asset_prefix: &str) -> Self {
        let mut body = String::new();

        body.push_str("<main><header><h1><i>Index of&nbsp;</i>");
        for crumb in &listing.breadcrumbs {
            body.push_str(&format!(
                r#"<a href="{}">{}</a>"#,
                escape_html(&href_for(&crumb.url)),
                escape_html(crumb.name.trim_end_matches('/'))
            ));
            body.push('/');
        }
        body.push_str("</h1></header><ul id=\"files\">");

        for entry in &listing.entries {
            let mut url = format!("/{}", entry.relative_path);
            if entry.is_directory && !url.ends_with('/') {
                url.push('/');
            }
            let class = if entry.is_directory { "folder" } else { "file" };
            body.push_str(&format!(
                r#"<li><a href="{}" title="{}" class="{} {}">{}</a>"#,
                escape_html(&href_for(&url)),
                escape_html(&entry.title),
                class,
                escape_html(&entry.extension),
                escape_html(&entry.name)
            ));
            if let Some(size) = &entry.size_human {
                body.push_str(&format!(r#"<i>{}</i>"#, size));
            }
            body.push_str("</li>");
        }
        body.push_str("</ul></main>");
        body.push_str(&format!(
            "<footer>serve/{} on port {}</footer>",
            listing.version, listing.port
        ));

        Self {
            title: format!("Files within {}", escape_html(&listing.directory)),
            css: String::new(),
            stylesheet: Some(format!("{}/style.css", asset_prefix.trim_end_matches('/'))),
            body,
        }
    }

    pub fn build(&self) -> String {
        let stylesheet = match &self.stylesheet {
            Some(href) => format!(r#"<link rel="stylesheet" href="{}">"#, escape_html(href)),
            None => String::new(),
        };
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <meta name="viewport" content="width=device-width, initial-scale=1">
                    <title>{}</title>
                    {}
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, stylesheet, self.css, self.body
        )
    }
}

/// 人类可读的文件大小，整数取整
pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{} {}", size.round() as u64, units[unit_index])
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// 逐段百分号编码一个以 `/` 分隔的 URL 路径
pub fn href_for(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, HREF_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}
