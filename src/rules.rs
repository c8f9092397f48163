// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 规则引擎
//!
//! 将配置中的 `redirects`、`rewrites`、`headers` 三张有序规则表编译为
//! [`Pattern`]，并按「重定向 → 重写 → 响应头」的层次对请求路径求值：
//!
//! - 重定向按顺序匹配，第一条命中即短路，不再处理其它规则。
//! - 重写按顺序匹配，只应用第一条，不做链式重写。
//! - 响应头规则彼此独立、可叠加：所有命中的规则按配置顺序贡献头部，
//!   同名头部由后出现的覆盖先出现的。响应头总是对照**原始**解码路径匹配。
//!
//! ## 模式语法
//! - `*` 匹配单个路径段内的任意字符（不跨越 `/`）。
//! - `**` 匹配任意多个路径段；位于 `/` 之后且在模式末尾时，也匹配省略该段的路径。
//! - `:name` 位于段首时匹配一个非空路径段，并以名字捕获。
//! - 目标中的 `$1..$n` 按从左到右的顺序引用所有通配符与命名参数，`:name` 引用命名参数。

use log::debug;
use regex::Regex;

use crate::config::{Config, HeaderEntry, RedirectRule, RewriteRule, Toggle};
use crate::config::{SINGLE_PAGE_DESTINATION, SINGLE_PAGE_SOURCE};
use crate::exception::Exception;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Segment,
    AnyDepth,
    Param(String),
}

/// 编译后的路径模式。
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    tokens: Vec<Token>,
    regex: Regex,
}

/// 一次成功匹配得到的捕获组
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captures {
    positional: Vec<String>,
    named: Vec<(String, String)>,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(source: &str) -> Result<Vec<Token>, Exception> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '*' {
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            let mut run = 0;
            while i < chars.len() && chars[i] == '*' {
                run += 1;
                i += 1;
            }
            match run {
                1 => tokens.push(Token::Segment),
                2 => tokens.push(Token::AnyDepth),
                _ => {
                    return Err(Exception::Configuration(format!(
                        "模式{}中出现了连续{}个*",
                        source, run
                    )))
                }
            }
            continue;
        }
        let at_segment_start = i == 0 || chars[i - 1] == '/';
        if c == ':' && at_segment_start && chars.get(i + 1).is_some_and(|n| is_ident_start(*n)) {
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            let mut name = String::new();
            i += 1;
            while i < chars.len() && is_ident_char(chars[i]) {
                name.push(chars[i]);
                i += 1;
            }
            if tokens.iter().any(|t| *t == Token::Param(name.clone())) {
                return Err(Exception::Configuration(format!(
                    "模式{}中参数:{}重复出现",
                    source, name
                )));
            }
            tokens.push(Token::Param(name));
            continue;
        }
        literal.push(c);
        i += 1;
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

fn build_regex(tokens: &[Token]) -> String {
    let mut re = String::from("^");
    let last = tokens.len().saturating_sub(1);
    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::Literal(text) => {
                // 末尾的 `/**` 允许整体省略，斜杠并入后面的可选组
                let tail_any = idx + 1 == last && tokens[last] == Token::AnyDepth && text.ends_with('/');
                if tail_any {
                    re.push_str(&regex::escape(&text[..text.len() - 1]));
                } else {
                    re.push_str(&regex::escape(text));
                }
            }
            Token::Segment => re.push_str("([^/]*)"),
            Token::AnyDepth => {
                let after_slash = idx > 0
                    && idx == last
                    && matches!(&tokens[idx - 1], Token::Literal(t) if t.ends_with('/'));
                if after_slash {
                    re.push_str("(?:/(.*))?");
                } else {
                    re.push_str("(.*)");
                }
            }
            Token::Param(name) => re.push_str(&format!("(?P<{}>[^/]+)", name)),
        }
    }
    re.push('$');
    re
}

impl Pattern {
    pub fn compile(source: &str) -> Result<Self, Exception> {
        if source.is_empty() {
            return Err(Exception::Configuration("规则的source不能为空".to_string()));
        }
        let tokens = tokenize(source)?;
        let expr = build_regex(&tokens);
        let regex = Regex::new(&expr)
            .map_err(|e| Exception::Configuration(format!("模式{}无法编译: {}", source, e)))?;
        Ok(Self {
            source: source.to_string(),
            tokens,
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 模式是否不含任何通配符与参数
    pub fn is_literal(&self) -> bool {
        self.tokens.iter().all(|t| matches!(t, Token::Literal(_)))
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn captures(&self, path: &str) -> Option<Captures> {
        let caps = self.regex.captures(path)?;
        let positional = (1..caps.len())
            .map(|i| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        let named = self
            .regex
            .capture_names()
            .flatten()
            .map(|name| {
                let value = caps.name(name).map(|m| m.as_str().to_string()).unwrap_or_default();
                (name.to_string(), value)
            })
            .collect();
        Some(Captures { positional, named })
    }
}

/// 编译后的 [`Toggle`]：整体开关，或只对匹配任一 glob 的请求路径生效
#[derive(Debug, Clone)]
pub enum PathToggle {
    Enabled(bool),
    Paths(Vec<Pattern>),
}

impl PathToggle {
    pub fn compile(toggle: &Toggle) -> Result<Self, Exception> {
        Ok(match toggle {
            Toggle::Enabled(b) => PathToggle::Enabled(*b),
            Toggle::Paths(globs) => PathToggle::Paths(
                globs
                    .iter()
                    .map(|g| Pattern::compile(g))
                    .collect::<Result<Vec<_>, Exception>>()?,
            ),
        })
    }

    /// 目录路径带或不带结尾斜杠都参与匹配
    pub fn applies_to(&self, request_path: &str) -> bool {
        match self {
            PathToggle::Enabled(b) => *b,
            PathToggle::Paths(patterns) => patterns.iter().any(|p| {
                p.is_match(request_path) || p.is_match(request_path.trim_end_matches('/'))
            }),
        }
    }
}

impl Captures {
    /// 将捕获代入目标模板
    pub fn substitute(&self, destination: &str) -> String {
        let chars: Vec<char> = destination.chars().collect();
        let mut out = String::with_capacity(destination.len());
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '$' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) {
                let mut digits = String::new();
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    digits.push(chars[i]);
                    i += 1;
                }
                let index: usize = digits.parse().unwrap_or(0);
                if index >= 1 {
                    if let Some(value) = self.positional.get(index - 1) {
                        out.push_str(value);
                    }
                }
                continue;
            }
            let at_segment_start = i == 0 || chars[i - 1] == '/';
            if c == ':' && at_segment_start && chars.get(i + 1).is_some_and(|n| is_ident_start(*n)) {
                let mut name = String::new();
                let mut j = i + 1;
                while j < chars.len() && is_ident_char(chars[j]) {
                    name.push(chars[j]);
                    j += 1;
                }
                if let Some((_, value)) = self.named.iter().find(|(n, _)| *n == name) {
                    out.push_str(value);
                    i = j;
                    continue;
                }
            }
            out.push(c);
            i += 1;
        }
        out
    }
}

/// 重定向决定
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub location: String,
    pub status_code: u16,
}

/// 已应用的重写
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub path: String,
    /// 是否为单页应用模式注入的合成规则
    pub single_page: bool,
}

/// 规则求值结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    /// 后续解析使用的路径（重写后；未重写时即原路径）
    pub path: String,
    pub rewrite: Option<Rewrite>,
    pub redirect: Option<Redirect>,
    pub extra_headers: Vec<(String, String)>,
}

/// 编译后的规则表，会话期间只读，可被多个请求并发共享。
#[derive(Debug, Clone)]
pub struct RuleEngine {
    redirects: Vec<(Pattern, RedirectRule)>,
    rewrites: Vec<(Pattern, RewriteRule)>,
    headers: Vec<(Pattern, Vec<HeaderEntry>)>,
    single: bool,
}

impl RuleEngine {
    pub fn from_config(config: &Config) -> Result<Self, Exception> {
        let redirects = config
            .redirects()
            .iter()
            .map(|r| Ok((Pattern::compile(&r.source)?, r.clone())))
            .collect::<Result<Vec<_>, Exception>>()?;
        let rewrites = config
            .rewrites()
            .iter()
            .map(|r| Ok((Pattern::compile(&r.source)?, r.clone())))
            .collect::<Result<Vec<_>, Exception>>()?;
        let headers = config
            .headers()
            .iter()
            .map(|r| Ok((Pattern::compile(&r.source)?, r.headers.clone())))
            .collect::<Result<Vec<_>, Exception>>()?;
        let single = config.render_single()
            || rewrites.first().is_some_and(|(_, r)| is_single_page_rule(r));
        Ok(Self {
            redirects,
            rewrites,
            headers,
            single,
        })
    }

    /// 单页应用模式是否生效
    pub fn is_single(&self) -> bool {
        self.single
    }

    pub fn apply(&self, request_path: &str) -> RuleOutcome {
        for (pattern, rule) in &self.redirects {
            if let Some(caps) = pattern.captures(request_path) {
                let location = caps.substitute(&rule.destination);
                debug!("重定向规则{}命中: {} -> {}", pattern.source(), request_path, location);
                return RuleOutcome {
                    path: request_path.to_string(),
                    rewrite: None,
                    redirect: Some(Redirect {
                        location,
                        status_code: rule.status_code,
                    }),
                    extra_headers: Vec::new(),
                };
            }
        }

        let mut outcome = RuleOutcome {
            path: request_path.to_string(),
            extra_headers: self.headers_for(request_path),
            ..Default::default()
        };

        for (index, (pattern, rule)) in self.rewrites.iter().enumerate() {
            if let Some(caps) = pattern.captures(request_path) {
                let target = caps.substitute(&rule.destination);
                let path = match target.split_once('?') {
                    Some((p, _)) => p.to_string(),
                    None => target,
                };
                debug!("重写规则{}命中: {} -> {}", pattern.source(), request_path, path);
                outcome.path = path.clone();
                outcome.rewrite = Some(Rewrite {
                    path,
                    single_page: self.single && index == 0 && is_single_page_rule(rule),
                });
                break;
            }
        }
        outcome
    }

    /// 叠加所有命中规则的响应头
    pub fn headers_for(&self, request_path: &str) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = Vec::new();
        for (pattern, entries) in &self.headers {
            if !pattern.is_match(request_path) {
                continue;
            }
            for entry in entries {
                match merged.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&entry.key)) {
                    Some(existing) => existing.1 = entry.value.clone(),
                    None => merged.push((entry.key.clone(), entry.value.clone())),
                }
            }
        }
        merged
    }
}

fn is_single_page_rule(rule: &RewriteRule) -> bool {
    rule.source == SINGLE_PAGE_SOURCE && rule.destination == SINGLE_PAGE_DESTINATION
}
