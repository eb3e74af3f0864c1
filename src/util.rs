// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use crate::{counter::HitCounter, param::STATUS_CODES};

pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    /// 错误页，标题与正文都是状态行，例如 `404 Not Found`。
    pub fn from_status_code(code: u16) -> Self {
        let reason = STATUS_CODES.get(&code).copied().unwrap_or("Unknown");
        let status_line = format!("{} {}", code, reason);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let body = format!("<h1>{}</h1>", status_line);
        Self {
            title: status_line,
            css,
            body,
        }
    }

    /// 目录列表页。
    ///
    /// 条目按名称的字典序排列。每个名称显示时做 HTML 转义，链接中做百分号编码，
    /// 两者互不替代；目录在链接和显示名后都加 `/`。每个条目后附带它当前的访问计数。
    pub fn from_dir(dir: &Path, root: &Path, counter: &dyn HitCounter) -> io::Result<Self> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        let mut items = String::new();
        for entry in &entries {
            let name = match entry.file_name() {
                Some(n) => n.to_string_lossy(),
                None => continue,
            };
            let slash = if entry.is_dir() { "/" } else { "" };
            let hits = counter.hits(&entry.to_string_lossy());
            items.push_str(&format!(
                r#"<li><a href="{}{}">{}{}</a> ({} hits)</li>"#,
                encode_link(&name),
                slash,
                escape_html(&name),
                slash,
                hits
            ));
        }

        let shown = match dir.strip_prefix(root) {
            Ok(rel) if rel.as_os_str().is_empty() => "/".to_string(),
            Ok(rel) => format!("/{}", rel.to_string_lossy()),
            Err(_) => dir.to_string_lossy().to_string(),
        };
        let title = format!("Directory listing for {}", escape_html(&shown));
        let body = format!("<h1>{}</h1><hr><ul>{}</ul><hr>", title, items);
        let css = r"
            li {
                padding: 2px;
                font-family: monospace;
            }"
        .to_string();
        Ok(Self { title, css, body })
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}

/// 转义 `&`、`<`、`>` 以及引号，用于显示文本。
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

/// 对链接中的单个路径段做百分号编码。
pub fn encode_link(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}
