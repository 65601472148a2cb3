//! BBCode to HTML.

use regex::{Captures, Regex};

use super::{escape_html, line_breaks, ContentRenderer};
use crate::{AgoraError, Result};

/// Placeholder delimiter for extracted code blocks.
const CODE_MARK: char = '\u{0}';

/// Renders BBCode: `[b] [i] [u] [s] [url] [url=] [img] [quote] [quote=]
/// [code] [list] [*]`.
#[derive(Debug, Clone)]
pub struct BbCodeRenderer {
    code: Regex,
    inline: Vec<(Regex, &'static str)>,
    quote: Regex,
    list: Regex,
}

impl BbCodeRenderer {
    pub fn new() -> Result<Self> {
        let inline = [
            (r"(?is)\[b\](.*?)\[/b\]", "<strong>${1}</strong>"),
            (r"(?is)\[i\](.*?)\[/i\]", "<em>${1}</em>"),
            (r"(?is)\[u\](.*?)\[/u\]", "<u>${1}</u>"),
            (r"(?is)\[s\](.*?)\[/s\]", "<s>${1}</s>"),
            (r"(?is)\[url\]([^\[\s]+?)\[/url\]", r#"<a href="${1}">${1}</a>"#),
            (r"(?is)\[url=([^\]\s]+)\](.*?)\[/url\]", r#"<a href="${1}">${2}</a>"#),
            (r"(?is)\[img\]([^\[\s]+?)\[/img\]", r#"<img src="${1}" alt="">"#),
        ]
        .into_iter()
        .map(|(pattern, replacement)| Ok((compile(pattern)?, replacement)))
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            code: compile(r"(?is)\[code\](.*?)\[/code\]")?,
            inline,
            quote: compile(r"(?is)\[quote(?:=([^\]]*))?\](.*?)\[/quote\]")?,
            list: compile(r"(?is)\[list\](.*?)\[/list\]")?,
        })
    }

    fn to_html(&self, raw: &str) -> String {
        let escaped = escape_html(&raw.replace(CODE_MARK, ""));

        // Code blocks are taken out first so their content stays literal.
        let mut blocks = Vec::new();
        let mut html = self
            .code
            .replace_all(&escaped, |caps: &Captures<'_>| {
                blocks.push(caps[1].trim_matches('\n').to_string());
                format!("{CODE_MARK}{}{CODE_MARK}", blocks.len() - 1)
            })
            .into_owned();

        for (re, replacement) in &self.inline {
            html = re.replace_all(&html, *replacement).into_owned();
        }

        html = self
            .list
            .replace_all(&html, |caps: &Captures<'_>| {
                let items: String = caps[1]
                    .split("[*]")
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| format!("<li>{item}</li>"))
                    .collect();
                format!("<ul>{items}</ul>")
            })
            .into_owned();

        // Nested quotes resolve over repeated passes.
        loop {
            let next = self
                .quote
                .replace_all(&html, |caps: &Captures<'_>| {
                    let body = caps[2].trim();
                    match caps.get(1).map(|m| m.as_str().trim()) {
                        Some(author) if !author.is_empty() => {
                            format!("<blockquote><cite>{author} wrote:</cite>{body}</blockquote>")
                        }
                        _ => format!("<blockquote>{body}</blockquote>"),
                    }
                })
                .into_owned();
            if next == html {
                break;
            }
            html = next;
        }

        let mut html = line_breaks(&html);
        for (i, block) in blocks.iter().enumerate() {
            let marker = format!("{CODE_MARK}{i}{CODE_MARK}");
            html = html.replace(&marker, &format!("<pre><code>{block}</code></pre>"));
        }
        html
    }
}

impl ContentRenderer for BbCodeRenderer {
    fn render(&self, raw: &str) -> String {
        ammonia::clean(&self.to_html(raw))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AgoraError::Config(format!("invalid markup rule: {e}")))
}
