//! Post content rendering for Agora.
//!
//! Raw post content is censored, converted from its markup language to HTML
//! and sanitized. Every renderer escapes user-supplied HTML before any markup
//! is interpreted.

mod bbcode;
mod markdown;

pub use bbcode::BbCodeRenderer;
pub use markdown::MarkdownRenderer;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;

/// Markup language of post content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentParser {
    #[default]
    BbCode,
    Markdown,
    Plain,
}

/// Turns raw post content into sanitized HTML.
pub trait ContentRenderer: Send + Sync {
    fn render(&self, raw: &str) -> String;
}

/// Escaped text with line breaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextRenderer;

impl ContentRenderer for PlainTextRenderer {
    fn render(&self, raw: &str) -> String {
        line_breaks(&escape_html(raw))
    }
}

/// Build the renderer for a markup language.
pub fn renderer_for(parser: ContentParser) -> Result<Box<dyn ContentRenderer>> {
    Ok(match parser {
        ContentParser::BbCode => Box::new(BbCodeRenderer::new()?),
        ContentParser::Markdown => Box::new(MarkdownRenderer::new()),
        ContentParser::Plain => Box::new(PlainTextRenderer),
    })
}

/// Replace forbidden words with asterisks.
///
/// Matching is case-insensitive and on whole words only.
pub fn censor(text: &str, words: &[String]) -> String {
    let alternatives: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return text.to_string();
    }

    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    match Regex::new(&pattern) {
        Ok(re) => re
            .replace_all(text, |caps: &regex::Captures<'_>| {
                "*".repeat(caps[0].chars().count())
            })
            .into_owned(),
        Err(e) => {
            warn!(error = %e, "Forbidden word list could not be compiled");
            text.to_string()
        }
    }
}

/// Escape the five HTML-significant characters.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Turn newlines into `<br>` tags.
pub(crate) fn line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "<br>\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_censor_whole_words_case_insensitive() {
        let censored = censor("Spam is not spammy, SPAM!", &words(&["spam"]));
        assert_eq!(censored, "**** is not spammy, ****!");
    }

    #[test]
    fn test_censor_escapes_patterns() {
        assert_eq!(censor("a+b and ab", &words(&["a+b"])), "*** and ab");
        assert_eq!(censor("nothing", &words(&["", "  "])), "nothing");
    }

    #[test]
    fn test_plain_text_renderer() {
        let html = PlainTextRenderer.render("<b>hi</b>\nthere");
        assert_eq!(html, "&lt;b&gt;hi&lt;/b&gt;<br>\nthere");
    }

    #[test]
    fn test_renderer_for_each_parser() {
        for parser in [ContentParser::BbCode, ContentParser::Markdown, ContentParser::Plain] {
            let html = renderer_for(parser).unwrap().render("<script>x</script>");
            assert!(!html.contains("<script>"));
        }
    }

    #[test]
    fn test_content_parser_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            parser: ContentParser,
        }
        let w: Wrapper = toml::from_str(r#"parser = "bbcode""#).unwrap();
        assert_eq!(w.parser, ContentParser::BbCode);
        let w: Wrapper = toml::from_str(r#"parser = "plain""#).unwrap();
        assert_eq!(w.parser, ContentParser::Plain);
    }
}
