//! CommonMark to HTML.

use pulldown_cmark::{html, Event, Options, Parser};

use super::ContentRenderer;

/// Renders CommonMark with strikethrough and tables.
///
/// Raw HTML in the source is shown as text.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownRenderer {
    options: Options,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self {
            options: Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES,
        }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentRenderer for MarkdownRenderer {
    fn render(&self, raw: &str) -> String {
        let events = Parser::new_ext(raw, self.options).map(|event| match event {
            Event::Html(text) | Event::InlineHtml(text) => Event::Text(text),
            other => other,
        });

        let mut out = String::with_capacity(raw.len() * 3 / 2);
        html::push_html(&mut out, events);
        ammonia::clean(&out)
    }
}
