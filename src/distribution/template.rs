//! Chat message rendering.
//!
//! Placeholders are substituted once each. Optional sections render as an
//! empty string when absent, otherwise they carry their own trailing
//! newline so empty sections leave no blank lines.

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::domain::{Content, Source, Subscription};

use super::preview::trim_description;

pub struct MessageContext<'a> {
    pub source: &'a Source,
    pub content: &'a Content,
    pub subscription: &'a Subscription,
    pub preview_chars: usize,
}

pub fn render_message(template: &str, ctx: &MessageContext<'_>) -> String {
    let preview = trim_description(&ctx.content.description, ctx.preview_chars);
    let preview_text = if preview.is_empty() {
        String::new()
    } else {
        format!("{}\n", encode_text(&preview))
    };

    let article_url = match ctx.content.article_url.as_deref() {
        Some(url) if ctx.subscription.enable_article => format!(
            "<a href=\"{}\">Full article</a>\n",
            encode_double_quoted_attribute(url)
        ),
        _ => String::new(),
    };

    let tags = if ctx.subscription.tag.is_empty() {
        String::new()
    } else {
        encode_text(&ctx.subscription.tag).into_owned()
    };

    let rendered = template
        .replace("{source_title}", &encode_text(ctx.source.display_title()))
        .replace("{content_title}", &encode_text(ctx.content.display_title()))
        .replace("{link}", &encode_double_quoted_attribute(&ctx.content.raw_link))
        .replace("{preview_text}", &preview_text)
        .replace("{article_url}", &article_url)
        .replace("{tags}", &tags);

    rendered.trim_end().to_string()
}

pub fn render_suspension_notice(source: &Source, error_count: u32) -> String {
    format!(
        "<a href=\"{}\">{}</a> failed {} consecutive updates and has been paused",
        encode_double_quoted_attribute(&source.url),
        encode_text(source.display_title()),
        error_count
    )
}
