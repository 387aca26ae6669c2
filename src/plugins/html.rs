//! HTML content and printer providers.
//!
//! The content provider rewrites `href`/`src` references through the render
//! context (a single streaming pass, which is why media compilation is
//! deferred rather than inlined) and expands `<doctool:data/>` placeholders
//! from the part's data. The printer wraps the assembled body in a document
//! layout.

use crate::{
    config::DataObject,
    context::RenderContext,
    pipeline::escape_html,
    provider::{ContentProvider, PluginValues, PrinterProvider},
};
use anyhow::Result;
use regex::{Captures, Regex};
use std::{
    path::Path,
    sync::{Arc, OnceLock},
};

/// Tags whose `href` participates in reference rewriting.
const HREF_TAGS: &str = "a|area|base|link";
/// Tags whose `src` participates in reference rewriting.
const SRC_TAGS: &str = "audio|embed|iframe|img|input|script|source|track|video";

fn href_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r#"(?is)(<(?:{HREF_TAGS})\b[^>]*?\bhref=")([^"]*)(")"#))
            .expect("hardcoded pattern")
    })
}

fn src_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r#"(?is)(<(?:{SRC_TAGS})\b[^>]*?\bsrc=")([^"]*)(")"#))
            .expect("hardcoded pattern")
    })
}

fn data_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<doctool:data\b([^>]*?)/>"#).expect("hardcoded pattern")
    })
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"(?is)\b{name}="([^"]*)""#);
    Regex::new(&pattern)
        .expect("hardcoded pattern")
        .captures(attrs)
        .map(|c| c[1].to_string())
}

pub struct HtmlContentProvider;

impl HtmlContentProvider {
    fn rewrite_references(&self, context: &RenderContext, html: &str) -> String {
        let rewrite = |captures: &Captures| {
            format!(
                "{}{}{}",
                &captures[1],
                context.resolve_url(&captures[2], None),
                &captures[3]
            )
        };

        let html = href_pattern().replace_all(html, rewrite);
        src_pattern().replace_all(&html, rewrite).into_owned()
    }

    fn expand_data_tags(&self, html: &str, data: &DataObject) -> String {
        data_pattern()
            .replace_all(html, |captures: &Captures| {
                let attrs = &captures[1];
                let Some(key) = attribute(attrs, "key") else {
                    return captures[0].to_string();
                };
                let Some(value) = data.get(&key) else {
                    return captures[0].to_string();
                };

                let text = escape_html(&value.to_string());
                match attribute(attrs, "element") {
                    Some(element) => format!("<{element}>{text}</{element}>"),
                    None => text,
                }
            })
            .into_owned()
    }
}

impl ContentProvider for HtmlContentProvider {
    fn render(
        &self,
        context: &RenderContext,
        _location: &Path,
        source: &[u8],
        data: &DataObject,
    ) -> Result<Vec<u8>> {
        let html = std::str::from_utf8(source)?;
        let html = self.rewrite_references(context, html);
        let html = self.expand_data_tags(&html, data);
        Ok(html.into_bytes())
    }
}

pub struct HtmlPrinterProvider;

impl PrinterProvider for HtmlPrinterProvider {
    fn default_extension(&self) -> &str {
        "html"
    }

    fn render(
        &self,
        _context: &RenderContext,
        source: &[u8],
        _data: &DataObject,
    ) -> Result<Vec<u8>> {
        let text = std::str::from_utf8(source)?;

        // The pipeline prepends a synthesized <head> fragment when the
        // document declares a title or stylesheets.
        let (head, body) = match text.strip_prefix("<head>").and_then(|rest| rest.split_once("</head>")) {
            Some((head, body)) => (head, body),
            None => ("", text),
        };

        let html = format!(
            "<!DOCTYPE html>\n<html>\n<head>{head}</head>\n<body>\n{body}\n</body>\n</html>\n"
        );
        Ok(html.into_bytes())
    }
}

pub fn plugin() -> Result<PluginValues> {
    let mut values = PluginValues::default();
    values
        .content_providers
        .insert(".html".into(), Arc::new(HtmlContentProvider));
    values
        .printer_providers
        .insert("html".into(), Arc::new(HtmlPrinterProvider));
    Ok(values)
}

// ============================================================================
// Tests
// ============================================================================
