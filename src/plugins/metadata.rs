//! Metadata post provider.
//!
//! Injects the document's data as `<title>`/`<meta>` tags right after the
//! opening `<head>` tag of an already-printed HTML stream. Documents without
//! a `<head>` pass through unchanged.

use crate::{
    config::DataObject,
    context::RenderContext,
    pipeline::escape_html,
    provider::{PluginValues, PostProvider},
};
use anyhow::Result;
use std::sync::Arc;

pub struct MetadataPostProvider;

fn metadata_fragment(data: &DataObject) -> String {
    let mut fragment = String::new();
    // The title leads the fragment regardless of key order.
    if let Some(title) = data.get("title") {
        fragment.push_str(&format!(
            "<title>{}</title>",
            escape_html(&title.to_string())
        ));
    }
    for (name, value) in data {
        if name == "title" {
            continue;
        }
        fragment.push_str(&format!(
            "<meta name=\"{}\" content=\"{}\">",
            escape_html(name),
            escape_html(&value.to_string())
        ));
    }
    fragment
}

impl PostProvider for MetadataPostProvider {
    fn render(
        &self,
        _context: &RenderContext,
        source: &[u8],
        data: &DataObject,
    ) -> Result<Vec<u8>> {
        let text = std::str::from_utf8(source)?;

        let Some(position) = text.find("<head>") else {
            return Ok(source.to_vec());
        };
        let insert_at = position + "<head>".len();

        let mut output = String::with_capacity(text.len());
        output.push_str(&text[..insert_at]);
        output.push_str(&metadata_fragment(data));
        output.push_str(&text[insert_at..]);
        Ok(output.into_bytes())
    }
}

pub fn plugin() -> Result<PluginValues> {
    let mut values = PluginValues::default();
    values
        .post_providers
        .insert("metadata".into(), Arc::new(MetadataPostProvider));
    Ok(values)
}

// ============================================================================
// Tests
// ============================================================================
