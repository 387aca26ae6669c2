//! Plugin API: the four provider capability contracts.
//!
//! A plugin is a factory returning [`PluginValues`], a set of capability maps
//! keyed by file extension (content, media) or provider name (printer, post).
//! Providers are stateless; everything they need to resolve names to concrete
//! resources comes through the [`RenderContext`] they are handed.

use crate::{config::DataObject, context::RenderContext};
use anyhow::Result;
use std::{collections::HashMap, path::Path, sync::Arc};

/// Renders one content or template file into output bytes.
///
/// Registered by file extension including the leading dot (`.md`, `.html`).
pub trait ContentProvider: Send + Sync {
    /// `location` is the file being rendered and becomes the origin for
    /// relative references resolved through the context.
    fn render(
        &self,
        context: &RenderContext,
        location: &Path,
        source: &[u8],
        data: &DataObject,
    ) -> Result<Vec<u8>>;
}

/// Compiles a non-document asset (stylesheet, diagram) into cacheable output.
///
/// Registered by file extension including the leading dot (`.scss`, `.puml`).
pub trait MediaProvider: Send + Sync {
    /// Extension of produced artifacts, with or without a leading dot.
    fn default_extension(&self) -> &str;

    /// `origin` is the file the media was referenced from, when known.
    fn render(
        &self,
        context: &RenderContext,
        origin: Option<&Path>,
        location: &Path,
        source: &[u8],
    ) -> Result<Vec<u8>>;
}

/// Renders the fully assembled document body into the final output format.
///
/// Registered by an arbitrary provider name (`html`, `weasyprint`).
pub trait PrinterProvider: Send + Sync {
    /// Appended to the output file name when the document declares none.
    fn default_extension(&self) -> &str;

    fn render(&self, context: &RenderContext, source: &[u8], data: &DataObject)
    -> Result<Vec<u8>>;
}

/// Structural post-processing over a fully printed byte stream, such as
/// table-of-contents or metadata injection.
pub trait PostProvider: Send + Sync {
    fn render(&self, context: &RenderContext, source: &[u8], data: &DataObject)
    -> Result<Vec<u8>>;
}

/// Capability maps returned by a plugin factory. All members are optional;
/// an empty map contributes nothing.
#[derive(Default)]
pub struct PluginValues {
    pub content_providers: HashMap<String, Arc<dyn ContentProvider>>,
    pub media_providers: HashMap<String, Arc<dyn MediaProvider>>,
    pub printer_providers: HashMap<String, Arc<dyn PrinterProvider>>,
    pub post_providers: HashMap<String, Arc<dyn PostProvider>>,
}
