//! Built-in plugin set.
//!
//! Covers plain HTML pipelines without any external plugins: an `.html`
//! content provider with reference rewriting, an `html` printer, and a
//! `metadata` post provider. Deployments embedding doctool as a library
//! register additional factories on the loader returned here.

mod html;
mod metadata;

use crate::registry::PluginLoader;

pub fn builtin_loader() -> PluginLoader {
    let mut loader = PluginLoader::new();
    loader.register("html", html::plugin);
    loader.register("metadata", metadata::plugin);
    loader
}
