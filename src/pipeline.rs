//! Document build pipeline.
//!
//! Linear state machine per document: validate providers, render parts,
//! assemble, await side effects, print, post-process, write. Parts render
//! concurrently but concatenate in manifest order. Batch builds isolate
//! per-document failures: every document is attempted and failures are
//! reported together at the end.

use crate::{
    config::{Config, Document},
    context::RenderContext,
    error::{BuildError, ProviderKind},
    log,
    registry::Registry,
};
use anyhow::{Context as _, Result, bail};
use rayon::prelude::*;
use std::{fs, path::PathBuf, sync::Arc};

/// Build every document in the manifest.
///
/// A failure in one document does not prevent attempted builds of the
/// others; all failures surface in one summary error.
pub fn build_documents(config: &Arc<Config>, registry: &Arc<Registry>) -> Result<()> {
    let failed: Vec<String> = config
        .documents
        .par_iter()
        .filter_map(|(id, document)| {
            if let Err(err) = build_document(config, registry, id, document) {
                log!("error"; "{id}: {err:#}");
                Some(id.clone())
            } else {
                None
            }
        })
        .collect();

    if failed.is_empty() {
        Ok(())
    } else {
        bail!(
            "{} of {} documents failed: {}",
            failed.len(),
            config.documents.len(),
            failed.join(", ")
        )
    }
}

/// Build one document to its output file.
pub fn build_document(
    config: &Arc<Config>,
    registry: &Arc<Registry>,
    id: &str,
    document: &Document,
) -> Result<()> {
    log!("build"; "building {id}");

    // Fail fast before rendering anything.
    let printer = registry
        .printer_provider(&document.printer)
        .ok_or_else(|| BuildError::NoProviderForKey {
            kind: ProviderKind::Printer,
            key: document.printer.clone(),
        })?
        .clone();

    let document = Arc::new(document.clone());
    let context = RenderContext::new(
        config.clone(),
        registry.clone(),
        id,
        document.clone(),
        document.with.clone(),
    );

    // Parts are independent; concatenation order must follow the manifest
    // regardless of completion order.
    let parts: Vec<Vec<u8>> = document
        .document
        .par_iter()
        .map(|part| {
            context
                .with_data(part.with.clone())
                .render_content(&part.template)
                .with_context(|| format!("part `{}`", part.template))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut assembled = Vec::new();
    if document.title.is_some() || !document.css.is_empty() {
        assembled.extend_from_slice(head_fragment(&context, &document).as_bytes());
    }
    for part in parts {
        assembled.extend_from_slice(&part);
    }

    // Media jobs enqueued while resolving asset/CSS URLs must land before
    // printing.
    context.await_all()?;

    let mut output = printer
        .render(&context, &assembled, &document.with)
        .map_err(|source| BuildError::ProviderRenderFailed {
            kind: ProviderKind::Printer,
            key: document.printer.clone(),
            location: id.to_string(),
            source,
        })?;
    context.await_all()?;

    for key in &document.post {
        let post = registry
            .post_provider(key)
            .ok_or_else(|| BuildError::NoProviderForKey {
                kind: ProviderKind::Post,
                key: key.clone(),
            })?;
        output = post
            .render(&context, &output, &document.with)
            .map_err(|source| BuildError::ProviderRenderFailed {
                kind: ProviderKind::Post,
                key: key.clone(),
                location: id.to_string(),
                source,
            })?;
        context.await_all()?;
    }

    let path = output_path(config, &document, printer.default_extension());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, output).with_context(|| format!("failed to write {}", path.display()))?;

    log!("build"; "{id} -> {}", path.display());
    Ok(())
}

/// Output location under dist, appending the printer's default extension
/// when the declared file has none. The dot is inserted exactly once even if
/// the extension already carries one.
fn output_path(config: &Config, document: &Document, default_extension: &str) -> PathBuf {
    let mut path = config
        .working_directory
        .join(&config.directories.dist)
        .join(&document.file);

    if path.extension().is_none() {
        path.set_extension(default_extension.trim_start_matches('.'));
    }
    path
}

/// Synthesized `<head>` fragment for documents declaring a title or CSS.
fn head_fragment(context: &RenderContext, document: &Document) -> String {
    let mut head = String::from("<head>");
    if let Some(title) = &document.title {
        head.push_str("<title>");
        head.push_str(&escape_html(title));
        head.push_str("</title>");
    }
    for css in &document.css {
        let href = context.resolve_url(css, None);
        head.push_str("<link rel=\"stylesheet\" href=\"");
        head.push_str(&escape_html(&href));
        head.push_str("\">");
    }
    head.push_str("</head>");
    head
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataObject, DocumentPart};
    use crate::provider::{ContentProvider, PluginValues, PostProvider, PrinterProvider};
    use crate::registry::PluginLoader;
    use std::{collections::BTreeMap, path::Path, thread, time::Duration};
    use tempfile::{TempDir, tempdir};

    /// Echoes the part's file content; sleeps on demand so an early part can
    /// finish after a later one.
    struct SlowEcho;

    impl ContentProvider for SlowEcho {
        fn render(
            &self,
            _context: &RenderContext,
            location: &Path,
            source: &[u8],
            _data: &DataObject,
        ) -> anyhow::Result<Vec<u8>> {
            if location.file_name().is_some_and(|n| n == "a.html") {
                thread::sleep(Duration::from_millis(50));
            }
            Ok(source.to_vec())
        }
    }

    struct PassPrinter {
        extension: &'static str,
    }

    impl PrinterProvider for PassPrinter {
        fn default_extension(&self) -> &str {
            self.extension
        }

        fn render(
            &self,
            _context: &RenderContext,
            source: &[u8],
            _data: &DataObject,
        ) -> anyhow::Result<Vec<u8>> {
            Ok(source.to_vec())
        }
    }

    struct SuffixPost;

    impl PostProvider for SuffixPost {
        fn render(
            &self,
            _context: &RenderContext,
            source: &[u8],
            _data: &DataObject,
        ) -> anyhow::Result<Vec<u8>> {
            let mut out = source.to_vec();
            out.extend_from_slice(b"+post");
            Ok(out)
        }
    }

    fn session(root: &TempDir, documents: BTreeMap<String, Document>) -> (Arc<Config>, Arc<Registry>) {
        let config = Config {
            working_directory: root.path().to_path_buf(),
            manifest_location: root.path().join("doctool.yaml"),
            plugins: vec!["test".into()],
            documents,
            ..Config::default()
        };

        let mut loader = PluginLoader::new();
        loader.register("test", || {
            let mut values = PluginValues::default();
            values
                .content_providers
                .insert(".html".into(), Arc::new(SlowEcho));
            values
                .printer_providers
                .insert("pass".into(), Arc::new(PassPrinter { extension: "html" }));
            values
                .printer_providers
                .insert("dotted".into(), Arc::new(PassPrinter { extension: ".html" }));
            values
                .post_providers
                .insert("suffix".into(), Arc::new(SuffixPost));
            Ok(values)
        });

        let mut registry = Registry::new();
        registry.validate_plugins(&config, &loader).unwrap();
        (Arc::new(config), Arc::new(registry))
    }

    fn document(file: &str, printer: &str, parts: &[&str]) -> Document {
        Document {
            namespace: Some("doc".into()),
            file: PathBuf::from(file),
            printer: printer.into(),
            with: DataObject::new(),
            title: None,
            css: vec![],
            post: vec![],
            document: parts
                .iter()
                .map(|template| DocumentPart {
                    template: (*template).to_string(),
                    with: DataObject::new(),
                })
                .collect(),
        }
    }

    fn write(root: &TempDir, relative: &str, content: &str) {
        let path = root.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
    }

    #[test]
    fn test_output_path_appends_default_extension_once() {
        let config = Config {
            working_directory: PathBuf::from("/work"),
            ..Config::default()
        };

        let plain = document("report", "pass", &[]);
        let path = output_path(&config, &plain, "html");
        assert_eq!(path, PathBuf::from("/work/dist/report.html"));

        // A leading dot on the extension must not double up.
        let path = output_path(&config, &plain, ".html");
        assert_eq!(path, PathBuf::from("/work/dist/report.html"));

        let explicit = document("report.pdf", "pass", &[]);
        let path = output_path(&config, &explicit, "html");
        assert_eq!(path, PathBuf::from("/work/dist/report.pdf"));
    }

    #[test]
    fn test_parts_concatenate_in_manifest_order() {
        let root = tempdir().unwrap();
        write(&root, "content/a.html", "A");
        write(&root, "content/b.html", "B");
        write(&root, "content/c.html", "C");

        let mut documents = BTreeMap::new();
        documents.insert("out".to_string(), document("out", "pass", &["a", "b", "c"]));
        let (config, registry) = session(&root, documents);

        build_document(&config, &registry, "out", &config.documents["out"]).unwrap();

        let output = fs::read_to_string(root.path().join("dist/out.html")).unwrap();
        assert_eq!(output, "ABC");
    }

    #[test]
    fn test_head_fragment_escapes_title_and_links_css() {
        let root = tempdir().unwrap();
        write(&root, "content/a.html", "body");

        let mut doc = document("out", "pass", &["a"]);
        doc.title = Some("Q&A <guide>".into());
        doc.css = vec!["https://cdn.example.com/x.css".into()];

        let mut documents = BTreeMap::new();
        documents.insert("out".to_string(), doc);
        let (config, registry) = session(&root, documents);

        build_document(&config, &registry, "out", &config.documents["out"]).unwrap();

        let output = fs::read_to_string(root.path().join("dist/out.html")).unwrap();
        assert!(output.contains("<title>Q&amp;A &lt;guide&gt;</title>"));
        assert!(output.contains("<link rel=\"stylesheet\" href=\"https://cdn.example.com/x.css\">"));
        assert!(output.ends_with("</head>body"));
    }

    #[test]
    fn test_post_providers_apply_in_order() {
        let root = tempdir().unwrap();
        write(&root, "content/a.html", "body");

        let mut doc = document("out", "pass", &["a"]);
        doc.post = vec!["suffix".into(), "suffix".into()];

        let mut documents = BTreeMap::new();
        documents.insert("out".to_string(), doc);
        let (config, registry) = session(&root, documents);

        build_document(&config, &registry, "out", &config.documents["out"]).unwrap();

        let output = fs::read_to_string(root.path().join("dist/out.html")).unwrap();
        assert_eq!(output, "body+post+post");
    }

    #[test]
    fn test_missing_printer_fails_fast() {
        let root = tempdir().unwrap();
        let mut documents = BTreeMap::new();
        documents.insert("out".to_string(), document("out", "ghost", &[]));
        let (config, registry) = session(&root, documents);

        let err = build_document(&config, &registry, "out", &config.documents["out"]).unwrap_err();
        let build_err = err.downcast_ref::<BuildError>().unwrap();
        assert!(matches!(
            build_err,
            BuildError::NoProviderForKey { kind: ProviderKind::Printer, .. }
        ));
    }

    #[test]
    fn test_batch_build_isolates_failures() {
        let root = tempdir().unwrap();
        write(&root, "content/a.html", "A");

        let mut documents = BTreeMap::new();
        documents.insert("good".to_string(), document("good", "pass", &["a"]));
        documents.insert("bad".to_string(), document("bad", "ghost", &[]));
        let (config, registry) = session(&root, documents);

        let err = build_documents(&config, &registry).unwrap_err();
        assert!(err.to_string().contains("1 of 2"));
        // The sibling still built.
        assert!(root.path().join("dist/good.html").exists());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a & b"), "a &amp; b");
        assert_eq!(escape_html("<\"'>"), "&lt;&quot;&#39;&gt;");
        assert_eq!(escape_html("plain"), "plain");
    }
}
