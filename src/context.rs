//! Per-document render context.
//!
//! A [`RenderContext`] gives a provider everything it needs to resolve
//! logical names to concrete resources without knowing the document model:
//! path lookups across the namespace/shared search order, URL resolution with
//! deferred media compilation, and nested content rendering.
//!
//! # Deferred media jobs
//!
//! `resolve_url` never compiles media synchronously. Reference rewriting is a
//! single streaming pass, so the URL of a derived artifact must be known
//! immediately; the expensive compilation is pushed onto a pending-job list
//! and executed when the surrounding build calls [`RenderContext::await_all`].
//! Jobs may enqueue further jobs through their own child contexts; the join
//! loops until the shared list drains empty.

use crate::{
    config::{Config, DataObject, DirectoryKind, Document},
    error::{BuildError, ProviderKind},
    log,
    registry::Registry,
};
use anyhow::{Context as _, Result};
use parking_lot::Mutex;
use rayon::prelude::*;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

type Job = Box<dyn FnOnce() -> Result<()> + Send>;

/// Deferred side-effect jobs, shared between a build's root context and every
/// child context spawned during that build.
///
/// Jobs are keyed by their output path: resolving the same reference twice in
/// one build must not queue two writers racing for the same cache file, so a
/// repeat enqueue is dropped and the caller reuses the first job's URL.
#[derive(Clone, Default)]
struct PendingJobs {
    inner: Arc<Mutex<JobState>>,
}

#[derive(Default)]
struct JobState {
    jobs: Vec<Job>,
    queued: FxHashSet<PathBuf>,
}

impl PendingJobs {
    fn push(&self, output: &Path, job: Job) {
        let mut state = self.inner.lock();
        if state.queued.insert(output.to_path_buf()) {
            state.jobs.push(job);
        }
    }

    fn take(&self) -> Vec<Job> {
        std::mem::take(&mut self.inner.lock().jobs)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }
}

/// Ephemeral per-build helper resolving paths and URLs for one document.
///
/// Created at the start of a render, dropped after `await_all` resolves;
/// never shared or reused across documents.
pub struct RenderContext {
    config: Arc<Config>,
    registry: Arc<Registry>,
    document_id: String,
    document: Arc<Document>,
    data: DataObject,
    /// The file currently being processed, used to resolve relative
    /// references.
    origin: Option<PathBuf>,
    jobs: PendingJobs,
}

fn is_absolute_url(name: &str) -> bool {
    static SCHEME: OnceLock<Regex> = OnceLock::new();
    SCHEME
        .get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").expect("hardcoded pattern"))
        .is_match(name)
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Extension of a path as a dot-prefixed registry key (`.scss`).
fn extension_key(path: &Path) -> Option<String> {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| format!(".{ext}"))
}

impl RenderContext {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<Registry>,
        document_id: impl Into<String>,
        document: Arc<Document>,
        data: DataObject,
    ) -> Self {
        Self {
            config,
            registry,
            document_id: document_id.into(),
            document,
            data,
            origin: None,
            jobs: PendingJobs::default(),
        }
    }

    /// Sibling context for one document part, sharing the pending-job list.
    pub fn with_data(&self, data: DataObject) -> Self {
        Self {
            config: self.config.clone(),
            registry: self.registry.clone(),
            document_id: self.document_id.clone(),
            document: self.document.clone(),
            data,
            origin: None,
            jobs: self.jobs.clone(),
        }
    }

    fn child(&self, origin: Option<PathBuf>) -> Self {
        Self {
            config: self.config.clone(),
            registry: self.registry.clone(),
            document_id: self.document_id.clone(),
            document: self.document.clone(),
            data: self.data.clone(),
            origin,
            jobs: self.jobs.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Path resolution
    // ------------------------------------------------------------------------

    /// Resolve a logical name under a directory kind.
    ///
    /// Fragment references (`#...`) denote in-document anchors and pass
    /// through unchanged. Lookups try the document's namespace root first,
    /// then the shared directory when one is configured.
    pub fn resolve_path(&self, kind: DirectoryKind, name: &str) -> Result<PathBuf, BuildError> {
        if name.starts_with('#') {
            return Ok(PathBuf::from(name));
        }

        let directory = self.config.directories.get(kind);
        let location = self
            .config
            .base_path(&self.document)
            .join(directory)
            .join(name);
        if location.exists() {
            return Ok(location);
        }

        if self.config.directories.namespaces
            && let Some(shared) = &self.config.directories.shared
        {
            let shared_location = self
                .config
                .working_directory
                .join(shared)
                .join(directory)
                .join(name);
            if shared_location.exists() {
                return Ok(shared_location);
            }
        }

        Err(BuildError::PathNotFound {
            directory: kind,
            name: name.to_string(),
        })
    }

    // ------------------------------------------------------------------------
    // URL resolution
    // ------------------------------------------------------------------------

    /// Resolve a reference to a URL, deferring derived-media compilation.
    ///
    /// Fragments and syntactically absolute URLs pass through unchanged. A
    /// relative reference is resolved against `origin` (falling back to this
    /// context's own origin), then against the asset directory. When the
    /// resolved file's extension is claimed by a media provider, the returned
    /// URL points at a deterministic cache location that only exists after
    /// `await_all`. Any failure is non-fatal: a warning is logged and the
    /// reference passes through unresolved.
    pub fn resolve_url(&self, name: &str, origin: Option<&Path>) -> String {
        if name.starts_with('#') || is_absolute_url(name) {
            return name.to_string();
        }

        match self.resolve_url_inner(name, origin) {
            Ok(url) => url,
            Err(err) => {
                log!("warn"; "could not resolve `{name}` for {}: {err:#}", self.document_id);
                name.to_string()
            }
        }
    }

    fn resolve_url_inner(&self, name: &str, origin: Option<&Path>) -> Result<String> {
        let origin = origin.or(self.origin.as_deref());
        let location = self.locate_reference(name, origin)?;

        let extension =
            extension_key(&location).ok_or(BuildError::MissingExtension(location.clone()))?;
        let provider = self
            .registry
            .media_provider(&extension)
            .ok_or(BuildError::NoProviderForKey {
                kind: ProviderKind::Media,
                key: extension,
            })?
            .clone();

        Ok(self.enqueue_media_job(provider, location, origin.map(Path::to_path_buf)))
    }

    /// Origin-relative resolution first, asset directory second.
    fn locate_reference(&self, name: &str, origin: Option<&Path>) -> Result<PathBuf> {
        if let Some(origin) = origin {
            let base = if origin.is_dir() {
                origin
            } else {
                origin.parent().unwrap_or(origin)
            };
            let relative = base.join(name);
            if relative.exists() {
                return Ok(relative);
            }
        }

        Ok(self.resolve_path(DirectoryKind::Asset, name)?)
    }

    /// Queue a media render targeting a cache file derived from the source
    /// path, and return the URL of that not-yet-written file.
    fn enqueue_media_job(
        &self,
        provider: Arc<dyn crate::provider::MediaProvider>,
        location: PathBuf,
        origin: Option<PathBuf>,
    ) -> String {
        let output = self.media_cache_path(&location, provider.default_extension());
        let url = file_url(&output);

        let child = self.child(Some(location.clone()));
        let target = output.clone();
        self.jobs.push(
            &output,
            Box::new(move || {
                let source = fs::read(&location).with_context(|| {
                    format!("failed to read media source {}", location.display())
                })?;
                let rendered = provider
                    .render(&child, origin.as_deref(), &location, &source)
                    .with_context(|| format!("media render failed for {}", location.display()))?;

                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&target, rendered)
                    .with_context(|| format!("failed to write {}", target.display()))?;
                Ok(())
            }),
        );

        url
    }

    /// Deterministic cache location: hash of the resolving file's path plus
    /// the provider's declared output extension. Keyed on the path, not the
    /// content, so an in-place edit without a path change can serve a stale
    /// artifact until the cache directory is cleared.
    fn media_cache_path(&self, location: &Path, extension: &str) -> PathBuf {
        let digest = blake3::hash(location.as_os_str().as_encoded_bytes());
        let name = hex::encode(&digest.as_bytes()[..16]);
        let extension = extension.trim_start_matches('.');

        self.config
            .base_path(&self.document)
            .join(&self.config.directories.cache)
            .join(format!("{name}.{extension}"))
    }

    // ------------------------------------------------------------------------
    // Content rendering
    // ------------------------------------------------------------------------

    /// Render a content-or-template file by logical name.
    ///
    /// Tries the content directory then the template directory, first match
    /// wins; within a directory the basename may be given without its
    /// extension. Dispatches to the content provider registered for the
    /// file's extension.
    pub fn render_content(&self, name: &str) -> Result<Vec<u8>, BuildError> {
        let location = [DirectoryKind::Content, DirectoryKind::Template]
            .into_iter()
            .find_map(|kind| self.find_file(kind, name))
            .ok_or_else(|| BuildError::FileNotFound {
                directory: DirectoryKind::Content,
                name: name.to_string(),
            })?;

        let extension =
            extension_key(&location).ok_or_else(|| BuildError::MissingExtension(location.clone()))?;
        let provider = self
            .registry
            .content_provider(&extension)
            .ok_or_else(|| BuildError::NoProviderForKey {
                kind: ProviderKind::Content,
                key: extension.clone(),
            })?
            .clone();

        let source =
            fs::read(&location).map_err(|err| BuildError::Io(location.clone(), err))?;

        let child = self.child(Some(location.clone()));
        provider
            .render(&child, &location, &source, &self.data)
            .map_err(|source| BuildError::ProviderRenderFailed {
                kind: ProviderKind::Content,
                key: extension,
                location: location.display().to_string(),
                source,
            })
    }

    /// Locate a file by logical name under a directory kind, searching the
    /// namespace root then the shared directory. An exact basename match wins
    /// over a match ignoring the extension.
    fn find_file(&self, kind: DirectoryKind, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let file_name = relative.file_name()?;
        let parent = relative.parent().unwrap_or(Path::new(""));
        let directory = self.config.directories.get(kind);

        let mut bases = vec![self.config.base_path(&self.document)];
        if self.config.directories.namespaces
            && let Some(shared) = &self.config.directories.shared
        {
            bases.push(self.config.working_directory.join(shared));
        }

        bases
            .into_iter()
            .find_map(|base| match_in_directory(&base.join(directory).join(parent), file_name))
    }

    // ------------------------------------------------------------------------
    // Side-effect synchronization
    // ------------------------------------------------------------------------

    /// Structured join over every pending job, including jobs enqueued
    /// transitively while earlier ones ran. URLs handed out by `resolve_url`
    /// are only valid once this returns.
    pub fn await_all(&self) -> Result<()> {
        loop {
            let batch = self.jobs.take();
            if batch.is_empty() {
                return Ok(());
            }
            batch.into_par_iter().try_for_each(|job| job())?;
        }
    }
}

fn match_in_directory(directory: &Path, file_name: &OsStr) -> Option<PathBuf> {
    let entries = fs::read_dir(directory).ok()?;

    let mut stem_match = None;
    for entry in entries.flatten() {
        if entry.file_name() == file_name {
            return Some(entry.path());
        }
        let path = entry.path();
        if stem_match.is_none() && path.file_stem() == Some(file_name) {
            stem_match = Some(path);
        }
    }
    stem_match
}

// ============================================================================
// Tests
// ============================================================================
