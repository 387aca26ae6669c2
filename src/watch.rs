//! Incremental file watcher.
//!
//! Maintains a live mapping from watched filesystem paths to affected
//! document ids and rebuilds only what a change touches.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌──────────┐    ┌────────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer│───▶│    Pending::take()     │  │
//! │  │ events   │    │ (300ms)  │    │                        │  │
//! │  └──────────┘    └──────────┘    │  ┌──────────────────┐  │  │
//! │                                  │  │ Reload           │  │  │
//! │                                  │  │ (manifest edit)  │  │  │
//! │                                  │  └──────────────────┘  │  │
//! │                                  │  ┌──────────────────┐  │  │
//! │                                  │  │ Scoped rebuild   │  │  │
//! │                                  │  │ (content/assets) │  │  │
//! │                                  │  └──────────────────┘  │  │
//! │                                  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A manifest edit invalidates the whole path index: the configuration is
//! re-read, plugins re-validated, watches re-installed and everything is
//! rebuilt. Any other change is routed through the index by path prefix,
//! because a namespace root is a directory and any file beneath it counts as
//! a change to that namespace's document.

use crate::{
    config::Config,
    log,
    pipeline::{build_document, build_documents},
    registry::{PluginLoader, Registry},
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
    time::{Duration, Instant},
};

const DEBOUNCE_MS: u64 = 300;

/// Extensions that mark a file as the manifest format.
const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml"];

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

fn is_manifest_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext))
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Watch Index
// =============================================================================

/// Which documents a watched path affects.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Document(String),
    All,
}

/// Flat path → document routing table, rebuilt whenever the configuration
/// changes.
struct WatchIndex {
    entries: Vec<(PathBuf, Target)>,
}

impl WatchIndex {
    fn from_config(config: &Config) -> Self {
        let mut entries = vec![(config.manifest_location.clone(), Target::All)];

        if config.directories.namespaces {
            for (id, document) in &config.documents {
                if let Some(namespace) = &document.namespace {
                    entries.push((
                        config.working_directory.join(namespace),
                        Target::Document(id.clone()),
                    ));
                }
            }
            if let Some(shared) = &config.directories.shared {
                entries.push((config.working_directory.join(shared), Target::All));
            }
        } else {
            for directory in [
                &config.directories.content,
                &config.directories.template,
                &config.directories.asset,
            ] {
                entries.push((config.working_directory.join(directory), Target::All));
            }
        }

        Self { entries }
    }
}

// =============================================================================
// Pending State
// =============================================================================

/// Rebuild scope accumulated between debounce fires.
///
/// Once the wildcard is recorded the set is never refined further until the
/// next fire; a confirmed manifest change subsumes everything.
#[derive(Default)]
struct Pending {
    all: bool,
    documents: FxHashSet<String>,
    config_change: bool,
}

/// One atomic snapshot of the pending scope.
#[derive(Debug, PartialEq, Eq)]
enum Fire {
    Reload,
    All,
    Documents(Vec<String>),
    Nothing,
}

impl Pending {
    fn note(&mut self, index: &WatchIndex, path: &Path, initial_build_done: bool) {
        if is_manifest_file(path) && initial_build_done {
            self.config_change = true;
            return;
        }

        if self.all {
            return;
        }

        for (base, target) in &index.entries {
            if path.starts_with(base) {
                match target {
                    Target::All => {
                        self.all = true;
                        self.documents.clear();
                        return;
                    }
                    Target::Document(id) => {
                        self.documents.insert(id.clone());
                    }
                }
            }
        }
    }

    fn take(&mut self) -> Fire {
        let fire = if self.config_change {
            // The next full load supersedes partial knowledge.
            Fire::Reload
        } else if self.all {
            Fire::All
        } else if self.documents.is_empty() {
            Fire::Nothing
        } else {
            let mut documents: Vec<String> = self.documents.drain().collect();
            documents.sort_unstable();
            Fire::Documents(documents)
        };

        self.all = false;
        self.config_change = false;
        self.documents.clear();
        fire
    }
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events; editors emit several events per logical save.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Watcher Setup
// =============================================================================

fn install_watches(
    tx: mpsc::Sender<notify::Result<Event>>,
    index: &WatchIndex,
) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(tx).context("failed to create file watcher")?;

    for (path, _) in &index.entries {
        if path.exists() {
            let mode = if path.is_dir() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher
                .watch(path, mode)
                .with_context(|| format!("failed to watch {}", path.display()))?;
        } else {
            // Picked up on the next manifest reload once the path exists.
            log!("watch"; "not watching missing path {}", path.display());
        }
    }

    Ok(watcher)
}

fn reload_config(config: &Config) -> Result<Arc<Config>> {
    let reloaded = Config::load(&config.working_directory, &config.manifest_location)?;
    reloaded.validate()?;
    Ok(Arc::new(reloaded))
}

// =============================================================================
// Public API
// =============================================================================

/// Build everything, then watch for changes and rebuild affected documents.
///
/// Rebuild failures are reported and the watcher continues observing; only a
/// broken watch subscription ends the loop.
pub fn watch_for_changes(
    mut config: Arc<Config>,
    mut registry: Arc<Registry>,
    loader: &PluginLoader,
) -> Result<()> {
    if let Err(err) = build_documents(&config, &registry) {
        log!("error"; "initial build failed: {err:#}");
    }
    let initial_build_done = true;

    let (tx, rx) = mpsc::channel();
    let mut index = WatchIndex::from_config(&config);
    let mut watcher = install_watches(tx.clone(), &index)?;
    log!("watch"; "watching {} paths", index.entries.len());

    let mut debouncer = Debouncer::new();
    let mut pending = Pending::default();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event),
            Ok(Err(err)) => log!("watch"; "error: {err}"),
            Err(mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                for path in debouncer.take() {
                    pending.note(&index, &path, initial_build_done);
                }

                match pending.take() {
                    Fire::Reload => {
                        log!("watch"; "manifest changed, reloading configuration");
                        // Close old subscriptions before installing new ones
                        // to avoid duplicate event delivery.
                        drop(watcher);
                        match reload_session(&config, loader) {
                            Ok((new_config, new_registry)) => {
                                config = new_config;
                                registry = new_registry;
                                index = WatchIndex::from_config(&config);
                            }
                            Err(err) => {
                                log!("error"; "reload failed, keeping previous configuration: {err:#}");
                            }
                        }
                        watcher = install_watches(tx.clone(), &index)?;

                        if let Err(err) = build_documents(&config, &registry) {
                            log!("error"; "rebuild failed: {err:#}");
                        }
                    }
                    Fire::All => {
                        if let Err(err) = build_documents(&config, &registry) {
                            log!("error"; "rebuild failed: {err:#}");
                        }
                    }
                    Fire::Documents(ids) => {
                        for id in ids {
                            match config.documents.get(&id) {
                                Some(document) => {
                                    if let Err(err) =
                                        build_document(&config, &registry, &id, document)
                                    {
                                        log!("error"; "{id}: {err:#}");
                                    }
                                }
                                None => log!("watch"; "stale index entry for `{id}`, ignoring"),
                            }
                        }
                    }
                    Fire::Nothing => {}
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
            // Irrelevant events, timeout without pending work.
            _ => {}
        }
    }

    Ok(())
}

fn reload_session(
    config: &Config,
    loader: &PluginLoader,
) -> Result<(Arc<Config>, Arc<Registry>)> {
    let config = reload_config(config)?;
    let mut registry = Registry::new();
    registry.validate_plugins(&config, loader)?;
    Ok((config, Arc::new(registry)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataObject, Directories, Document};
    use std::collections::BTreeMap;

    fn document(namespace: &str) -> Document {
        Document {
            namespace: Some(namespace.into()),
            file: PathBuf::from(namespace),
            printer: "html".into(),
            with: DataObject::new(),
            title: None,
            css: vec![],
            post: vec![],
            document: vec![],
        }
    }

    fn namespaced_config() -> Config {
        let mut documents = BTreeMap::new();
        documents.insert("guide".to_string(), document("guide"));
        documents.insert("manual".to_string(), document("handbook"));

        Config {
            working_directory: PathBuf::from("/work"),
            manifest_location: PathBuf::from("/work/doctool.yaml"),
            directories: Directories {
                namespaces: true,
                shared: Some(PathBuf::from("shared")),
                ..Default::default()
            },
            documents,
            ..Config::default()
        }
    }

    #[test]
    fn test_index_maps_namespaces_and_shared() {
        let index = WatchIndex::from_config(&namespaced_config());

        assert!(index.entries.contains(&(
            PathBuf::from("/work/doctool.yaml"),
            Target::All
        )));
        assert!(index.entries.contains(&(
            PathBuf::from("/work/guide"),
            Target::Document("guide".into())
        )));
        assert!(index.entries.contains(&(
            PathBuf::from("/work/handbook"),
            Target::Document("manual".into())
        )));
        assert!(index
            .entries
            .contains(&(PathBuf::from("/work/shared"), Target::All)));
    }

    #[test]
    fn test_index_without_namespaces_is_all_wildcards() {
        let mut config = namespaced_config();
        config.directories.namespaces = false;

        let index = WatchIndex::from_config(&config);
        assert!(index.entries.iter().all(|(_, t)| *t == Target::All));
        assert!(index
            .entries
            .contains(&(PathBuf::from("/work/content"), Target::All)));
        assert!(index
            .entries
            .contains(&(PathBuf::from("/work/template"), Target::All)));
        assert!(index
            .entries
            .contains(&(PathBuf::from("/work/asset"), Target::All)));
    }

    #[test]
    fn test_change_under_namespace_scopes_to_document() {
        let config = namespaced_config();
        let index = WatchIndex::from_config(&config);
        let mut pending = Pending::default();

        pending.note(&index, Path::new("/work/guide/content/intro.html"), true);
        pending.note(&index, Path::new("/elsewhere/unrelated.txt"), true);

        assert_eq!(pending.take(), Fire::Documents(vec!["guide".into()]));
        // The snapshot cleared the accumulator.
        assert_eq!(pending.take(), Fire::Nothing);
    }

    #[test]
    fn test_wildcard_collapse_is_sticky() {
        let config = namespaced_config();
        let index = WatchIndex::from_config(&config);
        let mut pending = Pending::default();

        pending.note(&index, Path::new("/work/guide/content/intro.html"), true);
        pending.note(&index, Path::new("/work/shared/template/base.html"), true);
        pending.note(&index, Path::new("/work/handbook/content/ch1.html"), true);

        assert_eq!(pending.take(), Fire::All);
    }

    #[test]
    fn test_manifest_change_triggers_reload_only() {
        let config = namespaced_config();
        let index = WatchIndex::from_config(&config);
        let mut pending = Pending::default();

        pending.note(&index, Path::new("/work/guide/content/intro.html"), true);
        pending.note(&index, Path::new("/work/doctool.yaml"), true);

        // The reload subsumes the scoped set.
        assert_eq!(pending.take(), Fire::Reload);
        assert_eq!(pending.take(), Fire::Nothing);
    }

    #[test]
    fn test_manifest_change_before_initial_build_routes_normally() {
        let config = namespaced_config();
        let index = WatchIndex::from_config(&config);
        let mut pending = Pending::default();

        pending.note(&index, Path::new("/work/doctool.yaml"), false);
        assert_eq!(pending.take(), Fire::All);
    }

    #[test]
    fn test_deletion_events_trigger_rebuilds() {
        use notify::event::{AccessKind, CreateKind, RemoveKind};

        assert!(is_relevant(&Event::new(EventKind::Remove(RemoveKind::File))));
        assert!(is_relevant(&Event::new(EventKind::Create(CreateKind::File))));
        assert!(!is_relevant(&Event::new(EventKind::Access(
            AccessKind::Read
        ))));
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("/p/.intro.html.swp")));
        assert!(is_temp_file(Path::new("/p/intro.html~")));
        assert!(is_temp_file(Path::new("/p/intro.bak")));
        assert!(!is_temp_file(Path::new("/p/intro.html")));
    }

    #[test]
    fn test_is_manifest_file() {
        assert!(is_manifest_file(Path::new("/work/doctool.yaml")));
        assert!(is_manifest_file(Path::new("/work/other.yml")));
        assert!(!is_manifest_file(Path::new("/work/intro.html")));
    }
}
