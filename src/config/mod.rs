//! Build manifest configuration for `doctool.yaml`.
//!
//! # Sections
//!
//! | Section         | Purpose                                          |
//! |-----------------|--------------------------------------------------|
//! | `directories`   | Search roots (content, template, asset, ...)     |
//! | `plugins`       | Plugin ids to load into the provider registry    |
//! | `documents`     | Build targets, each a list of parts + a printer  |
//!
//! # Example
//!
//! ```yaml
//! directories:
//!   namespaces: true
//!   shared: shared
//!
//! plugins:
//!   - html
//!
//! documents:
//!   guide:
//!     file: guide
//!     printer: html
//!     title: User Guide
//!     css: style.scss
//!     document:
//!       - template: intro
//!       - template: chapter
//!         with:
//!           number: 1
//! ```
//!
//! `working_directory` and `manifest_location` are absolute paths set once by
//! the loader; they are never part of the on-disk manifest.

pub mod defaults;
mod error;

pub use error::ConfigError;

use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Data Values
// ============================================================================

/// Flat mapping of string keys to scalar values, the only data shape passed
/// into renderers.
pub type DataObject = BTreeMap<String, DataValue>;

/// A scalar manifest value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) if value.fract() == 0.0 && value.is_finite() => {
                write!(f, "{}", *value as i64)
            }
            Self::Number(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

// ============================================================================
// Directories
// ============================================================================

/// Logical directory kinds a lookup can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryKind {
    Content,
    Template,
    Asset,
    Cache,
    Dist,
}

impl fmt::Display for DirectoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Content => "content",
            Self::Template => "template",
            Self::Asset => "asset",
            Self::Cache => "cache",
            Self::Dist => "dist",
        };
        f.write_str(name)
    }
}

/// Search roots, each relative to a document's namespace root when
/// `namespaces` is enabled, or to the working directory otherwise.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Directories {
    #[serde(default = "defaults::r#false")]
    pub namespaces: bool,

    /// Secondary search root consulted when a namespaced lookup misses.
    #[serde(default)]
    pub shared: Option<PathBuf>,

    #[serde(default = "defaults::directories::content")]
    pub content: PathBuf,

    #[serde(default = "defaults::directories::template")]
    pub template: PathBuf,

    #[serde(default = "defaults::directories::asset")]
    pub asset: PathBuf,

    #[serde(default = "defaults::directories::cache")]
    pub cache: PathBuf,

    #[serde(default = "defaults::directories::dist")]
    pub dist: PathBuf,
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            namespaces: false,
            shared: None,
            content: defaults::directories::content(),
            template: defaults::directories::template(),
            asset: defaults::directories::asset(),
            cache: defaults::directories::cache(),
            dist: defaults::directories::dist(),
        }
    }
}

impl Directories {
    /// Relative path configured for a directory kind.
    pub fn get(&self, kind: DirectoryKind) -> &Path {
        match kind {
            DirectoryKind::Content => &self.content,
            DirectoryKind::Template => &self.template,
            DirectoryKind::Asset => &self.asset,
            DirectoryKind::Cache => &self.cache,
            DirectoryKind::Dist => &self.dist,
        }
    }
}

// ============================================================================
// Documents
// ============================================================================

/// One content/template reference plus its local data.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentPart {
    pub template: String,

    #[serde(default)]
    pub with: DataObject,
}

/// One named build target assembled from ordered parts and rendered by one
/// printer. Read-only after manifest load; only defaults are filled in.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    /// Namespace root, defaults to the document's own key.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Output file, relative to the dist directory.
    pub file: PathBuf,

    /// Printer provider key.
    pub printer: String,

    #[serde(default)]
    pub with: DataObject,

    #[serde(default)]
    pub title: Option<String>,

    /// Stylesheet references, a single entry or a list.
    #[serde(default, deserialize_with = "one_or_many")]
    pub css: Vec<String>,

    /// Post provider keys applied in order after printing.
    #[serde(default)]
    pub post: Vec<String>,

    pub document: Vec<DocumentPart>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing `doctool.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Absolute project root (set after loading).
    #[serde(skip)]
    pub working_directory: PathBuf,

    /// Absolute path to the manifest file (set after loading).
    #[serde(skip)]
    pub manifest_location: PathBuf,

    #[serde(default)]
    pub directories: Directories,

    #[serde(default)]
    pub plugins: Vec<String>,

    #[serde(default)]
    pub documents: BTreeMap<String, Document>,
}

impl Config {
    /// Read and normalize a manifest.
    ///
    /// Missing fields are overlaid with defaults, every document gets its key
    /// as namespace unless one is declared.
    pub fn load(working_directory: &Path, location: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(location)
            .map_err(|err| ConfigError::Io(location.to_path_buf(), err))?;
        let mut config: Config = serde_yaml::from_str(&raw)?;

        config.working_directory = working_directory.to_path_buf();
        config.manifest_location = location.to_path_buf();

        for (name, document) in &mut config.documents {
            if document.namespace.is_none() {
                document.namespace = Some(name.clone());
            }
        }

        Ok(config)
    }

    /// Structural-shape validation; document semantics are left to providers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (id, document) in &self.documents {
            if document.file.is_absolute() {
                return Err(ConfigError::Validation(format!(
                    "document `{id}`: `file` must be relative"
                )));
            }
            if document.printer.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "document `{id}`: `printer` must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// Namespace-aware base directory for a document's lookups.
    pub fn base_path(&self, document: &Document) -> PathBuf {
        let mut base = self.working_directory.clone();
        if self.directories.namespaces
            && let Some(namespace) = &document.namespace
        {
            base.push(namespace);
        }
        base
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_manifest(dir: &Path, content: &str) -> PathBuf {
        let location = dir.join("doctool.yaml");
        let mut file = fs::File::create(&location).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        location
    }

    const MANIFEST: &str = r#"
directories:
  namespaces: true
  shared: shared

plugins:
  - html

documents:
  guide:
    file: guide
    printer: html
    title: User Guide
    css: style.scss
    document:
      - template: intro
      - template: chapter
        with:
          number: 1
          draft: true
  manual:
    namespace: handbook
    file: manual.pdf
    printer: weasyprint
    css:
      - a.css
      - b.css
    document: []
"#;

    #[test]
    fn test_load_fills_defaults_and_namespaces() {
        let dir = tempdir().unwrap();
        let location = write_manifest(dir.path(), MANIFEST);

        let config = Config::load(dir.path(), &location).unwrap();

        assert_eq!(config.working_directory, dir.path());
        assert_eq!(config.manifest_location, location);
        assert!(config.directories.namespaces);
        assert_eq!(config.directories.content, PathBuf::from("content"));
        assert_eq!(config.directories.dist, PathBuf::from("dist"));

        let guide = &config.documents["guide"];
        assert_eq!(guide.namespace.as_deref(), Some("guide"));
        assert_eq!(guide.css, vec!["style.scss"]);

        let manual = &config.documents["manual"];
        assert_eq!(manual.namespace.as_deref(), Some("handbook"));
        assert_eq!(manual.css, vec!["a.css", "b.css"]);
    }

    #[test]
    fn test_part_data_scalars() {
        let dir = tempdir().unwrap();
        let location = write_manifest(dir.path(), MANIFEST);
        let config = Config::load(dir.path(), &location).unwrap();

        let chapter = &config.documents["guide"].document[1];
        assert_eq!(chapter.with["number"], DataValue::Number(1.0));
        assert_eq!(chapter.with["draft"], DataValue::Bool(true));
        assert_eq!(chapter.with["number"].to_string(), "1");
    }

    #[test]
    fn test_base_path_respects_namespaces() {
        let dir = tempdir().unwrap();
        let location = write_manifest(dir.path(), MANIFEST);
        let mut config = Config::load(dir.path(), &location).unwrap();

        let manual = config.documents["manual"].clone();
        assert_eq!(config.base_path(&manual), dir.path().join("handbook"));

        config.directories.namespaces = false;
        assert_eq!(config.base_path(&manual), dir.path());
    }

    #[test]
    fn test_validate_rejects_absolute_output() {
        let dir = tempdir().unwrap();
        let location = write_manifest(
            dir.path(),
            "documents:\n  bad:\n    file: /etc/out\n    printer: html\n    document: []\n",
        );
        let config = Config::load(dir.path(), &location).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_manifest() {
        let dir = tempdir().unwrap();
        let result = Config::load(dir.path(), &dir.path().join("doctool.yaml"));
        assert!(matches!(result, Err(ConfigError::Io(_, _))));
    }
}
