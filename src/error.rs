//! Build error taxonomy.
//!
//! Typed errors for everything the orchestration engine can fail on.
//! Provider-internal failures stay opaque: they arrive as `anyhow::Error`
//! sources wrapped in [`BuildError::ProviderRenderFailed`].

use crate::config::DirectoryKind;
use std::path::PathBuf;
use thiserror::Error;

/// Which capability map a provider lookup went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Content,
    Media,
    Printer,
    Post,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Content => "content",
            Self::Media => "media",
            Self::Printer => "printer",
            Self::Post => "post",
        };
        f.write_str(name)
    }
}

/// Errors raised while building documents.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("unable to load plugin `{0}`")]
    PluginNotFound(String),

    #[error("plugin `{id}` failed to load")]
    PluginLoadFailed {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no {kind} provider found for `{key}`")]
    NoProviderForKey { kind: ProviderKind, key: String },

    #[error("could not find a file for `{name}` under `{directory}`")]
    FileNotFound {
        directory: DirectoryKind,
        name: String,
    },

    #[error("could not resolve path `{directory}/{name}`")]
    PathNotFound {
        directory: DirectoryKind,
        name: String,
    },

    #[error("could not find an extension for `{0}`")]
    MissingExtension(PathBuf),

    #[error("{kind} provider `{key}` failed rendering `{location}`")]
    ProviderRenderFailed {
        kind: ProviderKind,
        key: String,
        location: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("IO error at `{0}`")]
    Io(PathBuf, #[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_provider_display() {
        let err = BuildError::NoProviderForKey {
            kind: ProviderKind::Printer,
            key: "weasyprint".into(),
        };
        let display = format!("{err}");
        assert!(display.contains("printer"));
        assert!(display.contains("weasyprint"));
    }

    #[test]
    fn test_path_not_found_display() {
        let err = BuildError::PathNotFound {
            directory: DirectoryKind::Asset,
            name: "style.scss".into(),
        };
        assert_eq!(format!("{err}"), "could not resolve path `asset/style.scss`");
    }
}
