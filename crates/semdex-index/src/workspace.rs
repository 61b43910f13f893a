//! Workspace file enumeration and reading.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};

use crate::error::{IndexError, Result};
use crate::languages::{DEFAULT_EXTENSIONS, language_id_for_path};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Directories never descended into.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "node_modules",
    "target",
    ".git",
    "dist",
    "build",
    "out",
    "vendor",
    "__pycache__",
    ".venv",
];

/// File contents handed to the indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub text: String,
    pub language_id: String,
    /// Size in bytes.
    pub size: u64,
}

/// Source of the files to index, addressed by URI.
pub trait WorkspaceSource: Send + Sync {
    /// Every indexable file in the workspace.
    fn list_files(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Read `uri`. `None` when it no longer exists or is not text.
    fn read_file<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<Option<SourceFile>>>;

    /// Size in bytes without reading the contents. `None` when unknown or missing.
    fn file_size<'a>(&'a self, _uri: &'a str) -> BoxFuture<'a, Result<Option<u64>>> {
        Box::pin(async { Ok(None) })
    }

    /// Whether `uri` would be listed by [`list_files`](Self::list_files).
    fn accepts(&self, uri: &str) -> bool;
}

/// Filesystem workspace rooted at a directory. URIs are `/`-separated paths
/// relative to the root.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    root: PathBuf,
    extensions: HashSet<String>,
    overrides: Override,
}

impl FsWorkspace {
    /// Workspace with the default extension allowlist and excluded directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the exclude globs fail to compile.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_filters(root, DEFAULT_EXTENSIONS, DEFAULT_EXCLUDES)
    }

    /// # Errors
    ///
    /// Returns an error if an exclude glob is invalid.
    pub fn with_filters<E, X>(root: impl Into<PathBuf>, extensions: &[E], excludes: &[X]) -> Result<Self>
    where
        E: AsRef<str>,
        X: AsRef<str>,
    {
        let root = root.into();
        let mut builder = OverrideBuilder::new(&root);
        for pattern in excludes {
            let pattern = pattern.as_ref().trim_start_matches('!');
            builder.add(&format!("!{pattern}"))?;
        }
        Ok(Self {
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_owned())
                .collect(),
            overrides: builder.build()?,
            root,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// URI for an absolute path under the root, or `None` if it lies outside.
    #[must_use]
    pub fn uri_for_path(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    #[must_use]
    pub fn path_for_uri(&self, uri: &str) -> PathBuf {
        uri.split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    fn has_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(e))
    }

    fn walk(&self) -> Result<Vec<String>> {
        let mut uris = Vec::new();
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .overrides(self.overrides.clone())
            .build();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("skipping unreadable workspace entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file())
                || !self.has_allowed_extension(entry.path())
            {
                continue;
            }
            if let Some(uri) = self.uri_for_path(entry.path()) {
                uris.push(uri);
            }
        }
        uris.sort();
        Ok(uris)
    }
}

impl WorkspaceSource for FsWorkspace {
    fn list_files(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let this = self.clone();
            tokio::task::spawn_blocking(move || this.walk())
                .await
                .map_err(|e| IndexError::Other(format!("workspace walk panicked: {e}")))?
        })
    }

    fn read_file<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<Option<SourceFile>>> {
        Box::pin(async move {
            let path = self.path_for_uri(uri);
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let size = u64::try_from(bytes.len())?;
            let Ok(text) = String::from_utf8(bytes) else {
                tracing::debug!(file = %uri, "not valid UTF-8, skipping");
                return Ok(None);
            };
            let language_id = language_id_for_path(&path).unwrap_or("plaintext").to_owned();
            Ok(Some(SourceFile {
                text,
                language_id,
                size,
            }))
        })
    }

    fn file_size<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<Option<u64>>> {
        Box::pin(async move {
            match tokio::fs::metadata(self.path_for_uri(uri)).await {
                Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
                Ok(_) => Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn accepts(&self, uri: &str) -> bool {
        let path = self.path_for_uri(uri);
        if !self.has_allowed_extension(&path) {
            return false;
        }
        let mut prefix = self.root.clone();
        let parts: Vec<&str> = uri.split('/').collect();
        for (i, part) in parts.iter().enumerate() {
            prefix.push(part);
            let is_dir = i + 1 < parts.len();
            if part.starts_with('.') || self.overrides.matched(&prefix, is_dir).is_ignore() {
                return false;
            }
        }
        true
    }
}
