//! View introspection: narrowing `*` to what a template actually uses.
//!
//! Matching is best-effort substring containment, case-insensitive. A view
//! mentioning `name` anywhere (even inside `username`) selects `name`.

use crate::entity::Entity;
use crate::error::Result;
use std::path::PathBuf;

/// Source of view text.
pub trait ViewSource: Send + Sync {
    /// Return the raw text of `view`.
    fn contents(&self, view: &str) -> Result<String>;
}

/// Reads `<root>/<view><extension>` from disk. Dots in the view name are
/// treated as directory separators, so `orders.index` reads
/// `<root>/orders/index<extension>`.
#[derive(Debug, Clone)]
pub struct FileViewSource {
    root: PathBuf,
    extension: String,
}

impl FileViewSource {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    fn path_for(&self, view: &str) -> PathBuf {
        let mut path = self.root.clone();
        let mut segments = view.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                path.push(format!("{segment}{}", self.extension));
            }
        }
        path
    }
}

impl ViewSource for FileViewSource {
    fn contents(&self, view: &str) -> Result<String> {
        let path = self.path_for(view);
        tracing::debug!(view = %view, path = %path.display(), "Reading view source");
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Fillable attributes, then relation names, mentioned by `contents`.
pub fn columns_mentioned(entity: &Entity, contents: &str) -> Vec<String> {
    let haystack = contents.to_lowercase();
    let fillable = entity
        .fillable()
        .iter()
        .filter(|name| haystack.contains(&name.to_lowercase()))
        .cloned();
    let relations = entity
        .relations()
        .iter()
        .map(|(name, _)| name)
        .filter(|name| haystack.contains(&name.to_lowercase()))
        .map(str::to_string);
    fillable.chain(relations).collect()
}
