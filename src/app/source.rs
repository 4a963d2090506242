//! Where template source text comes from

use crate::error::{TrellisError, TrellisResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use tokio::fs;

/// File extension of template files
pub const TEMPLATE_EXT: &str = "tmpl";

/// Read access to template sources by relative, `/`-separated name
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Source text of one template
    async fn read(&self, name: &str) -> TrellisResult<String>;

    /// Every template name under `dir`, sorted. An empty `dir` lists the
    /// whole source.
    async fn list(&self, dir: &str) -> TrellisResult<Vec<String>>;
}

fn is_template(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext == TEMPLATE_EXT)
}

/// Reject names that would leave the source root
fn checked_name(name: &str) -> TrellisResult<&Path> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if name.is_empty() || escapes {
        return Err(TrellisError::TemplateNotFound(name.to_string()));
    }
    Ok(path)
}

/// Templates on disk under a project root
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl TemplateSource for DirSource {
    async fn read(&self, name: &str) -> TrellisResult<String> {
        let path = self.root.join(checked_name(name)?);
        match fs::read_to_string(&path).await {
            Ok(source) => Ok(source),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TrellisError::TemplateNotFound(name.to_string()))
            }
            Err(e) => Err(TrellisError::io(format!("reading {}", path.display()), e)),
        }
    }

    async fn list(&self, dir: &str) -> TrellisResult<Vec<String>> {
        let start = if dir.is_empty() {
            self.root.clone()
        } else {
            self.root.join(checked_name(dir)?)
        };
        if !start.is_dir() {
            return Ok(vec![]);
        }

        let mut found = Vec::new();
        let mut pending = vec![(start, dir.trim_end_matches('/').to_string())];
        while let Some((path, prefix)) = pending.pop() {
            let mut entries = fs::read_dir(&path)
                .await
                .map_err(|e| TrellisError::io(format!("reading {}", path.display()), e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| TrellisError::io(format!("reading {}", path.display()), e))?
            {
                let file_name = entry.file_name().to_string_lossy().to_string();
                if file_name.starts_with('.') {
                    continue;
                }
                let name = if prefix.is_empty() {
                    file_name
                } else {
                    format!("{}/{}", prefix, file_name)
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| TrellisError::io(format!("inspecting {}", name), e))?;

                if file_type.is_dir() {
                    pending.push((entry.path(), name));
                } else if is_template(&name) {
                    found.push(name);
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

/// In-process templates, mainly for tests and embedding
#[derive(Default)]
pub struct MemorySource {
    templates: RwLock<BTreeMap<String, String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template
    pub fn insert(&self, name: impl Into<String>, source: impl Into<String>) {
        self.templates
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.into(), source.into());
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.templates
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name)
    }
}

#[async_trait]
impl TemplateSource for MemorySource {
    async fn read(&self, name: &str) -> TrellisResult<String> {
        self.templates
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| TrellisError::TemplateNotFound(name.to_string()))
    }

    async fn list(&self, dir: &str) -> TrellisResult<Vec<String>> {
        let prefix = match dir.trim_end_matches('/') {
            "" => String::new(),
            dir => format!("{}/", dir),
        };
        Ok(self
            .templates
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .filter(|name| name.starts_with(&prefix) && is_template(name))
            .cloned()
            .collect())
    }
}
