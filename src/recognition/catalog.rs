use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::engine::ModelSpec;
use crate::config::{SUPPORTED_LANGUAGES, SUPPORTED_MODEL_SIZES};

/// Mapping of (language, size) to model directory, built once at startup.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models_dir: PathBuf,
    entries: BTreeMap<(String, String), PathBuf>,
    fallback: bool,
}

impl ModelCatalog {
    /// Scan `<models_dir>/<language>/<size>/`. Falls back to the default
    /// table when the directory is missing or holds no model directories.
    pub fn load(models_dir: &Path) -> Self {
        let entries = match scan(models_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot scan models directory {:?}: {}", models_dir, e);
                BTreeMap::new()
            }
        };

        if entries.is_empty() {
            info!(
                "No models found under {:?}, using default catalog",
                models_dir
            );
            return Self::default_table(models_dir);
        }

        info!(
            "Loaded {} models from {:?}",
            entries.len(),
            models_dir
        );

        Self {
            models_dir: models_dir.to_path_buf(),
            entries,
            fallback: false,
        }
    }

    /// Every supported language with every supported size
    pub fn default_table(models_dir: &Path) -> Self {
        let entries = SUPPORTED_LANGUAGES
            .iter()
            .flat_map(|lang| {
                SUPPORTED_MODEL_SIZES.iter().map(move |size| {
                    (
                        (lang.to_string(), size.to_string()),
                        models_dir.join(lang).join(size),
                    )
                })
            })
            .collect();

        Self {
            models_dir: models_dir.to_path_buf(),
            entries,
            fallback: true,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.entries.keys().map(|(lang, _)| lang.as_str()).collect();
        languages.dedup();
        languages
    }

    pub fn sizes(&self, language: &str) -> Vec<&str> {
        self.entries
            .keys()
            .filter(|(lang, _)| lang == language)
            .map(|(_, size)| size.as_str())
            .collect()
    }

    pub fn entries(&self) -> Vec<ModelSpec> {
        self.entries
            .iter()
            .map(|((language, size), path)| ModelSpec {
                language: language.clone(),
                size: size.clone(),
                path: path.clone(),
            })
            .collect()
    }

    pub fn contains(&self, language: &str, size: &str) -> bool {
        self.entries
            .contains_key(&(language.to_string(), size.to_string()))
    }

    /// Resolve a model. Pairs outside the catalog resolve to the
    /// conventional location so the adapter reports them as not found.
    pub fn resolve(&self, language: &str, size: &str) -> ModelSpec {
        let path = self
            .entries
            .get(&(language.to_string(), size.to_string()))
            .cloned()
            .unwrap_or_else(|| self.models_dir.join(language).join(size));

        ModelSpec {
            language: language.to_string(),
            size: size.to_string(),
            path,
        }
    }
}

fn scan(models_dir: &Path) -> std::io::Result<BTreeMap<(String, String), PathBuf>> {
    let mut entries = BTreeMap::new();
    if !models_dir.is_dir() {
        return Ok(entries);
    }

    for lang_entry in std::fs::read_dir(models_dir)? {
        let lang_entry = lang_entry?;
        if !lang_entry.file_type()?.is_dir() {
            continue;
        }
        let Some(language) = lang_entry.file_name().to_str().map(str::to_string) else {
            continue;
        };

        for size_entry in std::fs::read_dir(lang_entry.path())? {
            let size_entry = size_entry?;
            if !size_entry.file_type()?.is_dir() {
                continue;
            }
            let Some(size) = size_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            debug!("Found model {}/{} at {:?}", language, size, size_entry.path());
            entries.insert((language.clone(), size), size_entry.path());
        }
    }

    Ok(entries)
}
