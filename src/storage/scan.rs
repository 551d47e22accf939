//! Storage tree scanning: managed models, duplicates, orphans

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::types::{ModelInfo, ModelType};

use super::{METADATA_FILE, MODEL_EXTENSIONS, StorageLayout};

/// A group of managed models sharing `(name, type, baseModel)`
#[derive(Clone, Debug)]
pub struct DuplicateGroup {
    /// Shared model name
    pub name: String,
    /// Shared model type
    pub model_type: ModelType,
    /// Shared base model
    pub base_model: String,
    /// The colliding records (always 2 or more)
    pub models: Vec<ModelInfo>,
}

/// A model-like file with no sibling `metadata.json`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrphanFile {
    /// Absolute path of the orphaned file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// Yield every managed model under `category`, stamping each record with its
/// containing directory. Unreadable or malformed `metadata.json` files are
/// logged and skipped.
pub(crate) fn scan_category(category: &Path) -> impl Iterator<Item = ModelInfo> + use<> {
    WalkDir::new(category)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == METADATA_FILE)
        .filter_map(|entry| {
            let path = entry.path();
            let contents = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable metadata file");
                    return None;
                }
            };
            match serde_json::from_str::<ModelInfo>(&contents) {
                Ok(mut info) => {
                    info.path = path.parent().map(Path::to_path_buf);
                    Some(info)
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping malformed metadata file");
                    None
                }
            }
        })
}

impl StorageLayout {
    /// Walk every category directory and return all managed models.
    pub fn scan(&self) -> Vec<ModelInfo> {
        let mut models = Vec::new();
        for dir_name in ModelType::all_dirs() {
            let category = self.root().join(dir_name);
            if !category.is_dir() {
                continue;
            }
            models.extend(scan_category(&category));
        }
        tracing::info!(count = models.len(), "Storage scan complete");
        models
    }

    /// Group managed models by `(name, type, baseModel)` and return the
    /// groups with two or more members.
    pub fn find_duplicates(&self) -> Vec<DuplicateGroup> {
        let mut groups: HashMap<(String, ModelType, String), Vec<ModelInfo>> = HashMap::new();
        for model in self.scan() {
            groups
                .entry((
                    model.name.clone(),
                    model.model_type,
                    model.base_model.clone(),
                ))
                .or_default()
                .push(model);
        }

        let mut duplicates: Vec<DuplicateGroup> = groups
            .into_iter()
            .filter(|(_, models)| models.len() >= 2)
            .map(|((name, model_type, base_model), models)| DuplicateGroup {
                name,
                model_type,
                base_model,
                models,
            })
            .collect();
        // Deterministic output order for callers and tests
        duplicates.sort_by(|a, b| a.name.cmp(&b.name));
        duplicates
    }

    /// Find model-like files (by extension) whose directory holds no
    /// `metadata.json`.
    pub fn find_orphans(&self) -> Vec<OrphanFile> {
        let mut orphans = Vec::new();
        for dir_name in ModelType::all_dirs() {
            let category = self.root().join(dir_name);
            if !category.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&category)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                let is_model_file = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| {
                        MODEL_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m))
                    });
                if !is_model_file {
                    continue;
                }
                let has_metadata = path
                    .parent()
                    .is_some_and(|parent| parent.join(METADATA_FILE).is_file());
                if !has_metadata {
                    let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    orphans.push(OrphanFile {
                        path: path.to_path_buf(),
                        size,
                    });
                }
            }
        }
        orphans.sort_by(|a, b| a.path.cmp(&b.path));
        orphans
    }
}
