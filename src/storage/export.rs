//! Deletion and export copying

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::StorageLayout;

/// Outcome of exporting one path
#[derive(Clone, Debug)]
pub struct PathExportResult {
    /// Source path as given
    pub path: PathBuf,
    /// Whether the copy succeeded
    pub success: bool,
    /// Failure description when `success` is false
    pub error: Option<String>,
}

/// Aggregate outcome of an export run
#[derive(Clone, Debug, Default)]
pub struct ExportReport {
    /// Number of paths copied successfully
    pub success_count: usize,
    /// Number of paths that failed
    pub failed_count: usize,
    /// Per-path details, in input order
    pub details: Vec<PathExportResult>,
}

impl StorageLayout {
    /// Remove a managed directory (or single file) tree.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when removal fails.
    pub async fn delete(&self, path: &Path) -> Result<()> {
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_file(path).await?;
        }
        tracing::info!(path = %path.display(), "Deleted from storage tree");
        Ok(())
    }

    /// Copy each path (directory or file) into `dest`, preserving the leaf
    /// name. Per-path failures are collected, not propagated; creating the
    /// destination itself failing is the only hard error.
    pub async fn export(&self, paths: &[PathBuf], dest: &Path) -> Result<ExportReport> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| Error::from_write_error(e, dest))?;

        let mut report = ExportReport::default();
        for path in paths {
            let outcome = export_one(path, dest).await;
            match outcome {
                Ok(()) => {
                    report.success_count += 1;
                    report.details.push(PathExportResult {
                        path: path.clone(),
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Export failed for path");
                    report.failed_count += 1;
                    report.details.push(PathExportResult {
                        path: path.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        tracing::info!(
            succeeded = report.success_count,
            failed = report.failed_count,
            dest = %dest.display(),
            "Export complete"
        );
        Ok(report)
    }
}

async fn export_one(source: &Path, dest: &Path) -> Result<()> {
    let leaf = source
        .file_name()
        .ok_or_else(|| Error::Internal(format!("path has no leaf name: {}", source.display())))?;
    let target = dest.join(leaf);

    let metadata = tokio::fs::metadata(source).await?;
    if metadata.is_dir() {
        copy_dir(source.to_path_buf(), target).await
    } else {
        tokio::fs::copy(source, &target)
            .await
            .map_err(|e| Error::from_write_error(e, &target))?;
        Ok(())
    }
}

/// Recursive directory copy. Iterative with an explicit stack — model
/// directories are shallow, but symlinked cycles must not recurse forever.
async fn copy_dir(source: PathBuf, target: PathBuf) -> Result<()> {
    let mut stack = vec![(source, target)];
    while let Some((src, dst)) = stack.pop() {
        tokio::fs::create_dir_all(&dst)
            .await
            .map_err(|e| Error::from_write_error(e, &dst))?;
        let mut entries = tokio::fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let entry_dst = dst.join(entry.file_name());
            if file_type.is_dir() {
                stack.push((entry.path(), entry_dst));
            } else if file_type.is_file() {
                tokio::fs::copy(entry.path(), &entry_dst)
                    .await
                    .map_err(|e| Error::from_write_error(e, &entry_dst))?;
            }
            // Symlinks are skipped: an export must not reach outside the tree.
        }
    }
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn delete_removes_directory_tree() {
        let tmp = TempDir::new().unwrap();
        let layout = StorageLayout::new(tmp.path()).unwrap();
        let dir = tmp.path().join("loras/SDXL/Gone");
        std::fs::create_dir_all(dir.join("images")).unwrap();
        std::fs::write(dir.join("metadata.json"), "{}").unwrap();

        layout.delete(&dir).await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn delete_removes_single_file() {
        let tmp = TempDir::new().unwrap();
        let layout = StorageLayout::new(tmp.path()).unwrap();
        let file = tmp.path().join("stray.safetensors");
        std::fs::write(&file, b"x").unwrap();

        layout.delete(&file).await.unwrap();
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn delete_of_missing_path_errors() {
        let tmp = TempDir::new().unwrap();
        let layout = StorageLayout::new(tmp.path()).unwrap();
        let result = layout.delete(&tmp.path().join("never-existed")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn export_copies_dirs_and_files_preserving_leaf_names() {
        let tmp = TempDir::new().unwrap();
        let layout = StorageLayout::new(tmp.path()).unwrap();

        let model_dir = tmp.path().join("loras/SDXL/Exported");
        std::fs::create_dir_all(model_dir.join("images")).unwrap();
        std::fs::write(model_dir.join("metadata.json"), "{}").unwrap();
        std::fs::write(model_dir.join("images/a.png"), b"img").unwrap();
        let loose_file = tmp.path().join("loose.safetensors");
        std::fs::write(&loose_file, b"weights").unwrap();

        let dest = TempDir::new().unwrap();
        let report = layout
            .export(&[model_dir.clone(), loose_file.clone()], dest.path())
            .await
            .unwrap();

        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed_count, 0);
        assert!(dest.path().join("Exported/metadata.json").is_file());
        assert!(dest.path().join("Exported/images/a.png").is_file());
        assert!(dest.path().join("loose.safetensors").is_file());
    }

    #[tokio::test]
    async fn export_collects_per_path_failures() {
        let tmp = TempDir::new().unwrap();
        let layout = StorageLayout::new(tmp.path()).unwrap();
        let good = tmp.path().join("ok.bin");
        std::fs::write(&good, b"x").unwrap();
        let missing = tmp.path().join("missing.bin");

        let dest = TempDir::new().unwrap();
        let report = layout
            .export(&[good, missing.clone()], dest.path())
            .await
            .unwrap();

        assert_eq!(report.success_count, 1);
        assert_eq!(report.failed_count, 1);
        let failed = report.details.iter().find(|d| !d.success).unwrap();
        assert_eq!(failed.path, missing);
        assert!(failed.error.is_some());
    }

    #[tokio::test]
    async fn export_of_empty_list_is_empty_report() {
        let tmp = TempDir::new().unwrap();
        let layout = StorageLayout::new(tmp.path()).unwrap();
        let dest = TempDir::new().unwrap();

        let report = layout.export(&[], dest.path()).await.unwrap();
        assert_eq!(report.success_count, 0);
        assert_eq!(report.failed_count, 0);
        assert!(report.details.is_empty());
    }
}
