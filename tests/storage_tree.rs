//! Storage-tree round trips: scan/delete, export/scan, duplicates, orphans.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use modelhub_dl::{ModelInfo, ModelType, StorageLayout, sanitize};

fn record(id: i64, name: &str, model_type: ModelType, base: &str) -> ModelInfo {
    ModelInfo {
        id,
        version_id: id * 10,
        name: name.to_string(),
        model_type,
        base_model: base.to_string(),
        creator: "it-tester".to_string(),
        version_name: "v1".to_string(),
        description: String::new(),
        tags: vec![],
        download_url: format!("https://host/api/download/models/{id}"),
        size: Some(16),
        images: vec![],
        thumbnail: None,
        download_date: None,
        last_updated: None,
        path: None,
    }
}

/// Write a model directory (with a small binary) the way the pipeline would.
fn materialize(root: &Path, info: &ModelInfo) -> PathBuf {
    let dir = root
        .join(info.model_type.dir_name())
        .join(sanitize(&info.base_model))
        .join(sanitize(&info.name));
    std::fs::create_dir_all(dir.join("images")).expect("mkdir");
    std::fs::write(dir.join("model.safetensors"), vec![0u8; 16]).expect("binary");
    std::fs::write(
        dir.join("metadata.json"),
        serde_json::to_string_pretty(info).expect("serialize"),
    )
    .expect("metadata");
    dir
}

#[tokio::test]
async fn scan_after_delete_omits_the_deleted_path() {
    let tmp = TempDir::new().expect("tmp");
    let layout = StorageLayout::new(tmp.path()).expect("layout");
    let keep = materialize(tmp.path(), &record(1, "Keep", ModelType::Lora, "SDXL"));
    let drop_dir = materialize(tmp.path(), &record(2, "Drop", ModelType::Lora, "SDXL"));

    assert_eq!(layout.scan().len(), 2);

    layout.delete(&drop_dir).await.expect("delete");

    let remaining = layout.scan();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path.as_deref(), Some(keep.as_path()));
}

#[tokio::test]
async fn export_then_scan_of_dest_returns_exactly_the_exported_models() {
    let tmp = TempDir::new().expect("tmp");
    let layout = StorageLayout::new(tmp.path()).expect("layout");
    let a = materialize(tmp.path(), &record(1, "First", ModelType::Lora, "SDXL"));
    let b = materialize(
        tmp.path(),
        &record(2, "Second", ModelType::Checkpoint, "SD1.5"),
    );
    materialize(tmp.path(), &record(3, "Stays", ModelType::Vae, "SDXL"));

    // Export into a destination that is itself a valid layout root: place
    // each copied dir under the same category path.
    let dest_root = TempDir::new().expect("dest");
    let dest_a = dest_root.path().join("loras/SDXL");
    let dest_b = dest_root.path().join("checkpoints/SD1.5");
    let report_a = layout.export(&[a], &dest_a).await.expect("export a");
    let report_b = layout.export(&[b], &dest_b).await.expect("export b");
    assert_eq!(report_a.success_count + report_b.success_count, 2);
    assert_eq!(report_a.failed_count + report_b.failed_count, 0);

    let dest_layout = StorageLayout::new(dest_root.path()).expect("dest layout");
    let mut ids: Vec<i64> = dest_layout.scan().iter().map(|m| m.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2], "dest scan sees exactly the exported models");
}

#[tokio::test]
async fn duplicate_group_found_for_same_name_type_base() {
    let tmp = TempDir::new().expect("tmp");
    let layout = StorageLayout::new(tmp.path()).expect("layout");

    materialize(tmp.path(), &record(1, "Twin", ModelType::Lora, "SDXL"));
    // Second copy with a different id in a sibling directory
    let other_dir = tmp.path().join("loras/SDXL/Twin_alt");
    std::fs::create_dir_all(&other_dir).expect("mkdir");
    std::fs::write(
        other_dir.join("metadata.json"),
        serde_json::to_string_pretty(&record(2, "Twin", ModelType::Lora, "SDXL"))
            .expect("serialize"),
    )
    .expect("metadata");

    let groups = layout.find_duplicates();
    assert_eq!(groups.len(), 1, "exactly one group expected");
    assert_eq!(groups[0].models.len(), 2);
    assert_eq!(groups[0].name, "Twin");
}

#[tokio::test]
async fn orphan_appears_and_disappears_with_metadata() {
    let tmp = TempDir::new().expect("tmp");
    let layout = StorageLayout::new(tmp.path()).expect("layout");

    let dir = tmp.path().join("loras/SDXL");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join("foo.safetensors"), b"weights").expect("write");

    let orphans = layout.find_orphans();
    assert_eq!(orphans.len(), 1);
    assert!(orphans[0].path.ends_with("loras/SDXL/foo.safetensors"));

    std::fs::write(
        dir.join("metadata.json"),
        serde_json::to_string(&record(9, "foo", ModelType::Lora, "SDXL")).expect("serialize"),
    )
    .expect("metadata");

    assert!(
        layout.find_orphans().is_empty(),
        "a sibling metadata.json clears the orphan"
    );
}

#[tokio::test]
async fn usage_combines_lora_variants_under_one_category() {
    let tmp = TempDir::new().expect("tmp");
    let layout = StorageLayout::new(tmp.path()).expect("layout");

    // LORA and LoCon both route to loras/, so their bytes aggregate.
    materialize(tmp.path(), &record(1, "A", ModelType::Lora, "SDXL"));
    materialize(tmp.path(), &record(2, "B", ModelType::LoCon, "SDXL"));
    materialize(tmp.path(), &record(3, "C", ModelType::TextualInversion, "SD1.5"));

    let usage = layout.usage().expect("usage");
    let loras = usage.per_category_bytes.get("loras").copied().unwrap_or(0);
    let embeddings = usage
        .per_category_bytes
        .get("embeddings")
        .copied()
        .unwrap_or(0);
    assert!(loras > embeddings, "two models share loras/, one in embeddings/");
    assert!(usage.total_bytes >= usage.free_bytes);
}

#[test]
fn find_path_prefers_deterministic_location_then_falls_back_to_scan() {
    let tmp = TempDir::new().expect("tmp");
    let layout = StorageLayout::new(tmp.path()).expect("layout");

    // Deterministic location hit
    let canonical = materialize(tmp.path(), &record(1, "Findable", ModelType::Lora, "SDXL"));
    assert_eq!(
        layout.find_path(1, ModelType::Lora, "SDXL", "Findable"),
        Some(canonical)
    );

    // Renamed directory: only the id-based scan can find it
    let renamed = tmp.path().join("loras/SDXL/moved-by-hand");
    std::fs::create_dir_all(&renamed).expect("mkdir");
    std::fs::write(
        renamed.join("metadata.json"),
        serde_json::to_string(&record(2, "Elsewhere", ModelType::Lora, "SDXL"))
            .expect("serialize"),
    )
    .expect("metadata");
    assert_eq!(
        layout.find_path(2, ModelType::Lora, "SDXL", "Elsewhere"),
        Some(renamed)
    );

    // Unknown id resolves to nothing
    assert_eq!(layout.find_path(999, ModelType::Lora, "SDXL", "Ghost"), None);
}
