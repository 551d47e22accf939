//! Common test utilities for modelhub-dl integration tests

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modelhub_dl::client::HubClient;
use modelhub_dl::{Config, ModelDownloader, StorageLayout};

/// Bytes served as the fake model binary
pub const MODEL_BODY: &[u8] = &[0xAB; 4096];

/// Bytes served for every fake preview image
pub const IMAGE_BODY: &[u8] = b"not-really-a-png";

/// Describes one preview image to mount on the mock hub.
#[derive(Clone, Copy)]
pub struct FixtureImage {
    pub nsfw: bool,
    pub like_count: u64,
}

/// A model fixture mounted on a [`MockServer`].
pub struct FixtureModel {
    pub id: i64,
    pub version_id: i64,
    pub name: &'static str,
    pub base_model: &'static str,
    pub images: Vec<FixtureImage>,
}

impl FixtureModel {
    pub fn new(id: i64, name: &'static str) -> Self {
        Self {
            id,
            version_id: id * 10,
            name,
            base_model: "SDXL",
            images: vec![
                FixtureImage {
                    nsfw: false,
                    like_count: 5,
                },
                FixtureImage {
                    nsfw: false,
                    like_count: 3,
                },
            ],
        }
    }

    pub fn with_images(mut self, images: Vec<FixtureImage>) -> Self {
        self.images = images;
        self
    }

    pub fn page_url(&self) -> String {
        format!("https://civitai.com/models/{}", self.id)
    }
}

/// Mount the metadata, binary, and image endpoints for `model`.
pub async fn mount_model(server: &MockServer, model: &FixtureModel) {
    let download_url = format!("{}/api/download/models/{}", server.uri(), model.version_id);

    let model_json = json!({
        "id": model.id,
        "name": model.name,
        "type": "LORA",
        "description": "integration fixture",
        "tags": ["fixture", "test"],
        "creator": {"username": "it-tester"},
        "modelVersions": [{"id": model.version_id}]
    });
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/models/{}", model.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(model_json))
        .mount(server)
        .await;

    let images_json: Vec<_> = model
        .images
        .iter()
        .enumerate()
        .map(|(i, img)| {
            json!({
                "url": format!("{}/previews/{}-img{}.png", server.uri(), model.id, i),
                "nsfw": img.nsfw,
                "meta": {
                    "prompt": format!("prompt {i}"),
                    "model": "base-checkpoint",
                    "resources": [{"type": "lora", "name": model.name}]
                },
                "stats": {"likeCount": img.like_count, "heartCount": 0, "laughCount": 0}
            })
        })
        .collect();

    let version_json = json!({
        "id": model.version_id,
        "name": "v1.0",
        "baseModel": model.base_model,
        "downloadUrl": download_url,
        "files": [{
            "name": format!("{}.safetensors", model.name.to_lowercase().replace(' ', "-")),
            "downloadUrl": download_url,
            "sizeKB": (MODEL_BODY.len() as f64) / 1024.0,
            "metadata": {"format": "SafeTensor"},
            "primary": true
        }],
        "images": images_json
    });
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/model-versions/{}", model.version_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(version_json))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/download/models/{}", model.version_id)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MODEL_BODY))
        .mount(server)
        .await;

    for i in 0..model.images.len() {
        Mock::given(method("GET"))
            .and(path(format!("/previews/{}-img{}.png", model.id, i)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(IMAGE_BODY))
            .mount(server)
            .await;
    }
}

/// A downloader wired to `server` through the real [`HubClient`], writing
/// into a fresh temp root.
pub fn downloader_for(server: &MockServer, config: Config) -> (ModelDownloader, TempDir) {
    let temp = TempDir::new().expect("temp dir");
    let config = Config {
        comfy_path: temp.path().to_path_buf(),
        ..config
    };
    let layout = StorageLayout::new(temp.path()).expect("layout");
    let client = HubClient::new(&config)
        .expect("client")
        .with_base_url(server.uri());
    let downloader = ModelDownloader::with_host(config, Arc::new(client), layout);
    (downloader, temp)
}
