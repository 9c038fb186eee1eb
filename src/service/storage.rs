// service/storage.rs
use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::utils::image_utils::DecodedImage;

/// Stores an uploaded image and returns its public URL.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    async fn put_image(&self, owner_id: Uuid, folder: &str, image: &DecodedImage) -> Result<String, String>;
}

/// Writes files under `<root>/<owner>/<folder>/<uuid>.<ext>`; `ServeDir` serves them.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: &str, base_url: &str) -> Self {
        Self {
            root: PathBuf::from(root),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn safe_folder(folder: &str) -> String {
    let cleaned: String = folder
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "misc".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_image(&self, owner_id: Uuid, folder: &str, image: &DecodedImage) -> Result<String, String> {
        let folder = safe_folder(folder);
        let relative = format!("{}/{}/{}.{}", owner_id, folder, Uuid::new_v4(), image.extension());
        let path = self.root.join(&relative);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create upload directory: {}", e))?;
        }
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| format!("Failed to store image: {}", e))?;

        tracing::info!("Stored {} byte image at {:?}", image.bytes.len(), path);
        Ok(format!("{}/{}", self.base_url, relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    #[tokio::test]
    async fn test_put_image_writes_file_and_returns_url() {
        let root = std::env::temp_dir().join(format!("store-test-{}", Uuid::new_v4()));
        let store = LocalObjectStore::new(root.to_str().unwrap(), "http://localhost:8000/uploads/");
        let owner = Uuid::new_v4();
        let image = DecodedImage { bytes: vec![1, 2, 3], format: ImageFormat::Png };

        let url = store.put_image(owner, "../products", &image).await.unwrap();

        let prefix = format!("http://localhost:8000/uploads/{}/products/", owner);
        assert!(url.starts_with(&prefix), "{}", url);
        assert!(url.ends_with(".png"));

        let relative = url.trim_start_matches("http://localhost:8000/uploads/");
        assert_eq!(tokio::fs::read(root.join(relative)).await.unwrap(), vec![1, 2, 3]);
        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
