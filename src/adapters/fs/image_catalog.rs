use async_trait::async_trait;
use std::fs;
use std::path::Path;

use crate::application::ports::ImageCatalogPort;
use crate::domain::errors::{DomainError, DomainResult};

/// Extensiones aceptadas, comparadas en minúsculas. El nombre original
/// conserva su capitalización en el listado.
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

pub struct FsImageCatalog;

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl ImageCatalogPort for FsImageCatalog {
    async fn list_images(&self, folder: &Path) -> DomainResult<Vec<String>> {
        if !folder.is_dir() {
            return Err(DomainError::InvalidFolder(folder.display().to_string()));
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(folder)?.flatten() {
            let path = entry.path();
            if path.is_file() && is_image_file(&path) {
                files.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        files.sort();
        Ok(files)
    }
}
