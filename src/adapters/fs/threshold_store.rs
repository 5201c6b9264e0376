use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::application::ports::ThresholdStorePort;
use crate::domain::errors::DomainResult;
use crate::domain::request::Thresholds;

/// Persistencia de umbrales en un fichero JSON `{"conf": .., "iou": ..}`.
/// La escritura no es atómica: un crash a mitad puede dejar el fichero
/// truncado, en cuyo caso la siguiente carga vuelve a los valores por
/// defecto. Limitación documentada, sin lógica de recuperación.
pub struct FileThresholdStore {
    path: PathBuf,
}

impl FileThresholdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ThresholdStorePort for FileThresholdStore {
    async fn load(&self) -> Thresholds {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Fichero de umbrales ilegible ({e}), usando valores por defecto");
                Thresholds::default()
            }),
            Err(_) => Thresholds::default(),
        }
    }

    async fn save(&self, thresholds: Thresholds) -> DomainResult<()> {
        let raw = serde_json::to_string(&thresholds)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}
