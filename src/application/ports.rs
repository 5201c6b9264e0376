use async_trait::async_trait;
use std::path::Path;

use crate::domain::{
    detection::{DetectionOutcome, ModelKind},
    errors::DomainResult,
    request::{DetectionRequest, Thresholds},
};

#[async_trait]
pub trait ImageCatalogPort: Send + Sync {
    /// Lista los nombres de fichero de imagen de una carpeta, ordenados
    /// lexicográficamente. Falla con `InvalidFolder` si la ruta no existe
    /// o no es un directorio; una lista vacía no es un error aquí.
    async fn list_images(&self, folder: &Path) -> DomainResult<Vec<String>>;
}

/// Estrategia de selección de motor por inspección de bytes del modelo.
/// Heurística fail-open: cualquier fallo de lectura (fichero ausente,
/// permisos) resuelve a `Unified`. Riesgo de falso negativo conocido: un
/// modelo unificado que contenga la marca, o un fichero corrupto, se
/// enruta mal.
pub trait ModelProbePort: Send + Sync {
    fn probe(&self, model: &Path) -> ModelKind;
}

#[async_trait]
pub trait EnginePort: Send + Sync {
    async fn run(&self, request: DetectionRequest) -> DomainResult<DetectionOutcome>;
}

#[async_trait]
pub trait ThresholdStorePort: Send + Sync {
    /// Fichero ausente o ilegible ⇒ valores por defecto.
    async fn load(&self) -> Thresholds;
    async fn save(&self, thresholds: Thresholds) -> DomainResult<()>;
}
