use thiserror::Error;

/// Taxonomía de errores del dominio. Sin reintentos: cada fallo es terminal
/// para la petición que lo provocó y se reporta de forma síncrona.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Carpeta inválida: {0}")]
    InvalidFolder(String),
    #[error("No se encontraron imágenes en: {0}")]
    NoImagesFound(String),
    #[error("Motor legacy no disponible: {0}")]
    EngineUnavailable(String),
    #[error("Error cargando el modelo: {0}")]
    ModelLoadError(String),
    #[error("El motor no produjo ninguna salida: {0}")]
    NoOutputProduced(String),
    #[error("Error de inferencia: {0}")]
    InferenceError(String),
    #[error("Entrada inválida: {0}")]
    InvalidInput(String),
    #[error("Error de serialización: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
