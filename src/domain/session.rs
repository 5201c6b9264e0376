use serde::Serialize;

use super::detection::{DetectionOutcome, EngineHint, TaskKind};

/// Estado de navegación de un único operador: carpeta, ficheros listados,
/// índice actual, modelo seleccionado y último resultado. Es un único slot
/// por proceso, sobrescrito en cada detección; el servicio lo protege con
/// un mutex, pero entre clientes concurrentes gana el último escritor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Session {
    pub folder: String,
    pub files: Vec<String>,
    pub index: usize,
    pub model_path: String,
    pub task: TaskKind,
    pub engine: EngineHint,
    pub result: Option<DetectionOutcome>,
}
