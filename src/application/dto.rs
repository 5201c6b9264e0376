use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::detection::{ClassStat, EngineHint, TaskKind};
use crate::domain::request::Thresholds;
use crate::domain::session::Session;

fn default_conf() -> f32 {
    0.25
}

fn default_iou() -> f32 {
    0.45
}

/// Parámetros de `GET /`. Todos opcionales: sin carpeta ni modelo la
/// respuesta es el estado de sesión actual, sin relanzar inferencia.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowseQuery {
    #[serde(default)]
    pub index: i64,
    pub folder: Option<String>,
    pub model_path: Option<String>,
    #[serde(default)]
    pub model_type: TaskKind,
    #[serde(default)]
    pub engine: EngineHint,
    pub conf: Option<f32>,
    pub iou: Option<f32>,
}

/// Formulario de `POST /set-folder`: selecciona carpeta y modelo y lanza
/// detección sobre la primera imagen.
#[derive(Debug, Clone, Deserialize)]
pub struct SetFolderForm {
    pub folder_path: String,
    pub model_path: String,
    #[serde(default)]
    pub model_type: TaskKind,
    #[serde(default)]
    pub engine: EngineHint,
}

/// Parámetros de `GET /live_update`: persiste umbrales y re-ejecuta la
/// detección sobre el índice indicado.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveUpdateQuery {
    pub index: i64,
    pub folder: String,
    pub model_path: String,
    #[serde(default)]
    pub model_type: TaskKind,
    #[serde(default)]
    pub engine: EngineHint,
    #[serde(default = "default_conf")]
    pub conf: f32,
    #[serde(default = "default_iou")]
    pub iou: f32,
}

/// Estado de página que consume el dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PageState {
    pub folder: String,
    pub model_path: String,
    pub model_type: TaskKind,
    pub engine: EngineHint,
    pub index: usize,
    pub total: usize,
    pub files: Vec<String>,
    pub result_img: Option<String>,
    pub class_counts: BTreeMap<String, ClassStat>,
    pub conf: f32,
    pub iou: f32,
    pub message: Option<String>,
}

impl PageState {
    pub fn from_session(session: &Session, thresholds: Thresholds, message: Option<String>) -> Self {
        Self {
            folder: session.folder.clone(),
            model_path: session.model_path.clone(),
            model_type: session.task,
            engine: session.engine,
            index: session.index,
            total: session.files.len(),
            files: session.files.clone(),
            result_img: session.result.as_ref().map(|r| r.annotated_path.clone()),
            class_counts: session
                .result
                .as_ref()
                .map(|r| r.class_counts.clone())
                .unwrap_or_default(),
            conf: thresholds.conf,
            iou: thresholds.iou,
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveUpdateResponse {
    pub result_img: String,
    pub class_counts: BTreeMap<String, ClassStat>,
}
