use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::detection::TaskKind;

fn default_conf() -> f32 {
    0.25
}

fn default_iou() -> f32 {
    0.45
}

/// Umbrales de confianza e IoU. Se persisten en `thresholds.json` y se
/// reescriben por completo en cada mutación.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_conf")]
    pub conf: f32, // 0..1
    #[serde(default = "default_iou")]
    pub iou: f32, // 0..1
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { conf: 0.25, iou: 0.45 }
    }
}

/// Petición de inferencia sobre una única imagen. Inmutable, se construye
/// una por llamada.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub image_path: PathBuf,
    pub model_path: PathBuf,
    pub thresholds: Thresholds,
    pub task: TaskKind,
}
