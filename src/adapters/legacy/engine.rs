use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, warn};

use crate::adapters::onnx::annotate::OutputSink;
use crate::application::ports::EnginePort;
use crate::domain::{
    detection::{tally_labels, ClassStat, DetectionOutcome},
    errors::{DomainError, DomainResult},
    request::DetectionRequest,
};

/// Subdirectorio de experimento fijo: cada ejecución sobrescribe la
/// anterior, sin versionado.
const EXPERIMENT_NAME: &str = "det_legacy";

const OUTPUT_EXTENSIONS: [&str; 2] = ["jpg", "png"];

/// Motor legacy: delega la detección en un script externo, localiza la
/// imagen de salida más reciente del experimento y la copia al directorio
/// público de la aplicación.
pub struct LegacyScriptEngine {
    interpreter: String,
    script: PathBuf,
    sink: Arc<OutputSink>,
    available: bool,
}

impl LegacyScriptEngine {
    /// La disponibilidad se decide en el arranque: sin script en disco,
    /// toda petición enrutada aquí falla con `EngineUnavailable`. Las
    /// peticiones al motor unificado no se ven afectadas.
    pub fn new(
        interpreter: impl Into<String>,
        script: impl Into<PathBuf>,
        sink: Arc<OutputSink>,
    ) -> Self {
        let script = script.into();
        let available = script.is_file();
        if !available {
            warn!("Script legacy no encontrado en {}", script.display());
        }
        Self {
            interpreter: interpreter.into(),
            script,
            sink,
            available,
        }
    }
}

#[async_trait]
impl EnginePort for LegacyScriptEngine {
    async fn run(&self, request: DetectionRequest) -> DomainResult<DetectionOutcome> {
        if !self.available {
            return Err(DomainError::EngineUnavailable(self.script.display().to_string()));
        }

        let interpreter = self.interpreter.clone();
        let script = self.script.clone();
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || run_blocking(&interpreter, &script, &request, &sink))
            .await
            .map_err(|e| DomainError::InferenceError(format!("tarea legacy abortada: {e}")))?
    }
}

fn run_blocking(
    interpreter: &str,
    script: &Path,
    request: &DetectionRequest,
    sink: &OutputSink,
) -> DomainResult<DetectionOutcome> {
    let experiment_dir = sink.dir().join(EXPERIMENT_NAME);

    info!(
        "Ejecutando script legacy {} sobre {}",
        script.display(),
        request.image_path.display()
    );

    let status = Command::new(interpreter)
        .arg(script)
        .arg("--weights")
        .arg(&request.model_path)
        .arg("--source")
        .arg(&request.image_path)
        .arg("--conf-thres")
        .arg(request.thresholds.conf.to_string())
        .arg("--iou-thres")
        .arg(request.thresholds.iou.to_string())
        .arg("--project")
        .arg(sink.dir())
        .arg("--name")
        .arg(EXPERIMENT_NAME)
        .arg("--exist-ok")
        .status()?;

    if !status.success() {
        return Err(DomainError::InferenceError(format!(
            "el script legacy terminó con {status}"
        )));
    }

    let newest = newest_image(&experiment_dir)?
        .ok_or_else(|| DomainError::NoOutputProduced(experiment_dir.display().to_string()))?;

    let (dest, url) = sink.reserve("jpg");
    fs::copy(&newest, &dest)?;

    let csv_path = experiment_dir.join("predictions.csv");
    let class_counts = match fs::read_to_string(&csv_path) {
        Ok(raw) => parse_predictions_csv(&raw),
        Err(_) => BTreeMap::new(),
    };

    Ok(DetectionOutcome { annotated_path: url, class_counts })
}

/// Imagen más reciente del directorio de experimento, por fecha de creación
/// (o de modificación donde el sistema de ficheros no expone la primera).
/// Empates a tiempo idéntico se resuelven de forma arbitraria.
fn newest_image(dir: &Path) -> DomainResult<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(None),
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_output = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| OUTPUT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !is_output {
            continue;
        }

        let meta = entry.metadata()?;
        let stamp = meta.created().or_else(|_| meta.modified())?;
        if newest.as_ref().map(|(t, _)| stamp >= *t).unwrap_or(true) {
            newest = Some((stamp, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

/// CSV de resultados del script: una fila por detección, con la etiqueta en
/// la columna `Prediction`. Se agrupan las filas por etiqueta.
fn parse_predictions_csv(raw: &str) -> BTreeMap<String, ClassStat> {
    let mut lines = raw.lines();
    let Some(header) = lines.next() else {
        return BTreeMap::new();
    };
    let Some(column) = header.split(',').position(|h| h.trim() == "Prediction") else {
        return BTreeMap::new();
    };

    let labels: Vec<&str> = lines
        .filter_map(|line| line.split(',').nth(column))
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .collect();
    tally_labels(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection::TaskKind;
    use crate::domain::request::Thresholds;

    fn request(image: &Path, model: &Path) -> DetectionRequest {
        DetectionRequest {
            image_path: image.to_path_buf(),
            model_path: model.to_path_buf(),
            thresholds: Thresholds::default(),
            task: TaskKind::Normal,
        }
    }

    #[test]
    fn csv_rows_group_by_label() {
        let raw = "Image,Prediction,Confidence\na.jpg,perro,0.9\na.jpg,gato,0.8\na.jpg,perro,0.7\n";
        let counts = parse_predictions_csv(raw);
        assert_eq!(counts.get("perro"), Some(&ClassStat::Count(2)));
        assert_eq!(counts.get("gato"), Some(&ClassStat::Count(1)));
    }

    #[test]
    fn csv_without_prediction_column_is_empty() {
        assert!(parse_predictions_csv("Image,Label\na.jpg,perro\n").is_empty());
        assert!(parse_predictions_csv("").is_empty());
    }

    #[test]
    fn newest_image_prefers_latest_file() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("primera.jpg"), b"a").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(dir.path().join("segunda.png"), b"b").unwrap();
        fs::write(dir.path().join("notas.txt"), b"c").unwrap();

        let newest = newest_image(dir.path()).unwrap().unwrap();
        assert_eq!(newest.file_name().unwrap(), "segunda.png");
    }

    #[test]
    fn missing_experiment_dir_yields_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let newest = newest_image(&dir.path().join("no_existe")).unwrap();
        assert!(newest.is_none());
    }

    #[tokio::test]
    async fn missing_script_is_engine_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = Arc::new(OutputSink::new(dir.path().join("outputs"), "/static/outputs").unwrap());
        let engine = LegacyScriptEngine::new("python3", dir.path().join("no_detect.py"), sink);

        let result = engine
            .run(request(&dir.path().join("img.jpg"), &dir.path().join("pesos.pt")))
            .await;
        assert!(matches!(result, Err(DomainError::EngineUnavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_output_is_copied_and_csv_counted() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = Arc::new(OutputSink::new(dir.path().join("outputs"), "/static/outputs").unwrap());

        let image = dir.path().join("fuente.jpg");
        fs::write(&image, b"jpegbytes").unwrap();

        // Imita al script real: copia la fuente anotada al subdirectorio de
        // experimento y deja un predictions.csv al lado. Los argumentos son
        // posicionales porque el orden de invocación es fijo.
        let script = dir.path().join("detect.sh");
        fs::write(
            &script,
            "#!/bin/sh\nmkdir -p \"${10}/${12}\"\ncp \"$4\" \"${10}/${12}/anotada.jpg\"\nprintf 'Image,Prediction\\na,perro\\na,perro\\n' > \"${10}/${12}/predictions.csv\"\n",
        )
        .unwrap();

        let engine = LegacyScriptEngine::new("sh", &script, Arc::clone(&sink));
        let outcome = engine
            .run(request(&image, &dir.path().join("pesos.pt")))
            .await
            .unwrap();

        assert!(outcome.annotated_path.starts_with("/static/outputs/det_"));
        assert_eq!(outcome.class_counts.get("perro"), Some(&ClassStat::Count(2)));

        let copied = sink
            .dir()
            .join(outcome.annotated_path.rsplit('/').next().unwrap());
        assert!(copied.is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_experiment_dir_is_no_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = Arc::new(OutputSink::new(dir.path().join("outputs"), "/static/outputs").unwrap());

        let script = dir.path().join("detect.sh");
        fs::write(&script, "#!/bin/sh\nmkdir -p \"${10}/${12}\"\n").unwrap();

        let engine = LegacyScriptEngine::new("sh", &script, sink);
        let result = engine
            .run(request(&dir.path().join("img.jpg"), &dir.path().join("pesos.pt")))
            .await;
        assert!(matches!(result, Err(DomainError::NoOutputProduced(_))));
    }
}
