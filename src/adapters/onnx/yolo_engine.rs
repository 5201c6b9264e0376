use async_trait::async_trait;
use image::RgbImage;
use imageproc::contours::{BorderType, Contour};
use ndarray::{Array4, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix2, Ix3, IxDyn};
use ort::execution_providers::CUDA as CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::adapters::onnx::annotate::{
    class_color, draw_box, draw_contour, draw_label, draw_polygon, OutputSink,
};
use crate::adapters::onnx::postprocess::{
    decode_candidates, instance_mask, nms, obb_corners, top1, Candidate, HeadLayout, MASK_COEFFS,
};
use crate::application::ports::EnginePort;
use crate::domain::{
    detection::{tally_labels, ClassStat, DetectionOutcome, TaskKind},
    errors::{DomainError, DomainResult},
    request::DetectionRequest,
};

const DEFAULT_INPUT_SIZE: u32 = 640;

/// Motor unificado: carga el modelo ONNX, ejecuta una inferencia por
/// llamada y pinta las anotaciones de la tarea sobre una copia de la
/// imagen fuente. El modelo se recarga en cada llamada; coste conocido,
/// fuera de alcance optimizarlo aquí.
pub struct OnnxUnifiedEngine {
    sink: Arc<OutputSink>,
    input_size: u32,
}

impl OnnxUnifiedEngine {
    pub fn new(sink: Arc<OutputSink>) -> Self {
        Self { sink, input_size: DEFAULT_INPUT_SIZE }
    }
}

#[async_trait]
impl EnginePort for OnnxUnifiedEngine {
    async fn run(&self, request: DetectionRequest) -> DomainResult<DetectionOutcome> {
        let sink = Arc::clone(&self.sink);
        let input_size = self.input_size;
        tokio::task::spawn_blocking(move || run_blocking(&request, &sink, input_size))
            .await
            .map_err(|e| DomainError::InferenceError(format!("tarea de inferencia abortada: {e}")))?
    }
}

fn load_session(model_path: &Path) -> DomainResult<Session> {
    let mut builder = Session::builder()
        .map_err(|e| DomainError::ModelLoadError(e.to_string()))?
        .with_intra_threads(4)
        .map_err(|e| DomainError::ModelLoadError(e.to_string()))?;

    // CUDA es opcional: si está disponible se registra, si no seguimos en CPU.
    let cuda = CUDAExecutionProvider::default().build();
    if let Ok(builder_with_cuda) = builder.clone().with_execution_providers([cuda]) {
        builder = builder_with_cuda;
    }

    let model_bytes = fs::read(model_path)
        .map_err(|e| DomainError::ModelLoadError(format!("{}: {e}", model_path.display())))?;
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| DomainError::ModelLoadError(format!("{}: {e}", model_path.display())))
}

/// Nombres de clase del metadato `names` del export Ultralytics
/// (`{0: 'person', 1: 'bicycle', ...}`). Sin metadato, `class_{id}`.
fn class_names(session: &Session) -> BTreeMap<usize, String> {
    session
        .metadata()
        .ok()
        .and_then(|meta| meta.custom("names"))
        .map(|raw| parse_names_dict(&raw))
        .unwrap_or_default()
}

fn parse_names_dict(raw: &str) -> BTreeMap<usize, String> {
    let trimmed = raw.trim().trim_start_matches('{').trim_end_matches('}');
    let mut names = BTreeMap::new();
    for entry in trimmed.split(',') {
        let Some((key, value)) = entry.split_once(':') else {
            continue;
        };
        let Ok(id) = key.trim().parse::<usize>() else {
            continue;
        };
        let label = value.trim().trim_matches(|c| c == '\'' || c == '"').to_string();
        if !label.is_empty() {
            names.insert(id, label);
        }
    }
    names
}

fn label_for(names: &BTreeMap<usize, String>, class_id: usize) -> String {
    names
        .get(&class_id)
        .cloned()
        .unwrap_or_else(|| format!("class_{class_id}"))
}

/// Tensor CHW `[1, 3, s, s]` normalizado a [0,1], con reescalado simple
/// (sin letterbox, igual que el flujo original).
fn preprocess(rgb: &RgbImage, input_size: u32) -> Array4<f32> {
    let size = input_size as usize;
    let resized = image::imageops::resize(
        rgb,
        input_size,
        input_size,
        image::imageops::FilterType::Nearest,
    );

    let mut input = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
        input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
        input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
    }
    input
}

fn run_blocking(
    request: &DetectionRequest,
    sink: &OutputSink,
    input_size: u32,
) -> DomainResult<DetectionOutcome> {
    let source = image::open(&request.image_path)
        .map_err(|e| {
            DomainError::InvalidInput(format!(
                "no se pudo abrir la imagen {}: {e}",
                request.image_path.display()
            ))
        })?
        .to_rgb8();
    // La fuente nunca se muta: se anota sobre una copia.
    let mut annotated = source.clone();

    let mut session = load_session(&request.model_path)?;
    let names = class_names(&session);

    if request.task == TaskKind::Segmentation && session.outputs().len() < 2 {
        return Err(DomainError::InferenceError(
            "el modelo no expone salida de máscaras para la tarea de segmentación".into(),
        ));
    }

    let input = preprocess(&source, input_size);
    let shape = vec![1i64, 3, input_size as i64, input_size as i64];
    let input_tensor = Value::from_array((shape, input.into_raw_vec()))
        .map_err(|e| DomainError::InferenceError(e.to_string()))?;

    let outputs = session
        .run(ort::inputs![input_tensor])
        .map_err(|e| DomainError::InferenceError(e.to_string()))?;

    let (shape_out, data_out) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| DomainError::InferenceError(e.to_string()))?;
    let dims: Vec<usize> = shape_out.into_iter().map(|&x| x as usize).collect();
    let primary = ArrayViewD::from_shape(IxDyn(&dims), data_out)
        .map_err(|e| DomainError::InferenceError(e.to_string()))?;

    let scale = (
        source.width() as f32 / input_size as f32,
        source.height() as f32 / input_size as f32,
    );

    let class_counts = match request.task {
        TaskKind::Classification => annotate_classification(&mut annotated, &primary, &names)?,
        TaskKind::Normal => {
            let view = detection_view(&primary)?;
            let kept = decode_and_keep(&view, HeadLayout::Detect, request, scale)?;
            annotate_boxes(&mut annotated, &kept, &names)
        }
        TaskKind::Segmentation => {
            let view = detection_view(&primary)?;
            let kept = decode_and_keep(&view, HeadLayout::Segment, request, scale)?;

            let (proto_shape, proto_data) = outputs[1]
                .try_extract_tensor::<f32>()
                .map_err(|e| DomainError::InferenceError(e.to_string()))?;
            let proto_dims: Vec<usize> = proto_shape.into_iter().map(|&x| x as usize).collect();
            let protos = ArrayViewD::from_shape(IxDyn(&proto_dims), proto_data)
                .map_err(|e| DomainError::InferenceError(e.to_string()))?;
            let protos = proto_view(&protos)?;

            annotate_masks(&mut annotated, &kept, &protos, input_size, &names)
        }
        TaskKind::Obb => {
            let view = detection_view(&primary)?;
            let kept = decode_and_keep(&view, HeadLayout::Obb, request, scale)?;
            annotate_obb(&mut annotated, &kept, scale, &names)
        }
    };

    let (path, url) = sink.reserve("jpg");
    annotated.save(&path).map_err(|e| {
        DomainError::InferenceError(format!("no se pudo guardar la imagen anotada: {e}"))
    })?;

    info!(
        "Inferencia {:?} sobre {} → {} clases",
        request.task,
        request.image_path.display(),
        class_counts.len()
    );

    Ok(DetectionOutcome { annotated_path: url, class_counts })
}

/// Vista `[attrs, N]` del tensor de detección `[1, attrs, N]`.
fn detection_view<'a>(primary: &'a ArrayViewD<'a, f32>) -> DomainResult<ArrayView2<'a, f32>> {
    if primary.ndim() != 3 {
        return Err(DomainError::InferenceError(format!(
            "se esperaba salida 3D [1, attrs, N], llegó {}D",
            primary.ndim()
        )));
    }
    primary
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .map_err(|e| DomainError::InferenceError(e.to_string()))
}

/// Vista `[32, mh, mw]` del tensor de prototipos `[1, 32, mh, mw]`.
fn proto_view<'a>(protos: &'a ArrayViewD<'a, f32>) -> DomainResult<ArrayView3<'a, f32>> {
    if protos.ndim() != 4 || protos.shape()[1] != MASK_COEFFS {
        return Err(DomainError::InferenceError(format!(
            "tensor de prototipos con forma {:?}, se esperaba [1, {MASK_COEFFS}, mh, mw]",
            protos.shape()
        )));
    }
    protos
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix3>()
        .map_err(|e| DomainError::InferenceError(e.to_string()))
}

fn decode_and_keep(
    view: &ArrayView2<f32>,
    layout: HeadLayout,
    request: &DetectionRequest,
    scale: (f32, f32),
) -> DomainResult<Vec<Candidate>> {
    let decoded = decode_candidates(view, layout, request.thresholds.conf, scale)?;
    Ok(nms(decoded, request.thresholds.iou))
}

/// Clasificación: top-1 como texto en un ancla fija y un mapa de exactamente
/// una entrada etiqueta → confianza (float, no conteo).
fn annotate_classification(
    canvas: &mut RgbImage,
    primary: &ArrayViewD<f32>,
    names: &BTreeMap<usize, String>,
) -> DomainResult<BTreeMap<String, ClassStat>> {
    if primary.ndim() != 2 {
        return Err(DomainError::InferenceError(format!(
            "se esperaba salida de clasificación [1, nc], llegó {:?}",
            primary.shape()
        )));
    }
    let probs: Vec<f32> = primary.index_axis(Axis(0), 0).iter().copied().collect();
    let (class_id, score) = top1(&probs).ok_or_else(|| {
        DomainError::InferenceError("el modelo no devolvió probabilidades de clase".into())
    })?;

    let label = label_for(names, class_id);
    draw_label(canvas, &format!("{label} ({score:.2})"), 10, 30, image::Rgb([0, 255, 0]));

    let mut counts = BTreeMap::new();
    counts.insert(label, ClassStat::Score(score));
    Ok(counts)
}

fn annotate_boxes(
    canvas: &mut RgbImage,
    kept: &[Candidate],
    names: &BTreeMap<usize, String>,
) -> BTreeMap<String, ClassStat> {
    let mut labels = Vec::with_capacity(kept.len());
    for det in kept {
        let label = label_for(names, det.class_id);
        let color = class_color(det.class_id);
        draw_box(
            canvas,
            det.x1,
            det.y1,
            det.x2,
            det.y2,
            &format!("{label} {:.2}", det.score),
            color,
        );
        labels.push(label);
    }
    tally_labels(labels.iter().map(String::as_str))
}

fn annotate_masks(
    canvas: &mut RgbImage,
    kept: &[Candidate],
    protos: &ArrayView3<f32>,
    input_size: u32,
    names: &BTreeMap<usize, String>,
) -> BTreeMap<String, ClassStat> {
    let mut labels = Vec::with_capacity(kept.len());
    for det in kept {
        let label = label_for(names, det.class_id);
        let color = class_color(det.class_id);

        let mask = instance_mask(det, protos, input_size, canvas.dimensions());
        let contours: Vec<Contour<i32>> = imageproc::contours::find_contours(&mask);
        let mut labelled = false;
        for contour in contours.iter().filter(|c| c.border_type == BorderType::Outer) {
            let text = if labelled {
                String::new()
            } else {
                format!("{label} {:.2}", det.score)
            };
            draw_contour(canvas, &contour.points, &text, color);
            labelled = true;
        }
        labels.push(label);
    }
    tally_labels(labels.iter().map(String::as_str))
}

fn annotate_obb(
    canvas: &mut RgbImage,
    kept: &[Candidate],
    scale: (f32, f32),
    names: &BTreeMap<usize, String>,
) -> BTreeMap<String, ClassStat> {
    let mut labels = Vec::with_capacity(kept.len());
    for det in kept {
        let label = label_for(names, det.class_id);
        let color = class_color(det.class_id);
        let corners = obb_corners(det, scale);
        draw_polygon(canvas, &corners, &format!("{label} {:.2}", det.score), color);
        labels.push(label);
    }
    tally_labels(labels.iter().map(String::as_str))
}
