use image::GrayImage;
use ndarray::{ArrayView2, ArrayView3};
use std::collections::HashMap;

use crate::domain::errors::{DomainError, DomainResult};

/// Número de coeficientes de máscara del cabezal de segmentación.
pub const MASK_COEFFS: usize = 32;

/// Límite duro de detecciones conservadas tras NMS.
pub const MAX_DETECTIONS: usize = 300;

/// Candidato decodificado. Las esquinas `x1..y2` están en coordenadas de la
/// imagen original; `cx, cy, w, h` se conservan en coordenadas del modelo
/// para recortar máscaras y rotar cajas orientadas.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub score: f32,
    pub class_id: usize,
    pub coeffs: Vec<f32>, // segmentación: MASK_COEFFS valores
    pub angle: f32,       // obb: radianes; NAN si no aplica
}

/// Disposición del tensor de salida `[1, attrs, N]` según la tarea.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadLayout {
    /// attrs = 4 + nc
    Detect,
    /// attrs = 4 + nc + 32 (coeficientes de máscara al final)
    Segment,
    /// attrs = 4 + nc + 1 (ángulo en radianes al final)
    Obb,
}

impl HeadLayout {
    fn trailing(self) -> usize {
        match self {
            HeadLayout::Detect => 0,
            HeadLayout::Segment => MASK_COEFFS,
            HeadLayout::Obb => 1,
        }
    }

    /// Número de clases implícito en `attrs`, o `InferenceError` si la
    /// salida no tiene la forma que exige la tarea.
    pub fn class_count(self, attrs: usize) -> DomainResult<usize> {
        let overhead = 4 + self.trailing();
        if attrs <= overhead {
            return Err(DomainError::InferenceError(format!(
                "salida con {attrs} atributos, incompatible con la tarea ({:?} requiere más de {overhead})",
                self
            )));
        }
        Ok(attrs - overhead)
    }
}

/// Decodifica la vista `[attrs, N]` filtrando por confianza y escalando a
/// las dimensiones de la imagen original.
pub fn decode_candidates(
    view: &ArrayView2<f32>,
    layout: HeadLayout,
    conf_threshold: f32,
    scale: (f32, f32),
) -> DomainResult<Vec<Candidate>> {
    let attrs = view.shape()[0];
    let candidates = view.shape()[1];
    let nc = layout.class_count(attrs)?;
    let (sx, sy) = scale;

    let mut out = Vec::new();
    for i in 0..candidates {
        let mut class_id = 0usize;
        let mut score = f32::MIN;
        for c in 0..nc {
            let s = view[[4 + c, i]];
            if s > score {
                score = s;
                class_id = c;
            }
        }
        if score <= conf_threshold {
            continue;
        }

        let cx = view[[0, i]];
        let cy = view[[1, i]];
        let w = view[[2, i]];
        let h = view[[3, i]];

        let coeffs = match layout {
            HeadLayout::Segment => (0..MASK_COEFFS).map(|k| view[[4 + nc + k, i]]).collect(),
            _ => Vec::new(),
        };
        let angle = match layout {
            HeadLayout::Obb => view[[4 + nc, i]],
            _ => f32::NAN,
        };

        out.push(Candidate {
            x1: (cx - w / 2.0) * sx,
            y1: (cy - h / 2.0) * sy,
            x2: (cx + w / 2.0) * sx,
            y2: (cy + h / 2.0) * sy,
            cx,
            cy,
            w,
            h,
            score,
            class_id,
            coeffs,
            angle,
        });
    }
    Ok(out)
}

pub fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// NMS por clase: solo se comparan candidatos de la misma clase. El
/// resultado queda ordenado por confianza descendente y acotado a
/// `MAX_DETECTIONS`.
pub fn nms(candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    let mut groups: HashMap<usize, Vec<Candidate>> = HashMap::new();
    for candidate in candidates {
        groups.entry(candidate.class_id).or_default().push(candidate);
    }

    let mut kept = Vec::new();
    for (_, mut group) in groups {
        group.sort_unstable_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        let mut suppressed = vec![false; group.len()];
        for i in 0..group.len() {
            if suppressed[i] {
                continue;
            }
            for j in (i + 1)..group.len() {
                if !suppressed[j] && iou(&group[i], &group[j]) > iou_threshold {
                    suppressed[j] = true;
                }
            }
            kept.push(group[i].clone());
        }
    }

    kept.sort_unstable_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    kept.truncate(MAX_DETECTIONS);
    kept
}

/// Índice y confianza de la clase dominante de un vector de probabilidades.
pub fn top1(probs: &[f32]) -> Option<(usize, f32)> {
    probs
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, &p)| (i, p))
}

/// Esquinas del polígono orientado, rotadas en coordenadas del modelo y
/// escaladas a la imagen original.
pub fn obb_corners(candidate: &Candidate, scale: (f32, f32)) -> [(f32, f32); 4] {
    let (sx, sy) = scale;
    let (cos, sin) = (candidate.angle.cos(), candidate.angle.sin());
    let (hw, hh) = (candidate.w / 2.0, candidate.h / 2.0);

    let offsets = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)];
    offsets.map(|(dx, dy)| {
        let rx = candidate.cx + dx * cos - dy * sin;
        let ry = candidate.cy + dx * sin + dy * cos;
        (rx * sx, ry * sy)
    })
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Máscara binaria de una instancia: sigmoide del producto coeficientes ·
/// prototipos, recortada a la caja del candidato y reescalada al tamaño de
/// la imagen original. Blanco (255) dentro de la instancia.
pub fn instance_mask(
    candidate: &Candidate,
    protos: &ArrayView3<f32>, // [MASK_COEFFS, mh, mw]
    model_size: u32,
    original: (u32, u32),
) -> GrayImage {
    let mh = protos.shape()[1];
    let mw = protos.shape()[2];
    let proto_scale = mw as f32 / model_size as f32;

    let bx1 = (candidate.cx - candidate.w / 2.0) * proto_scale;
    let by1 = (candidate.cy - candidate.h / 2.0) * proto_scale;
    let bx2 = (candidate.cx + candidate.w / 2.0) * proto_scale;
    let by2 = (candidate.cy + candidate.h / 2.0) * proto_scale;

    let mut mask = GrayImage::new(mw as u32, mh as u32);
    for y in 0..mh {
        for x in 0..mw {
            let (fx, fy) = (x as f32, y as f32);
            if fx < bx1 || fx > bx2 || fy < by1 || fy > by2 {
                continue;
            }
            let mut acc = 0.0;
            for (k, coeff) in candidate.coeffs.iter().enumerate() {
                acc += coeff * protos[[k, y, x]];
            }
            if sigmoid(acc) > 0.5 {
                mask.put_pixel(x as u32, y as u32, image::Luma([255u8]));
            }
        }
    }

    image::imageops::resize(
        &mask,
        original.0,
        original.1,
        image::imageops::FilterType::Nearest,
    )
}
