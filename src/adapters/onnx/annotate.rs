use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

static FONT_BYTES: &[u8] = include_bytes!("../../../fonts/DejaVuSans.ttf");
static FONT: OnceLock<FontRef<'static>> = OnceLock::new();

const LABEL_SCALE: f32 = 16.0;

fn font() -> &'static FontRef<'static> {
    FONT.get_or_init(|| {
        FontRef::try_from_slice(FONT_BYTES).expect("fuente embebida inválida")
    })
}

/// Color pseudoaleatorio determinista por id de clase: la misma clase
/// siempre se pinta igual dentro de un proceso.
pub fn class_color(class_id: usize) -> Rgb<u8> {
    let mut rng = SmallRng::seed_from_u64(class_id as u64);
    Rgb([rng.gen(), rng.gen(), rng.gen()])
}

pub fn draw_label(canvas: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
    let x = x.max(0);
    let y = y.max(0);
    draw_text_mut(canvas, color, x, y, PxScale::from(LABEL_SCALE), font(), text);
}

/// Rectángulo hueco con etiqueta `label score` justo encima.
pub fn draw_box(canvas: &mut RgbImage, x1: f32, y1: f32, x2: f32, y2: f32, text: &str, color: Rgb<u8>) {
    let (w, h) = (canvas.width() as f32, canvas.height() as f32);
    let x1 = x1.clamp(0.0, w - 1.0);
    let y1 = y1.clamp(0.0, h - 1.0);
    let x2 = x2.clamp(0.0, w - 1.0);
    let y2 = y2.clamp(0.0, h - 1.0);

    let rect_w = ((x2 - x1) as u32).max(1);
    let rect_h = ((y2 - y1) as u32).max(1);
    draw_hollow_rect_mut(canvas, Rect::at(x1 as i32, y1 as i32).of_size(rect_w, rect_h), color);
    draw_label(canvas, text, x1 as i32, y1 as i32 - 18, color);
}

/// Contorno externo como polilínea cerrada, con etiqueta junto al primer
/// punto del contorno.
pub fn draw_contour(canvas: &mut RgbImage, points: &[Point<i32>], text: &str, color: Rgb<u8>) {
    if points.is_empty() {
        return;
    }
    for pair in points.windows(2) {
        draw_line_segment_mut(
            canvas,
            (pair[0].x as f32, pair[0].y as f32),
            (pair[1].x as f32, pair[1].y as f32),
            color,
        );
    }
    let first = points[0];
    let last = points[points.len() - 1];
    draw_line_segment_mut(
        canvas,
        (last.x as f32, last.y as f32),
        (first.x as f32, first.y as f32),
        color,
    );
    draw_label(canvas, text, first.x, first.y - 16, color);
}

/// Polígono orientado cerrado, con etiqueta junto al primer vértice.
pub fn draw_polygon(canvas: &mut RgbImage, corners: &[(f32, f32); 4], text: &str, color: Rgb<u8>) {
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        draw_line_segment_mut(canvas, a, b, color);
    }
    draw_label(canvas, text, corners[0].0 as i32, corners[0].1 as i32 - 16, color);
}

/// Destino de las imágenes anotadas: directorio en disco más el prefijo
/// público bajo el que las sirve la capa HTTP. Los nombres combinan marca
/// de tiempo a resolución de microsegundo con un contador atómico de
/// proceso, de modo que dos reservas en el mismo microsegundo no colisionan.
pub struct OutputSink {
    dir: PathBuf,
    public_prefix: String,
    seq: AtomicU64,
}

impl OutputSink {
    pub fn new(dir: impl Into<PathBuf>, public_prefix: impl Into<String>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            public_prefix: public_prefix.into(),
            seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserva un nombre único y devuelve (ruta en disco, URL pública).
    pub fn reserve(&self, ext: &str) -> (PathBuf, String) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "det_{}_{:06}_{}.{}",
            now.as_secs(),
            now.subsec_micros(),
            seq,
            ext
        );
        let url = format!("{}/{}", self.public_prefix.trim_end_matches('/'), name);
        (self.dir.join(name), url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_class_id_always_same_color() {
        assert_eq!(class_color(7), class_color(7));
        assert_eq!(class_color(0), class_color(0));
    }

    #[test]
    fn distinct_class_ids_differ_in_color() {
        // No hay garantía teórica, pero para los primeros ids debe cumplirse.
        let colors: Vec<_> = (0..10usize).map(class_color).collect();
        for i in 0..colors.len() {
            for j in (i + 1)..colors.len() {
                assert_ne!(colors[i], colors[j], "ids {i} y {j}");
            }
        }
    }

    #[test]
    fn reserve_never_collides_within_same_microsecond() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = OutputSink::new(dir.path(), "/static/outputs").unwrap();

        let mut names = std::collections::HashSet::new();
        for _ in 0..1000 {
            let (path, _) = sink.reserve("jpg");
            assert!(names.insert(path), "nombre repetido");
        }
    }

    #[test]
    fn reserve_builds_public_url_under_prefix() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = OutputSink::new(dir.path(), "/static/outputs/").unwrap();

        let (path, url) = sink.reserve("jpg");
        assert!(url.starts_with("/static/outputs/det_"));
        assert!(url.ends_with(".jpg"));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            url.rsplit('/').next().unwrap()
        );
    }

    #[test]
    fn drawing_is_clipped_to_canvas() {
        let mut canvas = RgbImage::new(64, 64);
        draw_box(&mut canvas, -10.0, -10.0, 120.0, 120.0, "fuera 0.99", Rgb([255, 0, 0]));
        draw_polygon(
            &mut canvas,
            &[(-5.0, -5.0), (70.0, -5.0), (70.0, 70.0), (-5.0, 70.0)],
            "obb 0.50",
            Rgb([0, 255, 0]),
        );
        // No debe haber pánico; el lienzo sigue siendo 64x64.
        assert_eq!(canvas.dimensions(), (64, 64));
    }
}
