use std::fs;
use std::path::Path;

use crate::application::ports::ModelProbePort;
use crate::domain::detection::ModelKind;

/// Marca de serialización de la librería legacy dentro del pickle de pesos.
const LEGACY_MARKER: &[u8] = b"models.yolo";

/// Sondea los bytes crudos del fichero de modelo en busca de la marca
/// legacy. Fail-open: cualquier fallo de lectura resuelve a `Unified`.
pub struct ByteMarkerProbe;

fn contains_marker(bytes: &[u8]) -> bool {
    bytes
        .windows(LEGACY_MARKER.len())
        .any(|window| window == LEGACY_MARKER)
}

impl ModelProbePort for ByteMarkerProbe {
    fn probe(&self, model: &Path) -> ModelKind {
        match fs::read(model) {
            Ok(bytes) if contains_marker(&bytes) => ModelKind::Legacy,
            _ => ModelKind::Unified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_routes_to_legacy_regardless_of_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pesos.onnx");
        fs::write(&path, b"\x80\x04...models.yolo.DetectionModel...").unwrap();

        assert_eq!(ByteMarkerProbe.probe(&path), ModelKind::Legacy);
    }

    #[test]
    fn file_without_marker_is_unified() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("yolo11n.onnx");
        fs::write(&path, b"onnx-protobuf-bytes").unwrap();

        assert_eq!(ByteMarkerProbe.probe(&path), ModelKind::Unified);
    }

    #[test]
    fn read_failure_fails_open_to_unified() {
        assert_eq!(
            ByteMarkerProbe.probe(Path::new("/no/existe.pt")),
            ModelKind::Unified
        );
    }

    #[test]
    fn marker_split_across_prefix_is_found() {
        let mut bytes = vec![0u8; 1000];
        bytes.extend_from_slice(b"models.yolo");
        assert!(contains_marker(&bytes));
        assert!(!contains_marker(b"models.yol"));
    }
}
