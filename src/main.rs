use std::sync::Arc;
use tower_http::services::ServeDir;

use yolo_folder_dashboard::adapters::{
    fs::{image_catalog::FsImageCatalog, threshold_store::FileThresholdStore},
    http::{router, state::HttpState},
    legacy::engine::LegacyScriptEngine,
    onnx::{annotate::OutputSink, model_probe::ByteMarkerProbe, yolo_engine::OnnxUnifiedEngine},
};
use yolo_folder_dashboard::application::services::{BrowseService, DetectionService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Inicializar logs (RUST_LOG=info por defecto)
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    tracing::info!("🔧 Inicializando adaptadores de infraestructura...");

    // 2. Instanciar Adaptadores (Capa de Infraestructura)
    // Arc porque se comparten entre servicios y el servidor HTTP.
    let sink = Arc::new(OutputSink::new("static/outputs", "/static/outputs")?);
    let catalog = Arc::new(FsImageCatalog);
    let probe = Arc::new(ByteMarkerProbe);
    let store = Arc::new(FileThresholdStore::new("thresholds.json"));
    let unified = Arc::new(OnnxUnifiedEngine::new(Arc::clone(&sink)));

    let legacy_script =
        std::env::var("LEGACY_DETECT_SCRIPT").unwrap_or_else(|_| "yolov5/detect.py".to_string());
    let legacy_interpreter =
        std::env::var("LEGACY_INTERPRETER").unwrap_or_else(|_| "python3".to_string());
    let legacy = Arc::new(LegacyScriptEngine::new(
        legacy_interpreter,
        legacy_script,
        Arc::clone(&sink),
    ));

    // 3. Instanciar Servicios (Capa de Aplicación - Casos de Uso)
    let detector = DetectionService::new(unified, legacy, probe);
    let browser = Arc::new(BrowseService::new(catalog, detector, store));

    // 4. Configurar el Router de Axum y Archivos Estáticos
    let state = HttpState { browser };
    let app = router(state).nest_service("/static", ServeDir::new("static"));

    // 5. Lanzar el Servidor
    let port = 8090;
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("🚀 Dashboard de detección iniciado en http://{}", addr);
    tracing::info!("📂 Imágenes anotadas servidas bajo /static/outputs");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
