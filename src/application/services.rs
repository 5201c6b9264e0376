use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::application::dto::{
    BrowseQuery, LiveUpdateQuery, LiveUpdateResponse, PageState, SetFolderForm,
};
use crate::application::ports::{EnginePort, ImageCatalogPort, ModelProbePort, ThresholdStorePort};
use crate::domain::{
    detection::{DetectionOutcome, EngineHint, ModelKind, TaskKind},
    errors::{DomainError, DomainResult},
    request::{DetectionRequest, Thresholds},
    session::Session,
};

/// Acota un índice solicitado a `[0, count-1]`. Con `count == 0` devuelve 0;
/// el llamante debe garantizar que hay ficheros antes de indexar.
pub fn clamp_index(requested: i64, count: usize) -> usize {
    requested.min(count as i64 - 1).max(0) as usize
}

/// Despachador de inferencia: enruta cada petición al motor legacy o al
/// unificado. Puro enrutado, sin lógica de inferencia propia.
pub struct DetectionService {
    unified: Arc<dyn EnginePort>,
    legacy: Arc<dyn EnginePort>,
    probe: Arc<dyn ModelProbePort>,
}

impl DetectionService {
    pub fn new(
        unified: Arc<dyn EnginePort>,
        legacy: Arc<dyn EnginePort>,
        probe: Arc<dyn ModelProbePort>,
    ) -> Self {
        Self { unified, legacy, probe }
    }

    /// Con `Auto` consulta el sondeo de bytes del modelo; un hint explícito
    /// se respeta sin comprobar nada.
    pub async fn detect(
        &self,
        request: DetectionRequest,
        hint: EngineHint,
    ) -> DomainResult<DetectionOutcome> {
        let kind = match hint {
            EngineHint::Legacy => ModelKind::Legacy,
            EngineHint::Unified => ModelKind::Unified,
            EngineHint::Auto => self.probe.probe(&request.model_path),
        };

        match kind {
            ModelKind::Legacy => {
                info!("⚠ Modelo legacy en {} – invocando script externo", request.model_path.display());
                self.legacy.run(request).await
            }
            ModelKind::Unified => {
                info!("ℹ Motor unificado para {}", request.model_path.display());
                self.unified.run(request).await
            }
        }
    }
}

/// Orquestador de navegación: listado de carpeta, acotado de índice,
/// despacho de detección y actualización del slot de sesión.
pub struct BrowseService {
    catalog: Arc<dyn ImageCatalogPort>,
    detector: DetectionService,
    thresholds: Arc<dyn ThresholdStorePort>,
    session: Mutex<Session>,
}

impl BrowseService {
    pub fn new(
        catalog: Arc<dyn ImageCatalogPort>,
        detector: DetectionService,
        thresholds: Arc<dyn ThresholdStorePort>,
    ) -> Self {
        Self {
            catalog,
            detector,
            thresholds,
            session: Mutex::new(Session::default()),
        }
    }

    /// `GET /`: con carpeta y modelo presentes re-ejecuta la detección sobre
    /// el índice acotado; los errores se devuelven como mensaje de página.
    pub async fn browse(&self, query: BrowseQuery) -> PageState {
        let stored = self.thresholds.load().await;
        let thresholds = Thresholds {
            conf: query.conf.unwrap_or(stored.conf),
            iou: query.iou.unwrap_or(stored.iou),
        };

        if let (Some(folder), Some(model)) = (query.folder.as_deref(), query.model_path.as_deref())
        {
            if let Err(e) = self
                .run_at(folder, model, query.model_type, query.engine, query.index, thresholds)
                .await
            {
                return self.page_with(thresholds, Some(e.to_string()));
            }
        }

        self.page_with(thresholds, None)
    }

    /// `POST /set-folder`: valida la carpeta y lanza detección sobre la
    /// primera imagen con los umbrales persistidos.
    pub async fn select_folder(&self, form: SetFolderForm) -> PageState {
        let thresholds = self.thresholds.load().await;

        match self
            .run_at(&form.folder_path, &form.model_path, form.model_type, form.engine, 0, thresholds)
            .await
        {
            Ok(_) => self.page_with(thresholds, None),
            Err(e) => self.page_with(thresholds, Some(e.to_string())),
        }
    }

    /// `GET /live_update`: persiste los umbrales recibidos y re-ejecuta la
    /// detección. A diferencia de la navegación, los errores se propagan
    /// para que la capa HTTP responda con el código adecuado.
    pub async fn live_update(&self, query: LiveUpdateQuery) -> DomainResult<LiveUpdateResponse> {
        let thresholds = Thresholds { conf: query.conf, iou: query.iou };
        self.thresholds.save(thresholds).await?;

        let outcome = self
            .run_at(&query.folder, &query.model_path, query.model_type, query.engine, query.index, thresholds)
            .await?;

        Ok(LiveUpdateResponse {
            result_img: outcome.annotated_path,
            class_counts: outcome.class_counts,
        })
    }

    async fn run_at(
        &self,
        folder: &str,
        model: &str,
        task: TaskKind,
        engine: EngineHint,
        index: i64,
        thresholds: Thresholds,
    ) -> DomainResult<DetectionOutcome> {
        let folder_path = Path::new(folder);
        let files = self.catalog.list_images(folder_path).await?;
        if files.is_empty() {
            return Err(DomainError::NoImagesFound(folder.to_string()));
        }

        let index = clamp_index(index, files.len());
        let image_path = folder_path.join(&files[index]);

        let request = DetectionRequest {
            image_path,
            model_path: PathBuf::from(model),
            thresholds,
            task,
        };
        let outcome = self.detector.detect(request, engine).await?;

        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        session.folder = folder.to_string();
        session.files = files;
        session.index = index;
        session.model_path = model.to_string();
        session.task = task;
        session.engine = engine;
        session.result = Some(outcome.clone());

        Ok(outcome)
    }

    fn page_with(&self, thresholds: Thresholds, message: Option<String>) -> PageState {
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        PageState::from_session(&session, thresholds, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_stays_within_bounds() {
        assert_eq!(clamp_index(-5, 3), 0);
        assert_eq!(clamp_index(0, 3), 0);
        assert_eq!(clamp_index(2, 3), 2);
        assert_eq!(clamp_index(99, 3), 2);
        assert_eq!(clamp_index(5, 0), 0);
    }

    #[test]
    fn clamp_is_monotonic() {
        let count = 7;
        let mut last = 0;
        for requested in -3..15 {
            let clamped = clamp_index(requested, count);
            assert!(clamped >= last, "el acotado no debe reordenar");
            assert!(clamped < count);
            last = clamped;
        }
    }
}
