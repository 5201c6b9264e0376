use std::sync::Arc;
use crate::application::services::BrowseService;

/// Estado compartido para los manejadores HTTP de Axum: el servicio de
/// navegación, que a su vez guarda el único slot de sesión del proceso.
#[derive(Clone)]
pub struct HttpState {
    pub browser: Arc<BrowseService>,
}
