use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde_json::json;

use crate::adapters::http::state::HttpState;
use crate::application::dto::{BrowseQuery, LiveUpdateQuery, SetFolderForm};
use crate::domain::errors::DomainError;

/// `GET /`: estado de página, re-ejecutando la detección si llegan carpeta
/// y modelo. Los errores de navegación viajan como `message` en la página.
pub async fn home(
    State(st): State<HttpState>,
    Query(query): Query<BrowseQuery>,
) -> impl IntoResponse {
    Json(st.browser.browse(query).await)
}

/// `POST /set-folder`: selección de carpeta/modelo con detección inmediata
/// sobre la primera imagen.
pub async fn set_folder(
    State(st): State<HttpState>,
    Form(form): Form<SetFolderForm>,
) -> impl IntoResponse {
    Json(st.browser.select_folder(form).await)
}

/// `GET /live_update`: persiste umbrales y devuelve
/// `{ result_img, class_counts }`.
pub async fn live_update(
    State(st): State<HttpState>,
    Query(query): Query<LiveUpdateQuery>,
) -> Response {
    match st.browser.live_update(query).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(error: DomainError) -> Response {
    let status = match &error {
        DomainError::InvalidFolder(_)
        | DomainError::NoImagesFound(_)
        | DomainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DomainError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}
