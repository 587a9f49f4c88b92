use std::sync::Arc;

use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Form, Json, Router};
use mosaic_catalogue::{DeployError, EngineError};
use mosaic_manifest::{ResourceId, Version};
use serde::Deserialize;

use crate::ingest::{Coordinator, IngestError, Upload};

/// Header carrying the requesting user. Authentication itself is an
/// external collaborator; this header is its seam.
pub const USER_HEADER: &str = "x-mosaic-user";

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/resources", post(create_resource))
        .route(
            "/resources/{vendor}/{name}/{version}",
            delete(delete_resource),
        )
        .with_state(state)
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_input",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "code": self.code, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let (status, code) = match &err {
            IngestError::MissingInput(_)
            | IngestError::InvalidUrl { .. }
            | IngestError::Archive(_)
            | IngestError::Manifest(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            IngestError::Fetch(_) => (StatusCode::BAD_GATEWAY, "upstream_unavailable"),
            IngestError::Engine(engine) => engine_status(engine),
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let (status, code) = engine_status(&err);
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn engine_status(err: &EngineError) -> (StatusCode, &'static str) {
    match err {
        EngineError::InstanceConflict(_) => (StatusCode::CONFLICT, "conflict"),
        EngineError::UnknownResource(_) => (StatusCode::NOT_FOUND, "not_found"),
        EngineError::Archive(_) | EngineError::PackageRequired(_) => {
            (StatusCode::BAD_REQUEST, "invalid_input")
        }
        EngineError::Deploy(DeployError::UnsafeEntry(_) | DeployError::Archive(_)) => {
            (StatusCode::BAD_REQUEST, "invalid_input")
        }
        EngineError::Deploy(_) | EngineError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    }
}

fn require_user(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::invalid_input(format!("missing {USER_HEADER} header")))
}

#[derive(Debug, Deserialize)]
struct RemoteForm {
    url: Option<String>,
    template_uri: Option<String>,
    #[serde(default)]
    packaged: bool,
    #[serde(default)]
    force_create: bool,
}

async fn create_resource(
    State(state): State<AppState>,
    req: Request,
) -> Result<Response, ApiError> {
    let user = require_user(req.headers())?;
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    let upload = if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|err| ApiError::invalid_input(err.to_string()))?;
        let mut file = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ApiError::invalid_input(err.to_string()))?
        {
            if field.name() == Some("file") {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::invalid_input(err.to_string()))?;
                file = Some(bytes.to_vec());
            }
        }
        Upload::PackageFile(file.ok_or_else(|| ApiError::invalid_input("missing file to upload"))?)
    } else if content_type.starts_with("application/octet-stream") {
        let bytes = axum::body::Bytes::from_request(req, &())
            .await
            .map_err(|err| ApiError::invalid_input(err.to_string()))?;
        Upload::PackageStream(bytes.to_vec())
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<RemoteForm>::from_request(req, &())
            .await
            .map_err(|err| ApiError::invalid_input(err.to_string()))?;
        let url = form
            .url
            .or(form.template_uri)
            .ok_or_else(|| ApiError::invalid_input("missing url or template_uri"))?;
        Upload::Remote {
            url,
            packaged: form.packaged,
            force_create: form.force_create,
        }
    } else {
        return Err(ApiError {
            status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
            code: "invalid_input",
            message: format!("unsupported content type '{content_type}'"),
        });
    };

    let registered = state.coordinator.ingest(upload, &user).await?;
    Ok(Json(registered.description).into_response())
}

async fn delete_resource(
    State(state): State<AppState>,
    Path((vendor, name, version)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = require_user(&headers)?;
    let version = Version::parse(&version).map_err(|err| ApiError::invalid_input(err.to_string()))?;
    let id = ResourceId::new(vendor, name, version);
    state.coordinator.engine().revoke(&id, &user)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
