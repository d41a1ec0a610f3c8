use crate::asset_manager::{AssetManager, Upload};
use crate::config::{ApiConfig, AssetConfig};
use crate::error::RegistryError;
use crate::record_store::{Guest, GuestFields, RecordStore};
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Room for the text fields and multipart framing on top of the photo itself
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<RecordStore>,
    pub assets: Arc<AssetManager>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(records: Arc<RecordStore>, config: &AssetConfig) -> Self {
        Self {
            assets: Arc::clone(records.assets()),
            records,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Response for create and update
#[derive(Debug, Serialize)]
pub struct GuestResponse {
    pub message: String,
    pub user: Guest,
}

/// Plain message response, also used for client errors
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error response for server-side failures
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_message: String,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::Validation(_) | RegistryError::DuplicateKey => StatusCode::BAD_REQUEST,
            RegistryError::NotFound => StatusCode::NOT_FOUND,
            RegistryError::Io(_) | RegistryError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if self.is_storage() {
            error!(error = %self, "Request failed on storage");
            return (
                status,
                Json(ErrorResponse {
                    error_message: self.to_string(),
                }),
            )
                .into_response();
        }

        (
            status,
            Json(MessageResponse {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    // Photos are fetched cross-origin and drawn onto export canvases
    let uploads = Router::new()
        .nest_service("/uploads", ServeDir::new(state.assets.root()))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-resource-policy"),
            HeaderValue::from_static("cross-origin"),
        ));

    let body_limit = state.max_upload_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/user", post(create_guest))
        .route("/users", get(list_guests))
        .route("/user/:id", get(get_guest).put(update_guest))
        .route("/delete/user/:id", delete(delete_guest))
        .with_state(state)
        .merge(uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "guest-registry"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.records.ping().await {
        Ok(()) => {
            let guests = state.records.count().await.unwrap_or_default();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "ready",
                    "database": "connected",
                    "guests": guests
                })),
            )
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Create a guest from a multipart form
#[instrument(skip(state, multipart))]
async fn create_guest(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<GuestResponse>), RegistryError> {
    let (fields, photo) = read_guest_form(multipart).await?;
    let guest = state.records.create(fields, photo).await?;

    Ok((
        StatusCode::CREATED,
        Json(GuestResponse {
            message: "User created successfully.".to_string(),
            user: guest,
        }),
    ))
}

/// List all guests. An empty store is an empty array, not an error.
#[instrument(skip(state))]
async fn list_guests(State(state): State<AppState>) -> Result<Json<Vec<Guest>>, RegistryError> {
    Ok(Json(state.records.get_all().await?))
}

/// Get single guest
#[instrument(skip(state))]
async fn get_guest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Guest>, RegistryError> {
    Ok(Json(state.records.get_by_id(&id).await?))
}

/// Update a guest, optionally replacing its photo
#[instrument(skip(state, multipart))]
async fn update_guest(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<GuestResponse>, RegistryError> {
    let (fields, photo) = read_guest_form(multipart).await?;
    let guest = state.records.update(&id, fields, photo).await?;

    Ok(Json(GuestResponse {
        message: "User updated successfully.".to_string(),
        user: guest,
    }))
}

/// Delete a guest
#[instrument(skip(state))]
async fn delete_guest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, RegistryError> {
    state.records.delete(&id).await?;

    Ok(Json(MessageResponse {
        message: "User deleted successfully.".to_string(),
    }))
}

/// Decode guest text fields and the optional `photo` file part.
/// A `photo` part without bytes means no photo was chosen.
async fn read_guest_form(mut multipart: Multipart) -> Result<(GuestFields, Option<Upload>), RegistryError> {
    let mut fields = GuestFields::default();
    let mut photo = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "photo" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if !bytes.is_empty() {
                    photo = Some(Upload {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
            }
            "name" | "email" | "address" | "phone" | "role" => {
                let value = field.text().await.map_err(multipart_error)?;
                let slot = match name.as_str() {
                    "name" => &mut fields.name,
                    "email" => &mut fields.email,
                    "address" => &mut fields.address,
                    "phone" => &mut fields.phone,
                    _ => &mut fields.role,
                };
                *slot = Some(value);
            }
            _ => {}
        }
    }

    Ok((fields, photo))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> RegistryError {
    RegistryError::validation(format!("Failed to parse multipart data: {e}"))
}

/// Start the guest API server and run until `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting guest API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
