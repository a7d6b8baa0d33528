use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Request, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use bodytrack_core::csv_io::parse_weight_csv;
use bodytrack_core::gateway::DEFAULT_USER_ID;
use bodytrack_core::models::{
    ImportSummary, NewWeightEntry, UserSettings, WeightEntry, WeightEntryPatch,
    is_valid_object_id,
};
use bodytrack_core::service::TrackerService;
use bodytrack_core::settings::SettingsPatch;

/// Largest accepted CSV upload.
pub(crate) const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
/// Request body cap: one upload plus multipart framing.
const BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 64 * 1024;

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

#[derive(Clone)]
pub(crate) struct AppState {
    service: Arc<Mutex<TrackerService>>,
    user_id: String,
    api_key: Option<String>,
}

impl AppState {
    pub(crate) fn new(service: TrackerService, api_key: Option<String>) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
            user_id: DEFAULT_USER_ID.to_string(),
            api_key,
        }
    }

    fn service(&self) -> MutexGuard<'_, TrackerService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct BatchDeleteRequest {
    ids: Vec<String>,
}

#[derive(Serialize)]
struct BatchDeleteResponse {
    deleted: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    PayloadTooLarge(String),
    UnsupportedMediaType(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            Self::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            Self::Internal(err) => {
                tracing::error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

/// Unwrap a JSON body, reporting extractor failures as `{ "error": ... }`.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    let rejection = match payload {
        Ok(Json(value)) => return Ok(value),
        Err(rejection) => rejection,
    };
    Err(match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(rejection.body_text()),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => {
            ApiError::UnsupportedMediaType(rejection.body_text())
        }
        _ => ApiError::BadRequest(rejection.body_text()),
    })
}

fn check_id(id: &str) -> Result<(), ApiError> {
    if is_valid_object_id(id) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Invalid id '{id}'")))
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            tracing::warn!(path = %request.uri().path(), "rejected request without valid API key");
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Settings handlers ---

async fn get_settings(State(state): State<AppState>) -> Result<Json<UserSettings>, ApiError> {
    let settings = state
        .service()
        .get_settings(&state.user_id)
        .context("failed to load settings")?;
    Ok(Json(settings))
}

async fn put_settings(
    State(state): State<AppState>,
    payload: Result<Json<SettingsPatch>, JsonRejection>,
) -> Result<Json<UserSettings>, ApiError> {
    let patch = json_body(payload)?;
    patch.validate().map_err(|e| bad_request(&e))?;
    let settings = state
        .service()
        .update_settings(&state.user_id, &patch)
        .context("failed to update settings")?;
    Ok(Json(settings))
}

async fn reset_settings(State(state): State<AppState>) -> Result<Json<UserSettings>, ApiError> {
    let settings = state
        .service()
        .reset_settings(&state.user_id)
        .context("failed to reset settings")?;
    Ok(Json(settings))
}

// --- Weight handlers ---

async fn list_weight(State(state): State<AppState>) -> Result<Json<Vec<WeightEntry>>, ApiError> {
    let entries = state
        .service()
        .list_weight_entries()
        .context("database error")?;
    Ok(Json(entries))
}

async fn create_weight(
    State(state): State<AppState>,
    payload: Result<Json<NewWeightEntry>, JsonRejection>,
) -> Result<(StatusCode, Json<WeightEntry>), ApiError> {
    let mut entry = json_body(payload)?;
    entry.validate().map_err(|e| bad_request(&e))?;
    let created = state
        .service()
        .create_weight_entry(entry)
        .context("failed to insert weight entry")?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_weight(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<WeightEntryPatch>, JsonRejection>,
) -> Result<Json<WeightEntry>, ApiError> {
    check_id(&id)?;
    let patch = json_body(payload)?;
    if patch.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }
    patch.validate().map_err(|e| bad_request(&e))?;

    let updated = state
        .service()
        .update_weight_entry(&id, &patch)
        .context("failed to update weight entry")?
        .ok_or_else(|| ApiError::NotFound(format!("Weight entry {id} not found")))?;
    Ok(Json(updated))
}

async fn delete_weight(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    check_id(&id)?;
    if state
        .service()
        .delete_weight_entry(&id)
        .context("database error")?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Weight entry {id} not found")))
    }
}

async fn batch_delete_weight(
    State(state): State<AppState>,
    payload: Result<Json<BatchDeleteRequest>, JsonRejection>,
) -> Result<Json<BatchDeleteResponse>, ApiError> {
    let req = json_body(payload)?;
    for id in &req.ids {
        check_id(id)?;
    }
    let deleted = state
        .service()
        .delete_weight_entries(&req.ids)
        .context("failed to delete weight entries")?;
    tracing::info!(requested = req.ids.len(), deleted, "batch delete");
    Ok(Json(BatchDeleteResponse { deleted }))
}

async fn upload_weight_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportSummary>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let is_csv = field
            .content_type()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case("text/csv"));
        if !is_csv {
            return Err(ApiError::UnsupportedMediaType(
                "Only text/csv files are accepted".to_string(),
            ));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(ApiError::PayloadTooLarge(
                "File exceeds the 5 MB limit".to_string(),
            ));
        }

        parse_weight_csv(data.as_ref()).map_err(|e| bad_request(&e))?;
        let summary = state
            .service()
            .import_csv(data.as_ref())
            .context("failed to import CSV")?;
        return Ok(Json(summary));
    }

    Err(ApiError::BadRequest(
        "Missing multipart field 'file'".to_string(),
    ))
}

fn csv_attachment(file_name: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response()
}

async fn export_weight_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let csv = state
        .service()
        .export_csv()
        .context("failed to export CSV")?;
    Ok(csv_attachment("weight-entries.csv", csv))
}

async fn weight_csv_template(State(state): State<AppState>) -> Result<Response, ApiError> {
    let csv = state
        .service()
        .template_csv()
        .context("failed to build CSV template")?;
    Ok(csv_attachment("weight-template.csv", csv))
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/settings", get(get_settings).put(put_settings))
        .route("/api/v1/settings/reset", post(reset_settings))
        .route("/api/v1/weight", get(list_weight).post(create_weight))
        .route("/api/v1/weight/batch-delete", post(batch_delete_weight))
        .route("/api/v1/weight/upload", post(upload_weight_csv))
        .route("/api/v1/weight/export", get(export_weight_csv))
        .route("/api/v1/weight/template", get(weight_csv_template))
        .route(
            "/api/v1/weight/{id}",
            put(update_weight).delete(delete_weight),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of a key, or `None` for keys too short to
/// abbreviate without revealing most of them.
fn key_preview(key: &str) -> Option<String> {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return None;
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    Some(format!("{head}...{tail}"))
}

pub async fn start_server(
    service: TrackerService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState::new(service, api_key.clone());
    let app = build_router(state);

    if let Some(ref key) = api_key {
        match key_preview(key) {
            Some(preview) => {
                tracing::info!("API key: {preview} (see api_key file in data directory)");
            }
            None => tracing::info!("API key set (see api_key file in data directory)"),
        }
    } else {
        tracing::warn!("authentication disabled (--no-auth), API is open to anyone");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        tracing::warn!(
            "listening on {bind} with no authentication; any device on your network can access this API"
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    tracing::info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const BOUNDARY: &str = "bodytrack-test-boundary";

    fn test_state(api_key: Option<String>) -> AppState {
        AppState::new(TrackerService::new_in_memory().unwrap(), api_key)
    }

    fn test_app(api_key: Option<String>) -> Router {
        build_router(test_state(api_key))
    }

    async fn send(app: &Router, request: axum::http::Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    fn multipart_upload(content_type: &str, data: &str) -> axum::http::Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"weights.csv\"\r\n\
             Content-Type: {content_type}\r\n\r\n\
             {data}\r\n\
             --{BOUNDARY}--\r\n"
        );
        axum::http::Request::post("/api/v1/weight/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn create(app: &Router, date: &str, weight: f64) -> Value {
        let (status, json) = send(
            app,
            json_request("POST", "/api/v1/weight", &json!({ "date": date, "weight": weight })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));
        let (status, json) = send(&app, get("/api/v1/settings")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));
        let request = axum::http::Request::get("/api/v1/weight")
            .header("Authorization", "Bearer wrong-key")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));
        let request = axum::http::Request::get("/api/v1/weight")
            .header("Authorization", "Bearer test-key-abc123")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!([]));
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app(None);
        let response = app.oneshot(get("/api/v1/settings")).await.unwrap();
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let app = test_app(Some("secret".to_string()));
        let response = app.oneshot(get("/api/v1/settings")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app(None);
        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/api/v1/weight")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/.bodytrack/db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert!(!json["error"].as_str().unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn settings_default_on_first_get() {
        let app = test_app(None);
        let (status, json) = send(&app, get("/api/v1/settings")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json["tableMetrics"],
            json!(["Date", "Weight", "BMI", "Body Fat %", "V-Fat", "S-Fat", "Water %", "BMR"])
        );
        assert_eq!(
            json["chartMetrics"],
            json!(["Weight", "BMI", "Body Fat %", "V-Fat", "S-Fat", "Water %", "BMR"])
        );
        assert_eq!(json["defaultVisibleMetrics"], json!(["Weight"]));
        assert_eq!(json["goalWeight"], Value::Null);
        assert_eq!(json["darkMode"], false);
        assert_eq!(json["name"], "Default User");
    }

    #[tokio::test]
    async fn settings_put_merges_and_prepends_date() {
        let app = test_app(None);
        let (status, json) = send(
            &app,
            json_request(
                "PUT",
                "/api/v1/settings",
                &json!({ "tableMetrics": ["Weight", "Date", "HR"], "goalWeight": 170 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tableMetrics"], json!(["Date", "Weight", "HR"]));
        assert_eq!(json["goalWeight"], 170.0);
        assert_eq!(json["darkMode"], false);

        let (_, again) = send(&app, get("/api/v1/settings")).await;
        assert_eq!(again["tableMetrics"], json!(["Date", "Weight", "HR"]));
    }

    #[tokio::test]
    async fn settings_put_rejects_non_positive_goal() {
        let app = test_app(None);
        let (status, json) = send(
            &app,
            json_request("PUT", "/api/v1/settings", &json!({ "goalWeight": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("goalWeight"));
    }

    #[tokio::test]
    async fn settings_reset_keeps_dark_mode() {
        let app = test_app(None);
        send(
            &app,
            json_request(
                "PUT",
                "/api/v1/settings",
                &json!({ "darkMode": true, "goalWeight": 150, "chartMetrics": ["HR"] }),
            ),
        )
        .await;

        let request = axum::http::Request::post("/api/v1/settings/reset")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["darkMode"], true);
        assert_eq!(json["goalWeight"], Value::Null);
        assert_eq!(json["chartMetrics"].as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn weight_create_list_update_delete() {
        let app = test_app(None);
        let created = create(&app, "2024-03-01", 180.4).await;
        assert_eq!(created["date"], "03-01-24");
        let id = created["id"].as_str().unwrap().to_string();
        assert!(is_valid_object_id(&id));

        let (_, list) = send(&app, get("/api/v1/weight")).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, updated) = send(
            &app,
            json_request(
                "PUT",
                &format!("/api/v1/weight/{id}"),
                &json!({ "bmi": 24.0, "weight": 179.9 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["weight"], 179.9);
        assert_eq!(updated["bmi"], 24.0);

        let request = axum::http::Request::delete(format!("/api/v1/weight/{id}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, list) = send(&app, get("/api/v1/weight")).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn weight_create_rejects_invalid_date() {
        let app = test_app(None);
        let (status, json) = send(
            &app,
            json_request("POST", "/api/v1/weight", &json!({ "date": "someday", "weight": 180 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Invalid date"));
    }

    #[tokio::test]
    async fn weight_malformed_id_returns_400() {
        let app = test_app(None);
        let request = axum::http::Request::delete("/api/v1/weight/default-1")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            json_request("PUT", "/api/v1/weight/123", &json!({ "weight": 170 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn weight_unknown_id_returns_404() {
        let app = test_app(None);
        let request = axum::http::Request::delete("/api/v1/weight/65f1a2b3c4d5e6f7a8b9c0d1")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            json_request(
                "PUT",
                "/api/v1/weight/65f1a2b3c4d5e6f7a8b9c0d1",
                &json!({ "weight": 170 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn weight_update_requires_a_field() {
        let app = test_app(None);
        let created = create(&app, "03-01-24", 180.0).await;
        let id = created["id"].as_str().unwrap();
        let (status, _) = send(
            &app,
            json_request("PUT", &format!("/api/v1/weight/{id}"), &json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn weight_update_accepts_entry_echoed_from_list() {
        let app = test_app(None);
        let created = create(&app, "03-01-24", 180.0).await;
        let id = created["id"].as_str().unwrap();

        let (_, list) = send(&app, get("/api/v1/weight")).await;
        let mut entry = list[0].clone();
        entry["weight"] = json!(171);
        let uri = format!("/api/v1/weight/{id}");
        let (status, json) = send(&app, json_request("PUT", &uri, &entry)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["weight"], 171.0);
        assert_eq!(json["createdAt"], created["createdAt"]);

        let (status, json) = send(
            &app,
            json_request("PUT", &uri, &json!({ "weight": 172, "notes": "after run" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["weight"], 172.0);
        assert!(json.get("notes").is_none());
    }

    #[tokio::test]
    async fn weight_create_ignores_read_only_keys() {
        let app = test_app(None);
        let (status, json) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/weight",
                &json!({ "_id": "abc", "id": "abc", "date": "03-01-24", "weight": 180 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_ne!(json["id"], "abc");
        assert!(is_valid_object_id(json["id"].as_str().unwrap()));
    }

    #[tokio::test]
    async fn malformed_json_body_is_json_bad_request() {
        let app = test_app(None);
        let request = axum::http::Request::post("/api/v1/weight")
            .header("content-type", "application/json")
            .body(Body::from("{\"date\":"))
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let (status, json) = send(
            &app,
            json_request("POST", "/api/v1/weight", &json!({ "date": "03-01-24", "weight": "heavy" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("weight"));

        let (status, json) = send(
            &app,
            json_request("PUT", "/api/v1/settings", &json!({ "darkMode": "yes" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn json_body_without_content_type_is_unsupported() {
        let app = test_app(None);
        let request = axum::http::Request::post("/api/v1/weight/batch-delete")
            .body(Body::from(r#"{"ids":[]}"#))
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn weight_ids_must_be_lowercase_hex() {
        let app = test_app(None);
        let created = create(&app, "03-01-24", 180.0).await;
        let upper = created["id"].as_str().unwrap().to_ascii_uppercase();

        let request = axum::http::Request::delete(format!("/api/v1/weight/{upper}"))
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], format!("Invalid id '{upper}'"));

        let (_, list) = send(&app, get("/api/v1/weight")).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn weight_batch_delete() {
        let app = test_app(None);
        let a = create(&app, "03-01-24", 180.0).await;
        let b = create(&app, "03-02-24", 179.0).await;
        create(&app, "03-03-24", 178.0).await;

        let (status, json) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/weight/batch-delete",
                &json!({ "ids": [a["id"], b["id"]] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["deleted"], 2);

        let (_, list) = send(&app, get("/api/v1/weight")).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            json_request("POST", "/api/v1/weight/batch-delete", &json!({ "ids": ["nope"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn weight_upload_csv_imports_rows() {
        let app = test_app(None);
        let (status, json) = send(
            &app,
            multipart_upload(
                "text/csv",
                "Date,Weight,Body Fat %\r\n03-01-24,180.2,21\r\n03-02-24,179.6,\r\nbad,1,1",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "rowsParsed": 3, "imported": 2, "skipped": 1 }));

        let (_, list) = send(&app, get("/api/v1/weight")).await;
        assert_eq!(list.as_array().unwrap().len(), 2);
        assert_eq!(list[0]["bodyFat"], 21.0);
    }

    #[tokio::test]
    async fn weight_upload_rejects_non_csv() {
        let app = test_app(None);
        let (status, json) = send(&app, multipart_upload("application/json", "{}")).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(json["error"], "Only text/csv files are accepted");
    }

    #[tokio::test]
    async fn weight_upload_rejects_oversized_file() {
        let app = test_app(None);
        let data = "x".repeat(MAX_UPLOAD_BYTES + 1);
        let (status, json) = send(&app, multipart_upload("text/csv", &data)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error"], "File exceeds the 5 MB limit");

        let (_, list) = send(&app, get("/api/v1/weight")).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn weight_upload_requires_date_column() {
        let app = test_app(None);
        let (status, json) = send(&app, multipart_upload("text/csv", "Weight\r\n180")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Date"));
    }

    #[tokio::test]
    async fn weight_export_and_template_are_csv_attachments() {
        let app = test_app(None);
        create(&app, "03-01-24", 180.0).await;

        let response = app.clone().oneshot(get("/api/v1/weight/export")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            CSV_CONTENT_TYPE
        );
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"weight-entries.csv\""
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("03-01-24,180,"));

        let response = app.oneshot(get("/api/v1/weight/template")).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("Date,Weight,BMI"));
    }

    #[test]
    fn key_preview_handles_short_and_multibyte_keys() {
        assert_eq!(
            key_preview("0123456789abcdef0123").as_deref(),
            Some("0123...0123")
        );
        assert_eq!(key_preview("abc"), None);
        assert_eq!(key_preview(""), None);
        assert_eq!(
            key_preview("ééééxxxxxxxxüüüü").as_deref(),
            Some("éééé...üüüü")
        );
    }
}
