//! HTTP routes.
//!
//! - `POST /update/` single JSON metric
//! - `POST /updates/` JSON array, RSA-encrypted when the server holds a key
//! - `POST /update/:type/:name/:value` path-encoded, unsigned
//! - `GET /value/:type/:name` plain-text value
//! - `POST /value/` JSON query, answers the signed metric
//! - `GET /` plain listing, `GET /ping` storage health

use super::{Ingest, TrustedSubnet};
use crate::core::config::REAL_IP_HEADER;
use crate::core::{Metric, MetricKind, PromLightError};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Router state.
#[derive(Clone)]
pub struct HttpState {
    /// Shared ingestion core
    pub ingest: Arc<Ingest>,
    /// When set, callers outside this subnet are rejected on every route
    pub trusted: Option<TrustedSubnet>,
}

/// Create the HTTP router.
pub fn create_router(ingest: Arc<Ingest>, trusted: Option<TrustedSubnet>) -> Router {
    let state = HttpState { ingest, trusted };

    let mut router = Router::new()
        .route("/", get(index))
        .route("/ping", get(ping))
        .route("/update/", post(update_json))
        .route("/updates/", post(update_batch))
        .route("/update/:type/:name/:value", post(update_path))
        .route("/value/", post(value_json))
        .route("/value/:type/:name", get(value_path));

    if state.trusted.is_some() {
        router = router.route_layer(middleware::from_fn_with_state(state.clone(), check_subnet));
    }

    router
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Runs before any body is read.
async fn check_subnet(State(state): State<HttpState>, request: Request, next: Next) -> Response {
    if let Some(trusted) = state.trusted {
        let real_ip = request
            .headers()
            .get(REAL_IP_HEADER)
            .and_then(|v| v.to_str().ok());
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);

        if let Err(e) = trusted.check(real_ip, peer) {
            return HttpError::from(e).into_response();
        }
    }
    next.run(request).await
}

async fn index(State(state): State<HttpState>) -> Result<String, HttpError> {
    let metrics = state.ingest.all().await?;

    let mut body = String::new();
    for metric in &metrics {
        let _ = writeln!(body, "{} {} {}", metric.kind, metric.id, metric);
    }
    Ok(body)
}

async fn ping(State(state): State<HttpState>) -> Result<&'static str, HttpError> {
    state.ingest.ping().await.map_err(|e| {
        tracing::error!(category = e.category(), "Storage ping failed: {}", e);
        HttpError::Internal(e.to_string())
    })?;
    Ok("OK")
}

async fn update_json(State(state): State<HttpState>, body: Bytes) -> Result<&'static str, HttpError> {
    let metric: Metric = serde_json::from_slice(&body)?;
    state.ingest.update(&metric).await?;
    Ok("Updated")
}

async fn update_batch(State(state): State<HttpState>, body: Bytes) -> Result<&'static str, HttpError> {
    tracing::debug!("Received batch, {} bytes", body.len());
    state.ingest.update_batch_raw(&body).await?;
    Ok("Updated")
}

async fn update_path(
    State(state): State<HttpState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Result<&'static str, HttpError> {
    state.ingest.update_path(&kind, &name, &value).await?;
    Ok("Updated")
}

async fn value_path(
    State(state): State<HttpState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<String, HttpError> {
    let kind: MetricKind = kind.parse()?;
    let value = state.ingest.value(kind, &name).await?;
    Ok(value.to_string())
}

async fn value_json(State(state): State<HttpState>, body: Bytes) -> Result<Json<Metric>, HttpError> {
    let query: Metric = serde_json::from_slice(&body)?;
    let metric = state.ingest.value_metric(query.kind, &query.id).await?;
    Ok(Json(metric))
}

/// HTTP-specific error type.
#[derive(Debug)]
pub enum HttpError {
    /// 400: malformed value, body or signature
    BadRequest(String),
    /// 403: caller outside the trusted subnet
    Forbidden(String),
    /// 404: unknown metric
    NotFound(String),
    /// 501: unknown metric type
    NotImplemented(String),
    /// 500: storage or other server-side failure
    Internal(String),
}

impl From<PromLightError> for HttpError {
    fn from(err: PromLightError) -> Self {
        let msg = err.to_string();
        let category = err.category();
        match err {
            PromLightError::NotFound { .. } => HttpError::NotFound(msg),
            PromLightError::UnknownKind(_) => HttpError::NotImplemented(msg),
            PromLightError::Untrusted(_) => HttpError::Forbidden(msg),
            PromLightError::InvalidValue(_)
            | PromLightError::InvalidSignature(_)
            | PromLightError::Json(_)
            | PromLightError::Serialization(_)
            | PromLightError::Crypto(_) => HttpError::BadRequest(msg),
            _ => {
                tracing::error!(category, "Request failed: {}", msg);
                HttpError::Internal(msg)
            },
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::BadRequest(format!("Invalid JSON: {}", err))
    }
}

impl HttpError {
    fn status(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::Forbidden(_) => StatusCode::FORBIDDEN,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            HttpError::BadRequest(msg)
            | HttpError::Forbidden(msg)
            | HttpError::NotFound(msg)
            | HttpError::NotImplemented(msg)
            | HttpError::Internal(msg) => msg,
        };

        let body = Json(serde_json::json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            HttpError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            HttpError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            HttpError::NotImplemented(msg) => write!(f, "Not Implemented: {}", msg),
            HttpError::Internal(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

impl std::error::Error for HttpError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (PromLightError::not_found(MetricKind::Gauge, "x"), StatusCode::NOT_FOUND),
            (PromLightError::UnknownKind("h".into()), StatusCode::NOT_IMPLEMENTED),
            (PromLightError::InvalidSignature("x".into()), StatusCode::BAD_REQUEST),
            (PromLightError::crypto("bad block"), StatusCode::BAD_REQUEST),
            (PromLightError::Untrusted("10.0.0.1".into()), StatusCode::FORBIDDEN),
            (PromLightError::storage("disk full"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(HttpError::from(err).status(), expected);
        }
    }
}
