use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::datamodel::Store;
use crate::error::ApiError;
use crate::references::{ImageUrls, PatternExtractor, ReferenceExtractor};

pub mod images;
pub mod products;

/// Shared by all handlers. Cloned per request, so everything is behind an `Arc`.
pub struct AppState<S> {
    pub store: Arc<S>,
    pub extractor: Arc<dyn ReferenceExtractor>,
    pub urls: ImageUrls,
    pub max_upload_size: usize,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            extractor: Arc::clone(&self.extractor),
            urls: self.urls.clone(),
            max_upload_size: self.max_upload_size,
        }
    }
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, urls: ImageUrls, max_upload_size: usize) -> Self {
        Self {
            store,
            extractor: Arc::new(PatternExtractor::new(urls.clone())),
            urls,
            max_upload_size,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ReferenceExtractor>) -> Self {
        self.extractor = extractor;
        self
    }
}

pub fn router<S: Store>(state: AppState<S>) -> Router {
    // leave room for the multipart framing, so slightly oversized files still
    // get a proper "too large" answer
    let body_limit = state.max_upload_size.saturating_mul(2);

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/upload",
            post(images::upload::<S>).fallback(method_not_allowed),
        )
        .route("/api/images/", get(images::missing_id))
        .route("/api/images/{id}", get(images::fetch::<S>))
        .route("/api/products", post(products::create::<S>))
        .route(
            "/api/products/{id}",
            get(products::fetch::<S>)
                .put(products::update::<S>)
                .delete(products::remove::<S>),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed("Method not allowed")
}
