use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::AppState;
use crate::datamodel::Store;
use crate::error::ApiError;
use crate::products::{self, Product, ProductId, ProductInput};

fn parse_id(id: &str) -> Result<ProductId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest("Invalid product ID".into()))
}

fn parse_input(payload: Result<Json<ProductInput>, JsonRejection>) -> Result<ProductInput, ApiError> {
    payload
        .map(|Json(input)| input)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// `POST /api/products`
pub async fn create<S: Store>(
    State(state): State<AppState<S>>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let input = parse_input(payload)?;
    let product = products::create_product(&*state.store, &*state.extractor, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// `GET /api/products/{id}`
pub async fn fetch<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let id = parse_id(&id)?;
    state
        .store
        .fetch_product(id)
        .await
        .map_err(|err| ApiError::storage("Error loading product", err))?
        .map(Json)
        .ok_or(ApiError::NotFound("Product not found"))
}

/// `PUT /api/products/{id}`
pub async fn update<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let id = parse_id(&id)?;
    let input = parse_input(payload)?;
    products::update_product(&*state.store, &*state.extractor, id, input)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Product not found"))
}

/// `DELETE /api/products/{id}`
pub async fn remove<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    products::delete_product(&*state.store, &*state.extractor, id)
        .await?
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(ApiError::NotFound("Product not found"))
}
