use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::AppState;
use crate::blobstore::BlobId;
use crate::datamodel::Store;
use crate::error::ApiError;
use crate::upload::{store_upload, ImageUpload, StoreUploadError, UploadError, UploadResponse};

pub const IMAGE_FIELD: &str = "image";

/// Stored images never change, so they can be cached for a year.
pub const CACHE_FOREVER: &str = "public, max-age=31536000";

/// `POST /api/upload`
pub async fn upload<S: Store>(
    State(state): State<AppState<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!(%rejection, "not a multipart upload");
        UploadError::MalformedForm
    })?;
    let upload = read_image_field(&mut multipart, state.max_upload_size).await?;

    match store_upload(&*state.store, &state.urls, upload, state.max_upload_size).await {
        Ok(response) => Ok(Json(response)),
        Err(StoreUploadError::Rejected(err)) => Err(err.into()),
        Err(StoreUploadError::Storage(err)) => Err(ApiError::storage("Failed to save image", err)),
    }
}

async fn read_image_field(
    multipart: &mut Multipart,
    max_size: usize,
) -> Result<Option<ImageUpload>, UploadError> {
    let too_large = |err: &MultipartError| err.status() == StatusCode::PAYLOAD_TOO_LARGE;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        if too_large(&err) {
            UploadError::TooLarge { max_size }
        } else {
            UploadError::MalformedForm
        }
    })? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_owned();
        let content_type = field.content_type().map(str::to_owned);

        let data = field.bytes().await.map_err(|err| {
            if too_large(&err) {
                UploadError::TooLarge { max_size }
            } else {
                tracing::warn!(error = %err, "failed to read uploaded image");
                UploadError::Unreadable
            }
        })?;

        return Ok(Some(ImageUpload {
            file_name,
            content_type,
            data: data.to_vec(),
        }));
    }
    Ok(None)
}

/// `GET /api/images/`
pub async fn missing_id() -> ApiError {
    ApiError::BadRequest("Image ID is required".into())
}

/// `GET /api/images/{id}`
pub async fn fetch<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id: BlobId = id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid image ID".into()))?;

    let image = state
        .store
        .fetch_image(id)
        .await
        .map_err(|err| ApiError::storage("Error serving image", err))?
        .ok_or(ApiError::NotFound("Image not found"))?;

    let etag = image.etag();
    let not_modified = headers
        .get(IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| etag_matches(value, &etag));
    if not_modified {
        let headers = [(CACHE_CONTROL, CACHE_FOREVER.to_owned()), (ETAG, etag)];
        return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
    }

    let headers = [
        (CONTENT_TYPE, image.mime_type.as_mime().to_owned()),
        (CONTENT_LENGTH, image.size.to_string()),
        (CACHE_CONTROL, CACHE_FOREVER.to_owned()),
        (ETAG, etag),
    ];
    Ok((headers, image.data).into_response())
}

/// Weak comparison of an `If-None-Match` header against our etag.
/// The header may be `*` or a comma separated list of (possibly weak) tags.
fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let etag = etag.trim_start_matches("W/");
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|tag| tag == "*" || tag.trim_start_matches("W/") == etag)
}
