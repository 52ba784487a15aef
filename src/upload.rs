//! Turning a submitted file into a stored image.

use crate::blobstore::{BlobId, BlobStore, NewImage};
use crate::references::ImageUrls;
use crate::signature::ImageType;

pub const ONE_MEG: usize = 1024 * 1024;
pub const MAX_FILE_SIZE: usize = 5 * ONE_MEG;

/// The `image` field of an upload form, read fully into memory.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    /// The declared MIME type, if the client sent one.
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to parse form data")]
    MalformedForm,
    #[error("No image provided")]
    NoImage,
    #[error("Image too large")]
    TooLarge { max_size: usize },
    #[error("Invalid image type")]
    InvalidType,
    #[error("Failed to process image data")]
    Unreadable,
    #[error("Invalid image content")]
    InvalidContent,
}

impl UploadError {
    /// The configured maximum, in whole megabytes, e.g. `5MB`.
    pub fn max_size(&self) -> Option<String> {
        match self {
            Self::TooLarge { max_size } => Some(format!("{}MB", max_size / ONE_MEG)),
            _ => None,
        }
    }

    pub fn allowed_types(&self) -> Option<String> {
        match self {
            Self::InvalidType => Some(ImageType::allowed_list()),
            _ => None,
        }
    }
}

/// Checks an upload in order: presence, size, declared type, then content.
/// The first failing check wins.
pub fn validate_upload(
    upload: Option<ImageUpload>,
    max_size: usize,
) -> Result<NewImage, UploadError> {
    let upload = upload.ok_or(UploadError::NoImage)?;

    if upload.data.len() > max_size {
        return Err(UploadError::TooLarge { max_size });
    }

    let mime_type = upload
        .content_type
        .as_deref()
        .and_then(ImageType::from_mime)
        .ok_or(UploadError::InvalidType)?;

    if !mime_type.matches_signature(&upload.data) {
        tracing::warn!(
            file_name = %upload.file_name,
            declared = %mime_type,
            head = ?&upload.data[..upload.data.len().min(8)],
            "image content does not match its declared type"
        );
        return Err(UploadError::InvalidContent);
    }

    Ok(NewImage::new(upload.file_name, mime_type, upload.data))
}

/// What the editor gets back after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UploadResponse {
    pub url: String,
    pub id: String,
}

impl UploadResponse {
    pub fn new(urls: &ImageUrls, id: BlobId) -> Self {
        Self {
            url: urls.url_for(id),
            id: id.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreUploadError<E> {
    #[error(transparent)]
    Rejected(#[from] UploadError),
    #[error("Failed to save image")]
    Storage(#[source] E),
}

/// Validates and stores an upload, returning its public reference.
///
/// Nothing is written unless every check passed.
pub async fn store_upload<S>(
    store: &S,
    urls: &ImageUrls,
    upload: Option<ImageUpload>,
    max_size: usize,
) -> Result<UploadResponse, StoreUploadError<S::Error>>
where
    S: BlobStore + ?Sized,
{
    let image = validate_upload(upload, max_size)?;
    let stored = store
        .store_image(image)
        .await
        .map_err(StoreUploadError::Storage)?;

    tracing::info!(
        image = %stored.id,
        mime_type = %stored.mime_type,
        size = stored.size,
        "stored uploaded image"
    );
    Ok(UploadResponse::new(urls, stored.id))
}
