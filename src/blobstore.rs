use core::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::signature::ImageType;

/// Identifier of a stored image. Allocated on insert and never reused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobId(pub u64);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BlobId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// An image that passed validation and is ready to be inserted.
///
/// The size is derived from the payload, so the two can never disagree.
pub struct NewImage {
    pub filename: String,
    pub original_name: String,
    pub mime_type: ImageType,
    pub data: Vec<u8>,
}

impl fmt::Debug for NewImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewImage")
            .field("filename", &self.filename)
            .field("original_name", &self.original_name)
            .field("mime_type", &self.mime_type)
            .field("data", &Payload(&self.data))
            .finish()
    }
}

impl NewImage {
    pub fn new(original_name: impl Into<String>, mime_type: ImageType, data: Vec<u8>) -> Self {
        let original_name = original_name.into();
        Self {
            filename: original_name.clone(),
            original_name,
            mime_type,
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Prints only the first few bytes of an image payload.
struct Payload<'a>(&'a [u8]);

impl fmt::Debug for Payload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.len().min(16);
        write!(
            f,
            "{:02X?}{}",
            &self.0[..len],
            if len < self.0.len() { "…" } else { "" }
        )
    }
}

/// A stored image row.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub id: BlobId,
    pub filename: String,
    pub original_name: String,
    pub mime_type: ImageType,
    pub size: u64,
    pub hash: blake3::Hash,
    pub data: Vec<u8>,
    /// Seconds since the epoch.
    pub created_at: i64,
}

impl ImageBlob {
    pub fn etag(&self) -> String {
        format!("\"{:x}\"", base16ct::HexDisplay(self.hash.as_bytes()))
    }
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBlob")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("original_name", &self.original_name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.size)
            .field("hash", &format_args!("{:x}", base16ct::HexDisplay(self.hash.as_bytes())))
            .field("data", &Payload(&self.data))
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn store_image(&self, image: NewImage) -> Result<ImageBlob, Self::Error>;

    async fn fetch_image(&self, id: BlobId) -> Result<Option<ImageBlob>, Self::Error>;

    /// Removes the image. Deleting an unknown id is not an error.
    async fn delete_image(&self, id: BlobId) -> Result<(), Self::Error>;
}
