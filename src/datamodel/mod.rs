use serde::{Deserialize, Serialize};

use crate::blobstore::{BlobId, BlobStore, ImageBlob, NewImage};
use crate::products::{Product, ProductId, ProductInput, ProductStatus, ProductStore};
use crate::signature::ImageType;

pub mod fjall_impl;
pub mod mem_impl;

pub use fjall_impl::{FjallStore, StoreError};
pub use mem_impl::MemStore;

/// Everything the HTTP layer needs from a storage backend.
pub trait Store: BlobStore + ProductStore + 'static {}
impl<S: BlobStore + ProductStore + 'static> Store for S {}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// An image row as persisted, keyed by its `BlobId`.
#[derive(Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub filename: String,
    pub original_name: String,
    pub mime_type: ImageType,
    pub size: u64,
    pub hash: [u8; 32],
    pub data: Vec<u8>,
    pub created_at: i64,
}

impl ImageRecord {
    pub fn new(image: NewImage, created_at: i64) -> Self {
        let size = image.size();
        let hash = *blake3::hash(&image.data).as_bytes();
        Self {
            filename: image.filename,
            original_name: image.original_name,
            mime_type: image.mime_type,
            size,
            hash,
            data: image.data,
            created_at,
        }
    }

    pub fn into_blob(self, id: BlobId) -> ImageBlob {
        ImageBlob {
            id,
            filename: self.filename,
            original_name: self.original_name,
            mime_type: self.mime_type,
            size: self.size,
            hash: blake3::Hash::from_bytes(self.hash),
            data: self.data,
            created_at: self.created_at,
        }
    }
}

/// A product row as persisted, keyed by its `ProductId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock_quantity: i64,
    pub category: Option<String>,
    pub status: ProductStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProductRecord {
    pub fn new(input: ProductInput, now: i64) -> Self {
        Self {
            name: input.name,
            description: input.description,
            price: input.price,
            stock_quantity: input.stock_quantity,
            category: input.category,
            status: input.status,
            created_at: now,
            updated_at: now,
        }
    }

    /// The same row with its editable fields replaced.
    pub fn updated(&self, input: ProductInput, now: i64) -> Self {
        Self {
            created_at: self.created_at,
            ..Self::new(input, now)
        }
    }

    pub fn into_product(self, id: ProductId) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            stock_quantity: self.stock_quantity,
            category: self.category,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
