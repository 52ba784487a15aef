use core::fmt;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::*;
use crate::products::ProductUpdate;

#[derive(Default)]
struct Tables {
    last_image_id: u64,
    images: HashMap<BlobId, ImageRecord>,
    last_product_id: u64,
    products: HashMap<ProductId, ProductRecord>,
}

/// A purely in-memory store. Ids are still never reused, but nothing
/// survives a restart.
#[derive(Default)]
pub struct MemStore {
    tables: RwLock<Tables>,
}

impl fmt::Debug for MemStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.read();
        f.debug_struct("MemStore")
            .field("images", &tables.images.len())
            .field("products", &tables.products.len())
            .finish()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of all stored images, in ascending order.
    pub fn image_ids(&self) -> Vec<BlobId> {
        let mut ids: Vec<_> = self.read().images.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // a panic while holding the lock cannot leave the maps half-updated,
    // so poisoning is ignored
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl BlobStore for MemStore {
    type Error = Infallible;

    async fn store_image(&self, image: NewImage) -> Result<ImageBlob, Infallible> {
        let record = ImageRecord::new(image, now());

        let mut tables = self.write();
        tables.last_image_id += 1;
        let id = BlobId(tables.last_image_id);
        tables.images.insert(id, record.clone());

        Ok(record.into_blob(id))
    }

    async fn fetch_image(&self, id: BlobId) -> Result<Option<ImageBlob>, Infallible> {
        let tables = self.read();
        Ok(tables.images.get(&id).cloned().map(|record| record.into_blob(id)))
    }

    async fn delete_image(&self, id: BlobId) -> Result<(), Infallible> {
        self.write().images.remove(&id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProductStore for MemStore {
    type Error = Infallible;

    async fn create_product(&self, input: ProductInput) -> Result<Product, Infallible> {
        let record = ProductRecord::new(input, now());

        let mut tables = self.write();
        tables.last_product_id += 1;
        let id = ProductId(tables.last_product_id);
        tables.products.insert(id, record.clone());

        Ok(record.into_product(id))
    }

    async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>, Infallible> {
        let tables = self.read();
        Ok(tables
            .products
            .get(&id)
            .cloned()
            .map(|record| record.into_product(id)))
    }

    async fn update_product(
        &self,
        id: ProductId,
        input: ProductInput,
    ) -> Result<Option<ProductUpdate>, Infallible> {
        let mut tables = self.write();
        let Some(record) = tables.products.get_mut(&id) else {
            return Ok(None);
        };
        let updated = record.updated(input, now());
        let previous = std::mem::replace(record, updated.clone());

        Ok(Some(ProductUpdate {
            previous: previous.into_product(id),
            current: updated.into_product(id),
        }))
    }

    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>, Infallible> {
        let removed = self.write().products.remove(&id);
        Ok(removed.map(|record| record.into_product(id)))
    }
}
