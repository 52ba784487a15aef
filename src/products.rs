//! Products whose descriptions embed uploaded images.
//!
//! Every write goes through here so that image cleanup happens strictly after
//! the product row has been committed.

use core::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::blobstore::BlobStore;
use crate::reconcile::{reconcile, Reconciliation};
use crate::references::ReferenceExtractor;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProductId(pub u64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProductId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
}

/// The editable part of a product, as submitted by the admin form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    /// Rich-text HTML, may embed `<img src="...">` references.
    pub description: String,
    pub price: f64,
    pub stock_quantity: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: ProductStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock_quantity: i64,
    pub category: Option<String>,
    pub status: ProductStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The row before and after a committed update.
#[derive(Debug, Clone)]
pub struct ProductUpdate {
    pub previous: Product,
    pub current: Product,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Name is required")]
    NameRequired,
    #[error("Description is required")]
    DescriptionRequired,
    #[error("Price must be a positive number")]
    InvalidPrice,
    #[error("Stock must be a non-negative integer")]
    InvalidStock,
}

impl ProductInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::NameRequired);
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::DescriptionRequired);
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ValidationError::InvalidPrice);
        }
        if self.stock_quantity < 0 {
            return Err(ValidationError::InvalidStock);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait ProductStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn create_product(&self, input: ProductInput) -> Result<Product, Self::Error>;

    async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>, Self::Error>;

    /// Replaces the editable fields, returning the row as it was before and
    /// after the write. `None` if there is no such product.
    async fn update_product(
        &self,
        id: ProductId,
        input: ProductInput,
    ) -> Result<Option<ProductUpdate>, Self::Error>;

    /// Removes the product, returning the removed row.
    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>, Self::Error>;
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ProductError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("storage error: {0}")]
    Storage(#[source] BoxError),
}

impl ProductError {
    fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }
}

pub async fn create_product<S>(
    store: &S,
    extractor: &dyn ReferenceExtractor,
    input: ProductInput,
) -> Result<Product, ProductError>
where
    S: ProductStore + BlobStore,
{
    input.validate()?;
    let product = store
        .create_product(input)
        .await
        .map_err(ProductError::storage)?;
    tracing::info!(product = %product.id, "product created");

    // nothing existed before, so this never deletes anything
    log_reconciliation(
        product.id,
        reconcile(store, extractor, None, Some(&product.description)).await,
    );
    Ok(product)
}

pub async fn update_product<S>(
    store: &S,
    extractor: &dyn ReferenceExtractor,
    id: ProductId,
    input: ProductInput,
) -> Result<Option<Product>, ProductError>
where
    S: ProductStore + BlobStore,
{
    input.validate()?;
    let Some(ProductUpdate { previous, current }) = store
        .update_product(id, input)
        .await
        .map_err(ProductError::storage)?
    else {
        return Ok(None);
    };
    tracing::info!(product = %id, "product updated");

    log_reconciliation(
        id,
        reconcile(
            store,
            extractor,
            Some(&previous.description),
            Some(&current.description),
        )
        .await,
    );
    Ok(Some(current))
}

pub async fn delete_product<S>(
    store: &S,
    extractor: &dyn ReferenceExtractor,
    id: ProductId,
) -> Result<Option<Product>, ProductError>
where
    S: ProductStore + BlobStore,
{
    let Some(previous) = store
        .delete_product(id)
        .await
        .map_err(ProductError::storage)?
    else {
        return Ok(None);
    };
    tracing::info!(product = %id, "product deleted");

    log_reconciliation(
        id,
        reconcile(store, extractor, Some(&previous.description), None).await,
    );
    Ok(Some(previous))
}

fn log_reconciliation(product: ProductId, outcome: Reconciliation) {
    if !outcome.removed.is_empty() {
        tracing::info!(%product, removed = ?outcome.removed, "removed orphaned images");
    }
    if !outcome.failed.is_empty() {
        tracing::warn!(%product, failed = ?outcome.failed, "orphaned images left behind");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::{BlobId, NewImage};
    use crate::datamodel::MemStore;
    use crate::references::{ImageUrls, PatternExtractor};
    use crate::signature::ImageType;

    fn input(description: &str) -> ProductInput {
        ProductInput {
            name: "Classic White T-Shirt".into(),
            description: description.into(),
            price: 29.99,
            stock_quantity: 100,
            category: Some("clothing".into()),
            status: ProductStatus::Active,
        }
    }

    async fn upload(store: &MemStore) -> BlobId {
        let image = NewImage::new("a.gif", ImageType::Gif, b"GIF89a".to_vec());
        store.store_image(image).await.unwrap().id
    }

    #[test]
    fn test_validation() {
        assert_eq!(input("<p>x</p>").validate(), Ok(()));

        let mut bad = input("<p>x</p>");
        bad.name = "  ".into();
        assert_eq!(bad.validate(), Err(ValidationError::NameRequired));

        let bad = input("");
        assert_eq!(bad.validate(), Err(ValidationError::DescriptionRequired));

        let mut bad = input("<p>x</p>");
        bad.price = -1.0;
        assert_eq!(bad.validate(), Err(ValidationError::InvalidPrice));
        bad.price = f64::NAN;
        assert_eq!(bad.validate(), Err(ValidationError::InvalidPrice));

        let mut bad = input("<p>x</p>");
        bad.stock_quantity = -3;
        assert_eq!(bad.validate(), Err(ValidationError::InvalidStock));
    }

    #[tokio::test]
    async fn test_update_removes_dropped_images() {
        let store = MemStore::new();
        let extractor = PatternExtractor::new(ImageUrls::default());
        let kept = upload(&store).await;
        let dropped = upload(&store).await;

        let body = format!(r#"<img src="/api/images/{kept}"><img src="/api/images/{dropped}">"#);
        let product = create_product(&store, &extractor, input(&body))
            .await
            .unwrap();

        let body = format!(r#"<p>only one left</p><img src="/api/images/{kept}">"#);
        let updated = update_product(&store, &extractor, product.id, input(&body))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.description, body);

        assert!(store.fetch_image(kept).await.unwrap().is_some());
        assert!(store.fetch_image(dropped).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_everything() {
        let store = MemStore::new();
        let extractor = PatternExtractor::new(ImageUrls::default());
        let image = upload(&store).await;

        let body = format!(r#"<img src="/api/images/{image}">"#);
        let product = create_product(&store, &extractor, input(&body))
            .await
            .unwrap();

        let err = update_product(&store, &extractor, product.id, input(""))
            .await
            .unwrap_err();
        assert!(matches!(err, ProductError::Invalid(_)));

        let stored = store.fetch_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.description, body);
        assert!(store.fetch_image(image).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_removes_all_images() {
        let store = MemStore::new();
        let extractor = PatternExtractor::new(ImageUrls::default());
        let first = upload(&store).await;
        let second = upload(&store).await;
        let unrelated = upload(&store).await;

        let body = format!(r#"<img src="/api/images/{first}"><img src="/api/images/{second}">"#);
        let product = create_product(&store, &extractor, input(&body))
            .await
            .unwrap();

        let deleted = delete_product(&store, &extractor, product.id)
            .await
            .unwrap();
        assert_eq!(deleted.map(|p| p.id), Some(product.id));
        assert_eq!(store.image_ids(), [unrelated]);

        let missing = delete_product(&store, &extractor, product.id)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_product() {
        let store = MemStore::new();
        let extractor = PatternExtractor::new(ImageUrls::default());
        let result = update_product(&store, &extractor, ProductId(404), input("<p>x</p>"))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
