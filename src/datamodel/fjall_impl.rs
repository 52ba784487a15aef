use std::path::Path;
use std::sync::Arc;

use fjall::{TransactionalKeyspace, TransactionalPartitionHandle};

use super::*;
use crate::products::ProductUpdate;

const IMAGE_SEQUENCE: &[u8] = b"images";
const PRODUCT_SEQUENCE: &[u8] = b"products";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage engine error: {0}")]
    Fjall(#[from] fjall::Error),
    #[error("failed to encode or decode a row: {0}")]
    Encoding(#[from] postcard::Error),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

struct Partitions {
    database: TransactionalKeyspace,
    images: TransactionalPartitionHandle,
    products: TransactionalPartitionHandle,
    /// Last allocated id per table, so deleted ids are never handed out again.
    sequences: TransactionalPartitionHandle,
}

/// A store persisted in a transactional fjall keyspace.
///
/// Keys and rows are postcard encoded. fjall is blocking, so every operation
/// is moved onto tokio's blocking pool.
#[derive(Clone)]
pub struct FjallStore {
    partitions: Arc<Partitions>,
}

impl FjallStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let database = fjall::Config::new(path).open_transactional()?;
        let images = database.open_partition("images", Default::default())?;
        let products = database.open_partition("products", Default::default())?;
        let sequences = database.open_partition("sequences", Default::default())?;

        Ok(Self {
            partitions: Arc::new(Partitions {
                database,
                images,
                products,
                sequences,
            }),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Partitions) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let partitions = Arc::clone(&self.partitions);
        tokio::task::spawn_blocking(move || f(&partitions)).await?
    }
}

fn decode_id(bytes: Option<&[u8]>) -> Result<u64, StoreError> {
    match bytes {
        Some(bytes) => Ok(postcard::from_bytes(bytes)?),
        None => Ok(0),
    }
}

impl Partitions {
    fn insert_image(&self, record: &ImageRecord) -> Result<BlobId, StoreError> {
        let row = postcard::to_stdvec(record)?;
        loop {
            let mut write_tx = self.database.write_tx()?;

            let last = decode_id(write_tx.get(&self.sequences, IMAGE_SEQUENCE)?.as_deref())?;
            let id = BlobId(last + 1);
            write_tx.insert(&self.sequences, IMAGE_SEQUENCE, postcard::to_stdvec(&id.0)?);
            write_tx.insert(&self.images, postcard::to_stdvec(&id)?, row.clone());

            match write_tx.commit()? {
                Ok(()) => return Ok(id),
                Err(_conflict) => tracing::debug!("image id allocation conflicted, retrying"),
            }
        }
    }

    fn get_image(&self, id: BlobId) -> Result<Option<ImageRecord>, StoreError> {
        let key = postcard::to_stdvec(&id)?;
        let read_tx = self.database.read_tx();

        match read_tx.get(&self.images, key)? {
            Some(row) => Ok(Some(postcard::from_bytes(&row)?)),
            None => Ok(None),
        }
    }

    fn remove_image(&self, id: BlobId) -> Result<(), StoreError> {
        let key = postcard::to_stdvec(&id)?;
        loop {
            let mut write_tx = self.database.write_tx()?;
            write_tx.remove(&self.images, key.clone());

            match write_tx.commit()? {
                Ok(()) => return Ok(()),
                Err(_conflict) => tracing::debug!(image = %id, "image delete conflicted, retrying"),
            }
        }
    }

    fn insert_product(&self, record: &ProductRecord) -> Result<ProductId, StoreError> {
        let row = postcard::to_stdvec(record)?;
        loop {
            let mut write_tx = self.database.write_tx()?;

            let last = decode_id(write_tx.get(&self.sequences, PRODUCT_SEQUENCE)?.as_deref())?;
            let id = ProductId(last + 1);
            write_tx.insert(&self.sequences, PRODUCT_SEQUENCE, postcard::to_stdvec(&id.0)?);
            write_tx.insert(&self.products, postcard::to_stdvec(&id)?, row.clone());

            match write_tx.commit()? {
                Ok(()) => return Ok(id),
                Err(_conflict) => tracing::debug!("product id allocation conflicted, retrying"),
            }
        }
    }

    fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>, StoreError> {
        let key = postcard::to_stdvec(&id)?;
        let read_tx = self.database.read_tx();

        match read_tx.get(&self.products, key)? {
            Some(row) => Ok(Some(postcard::from_bytes(&row)?)),
            None => Ok(None),
        }
    }

    /// Reads the current row and writes `change(row)` in one transaction.
    /// `change` returning `None` removes the row.
    fn modify_product(
        &self,
        id: ProductId,
        change: impl Fn(&ProductRecord) -> Option<ProductRecord>,
    ) -> Result<Option<(ProductRecord, Option<ProductRecord>)>, StoreError> {
        let key = postcard::to_stdvec(&id)?;
        loop {
            let mut write_tx = self.database.write_tx()?;

            let Some(row) = write_tx.get(&self.products, &key)? else {
                return Ok(None);
            };
            let previous: ProductRecord = postcard::from_bytes(&row)?;
            let next = change(&previous);
            match &next {
                Some(next) => {
                    write_tx.insert(&self.products, key.clone(), postcard::to_stdvec(next)?);
                }
                None => {
                    write_tx.remove(&self.products, key.clone());
                }
            }

            match write_tx.commit()? {
                Ok(()) => return Ok(Some((previous, next))),
                Err(_conflict) => {
                    tracing::debug!(product = %id, "product write conflicted, retrying")
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for FjallStore {
    type Error = StoreError;

    async fn store_image(&self, image: NewImage) -> Result<ImageBlob, StoreError> {
        let record = ImageRecord::new(image, now());
        self.run(move |partitions| {
            let id = partitions.insert_image(&record)?;
            Ok(record.into_blob(id))
        })
        .await
    }

    async fn fetch_image(&self, id: BlobId) -> Result<Option<ImageBlob>, StoreError> {
        self.run(move |partitions| {
            let record = partitions.get_image(id)?;
            Ok(record.map(|record| record.into_blob(id)))
        })
        .await
    }

    async fn delete_image(&self, id: BlobId) -> Result<(), StoreError> {
        self.run(move |partitions| partitions.remove_image(id)).await
    }
}

#[async_trait::async_trait]
impl ProductStore for FjallStore {
    type Error = StoreError;

    async fn create_product(&self, input: ProductInput) -> Result<Product, StoreError> {
        let record = ProductRecord::new(input, now());
        self.run(move |partitions| {
            let id = partitions.insert_product(&record)?;
            Ok(record.into_product(id))
        })
        .await
    }

    async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.run(move |partitions| {
            let record = partitions.get_product(id)?;
            Ok(record.map(|record| record.into_product(id)))
        })
        .await
    }

    async fn update_product(
        &self,
        id: ProductId,
        input: ProductInput,
    ) -> Result<Option<ProductUpdate>, StoreError> {
        let now = now();
        self.run(move |partitions| {
            let modified =
                partitions.modify_product(id, |previous| Some(previous.updated(input.clone(), now)))?;
            Ok(modified.and_then(|(previous, current)| {
                Some(ProductUpdate {
                    previous: previous.into_product(id),
                    current: current?.into_product(id),
                })
            }))
        })
        .await
    }

    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.run(move |partitions| {
            let modified = partitions.modify_product(id, |_| None)?;
            Ok(modified.map(|(previous, _)| previous.into_product(id)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(name: &str, len: usize) -> NewImage {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.resize(len, 0xAB);
        NewImage::new(name, ImageType::Jpeg, data)
    }

    fn wallet(description: &str) -> ProductInput {
        ProductInput {
            name: "Leather Wallet".into(),
            description: description.into(),
            price: 49.99,
            stock_quantity: 75,
            category: Some("accessories".into()),
            status: ProductStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_images_roundtrip() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = FjallStore::open(tempdir.path()).unwrap();

        let stored = store.store_image(jpeg("photo.jpg", 4096)).await.unwrap();
        assert_eq!(stored.id, BlobId(1));
        assert_eq!(stored.size, 4096);

        let fetched = store.fetch_image(stored.id).await.unwrap().unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(fetched.mime_type, ImageType::Jpeg);
        assert_eq!(fetched.hash, blake3::hash(&fetched.data));

        store.delete_image(stored.id).await.unwrap();
        store.delete_image(stored.id).await.unwrap();
        assert!(store.fetch_image(stored.id).await.unwrap().is_none());

        // never allocated
        store.delete_image(BlobId(12345)).await.unwrap();
        store.delete_image(BlobId(12345)).await.unwrap();
        assert!(store.fetch_image(BlobId(12345)).await.unwrap().is_none());

        // deleting an unknown id does not advance the sequence
        let next = store.store_image(jpeg("next.jpg", 16)).await.unwrap();
        assert_eq!(next.id, BlobId(2));
    }

    #[tokio::test]
    async fn test_ids_survive_reopen() {
        let tempdir = tempfile::tempdir().unwrap();
        {
            let store = FjallStore::open(tempdir.path()).unwrap();
            let first = store.store_image(jpeg("a.jpg", 16)).await.unwrap();
            let second = store.store_image(jpeg("b.jpg", 16)).await.unwrap();
            assert_eq!((first.id, second.id), (BlobId(1), BlobId(2)));
            store.delete_image(second.id).await.unwrap();
        }

        let store = FjallStore::open(tempdir.path()).unwrap();
        assert!(store.fetch_image(BlobId(1)).await.unwrap().is_some());
        let third = store.store_image(jpeg("c.jpg", 16)).await.unwrap();
        assert_eq!(third.id, BlobId(3));
    }

    #[tokio::test]
    async fn test_products() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = FjallStore::open(tempdir.path()).unwrap();

        let created = store.create_product(wallet("<p>old</p>")).await.unwrap();
        let fetched = store.fetch_product(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);

        let update = store
            .update_product(created.id, wallet("<p>new</p>"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.previous.description, "<p>old</p>");
        assert_eq!(update.current.description, "<p>new</p>");

        assert!(store
            .update_product(ProductId(99), wallet("<p>x</p>"))
            .await
            .unwrap()
            .is_none());

        let deleted = store.delete_product(created.id).await.unwrap().unwrap();
        assert_eq!(deleted.description, "<p>new</p>");
        assert!(store.delete_product(created.id).await.unwrap().is_none());
        assert!(store.fetch_product(created.id).await.unwrap().is_none());
    }
}
