pub mod api;
pub mod blobstore;
pub mod config;
pub mod datamodel;
pub mod error;
pub mod products;
pub mod reconcile;
pub mod references;
pub mod signature;
pub mod upload;
