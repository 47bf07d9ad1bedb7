pub mod backup;
mod models;
mod store;

pub use models::*;
pub use store::{FileStore, Result, StorageError, StoreKey};
