pub mod aws;
pub mod memory;
pub mod store;

pub use aws::{AwsObjectStore, AwsStoreConfig};
pub use memory::InMemoryObjectStore;
pub use store::{ObjectStore, ObjectStoreError};
