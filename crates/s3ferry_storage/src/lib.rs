pub mod crypto;
pub mod repository;

pub use crypto::{CipherError, SecretCipher};
pub use repository::{CredentialRecord, FerryStorage, StorageConfig, TransferJobRecord};
