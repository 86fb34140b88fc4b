//! Static API-key authentication.
//!
//! Every operation requires an `x-api-key` header naming an active record in
//! the `api_keys` collection (document id = the raw key). There are no roles
//! or scopes: a key is either allowed or not.
//!
//! The registry is reached through the [`KeyRegistry`] trait so the HTTP
//! layer can be tested against any store.

pub mod store;
pub mod types;

pub use store::{ensure_default_key, validate_key, KeyRegistry, KeyRejection, StoreKeyRegistry};
pub use types::ApiKeyRecord;
