//! Token/account cache engine: entity schema, deterministic key codec, and the cache
//! manager that owns all entity CRUD and consistency enforcement.

pub mod entity;
pub mod key;
pub mod manager;

pub use entity::{
	AccountEntity, AppMetadataEntity, AuthorityMetadataEntity, CredentialEntity, CredentialKind,
	ThrottlingEntity,
};
pub use key::{AccountKey, AppMetadataKey, CredentialKey, KeyParseError};
pub use manager::{AccountFilter, CacheManager, CredentialFilter};
