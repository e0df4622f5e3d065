//! Platform capability contracts consumed by the core.
//!
//! The core never talks to a concrete storage backend, HTTP stack, crypto library, clock,
//! or executor directly. Host platforms (browser shim, native daemon, tests) inject
//! implementations of the traits below, and the core depends only on these contracts.

pub mod memory;
pub mod system;
#[cfg(feature = "reqwest")] pub mod reqwest;

pub use memory::MemoryStorage;
pub use system::{DefaultCrypto, SystemClock};
#[cfg(feature = "reqwest")] pub use reqwest::ReqwestNetworkClient;

// self
use crate::{_prelude::*, error::StorageError};

/// Boxed future returned by [`NetworkCapability`] calls.
pub type NetworkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, NetworkError>> + 'a + Send>>;

/// Key-value persistence contract scoped to a single cache partition.
///
/// All operations are synchronous with respect to the in-process cache state; a sequence
/// of reads and writes issued without an intervening suspension point is atomic from the
/// perspective of other logical operations.
pub trait StorageCapability
where
	Self: Send + Sync,
{
	/// Returns the serialized record stored under `key`, if any.
	fn get(&self, key: &str) -> Option<String>;

	/// Persists or replaces the serialized record under `key`.
	fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

	/// Removes the record stored under `key`.
	fn remove(&self, key: &str) -> Result<(), StorageError>;

	/// Lists every key currently present in the partition.
	fn keys(&self) -> Vec<String>;
}

/// HTTP transport contract used for OIDC discovery and token requests.
pub trait NetworkCapability
where
	Self: Send + Sync,
{
	/// Issues a GET request and returns the raw response.
	fn get(&self, url: Url) -> NetworkFuture<'_, NetworkResponse>;

	/// Issues a form-urlencoded POST request and returns the raw response.
	fn post_form(&self, url: Url, body: String) -> NetworkFuture<'_, NetworkResponse>;
}

/// Raw HTTP response surfaced to the core by a [`NetworkCapability`].
#[derive(Clone, Debug)]
pub struct NetworkResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body bytes interpreted as UTF-8.
	pub body: String,
	/// Retry-After hint parsed from response headers, when present.
	pub retry_after: Option<Duration>,
}
impl NetworkResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Transport-level failure reported by a [`NetworkCapability`].
#[derive(Clone, Debug, ThisError)]
#[error("Transport failure: {message}.")]
pub struct NetworkError {
	/// Transport-specific failure payload.
	pub message: String,
}
impl NetworkError {
	/// Wraps a transport-specific error value.
	pub fn new(src: impl Display) -> Self {
		Self { message: src.to_string() }
	}
}

/// Cryptographic primitives consumed by the core.
///
/// The core never implements hashing or randomness itself; it requests digests for
/// request thumbprints and random material for correlation ids through this seam.
pub trait CryptoCapability
where
	Self: Send + Sync,
{
	/// Computes a SHA-256 digest of `data`.
	fn sha256(&self, data: &[u8]) -> [u8; 32];

	/// Generates a new GUID-shaped identifier.
	fn new_guid(&self) -> String;
}

/// Clock seam allowing deterministic tests.
pub trait ClockCapability
where
	Self: Send + Sync,
{
	/// Returns the current UTC instant.
	fn now(&self) -> OffsetDateTime;
}

/// Detached task execution for fire-and-forget work (background refresh).
///
/// Failures inside spawned futures must never propagate to the caller that scheduled
/// them; implementations simply drive the future to completion on their own schedule.
pub trait TaskSpawner
where
	Self: Send + Sync,
{
	/// Schedules the future to run without blocking the caller.
	fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send>>);
}
