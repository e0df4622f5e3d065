//! Request throttling keyed by request thumbprint.
//!
//! A server response carrying a throttle signal (HTTP 429, 5xx, or a Retry-After
//! header) records a backoff window for the request shape that triggered it. Any
//! matching request inside the window fails immediately with a throttling error
//! instead of reaching the network. Expired entries are removed lazily when found,
//! not by a background sweep.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	cache::{CacheManager, entity::ThrottlingEntity},
	error::StorageError,
	platform::{ClockCapability, CryptoCapability},
};

/// Backoff applied when the server supplies no Retry-After hint.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::seconds(60);
/// Upper bound on any server-requested backoff window.
pub const MAX_THROTTLE_WINDOW: Duration = Duration::seconds(3600);

/// Stable fingerprint of a token request's throttle-relevant shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestThumbprint {
	/// Client id issuing the request.
	pub client_id: String,
	/// Canonical authority the request targets.
	pub authority: String,
	/// Normalized scopes being requested.
	pub scopes: ScopeSet,
	/// Home account id, when the request is user-bound.
	pub home_account_id: Option<String>,
}
impl RequestThumbprint {
	/// Hashes the thumbprint into the cache key for its throttling entity.
	pub fn hash(&self, crypto: &dyn CryptoCapability) -> String {
		let material = format!(
			"{}|{}|{}|{}",
			self.client_id.to_lowercase(),
			self.authority.to_lowercase(),
			self.scopes.normalized(),
			self.home_account_id.as_deref().unwrap_or_default().to_lowercase(),
		);

		STANDARD_NO_PAD.encode(crypto.sha256(material.as_bytes()))
	}
}

/// Records and enforces server-signaled backoff windows.
#[derive(Clone)]
pub struct ThrottlingGuard {
	cache: CacheManager,
	clock: Arc<dyn ClockCapability>,
}
impl ThrottlingGuard {
	/// Creates a guard over the shared cache and clock.
	pub fn new(cache: CacheManager, clock: Arc<dyn ClockCapability>) -> Self {
		Self { cache, clock }
	}

	/// Returns `true` when an unexpired throttle entry forbids this request shape.
	///
	/// An expired entry found here is removed before returning `false`.
	pub fn should_throttle(&self, thumbprint: &str) -> bool {
		self.active_entry(thumbprint).is_some()
	}

	/// Fails with [`Error::Throttled`] when the request shape is inside a backoff window.
	pub fn check(&self, thumbprint: &str, correlation_id: &str) -> Result<()> {
		match self.active_entry(thumbprint) {
			Some(entity) => Err(Error::Throttled {
				retry_at: entity.throttle_time,
				error_code: entity.error_code,
				error_description: entity.error_description,
				correlation_id: Some(correlation_id.to_owned()),
			}),
			None => Ok(()),
		}
	}

	/// Records a backoff window for the request shape.
	///
	/// The window is the server's Retry-After hint when present, otherwise the
	/// default, and never exceeds the sane maximum.
	pub fn record_throttle(
		&self,
		thumbprint: &str,
		retry_after: Option<Duration>,
		status: u16,
		error_code: Option<&str>,
		error_description: Option<&str>,
	) -> Result<(), StorageError> {
		let window = retry_after.unwrap_or(DEFAULT_THROTTLE_WINDOW).min(MAX_THROTTLE_WINDOW);
		let entity = ThrottlingEntity {
			throttle_time: self.clock.now() + window,
			status: Some(status),
			error_code: error_code.map(str::to_owned),
			error_description: error_description.map(str::to_owned),
		};

		self.cache.save_throttling_entity(thumbprint, &entity)
	}

	/// Removes any throttle entry for the request shape (successful completion).
	pub fn clear_throttle(&self, thumbprint: &str) -> Result<(), StorageError> {
		self.cache.remove_throttling_entity(thumbprint)
	}

	/// Returns `true` when a response carries a throttle signal.
	pub fn is_throttle_signal(status: u16, retry_after: Option<Duration>) -> bool {
		status == 429 || (500..600).contains(&status) || retry_after.is_some()
	}

	fn active_entry(&self, thumbprint: &str) -> Option<ThrottlingEntity> {
		let entity = self.cache.get_throttling_entity(thumbprint)?;

		if entity.is_expired_at(self.clock.now()) {
			// Lazy removal; no background sweep exists.
			let _ = self.cache.remove_throttling_entity(thumbprint);

			return None;
		}

		Some(entity)
	}
}
impl Debug for ThrottlingGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ThrottlingGuard").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicI64, Ordering};
	// self
	use super::*;
	use crate::platform::{DefaultCrypto, MemoryStorage};

	#[derive(Debug, Default)]
	struct TestClock(AtomicI64);
	impl TestClock {
		fn advance(&self, delta: Duration) {
			self.0.fetch_add(delta.whole_seconds(), Ordering::SeqCst);
		}
	}
	impl ClockCapability for TestClock {
		fn now(&self) -> OffsetDateTime {
			OffsetDateTime::UNIX_EPOCH + Duration::seconds(self.0.load(Ordering::SeqCst))
		}
	}

	fn thumbprint() -> String {
		RequestThumbprint {
			client_id: "client".into(),
			authority: "https://login.contoso.com/tenant".into(),
			scopes: ScopeSet::new(["user.read"]).expect("Scope fixture should be valid."),
			home_account_id: Some("uid.utid".into()),
		}
		.hash(&DefaultCrypto)
	}

	#[test]
	fn thumbprint_is_stable_across_scope_ordering() {
		let lhs = RequestThumbprint {
			client_id: "Client".into(),
			authority: "https://login.contoso.com/tenant".into(),
			scopes: ScopeSet::new(["b", "a"]).expect("Scope fixture should be valid."),
			home_account_id: None,
		};
		let rhs = RequestThumbprint {
			client_id: "client".into(),
			authority: "https://LOGIN.contoso.com/tenant".into(),
			scopes: ScopeSet::new(["a", "b"]).expect("Scope fixture should be valid."),
			home_account_id: None,
		};

		assert_eq!(lhs.hash(&DefaultCrypto), rhs.hash(&DefaultCrypto));
	}

	#[test]
	fn throttle_window_expires_with_simulated_time() {
		let clock = Arc::new(TestClock::default());
		let guard = ThrottlingGuard::new(
			CacheManager::new(Arc::new(MemoryStorage::default())),
			clock.clone(),
		);
		let key = thumbprint();

		guard
			.record_throttle(&key, Some(Duration::seconds(60)), 429, Some("server_busy"), None)
			.expect("Throttle record should succeed.");

		assert!(guard.should_throttle(&key));

		clock.advance(Duration::seconds(61));

		assert!(!guard.should_throttle(&key));
		// Lazy removal cleaned the entry, so a fresh check stays clear.
		assert!(guard.check(&key, "corr-1").is_ok());
	}

	#[test]
	fn throttled_error_carries_the_correlation_id() {
		let clock = Arc::new(TestClock::default());
		let guard = ThrottlingGuard::new(
			CacheManager::new(Arc::new(MemoryStorage::default())),
			clock.clone(),
		);
		let key = thumbprint();

		guard
			.record_throttle(&key, None, 429, Some("server_busy"), None)
			.expect("Throttle record should succeed.");

		let err = guard.check(&key, "corr-42").expect_err("An active window must fail the check.");

		assert!(matches!(
			err,
			Error::Throttled { correlation_id: Some(ref id), .. } if id == "corr-42"
		));
	}

	#[test]
	fn retry_after_is_bounded_by_the_maximum_window() {
		let clock = Arc::new(TestClock::default());
		let cache = CacheManager::new(Arc::new(MemoryStorage::default()));
		let guard = ThrottlingGuard::new(cache.clone(), clock.clone());
		let key = thumbprint();

		guard
			.record_throttle(&key, Some(Duration::hours(48)), 503, None, None)
			.expect("Throttle record should succeed.");

		let entity =
			cache.get_throttling_entity(&key).expect("Throttle entity should be stored.");

		assert_eq!(entity.throttle_time, clock.now() + MAX_THROTTLE_WINDOW);
	}

	#[test]
	fn throttle_signals_cover_status_and_retry_after() {
		assert!(ThrottlingGuard::is_throttle_signal(429, None));
		assert!(ThrottlingGuard::is_throttle_signal(503, None));
		assert!(ThrottlingGuard::is_throttle_signal(200, Some(Duration::seconds(10))));
		assert!(!ThrottlingGuard::is_throttle_signal(400, None));
	}
}
