//! Platform-agnostic OAuth2/OIDC client core—token/account cache engine, authority trust
//! resolution, silent acquisition orchestration, request throttling, and correlated performance
//! telemetry behind injectable platform capabilities.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authority;
pub mod cache;
pub mod error;
pub mod flows;
pub mod obs;
pub mod platform;
pub mod throttle;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and deterministic platform mocks for integration tests;
	//! enabled via `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicI64, Ordering},
	};
	// self
	use crate::{
		authority::CloudDiscoveryMetadata,
		flows::{SilentFlow, SilentFlowConfig},
		platform::{
			ClockCapability, DefaultCrypto, MemoryStorage, NetworkCapability, NetworkError,
			NetworkFuture, NetworkResponse, TaskSpawner,
		},
	};

	/// Authority used across integration tests; resolved through the static test cloud
	/// table, never the network.
	pub const TEST_AUTHORITY: &str = "https://login.test.example/test-tenant";
	/// Host component of [`TEST_AUTHORITY`].
	pub const TEST_AUTHORITY_HOST: &str = "login.test.example";

	/// Static cloud table trusting the test authority host.
	pub fn test_cloud_config() -> Vec<CloudDiscoveryMetadata> {
		vec![CloudDiscoveryMetadata::from_host(TEST_AUTHORITY_HOST)]
	}

	/// Deterministic clock starting at the Unix epoch and advancing only when told to.
	#[derive(Clone, Debug, Default)]
	pub struct TestClock(Arc<AtomicI64>);
	impl TestClock {
		/// Moves the clock forward.
		pub fn advance(&self, delta: Duration) {
			self.0.fetch_add(delta.whole_seconds(), Ordering::SeqCst);
		}
	}
	impl ClockCapability for TestClock {
		fn now(&self) -> OffsetDateTime {
			OffsetDateTime::UNIX_EPOCH + Duration::seconds(self.0.load(Ordering::SeqCst))
		}
	}

	/// A request observed by [`MockNetwork`].
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// HTTP method label.
		pub method: &'static str,
		/// Request URL.
		pub url: Url,
		/// Form body for POST requests.
		pub body: Option<String>,
	}

	/// Scripted network capability; responses are served in enqueue order.
	#[derive(Clone, Debug, Default)]
	pub struct MockNetwork {
		queue: Arc<Mutex<VecDeque<NetworkResponse>>>,
		requests: Arc<Mutex<Vec<RecordedRequest>>>,
	}
	impl MockNetwork {
		/// Scripts the next response.
		pub fn enqueue(&self, status: u16, body: impl Into<String>) {
			self.enqueue_response(NetworkResponse {
				status,
				body: body.into(),
				retry_after: None,
			});
		}

		/// Scripts the next response with full control over its fields.
		pub fn enqueue_response(&self, response: NetworkResponse) {
			self.queue.lock().push_back(response);
		}

		/// Every request observed so far.
		pub fn requests(&self) -> Vec<RecordedRequest> {
			self.requests.lock().clone()
		}

		/// Number of requests observed so far.
		pub fn request_count(&self) -> usize {
			self.requests.lock().len()
		}

		fn dispatch(
			&self,
			method: &'static str,
			url: Url,
			body: Option<String>,
		) -> Result<NetworkResponse, NetworkError> {
			self.requests.lock().push(RecordedRequest { method, url, body });
			self.queue
				.lock()
				.pop_front()
				.ok_or_else(|| NetworkError::new("no scripted response left"))
		}
	}
	impl NetworkCapability for MockNetwork {
		fn get(&self, url: Url) -> NetworkFuture<'_, NetworkResponse> {
			Box::pin(async move { self.dispatch("GET", url, None) })
		}

		fn post_form(&self, url: Url, body: String) -> NetworkFuture<'_, NetworkResponse> {
			Box::pin(async move { self.dispatch("POST", url, Some(body)) })
		}
	}

	/// Task spawner that queues detached futures for the test to drive explicitly.
	#[derive(Clone, Default)]
	pub struct QueueSpawner {
		tasks: Arc<Mutex<Vec<Pin<Box<dyn Future<Output = ()> + Send>>>>>,
	}
	impl QueueSpawner {
		/// Number of spawned tasks not yet driven.
		pub fn pending(&self) -> usize {
			self.tasks.lock().len()
		}

		/// Drives every queued task to completion, in spawn order.
		pub async fn run_all(&self) {
			let tasks = std::mem::take(&mut *self.tasks.lock());

			for task in tasks {
				task.await;
			}
		}
	}
	impl TaskSpawner for QueueSpawner {
		fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send>>) {
			self.tasks.lock().push(fut);
		}
	}
	impl Debug for QueueSpawner {
		fn fmt(&self, f: &mut Formatter) -> FmtResult {
			f.debug_struct("QueueSpawner").field("pending", &self.pending()).finish()
		}
	}

	/// Capability bundle returned by [`build_test_flow`].
	pub struct TestFlowParts {
		/// Flow under test, resolving [`TEST_AUTHORITY`] through the static table.
		pub flow: SilentFlow,
		/// Storage shared with the flow's cache.
		pub storage: MemoryStorage,
		/// Scripted network shared with the flow.
		pub network: MockNetwork,
		/// Deterministic clock shared with the flow.
		pub clock: TestClock,
		/// Spawner collecting the flow's detached refreshes.
		pub spawner: QueueSpawner,
	}

	/// Constructs a [`SilentFlow`] over in-memory storage, a scripted network, a
	/// deterministic clock, and a queueing spawner.
	pub fn build_test_flow(client_id: &str) -> TestFlowParts {
		let storage = MemoryStorage::default();
		let network = MockNetwork::default();
		let clock = TestClock::default();
		let spawner = QueueSpawner::default();
		let flow = SilentFlow::new(
			SilentFlowConfig::new(client_id),
			Arc::new(storage.clone()),
			Arc::new(network.clone()),
			Arc::new(DefaultCrypto),
			Arc::new(clock.clone()),
			Arc::new(spawner.clone()),
		)
		.with_static_cloud_config(test_cloud_config());

		TestFlowParts { flow, storage, network, clock, spawner }
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use url;
#[cfg(test)] use tokio as _;
