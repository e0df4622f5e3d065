//! Correlated performance telemetry for nested, partially-overlapping async measurements.
//!
//! A correlation id ties together every measurement belonging to one logical operation.
//! Measurements started under the same id form a flat tree: one top-level measurement
//! plus any number of named submeasurements, all possibly in flight at once. Nothing is
//! emitted until [`PerfCorrelator::flush_measurements`] flattens the whole tree into a
//! single [`PerfEvent`] and discards the in-progress state for that id.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, platform::ClockCapability};

/// Callback invoked with the batch of events emitted by a flush.
pub type PerfCallback = Arc<dyn Fn(&[PerfEvent]) + Send + Sync>;

/// Handle returned by callback registration, used for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Platform seam producing duration measurements.
///
/// An implementation may report no usable duration (an unsupported environment); in
/// that case the correlator emits no event at all for the correlation id.
pub trait MeasurementCapability
where
	Self: Send + Sync,
{
	/// Starts a named measurement clock.
	fn start(&self, name: &str, correlation_id: &str) -> Box<dyn ActiveMeasurement>;
}

/// A running measurement clock.
pub trait ActiveMeasurement
where
	Self: Send,
{
	/// Stops the clock and returns the elapsed milliseconds, when measurable.
	fn stop(&mut self) -> Option<f64>;
}

/// Default [`MeasurementCapability`] backed by a [`ClockCapability`].
#[derive(Clone)]
pub struct ClockMeasurementFactory {
	clock: Arc<dyn ClockCapability>,
}
impl ClockMeasurementFactory {
	/// Creates a factory over the provided clock.
	pub fn new(clock: Arc<dyn ClockCapability>) -> Self {
		Self { clock }
	}
}
impl MeasurementCapability for ClockMeasurementFactory {
	fn start(&self, _name: &str, _correlation_id: &str) -> Box<dyn ActiveMeasurement> {
		Box::new(ClockMeasurement { clock: self.clock.clone(), started: self.clock.now() })
	}
}

struct ClockMeasurement {
	clock: Arc<dyn ClockCapability>,
	started: OffsetDateTime,
}
impl ActiveMeasurement for ClockMeasurement {
	fn stop(&mut self) -> Option<f64> {
		Some((self.clock.now() - self.started).whole_microseconds() as f64 / 1_000.0)
	}
}

/// One flattened event describing a completed top-level operation.
#[derive(Clone, Debug)]
pub struct PerfEvent {
	/// Top-level measurement name.
	pub name: String,
	/// Correlation id the event belongs to.
	pub correlation_id: String,
	/// Unix milliseconds at which the top-level measurement started.
	pub start_time_ms: i64,
	/// Total duration of the top-level measurement.
	pub duration_ms: f64,
	/// Whether the operation completed successfully.
	pub success: bool,
	/// Client id the correlator was configured with.
	pub client_id: String,
	/// Authority the correlator was configured with.
	pub authority: String,
	/// Library name stamped on every event.
	pub library_name: String,
	/// Library version stamped on every event.
	pub library_version: String,
	/// Submeasurement durations keyed as `{name}_duration_ms`.
	pub sub_measurements: BTreeMap<String, f64>,
}
impl PerfEvent {
	/// Looks up a submeasurement duration by its measurement name.
	pub fn sub_duration_ms(&self, name: &str) -> Option<f64> {
		self.sub_measurements.get(&sub_measurement_key(name)).copied()
	}
}

struct PendingMeasurement {
	token: u64,
	name: String,
	start_time_ms: i64,
	timer: Box<dyn ActiveMeasurement>,
}

struct CompletedMeasurement {
	name: String,
	start_time_ms: i64,
	duration_ms: Option<f64>,
	success: bool,
}

#[derive(Default)]
struct OperationState {
	pending: Vec<PendingMeasurement>,
	completed: Vec<CompletedMeasurement>,
}

/// Tracks measurement trees per correlation id and emits one flattened event per flush.
pub struct PerfCorrelator {
	client_id: String,
	authority: String,
	library_name: String,
	library_version: String,
	measurement: Arc<dyn MeasurementCapability>,
	clock: Arc<dyn ClockCapability>,
	callbacks: Mutex<HashMap<u64, PerfCallback>>,
	operations: Mutex<HashMap<String, OperationState>>,
	next_id: AtomicU64,
}
impl PerfCorrelator {
	/// Creates a correlator stamping events with the provided client/authority/library
	/// identity.
	pub fn new(
		client_id: impl Into<String>,
		authority: impl Into<String>,
		library_name: impl Into<String>,
		library_version: impl Into<String>,
		measurement: Arc<dyn MeasurementCapability>,
		clock: Arc<dyn ClockCapability>,
	) -> Self {
		Self {
			client_id: client_id.into(),
			authority: authority.into(),
			library_name: library_name.into(),
			library_version: library_version.into(),
			measurement,
			clock,
			callbacks: Mutex::new(HashMap::new()),
			operations: Mutex::new(HashMap::new()),
			next_id: AtomicU64::new(1),
		}
	}

	/// Registers a callback receiving every emitted event batch.
	pub fn add_callback(&self, callback: PerfCallback) -> CallbackId {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);

		self.callbacks.lock().insert(id, callback);

		CallbackId(id)
	}

	/// Removes a registered callback; returns `false` when the id is unknown.
	pub fn remove_callback(&self, id: CallbackId) -> bool {
		self.callbacks.lock().remove(&id.0).is_some()
	}

	/// Starts a named measurement under the correlation id.
	///
	/// Multiple measurements may be active concurrently under one id. Ending the
	/// returned guard records success/failure and stops the clock; a guard never
	/// ended by flush time is force-ended so no measurement leaks across operations.
	pub fn start_measurement(
		self: &Arc<Self>,
		name: &str,
		correlation_id: &str,
	) -> MeasurementGuard {
		let token = self.next_id.fetch_add(1, Ordering::Relaxed);
		let pending = PendingMeasurement {
			token,
			name: name.to_owned(),
			start_time_ms: unix_ms(self.clock.now()),
			timer: self.measurement.start(name, correlation_id),
		};

		self.operations.lock().entry(correlation_id.to_owned()).or_default().pending.push(pending);

		MeasurementGuard { correlator: self.clone(), correlation_id: correlation_id.to_owned(), token }
	}

	/// Flattens and emits the operation's measurement tree, then discards its state.
	///
	/// No event is emitted when the top-level measurement is missing or when the
	/// platform reported no usable duration for it.
	pub fn flush_measurements(&self, top_level: &str, correlation_id: &str) {
		let Some(mut state) = self.operations.lock().remove(correlation_id) else { return };

		// Force-end whatever is still running under this correlation id.
		for mut pending in state.pending.drain(..) {
			state.completed.push(CompletedMeasurement {
				name: pending.name,
				start_time_ms: pending.start_time_ms,
				duration_ms: pending.timer.stop(),
				success: false,
			});
		}

		let Some(top) = state.completed.iter().find(|measurement| measurement.name == top_level)
		else {
			return;
		};
		let Some(duration_ms) = top.duration_ms else { return };
		let mut event = PerfEvent {
			name: top.name.clone(),
			correlation_id: correlation_id.to_owned(),
			start_time_ms: top.start_time_ms,
			duration_ms,
			success: top.success,
			client_id: self.client_id.clone(),
			authority: self.authority.clone(),
			library_name: self.library_name.clone(),
			library_version: self.library_version.clone(),
			sub_measurements: BTreeMap::new(),
		};

		// First completed measurement per name wins; later duplicates are ignored.
		for measurement in &state.completed {
			if measurement.name == top_level {
				continue;
			}

			let Some(duration) = measurement.duration_ms else { continue };
			let key = sub_measurement_key(&measurement.name);

			event.sub_measurements.entry(key).or_insert(duration);
		}

		let events = [event];

		for callback in self.callbacks.lock().values() {
			callback(&events);
		}
	}

	fn end_measurement(&self, correlation_id: &str, token: u64, success: bool) -> Option<f64> {
		let mut operations = self.operations.lock();
		let state = operations.get_mut(correlation_id)?;
		let index = state.pending.iter().position(|pending| pending.token == token)?;
		let mut pending = state.pending.swap_remove(index);
		let duration_ms = pending.timer.stop();

		state.completed.push(CompletedMeasurement {
			name: pending.name,
			start_time_ms: pending.start_time_ms,
			duration_ms,
			success,
		});

		duration_ms
	}
}
impl Debug for PerfCorrelator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PerfCorrelator")
			.field("client_id", &self.client_id)
			.field("authority", &self.authority)
			.finish_non_exhaustive()
	}
}

/// Guard for an in-flight measurement; ending it records the outcome.
pub struct MeasurementGuard {
	correlator: Arc<PerfCorrelator>,
	correlation_id: String,
	token: u64,
}
impl MeasurementGuard {
	/// Stops the clock and records the outcome, returning the measured duration.
	pub fn end(self, success: bool) -> Option<f64> {
		self.correlator.end_measurement(&self.correlation_id, self.token, success)
	}
}
impl Debug for MeasurementGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MeasurementGuard").field("correlation_id", &self.correlation_id).finish()
	}
}

fn sub_measurement_key(name: &str) -> String {
	format!("{name}_duration_ms")
}

fn unix_ms(instant: OffsetDateTime) -> i64 {
	(instant.unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::platform::SystemClock;

	const SAMPLE_DURATION_MS: f64 = 50.0;

	struct FixedMeasurement(Option<f64>);
	impl ActiveMeasurement for FixedMeasurement {
		fn stop(&mut self) -> Option<f64> {
			self.0
		}
	}

	struct FixedFactory(Option<f64>);
	impl MeasurementCapability for FixedFactory {
		fn start(&self, _name: &str, _correlation_id: &str) -> Box<dyn ActiveMeasurement> {
			Box::new(FixedMeasurement(self.0))
		}
	}

	fn correlator(duration: Option<f64>) -> Arc<PerfCorrelator> {
		Arc::new(PerfCorrelator::new(
			"test-client-id",
			"https://login.contoso.com/common",
			"oidc-silent-core",
			"0.1.0",
			Arc::new(FixedFactory(duration)),
			Arc::new(SystemClock),
		))
	}

	fn capture() -> (PerfCallback, Arc<Mutex<Vec<PerfEvent>>>) {
		let sink = Arc::new(Mutex::new(Vec::new()));
		let clone = sink.clone();
		let callback: PerfCallback =
			Arc::new(move |events| clone.lock().extend(events.iter().cloned()));

		(callback, sink)
	}

	#[test]
	fn adds_and_removes_a_callback() {
		let correlator = correlator(Some(SAMPLE_DURATION_MS));
		let (callback, _) = capture();
		let id = correlator.add_callback(callback);

		assert!(correlator.remove_callback(id));
		assert!(!correlator.remove_callback(id));
	}

	#[test]
	fn starts_ends_and_emits_one_flattened_event() {
		let correlator = correlator(Some(SAMPLE_DURATION_MS));
		let (callback, sink) = capture();

		correlator.add_callback(callback);
		correlator.start_measurement("acquire_token_silent", "corr-1").end(true);
		correlator.start_measurement("silent_cache_lookup", "corr-1").end(true);
		correlator.flush_measurements("acquire_token_silent", "corr-1");

		let events = sink.lock();

		assert_eq!(events.len(), 1);
		assert_eq!(events[0].correlation_id, "corr-1");
		assert_eq!(events[0].duration_ms, SAMPLE_DURATION_MS);
		assert!(events[0].success);
		assert_eq!(events[0].client_id, "test-client-id");
		assert_eq!(events[0].sub_duration_ms("silent_cache_lookup"), Some(SAMPLE_DURATION_MS));
	}

	#[test]
	fn force_ends_dangling_submeasurements_at_flush() {
		let correlator = correlator(Some(SAMPLE_DURATION_MS));
		let (callback, sink) = capture();

		correlator.add_callback(callback);

		let top = correlator.start_measurement("acquire_token_silent", "corr-2");
		let _dangling = correlator.start_measurement("refresh_token_exchange", "corr-2");

		top.end(true);
		correlator.flush_measurements("acquire_token_silent", "corr-2");

		let events = sink.lock();

		assert_eq!(events.len(), 1);
		assert_eq!(
			events[0].sub_duration_ms("refresh_token_exchange"),
			Some(SAMPLE_DURATION_MS),
			"Flush must force-end submeasurements that were never ended.",
		);
	}

	#[test]
	fn only_the_first_submeasurement_per_name_is_retained() {
		struct SequenceFactory(Mutex<Vec<f64>>);
		impl MeasurementCapability for SequenceFactory {
			fn start(&self, _name: &str, _correlation_id: &str) -> Box<dyn ActiveMeasurement> {
				Box::new(FixedMeasurement(self.0.lock().pop()))
			}
		}

		let correlator = Arc::new(PerfCorrelator::new(
			"test-client-id",
			"https://login.contoso.com/common",
			"oidc-silent-core",
			"0.1.0",
			// Popped back-to-front: top gets 50, first sub 50, second sub 1.
			Arc::new(SequenceFactory(Mutex::new(vec![1.0, 50.0, 50.0]))),
			Arc::new(SystemClock),
		));
		let (callback, sink) = capture();

		correlator.add_callback(callback);
		correlator.start_measurement("acquire_token_silent", "corr-3").end(true);
		correlator.start_measurement("silent_cache_lookup", "corr-3").end(true);
		correlator.start_measurement("silent_cache_lookup", "corr-3").end(true);
		correlator.flush_measurements("acquire_token_silent", "corr-3");

		let events = sink.lock();

		assert_eq!(events.len(), 1);
		assert_eq!(events[0].sub_duration_ms("silent_cache_lookup"), Some(SAMPLE_DURATION_MS));
	}

	#[test]
	fn no_event_is_emitted_without_a_usable_duration() {
		let correlator = correlator(None);
		let (callback, sink) = capture();

		correlator.add_callback(callback);

		let result = correlator.start_measurement("acquire_token_silent", "corr-4").end(true);

		correlator.flush_measurements("acquire_token_silent", "corr-4");

		assert!(result.is_none());
		assert!(sink.lock().is_empty(), "Unsupported environments must emit nothing.");
	}

	#[test]
	fn flush_discards_state_so_a_second_flush_is_silent() {
		let correlator = correlator(Some(SAMPLE_DURATION_MS));
		let (callback, sink) = capture();

		correlator.add_callback(callback);
		correlator.start_measurement("acquire_token_silent", "corr-5").end(true);
		correlator.flush_measurements("acquire_token_silent", "corr-5");
		correlator.flush_measurements("acquire_token_silent", "corr-5");

		assert_eq!(sink.lock().len(), 1);
	}
}
