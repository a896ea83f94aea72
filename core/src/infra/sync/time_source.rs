//! Time source abstraction for drift and latency measurement
//!
//! The drift tracker and the delivery reconciler need "now" to be injectable
//! so tests can pin drift and push latencies to exact values. Production code
//! uses `SystemTimeSource`; tests use `FakeTimeSource` for controlled,
//! reproducible timing.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Abstracts the wall clock
///
/// Implementations must be thread-safe since the engine samples time from
/// multiple spawned tasks.
pub trait TimeSource: Send + Sync {
	/// Current wall-clock time
	fn now(&self) -> DateTime<Utc>;
}

/// Production time source backed by the system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Test time source with manual control
///
/// Stores milliseconds since the Unix epoch in an atomic so one instance can
/// be shared across tasks while the test advances time. Supports setting the
/// clock backwards for skew scenarios.
#[derive(Debug, Clone)]
pub struct FakeTimeSource {
	millis: Arc<AtomicI64>,
}

impl FakeTimeSource {
	/// Create a fake time source pinned at `initial`
	pub fn new(initial: DateTime<Utc>) -> Self {
		Self {
			millis: Arc::new(AtomicI64::new(initial.timestamp_millis())),
		}
	}

	/// Advance the clock by `delta`
	pub fn advance(&self, delta: chrono::Duration) {
		self.millis
			.fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
	}

	/// Set the clock to `at` (may be in the past)
	pub fn set(&self, at: DateTime<Utc>) {
		self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
	}
}

impl TimeSource for FakeTimeSource {
	fn now(&self) -> DateTime<Utc> {
		DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
			.expect("fake time within representable range")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn at(millis: i64) -> DateTime<Utc> {
		DateTime::from_timestamp_millis(millis).unwrap()
	}

	#[test]
	fn test_fake_time_advances() {
		let time = FakeTimeSource::new(at(1_000));
		assert_eq!(time.now(), at(1_000));

		time.advance(chrono::Duration::milliseconds(500));
		assert_eq!(time.now(), at(1_500));
	}

	#[test]
	fn test_fake_time_can_go_backwards() {
		let time = FakeTimeSource::new(at(5_000));
		time.set(at(1_000));
		assert_eq!(time.now(), at(1_000));
	}

	#[test]
	fn test_fake_time_is_shared_across_clones() {
		let time = FakeTimeSource::new(at(1_000));
		let clone = time.clone();

		time.advance(chrono::Duration::milliseconds(100));
		assert_eq!(clone.now(), at(1_100));
	}
}
