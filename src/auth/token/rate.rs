//! Fixed-window request ceilings attached to tokens at issuance.

// self
use crate::_prelude::*;

/// Request ceiling enforced by the token store per token id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimit {
	/// Length of one counting window.
	pub window: Duration,
	/// Maximum verifications allowed inside one window.
	pub max_requests: u32,
}
impl RateLimit {
	/// Creates a ceiling of `max_requests` per `window`.
	pub const fn new(max_requests: u32, window: Duration) -> Self {
		Self { window, max_requests }
	}

	/// Window length in whole milliseconds, as key-management backends expect it.
	pub fn window_ms(&self) -> i64 {
		i64::try_from(self.window.whole_milliseconds()).unwrap_or(i64::MAX)
	}
}

/// Rate-limit state reported by a store alongside a verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
	/// Ceiling that applies to the current window.
	pub limit: u32,
	/// Requests still available in the current window.
	pub remaining: u32,
	/// Instant the current window closes.
	pub reset_at: OffsetDateTime,
}
