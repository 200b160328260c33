//! Token store contract and built-in store implementations.
//!
//! The store is the sole owner of token existence, expiry, the `enabled` flag, and rate
//! counters. The rest of the crate treats it as a remote authority: it never caches store
//! answers and never mutates a token except through [`TokenStore::delete`].

pub mod memory;
#[cfg(feature = "reqwest")] pub mod remote;

pub use memory::MemoryStore;
#[cfg(feature = "reqwest")] pub use remote::RemoteStore;

// self
use crate::{
	_prelude::*,
	auth::{GuestId, OwnerId, RateLimit, RateLimitState, TokenId, TokenSecret},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by token stores.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Creates a token and returns its identifier plus freshly generated secret.
	fn create(&self, request: CreateTokenRequest) -> StoreFuture<'_, CreatedToken>;

	/// Deletes a token so later verifications no longer find it.
	fn delete<'a>(&'a self, id: &'a TokenId) -> StoreFuture<'a, ()>;

	/// Verifies a presented secret.
	///
	/// Implementations check existence, the `enabled` flag, and expiry, and count the call
	/// against the token's current rate window as one atomic step.
	fn verify<'a>(&'a self, secret: &'a TokenSecret) -> StoreFuture<'a, Verification>;
}

/// Metadata attached to a token under its owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMeta {
	/// Guest the token was issued to.
	pub guest_id: GuestId,
}

/// Everything a store needs to mint a token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateTokenRequest {
	/// Owner label the token is filed under.
	pub owner: OwnerId,
	/// Metadata stored next to the token.
	pub meta: TokenMeta,
	/// Issued-at instant chosen by the issuer.
	pub issued_at: OffsetDateTime,
	/// Absolute expiry (`issued_at + ttl`).
	pub expires_at: OffsetDateTime,
	/// Ceiling enforced per window.
	pub rate_limit: RateLimit,
	/// Operator-facing secret prefix.
	pub prefix: String,
	/// Random bytes of secret material.
	pub byte_length: usize,
	/// Whether the token starts enabled.
	pub enabled: bool,
}

/// Store response to a successful creation.
#[derive(Clone, Debug)]
pub struct CreatedToken {
	/// Store-generated identifier.
	pub id: TokenId,
	/// Secret material; returned exactly once.
	pub secret: TokenSecret,
}

/// Domain codes a store attaches to a verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationCode {
	/// Secret matched an enabled, unexpired token within its rate ceiling.
	Valid,
	/// No token matches the secret.
	NotFound,
	/// Token matched but is switched off.
	Disabled,
	/// Token matched but reached its expiry instant.
	Expired,
	/// Token matched but exhausted its current rate window.
	RateLimited,
	/// Token matched but its usage budget is spent.
	UsageExceeded,
	/// The store refused to evaluate the token for this caller.
	Forbidden,
	/// Any code this crate does not know about.
	#[serde(other)]
	Unrecognized,
}
impl VerificationCode {
	/// Returns the wire label.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Valid => "VALID",
			Self::NotFound => "NOT_FOUND",
			Self::Disabled => "DISABLED",
			Self::Expired => "EXPIRED",
			Self::RateLimited => "RATE_LIMITED",
			Self::UsageExceeded => "USAGE_EXCEEDED",
			Self::Forbidden => "FORBIDDEN",
			Self::Unrecognized => "UNRECOGNIZED",
		}
	}
}

/// Store answer to a verification request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verification {
	/// Whether the store considers the token usable.
	pub valid: bool,
	/// Domain code explaining the decision, if the store supplied one.
	pub code: Option<VerificationCode>,
	/// Rate-limit bookkeeping after this verification, if reported.
	pub rate_limit: Option<RateLimitState>,
}
impl Verification {
	/// Verification that passed.
	pub fn valid() -> Self {
		Self { valid: true, code: Some(VerificationCode::Valid), rate_limit: None }
	}

	/// Verification that failed with `code`.
	pub fn rejected(code: VerificationCode) -> Self {
		Self { valid: false, code: Some(code), rate_limit: None }
	}

	/// Attaches rate-limit bookkeeping.
	pub fn with_rate_limit(mut self, state: RateLimitState) -> Self {
		self.rate_limit = Some(state);

		self
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// The store could not be reached (DNS, TCP, TLS, timeout).
	#[error("Transport failure: {message}.")]
	Transport {
		/// Human-readable error payload.
		message: String,
	},
	/// The store answered with an error (quota, validation, internal failure).
	#[error("{message}")]
	Backend {
		/// Message reported by the store.
		message: String,
		/// Store-specific error code, when available.
		code: Option<String>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The store answered with something that could not be decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	/// Returns `true` when the store was unreachable or reported its own failure, as opposed to
	/// answering with something this crate did not understand.
	pub fn is_backend_failure(&self) -> bool {
		matches!(self, Self::Transport { .. } | Self::Backend { .. })
	}
}
