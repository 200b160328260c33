//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use time::PrimitiveDateTime;
// self
use crate::{
	_prelude::*,
	auth::{IdentityPair, RateLimitState, TokenId, TokenRecord, TokenSecret, TokenStatus},
	config::MIN_TOKEN_BYTES,
	store::{
		CreateTokenRequest, CreatedToken, StoreError, StoreFuture, TokenStore, Verification,
		VerificationCode,
	},
};

const TOKEN_ID_BYTES: usize = 12;

/// Time source consulted on every store operation.
pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

type StoreState = Arc<RwLock<MemoryState>>;

#[derive(Debug, Default)]
struct MemoryState {
	// Keyed by secret digest; raw secrets are never retained.
	tokens: HashMap<String, StoredToken>,
	digests: HashMap<TokenId, String>,
}

#[derive(Debug)]
struct StoredToken {
	record: TokenRecord,
	window: RateWindow,
}

#[derive(Debug)]
struct RateWindow {
	started_at: OffsetDateTime,
	count: u32,
}

/// Thread-safe store that keeps tokens in-process.
///
/// Verification, expiry, and the fixed-window rate counter are evaluated under one write lock,
/// so concurrent verifications of the same token never lose an increment.
#[derive(Clone)]
pub struct MemoryStore {
	state: StoreState,
	clock: Clock,
}
impl MemoryStore {
	/// Replaces the wall clock, typically with a manually advanced one in tests.
	pub fn with_clock(mut self, clock: Clock) -> Self {
		self.clock = clock;

		self
	}

	/// Flips the `enabled` flag of a stored token. Returns `false` if the id is unknown.
	pub fn set_enabled(&self, id: &TokenId, enabled: bool) -> bool {
		let mut guard = self.state.write();
		let Some(digest) = guard.digests.get(id).cloned() else {
			return false;
		};

		match guard.tokens.get_mut(&digest) {
			Some(stored) => {
				stored.record.enabled = enabled;

				true
			},
			None => false,
		}
	}

	/// Returns the non-secret record for `id`, if present.
	pub fn record(&self, id: &TokenId) -> Option<TokenRecord> {
		let guard = self.state.read();

		guard.digests.get(id).and_then(|digest| guard.tokens.get(digest)).map(|s| s.record.clone())
	}

	/// Number of tokens currently held.
	pub fn len(&self) -> usize {
		self.state.read().tokens.len()
	}

	/// Returns `true` when no tokens are held.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn now(&self) -> OffsetDateTime {
		(self.clock)()
	}

	fn create_now(
		state: StoreState,
		request: CreateTokenRequest,
	) -> Result<CreatedToken, StoreError> {
		if request.byte_length < MIN_TOKEN_BYTES {
			return Err(StoreError::Backend {
				message: format!(
					"byteLength must be at least {MIN_TOKEN_BYTES}, got {}",
					request.byte_length
				),
				code: Some("BAD_REQUEST".into()),
				status: Some(400),
			});
		}

		let id = generate_token_id()?;
		let secret = TokenSecret::generate(&request.prefix, request.byte_length);
		let digest = secret.digest();
		let record = TokenRecord {
			id: id.clone(),
			identity: IdentityPair::new(request.owner, request.meta.guest_id),
			prefix: request.prefix,
			issued_at: request.issued_at,
			expires_at: request.expires_at,
			rate_limit: request.rate_limit,
			enabled: request.enabled,
		};
		let window = RateWindow { started_at: request.issued_at, count: 0 };
		let mut guard = state.write();

		guard.digests.insert(id.clone(), digest.clone());
		guard.tokens.insert(digest, StoredToken { record, window });

		Ok(CreatedToken { id, secret })
	}

	fn delete_now(state: StoreState, id: &TokenId) -> Result<(), StoreError> {
		let mut guard = state.write();
		let digest = guard.digests.remove(id).ok_or_else(|| StoreError::Backend {
			message: format!("Token {id} does not exist"),
			code: Some("NOT_FOUND".into()),
			status: Some(404),
		})?;

		guard.tokens.remove(&digest);

		Ok(())
	}

	fn verify_now(state: StoreState, digest: String, now: OffsetDateTime) -> Verification {
		let mut guard = state.write();
		let Some(stored) = guard.tokens.get_mut(&digest) else {
			return Verification::rejected(VerificationCode::NotFound);
		};

		match stored.record.status_at(now) {
			TokenStatus::Disabled => return Verification::rejected(VerificationCode::Disabled),
			TokenStatus::Expired => return Verification::rejected(VerificationCode::Expired),
			TokenStatus::Active => {},
		}

		let limit = stored.record.rate_limit;
		let window = &mut stored.window;

		if now >= window_end(window.started_at, limit.window) {
			window.started_at = now;
			window.count = 0;
		}

		let reset_at = window_end(window.started_at, limit.window);

		if window.count >= limit.max_requests {
			return Verification::rejected(VerificationCode::RateLimited).with_rate_limit(
				RateLimitState { limit: limit.max_requests, remaining: 0, reset_at },
			);
		}

		window.count += 1;

		Verification::valid().with_rate_limit(RateLimitState {
			limit: limit.max_requests,
			remaining: limit.max_requests - window.count,
			reset_at,
		})
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self { state: Default::default(), clock: Arc::new(OffsetDateTime::now_utc) }
	}
}
impl Debug for MemoryStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryStore").field("tokens", &self.len()).finish()
	}
}
impl TokenStore for MemoryStore {
	fn create(&self, request: CreateTokenRequest) -> StoreFuture<'_, CreatedToken> {
		let state = self.state.clone();

		Box::pin(async move { Self::create_now(state, request) })
	}

	fn delete<'a>(&'a self, id: &'a TokenId) -> StoreFuture<'a, ()> {
		let state = self.state.clone();

		Box::pin(async move { Self::delete_now(state, id) })
	}

	fn verify<'a>(&'a self, secret: &'a TokenSecret) -> StoreFuture<'a, Verification> {
		let state = self.state.clone();
		let digest = secret.digest();
		let now = self.now();

		Box::pin(async move { Ok(Self::verify_now(state, digest, now)) })
	}
}

// Saturates at the last representable instant.
fn window_end(started_at: OffsetDateTime, window: Duration) -> OffsetDateTime {
	started_at.checked_add(window).unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc())
}

fn generate_token_id() -> Result<TokenId, StoreError> {
	let mut bytes = [0_u8; TOKEN_ID_BYTES];

	rand::rng().fill_bytes(&mut bytes);

	TokenId::new(format!("key_{}", URL_SAFE_NO_PAD.encode(bytes)))
		.map_err(|e| StoreError::Serialization { message: e.to_string() })
}
