//! Immutable token records and the one-time handle returned at issuance.

// self
use crate::{
	_prelude::*,
	auth::{IdentityPair, RateLimit, TokenId, TokenSecret},
};

/// Lifecycle status of a token at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token may be presented.
	Active,
	/// Token reached its expiry instant.
	Expired,
	/// Token was switched off by the store operator.
	Disabled,
}

/// Non-secret description of an issued token.
///
/// Everything here is fixed at issuance; rate counters and the `enabled` flag live in the
/// token store and are only mirrored in this struct when a store materializes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Store-generated identifier; used for rotation.
	pub id: TokenId,
	/// Identity pair the token belongs to.
	pub identity: IdentityPair,
	/// Operator-facing prefix carried by the secret.
	pub prefix: String,
	/// Issued-at instant.
	pub issued_at: OffsetDateTime,
	/// Expiry instant, always `issued_at + ttl`.
	pub expires_at: OffsetDateTime,
	/// Ceiling enforced per window.
	pub rate_limit: RateLimit,
	/// Whether the store still honors the token.
	pub enabled: bool,
}
impl TokenRecord {
	/// Computes the lifecycle status at `instant`.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if !self.enabled {
			return TokenStatus::Disabled;
		}
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}

		TokenStatus::Active
	}

	/// Time-to-live the record was issued with.
	pub fn ttl(&self) -> Duration {
		self.expires_at - self.issued_at
	}
}

/// Full token handle, secret included. Produced exactly once per issuance.
#[derive(Clone)]
pub struct IssuedToken {
	/// Non-secret token description.
	pub record: TokenRecord,
	/// Secret material the client must present to the gate.
	pub secret: TokenSecret,
}
impl IssuedToken {
	/// Identifier the client hands back on its next rotation.
	pub fn id(&self) -> &TokenId {
		&self.record.id
	}
}
impl Debug for IssuedToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IssuedToken")
			.field("record", &self.record)
			.field("secret", &"<redacted>")
			.finish()
	}
}
