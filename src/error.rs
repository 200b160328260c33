//! Crate-level error types shared across the issuer, stores, and page sources.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs below the gate.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Issuance parameters the clock cannot honor.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Caller-supplied identifier failed validation.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
}

/// Configuration and validation failures raised while assembling the gate.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Store endpoint URL cannot be parsed or joined.
	#[error("Store endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Token time-to-live must be positive.
	#[error("Token TTL must be positive.")]
	NonPositiveTtl,
	/// Token time-to-live exceeds the supported maximum.
	#[error("Token TTL must not exceed {max}.")]
	TtlTooLarge {
		/// Longest accepted TTL.
		max: Duration,
	},
	/// Rate-limit window must be positive.
	#[error("Rate-limit window must be positive.")]
	NonPositiveRateWindow,
	/// Rate-limit window exceeds the supported maximum.
	#[error("Rate-limit window must not exceed {max}.")]
	RateWindowTooLarge {
		/// Longest accepted window.
		max: Duration,
	},
	/// Expiry would fall outside the representable date range.
	#[error("Token TTL {ttl} from {issued_at} overflows the supported date range.")]
	ExpiryOutOfRange {
		/// Issue instant.
		issued_at: OffsetDateTime,
		/// TTL that overflowed.
		ttl: Duration,
	},
	/// Rate-limit ceiling must allow at least one request.
	#[error("Rate-limit ceiling must allow at least one request per window.")]
	ZeroRateCeiling,
	/// Secret material would be shorter than the supported minimum.
	#[error("Token byte length must be at least {min}, got {actual}.")]
	TokenTooShort {
		/// Minimum supported byte length.
		min: usize,
		/// Byte length that was supplied.
		actual: usize,
	},
	/// Prefix label is empty or contains reserved characters.
	#[error("Token prefix `{prefix}` must be non-empty and free of whitespace and underscores.")]
	InvalidPrefix {
		/// Prefix that failed validation.
		prefix: String,
	},
	/// Media type label is empty.
	#[error("Document media type cannot be empty.")]
	EmptyMediaType,
	/// Default identity labels are not valid identifiers.
	#[error("Default identity labels are invalid.")]
	InvalidDefaultIdentity {
		/// Underlying identifier failure.
		#[source]
		source: crate::auth::IdentifierError,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend {
			message: "quota exhausted".into(),
			code: Some("USAGE_EXCEEDED".into()),
			status: Some(429),
		};
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("quota exhausted"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn config_messages_name_the_offending_value() {
		let err = ConfigError::TokenTooShort { min: 16, actual: 8 };

		assert_eq!(err.to_string(), "Token byte length must be at least 16, got 8.");

		let err = ConfigError::InvalidPrefix { prefix: "bad prefix".into() };

		assert!(err.to_string().contains("`bad prefix`"));

		let err = ConfigError::TtlTooLarge { max: Duration::days(365) };

		assert!(err.to_string().starts_with("Token TTL must not exceed"));
	}
}
