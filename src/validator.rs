//! Total classification of presented tokens.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{StoreError, TokenStore, Verification, VerificationCode},
};

/// Exactly one verdict per presented token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validation {
	/// Token is usable; this call was counted against its rate window.
	Valid,
	/// Unknown, disabled, or mismatched token.
	InvalidKey,
	/// Token reached its expiry instant.
	ExpiredKey,
	/// Token exhausted its current rate window.
	RateLimitExceeded {
		/// When the window closes, if the store reported it.
		reset_at: Option<OffsetDateTime>,
	},
	/// The store was unreachable or reported its own failure.
	BackendError {
		/// Diagnostic detail; never shown to callers.
		detail: String,
	},
	/// Any other fault, such as an undecodable store response.
	UnknownError {
		/// Diagnostic detail; never shown to callers.
		detail: String,
	},
}
impl Validation {
	/// Stable label used in logs and metrics.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Valid => "valid",
			Self::InvalidKey => "invalid_key",
			Self::ExpiredKey => "expired_key",
			Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
			Self::BackendError { .. } => "backend_error",
			Self::UnknownError { .. } => "unknown_error",
		}
	}

	/// Returns `true` for [`Validation::Valid`].
	pub fn is_valid(&self) -> bool {
		matches!(self, Self::Valid)
	}

	fn from_store_error(err: StoreError) -> Self {
		if err.is_backend_failure() {
			Self::BackendError { detail: err.to_string() }
		} else {
			Self::UnknownError { detail: err.to_string() }
		}
	}

	fn from_verification(verification: Verification) -> Self {
		match verification.code {
			Some(VerificationCode::Expired) => Self::ExpiredKey,
			Some(VerificationCode::RateLimited) => Self::RateLimitExceeded {
				reset_at: verification.rate_limit.map(|state| state.reset_at),
			},
			_ if verification.valid => Self::Valid,
			_ => Self::InvalidKey,
		}
	}
}
impl Display for Validation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Asks the token store about presented secrets and classifies the answer.
#[derive(Clone)]
pub struct AccessValidator {
	store: Arc<dyn TokenStore>,
}
impl AccessValidator {
	/// Creates a validator backed by `store`.
	pub fn new(store: Arc<dyn TokenStore>) -> Self {
		Self { store }
	}

	/// Classifies `secret`. Every call counts against the token's rate window, valid or not.
	pub async fn validate(&self, secret: &TokenSecret) -> Validation {
		const KIND: OpKind = OpKind::Validate;

		let span = OpSpan::new(KIND, "validate");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let validation = span
			.instrument(async {
				match self.store.verify(secret).await {
					Ok(verification) => Validation::from_verification(verification),
					Err(e) => Validation::from_store_error(e),
				}
			})
			.await;
		let outcome = match validation {
			Validation::Valid => OpOutcome::Success,
			Validation::BackendError { .. } | Validation::UnknownError { .. } => OpOutcome::Failure,
			_ => OpOutcome::Rejected,
		};

		obs::record_op_outcome(KIND, outcome);
		obs::record_validation(validation.as_str());

		validation
	}
}
impl Debug for AccessValidator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessValidator").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		auth::{RateLimitState, TokenId},
		store::{CreateTokenRequest, CreatedToken, StoreFuture},
	};

	struct FixedStore(std::result::Result<Verification, StoreError>);
	impl TokenStore for FixedStore {
		fn create(&self, _: CreateTokenRequest) -> StoreFuture<'_, CreatedToken> {
			Box::pin(async { Err(StoreError::Transport { message: "unused".into() }) })
		}

		fn delete<'a>(&'a self, _: &'a TokenId) -> StoreFuture<'a, ()> {
			Box::pin(async { Ok(()) })
		}

		fn verify<'a>(&'a self, _: &'a TokenSecret) -> StoreFuture<'a, Verification> {
			let answer = self.0.clone();

			Box::pin(async move { answer })
		}
	}

	async fn classify(answer: std::result::Result<Verification, StoreError>) -> Validation {
		AccessValidator::new(Arc::new(FixedStore(answer)))
			.validate(&TokenSecret::new("doc_presented"))
			.await
	}

	#[tokio::test]
	async fn store_codes_map_to_one_outcome_each() {
		assert_eq!(classify(Ok(Verification::valid())).await, Validation::Valid);
		assert_eq!(
			classify(Ok(Verification::rejected(VerificationCode::Expired))).await,
			Validation::ExpiredKey
		);
		assert_eq!(
			classify(Ok(Verification::rejected(VerificationCode::RateLimited))).await,
			Validation::RateLimitExceeded { reset_at: None }
		);

		for code in [
			VerificationCode::NotFound,
			VerificationCode::Disabled,
			VerificationCode::UsageExceeded,
			VerificationCode::Forbidden,
			VerificationCode::Unrecognized,
		] {
			assert_eq!(
				classify(Ok(Verification::rejected(code.clone()))).await,
				Validation::InvalidKey,
				"{} must classify as an invalid key.",
				code.as_str()
			);
		}
	}

	#[tokio::test]
	async fn codeless_answers_fall_back_to_the_valid_flag() {
		let valid = Verification { valid: true, code: None, rate_limit: None };
		let invalid = Verification { valid: false, code: None, rate_limit: None };

		assert_eq!(classify(Ok(valid)).await, Validation::Valid);
		assert_eq!(classify(Ok(invalid)).await, Validation::InvalidKey);
	}

	#[tokio::test]
	async fn expiry_wins_over_a_stale_valid_flag() {
		let answer =
			Verification { valid: true, code: Some(VerificationCode::Expired), rate_limit: None };

		assert_eq!(classify(Ok(answer)).await, Validation::ExpiredKey);
	}

	#[tokio::test]
	async fn throttling_reports_window_reset() {
		let reset_at = macros::datetime!(2025-01-01 00:00:03 UTC);
		let answer = Verification::rejected(VerificationCode::RateLimited).with_rate_limit(
			RateLimitState { limit: 5, remaining: 0, reset_at },
		);

		assert_eq!(
			classify(Ok(answer)).await,
			Validation::RateLimitExceeded { reset_at: Some(reset_at) }
		);
	}

	#[tokio::test]
	async fn store_failures_split_into_backend_and_unknown() {
		let backend = classify(Err(StoreError::Transport { message: "timeout".into() })).await;

		assert!(
			matches!(backend, Validation::BackendError { ref detail } if detail.contains("timeout"))
		);

		let backend = classify(Err(StoreError::Backend {
			message: "internal".into(),
			code: Some("INTERNAL_SERVER_ERROR".into()),
			status: Some(500),
		}))
		.await;

		assert_eq!(backend.as_str(), "backend_error");

		let unknown = classify(Err(StoreError::Serialization { message: "eof".into() })).await;

		assert!(matches!(unknown, Validation::UnknownError { .. }));
		assert!(!unknown.is_valid());
	}
}
