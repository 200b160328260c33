// std
use std::sync::Arc;
// crates.io
use time::Duration;
// self
use page_gate::{
	auth::IdentityPair,
	config::GateConfig,
	document::MemorySource,
	gate::{ContentGate, Rejection, RejectionKind},
	issuer::TokenIssuer,
	store::{MemoryStore, TokenStore},
	validator::{AccessValidator, Validation},
};

#[tokio::test]
async fn short_lived_token_is_throttled_then_expires() {
	let config = GateConfig::builder()
		.ttl(Duration::milliseconds(2_000))
		.rate_limit(5, Duration::milliseconds(3_000))
		.build()
		.expect("Scenario configuration should be valid.");
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let issuer = TokenIssuer::new(store.clone(), config.issuance.clone());
	let validator = AccessValidator::new(store);
	let identity = IdentityPair::parse("u1", "g1").expect("Identity fixture should be valid.");
	let token = issuer.issue(identity, None).await.expect("Issuance should succeed.").token;

	for attempt in 1..=5 {
		assert_eq!(validator.validate(&token.secret).await, Validation::Valid, "attempt {attempt}");
	}

	assert!(matches!(
		validator.validate(&token.secret).await,
		Validation::RateLimitExceeded { reset_at: Some(_) }
	));

	tokio::time::sleep(std::time::Duration::from_millis(2_100)).await;

	assert_eq!(validator.validate(&token.secret).await, Validation::ExpiredKey);
}

#[tokio::test]
async fn every_presented_value_gets_exactly_one_verdict() {
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let gate = ContentGate::new(
		AccessValidator::new(store),
		Arc::new(MemorySource::new("application/pdf", ["only page"])),
	);

	for token in ["doc_", "doc_AAAAAAAAAAAAAAAAAAAAAA", "not-even-prefixed", "🦀"] {
		let rejection = gate
			.handle_request(Some(token), Some("1"))
			.await
			.expect_err("Tokens that were never issued must be refused.");

		assert_eq!(rejection, Rejection::InvalidKey);
		assert_eq!(rejection.kind(), RejectionKind::Authorization);
	}
}
