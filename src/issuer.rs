//! Token issuance with best-effort rotation of the caller's previous token.
//!
//! [`TokenIssuer::issue`] deletes the previous token (when the caller names one) before
//! creating the replacement. A failed delete never blocks the new token: the orphan expires on
//! its own TTL, and the failure is surfaced through [`CleanupOutcome`], a `warn` event, and the
//! `page_gate_rotation_cleanup_failures_total` counter. Calls for the same identity pair inside
//! one process are serialized by a per-pair async guard.

// self
use crate::{
	_prelude::*,
	auth::{IdentityPair, IssuedToken, TokenId, TokenRecord},
	config::IssuancePolicy,
	error::ConfigError,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{CreateTokenRequest, TokenMeta, TokenStore, memory::Clock},
};

type GuardMap = Arc<Mutex<HashMap<IdentityPair, GuardSlot>>>;

#[derive(Default)]
struct GuardSlot {
	lock: Arc<AsyncMutex<()>>,
	holders: usize,
}

// Registered interest in one pair's lock. Dropping the lease, including when the owning future is
// cancelled, removes the slot once no holder remains.
struct GuardLease {
	guards: GuardMap,
	identity: IdentityPair,
	lock: Arc<AsyncMutex<()>>,
}
impl GuardLease {
	fn acquire(guards: &GuardMap, identity: &IdentityPair) -> Self {
		let lock = {
			let mut map = guards.lock();
			let slot = map.entry(identity.clone()).or_default();

			slot.holders += 1;

			slot.lock.clone()
		};

		Self { guards: guards.clone(), identity: identity.clone(), lock }
	}
}
impl Drop for GuardLease {
	fn drop(&mut self) {
		let mut map = self.guards.lock();
		let idle = map.get_mut(&self.identity).is_some_and(|slot| {
			slot.holders = slot.holders.saturating_sub(1);

			slot.holders == 0
		});

		if idle {
			map.remove(&self.identity);
		}
	}
}

/// What happened to the previous token during a rotation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanupOutcome {
	/// The caller did not name a previous token.
	NotRequested,
	/// The previous token was deleted.
	Deleted,
	/// Deletion failed; the previous token stays valid until it expires.
	Failed {
		/// Store error rendered for diagnostics.
		message: String,
	},
}

/// Result of a successful issuance.
#[derive(Clone, Debug)]
pub struct Issuance {
	/// Fresh token, secret included. Handed to the caller once.
	pub token: IssuedToken,
	/// Fate of the token being rotated out.
	pub cleanup: CleanupOutcome,
}

/// Mints tokens under a fixed [`IssuancePolicy`].
#[derive(Clone)]
pub struct TokenIssuer {
	store: Arc<dyn TokenStore>,
	policy: IssuancePolicy,
	clock: Clock,
	guards: GuardMap,
}
impl TokenIssuer {
	/// Creates an issuer writing to `store`.
	pub fn new(store: Arc<dyn TokenStore>, policy: IssuancePolicy) -> Self {
		Self {
			store,
			policy,
			clock: Arc::new(OffsetDateTime::now_utc),
			guards: Default::default(),
		}
	}

	/// Replaces the wall clock used for `issued_at`.
	pub fn with_clock(mut self, clock: Clock) -> Self {
		self.clock = clock;

		self
	}

	/// Policy applied to every token.
	pub fn policy(&self) -> &IssuancePolicy {
		&self.policy
	}

	/// Issues a token for `identity`, deleting `old_token_id` first when present.
	///
	/// Store rejections of the creation step are returned as [`Error::Storage`] carrying the
	/// store's message; nothing is retried. A TTL that pushes the expiry past the representable
	/// date range is an [`Error::Config`] and never reaches the store.
	pub async fn issue(
		&self,
		identity: IdentityPair,
		old_token_id: Option<TokenId>,
	) -> Result<Issuance> {
		const KIND: OpKind = OpKind::Issue;

		let span = OpSpan::new(KIND, "issue");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let lease = GuardLease::acquire(&self.guards, &identity);
		let result = span
			.instrument(async {
				let _singleflight = lease.lock.lock().await;
				let cleanup = self.cleanup(old_token_id.as_ref()).await;

				self.create(identity.clone()).await.map(|token| Issuance { token, cleanup })
			})
			.await;

		drop(lease);

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	async fn cleanup(&self, old_token_id: Option<&TokenId>) -> CleanupOutcome {
		let Some(id) = old_token_id else {
			return CleanupOutcome::NotRequested;
		};

		match self.store.delete(id).await {
			Ok(()) => {
				tracing::debug!(token_id = %id, "Deleted previous token.");

				CleanupOutcome::Deleted
			},
			Err(e) => {
				tracing::warn!(
					token_id = %id,
					error = %e,
					"Previous token could not be deleted and stays valid until it expires."
				);
				obs::record_rotation_cleanup_failure();

				CleanupOutcome::Failed { message: e.to_string() }
			},
		}
	}

	async fn create(&self, identity: IdentityPair) -> Result<IssuedToken> {
		let issued_at = (self.clock)();
		let ttl = self.policy.ttl;
		let expires_at = issued_at
			.checked_add(ttl)
			.ok_or(ConfigError::ExpiryOutOfRange { issued_at, ttl })?;
		let request = CreateTokenRequest {
			owner: identity.owner.clone(),
			meta: TokenMeta { guest_id: identity.guest.clone() },
			issued_at,
			expires_at,
			rate_limit: self.policy.rate_limit,
			prefix: self.policy.prefix.clone(),
			byte_length: self.policy.byte_length,
			enabled: true,
		};
		let created = self.store.create(request).await.inspect_err(|e| {
			tracing::warn!(identity = %identity, error = %e, "Token store refused to create a token.");
		})?;
		let record = TokenRecord {
			id: created.id,
			identity,
			prefix: self.policy.prefix.clone(),
			issued_at,
			expires_at,
			rate_limit: self.policy.rate_limit,
			enabled: true,
		};

		tracing::info!(
			token_id = %record.id,
			identity = %record.identity,
			expires_at = %record.expires_at,
			"Issued token."
		);

		Ok(IssuedToken { record, secret: created.secret })
	}
}
impl Debug for TokenIssuer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenIssuer").field("policy", &self.policy).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		auth::TokenSecret,
		store::{
			CreatedToken, MemoryStore, StoreError, StoreFuture, Verification, VerificationCode,
		},
	};

	#[derive(Default)]
	struct ScriptedStore {
		inner: MemoryStore,
		calls: Mutex<Vec<&'static str>>,
		fail_delete: bool,
		fail_create: Option<StoreError>,
	}
	impl TokenStore for ScriptedStore {
		fn create(&self, request: CreateTokenRequest) -> StoreFuture<'_, CreatedToken> {
			self.calls.lock().push("create");

			match &self.fail_create {
				Some(err) => {
					let err = err.clone();

					Box::pin(async move { Err(err) })
				},
				None => self.inner.create(request),
			}
		}

		fn delete<'a>(&'a self, id: &'a TokenId) -> StoreFuture<'a, ()> {
			self.calls.lock().push("delete");

			if self.fail_delete {
				return Box::pin(async {
					Err(StoreError::Transport { message: "connection refused".into() })
				});
			}

			self.inner.delete(id)
		}

		fn verify<'a>(&'a self, secret: &'a TokenSecret) -> StoreFuture<'a, Verification> {
			self.inner.verify(secret)
		}
	}

	fn identity() -> IdentityPair {
		IdentityPair::parse("u1", "g1").expect("Identity fixture should be valid.")
	}

	#[tokio::test]
	async fn rotation_deletes_before_creating() {
		let store = Arc::new(ScriptedStore::default());
		let issuer = TokenIssuer::new(store.clone(), IssuancePolicy::default());
		let first = issuer.issue(identity(), None).await.expect("First issuance should succeed.");

		assert_eq!(first.cleanup, CleanupOutcome::NotRequested);

		let second = issuer
			.issue(identity(), Some(first.token.id().clone()))
			.await
			.expect("Rotation should succeed.");

		assert_eq!(second.cleanup, CleanupOutcome::Deleted);
		assert_eq!(*store.calls.lock(), ["create", "delete", "create"]);
		assert_eq!(
			store.verify(&first.token.secret).await.expect("Verification should not fail.").code,
			Some(VerificationCode::NotFound)
		);
		assert!(
			store.verify(&second.token.secret).await.expect("Verification should not fail.").valid
		);
	}

	#[tokio::test]
	async fn failed_cleanup_still_issues() {
		let store = Arc::new(ScriptedStore { fail_delete: true, ..Default::default() });
		let issuer = TokenIssuer::new(store.clone(), IssuancePolicy::default());
		let old = TokenId::new("key_gone").expect("Token id fixture should be valid.");
		let issuance =
			issuer.issue(identity(), Some(old)).await.expect("Issuance must survive cleanup.");

		match &issuance.cleanup {
			CleanupOutcome::Failed { message } => assert!(message.contains("connection refused")),
			other => panic!("Unexpected cleanup outcome: {other:?}"),
		}
		assert_eq!(*store.calls.lock(), ["delete", "create"]);
	}

	#[tokio::test]
	async fn creation_rejection_carries_store_message() {
		let store = Arc::new(ScriptedStore {
			fail_create: Some(StoreError::Backend {
				message: "ownerId is too long".into(),
				code: Some("BAD_REQUEST".into()),
				status: Some(400),
			}),
			..Default::default()
		});
		let issuer = TokenIssuer::new(store, IssuancePolicy::default());
		let err = issuer.issue(identity(), None).await.expect_err("Store rejection must surface.");

		assert!(matches!(err, Error::Storage(StoreError::Backend { .. })));
		assert_eq!(err.to_string(), "ownerId is too long");
	}

	#[tokio::test]
	async fn issued_record_follows_policy() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let policy = IssuancePolicy { prefix: "ebook".into(), ..Default::default() };
		let issuer = TokenIssuer::new(Arc::new(MemoryStore::default()), policy)
			.with_clock(Arc::new(move || now));
		let issuance = issuer.issue(identity(), None).await.expect("Issuance should succeed.");
		let record = &issuance.token.record;

		assert_eq!(record.issued_at, now);
		assert_eq!(record.expires_at, now + Duration::minutes(2));
		assert_eq!(record.rate_limit, issuer.policy().rate_limit);
		assert!(record.enabled);
		assert!(issuance.token.secret.expose().starts_with("ebook_"));
		assert!(issuer.guards.lock().is_empty(), "Idle guards should be released.");
	}

	#[tokio::test]
	async fn expiry_overflow_is_an_error_not_a_panic() {
		let store = Arc::new(ScriptedStore::default());
		let policy = IssuancePolicy { ttl: Duration::MAX, ..Default::default() };
		let issuer = TokenIssuer::new(store.clone(), policy);
		let err = issuer.issue(identity(), None).await.expect_err("Overflowing TTL must fail.");

		assert!(matches!(err, Error::Config(ConfigError::ExpiryOutOfRange { .. })));
		assert!(store.calls.lock().is_empty(), "Nothing may reach the store.");
		assert!(issuer.guards.lock().is_empty());
	}

	// Logs both ends of every call and yields in between, so unguarded calls would interleave.
	#[derive(Default)]
	struct YieldingStore {
		inner: MemoryStore,
		calls: Mutex<Vec<&'static str>>,
	}
	impl TokenStore for YieldingStore {
		fn create(&self, request: CreateTokenRequest) -> StoreFuture<'_, CreatedToken> {
			Box::pin(async move {
				self.calls.lock().push("create:begin");
				tokio::task::yield_now().await;

				let created = self.inner.create(request).await;

				self.calls.lock().push("create:end");

				created
			})
		}

		fn delete<'a>(&'a self, id: &'a TokenId) -> StoreFuture<'a, ()> {
			Box::pin(async move {
				self.calls.lock().push("delete:begin");
				tokio::task::yield_now().await;

				let deleted = self.inner.delete(id).await;

				self.calls.lock().push("delete:end");

				deleted
			})
		}

		fn verify<'a>(&'a self, secret: &'a TokenSecret) -> StoreFuture<'a, Verification> {
			self.inner.verify(secret)
		}
	}

	#[tokio::test]
	async fn concurrent_rotations_for_one_pair_do_not_interleave() {
		let store = Arc::new(YieldingStore::default());
		let issuer = TokenIssuer::new(store.clone(), IssuancePolicy::default());
		let old_a = TokenId::new("key_a").expect("Token id fixture should be valid.");
		let old_b = TokenId::new("key_b").expect("Token id fixture should be valid.");
		let (a, b) = tokio::join!(
			issuer.issue(identity(), Some(old_a)),
			issuer.issue(identity(), Some(old_b))
		);

		a.expect("First concurrent rotation should succeed.");
		b.expect("Second concurrent rotation should succeed.");

		let one_rotation = ["delete:begin", "delete:end", "create:begin", "create:end"];

		assert_eq!(*store.calls.lock(), [one_rotation, one_rotation].concat());
		assert!(issuer.guards.lock().is_empty());
	}

	#[tokio::test]
	async fn distinct_pairs_are_not_serialized() {
		let store = Arc::new(YieldingStore::default());
		let issuer = TokenIssuer::new(store.clone(), IssuancePolicy::default());
		let other = IdentityPair::parse("u2", "g2").expect("Identity fixture should be valid.");
		let (a, b) = tokio::join!(issuer.issue(identity(), None), issuer.issue(other, None));

		a.expect("First issuance should succeed.");
		b.expect("Second issuance should succeed.");

		assert_eq!(
			*store.calls.lock(),
			["create:begin", "create:begin", "create:end", "create:end"]
		);
	}

	struct StalledStore;
	impl TokenStore for StalledStore {
		fn create(&self, _: CreateTokenRequest) -> StoreFuture<'_, CreatedToken> {
			Box::pin(std::future::pending())
		}

		fn delete<'a>(&'a self, _: &'a TokenId) -> StoreFuture<'a, ()> {
			Box::pin(std::future::pending())
		}

		fn verify<'a>(&'a self, _: &'a TokenSecret) -> StoreFuture<'a, Verification> {
			Box::pin(std::future::pending())
		}
	}

	#[tokio::test]
	async fn abandoned_issuances_release_their_guards() {
		let issuer = TokenIssuer::new(Arc::new(StalledStore), IssuancePolicy::default());

		for i in 0..20 {
			let pair = IdentityPair::parse(format!("u{i}"), "g").expect("Identity should be valid.");
			let outcome =
				tokio::time::timeout(std::time::Duration::from_millis(1), issuer.issue(pair, None))
					.await;

			assert!(outcome.is_err(), "A stalled store must time the call out.");
		}

		let waiting = issuer.issue(identity(), None);
		let holding = issuer.issue(identity(), None);
		let both = async { tokio::join!(waiting, holding) };

		assert!(
			tokio::time::timeout(std::time::Duration::from_millis(1), both).await.is_err(),
			"Both calls should still be pending when abandoned."
		);
		assert!(issuer.guards.lock().is_empty(), "Cancelled calls must not leave guards behind.");
	}
}
