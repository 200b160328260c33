//! [`TokenStore`] backed by a remote key-management service speaking the Unkey v1 JSON API.
//!
//! Endpoints used: `POST /v1/keys.createKey`, `POST /v1/keys.deleteKey`, and
//! `POST /v1/keys.verifyKey`. Every request carries the root key as a bearer token and is scoped
//! to one `apiId`. Error responses are expected in the `{"error": {"code", "message"}}` envelope;
//! anything else with a non-2xx status is still reported as a backend failure.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{RateLimitState, TokenId, TokenSecret},
	error::ConfigError,
	store::{
		CreateTokenRequest, CreatedToken, StoreError, StoreFuture, TokenMeta, TokenStore,
		Verification, VerificationCode,
	},
};

const CREATE_PATH: &str = "/v1/keys.createKey";
const DELETE_PATH: &str = "/v1/keys.deleteKey";
const VERIFY_PATH: &str = "/v1/keys.verifyKey";

/// Remote key-management backend client.
#[derive(Clone)]
pub struct RemoteStore {
	client: ReqwestClient,
	base_url: Url,
	root_key: TokenSecret,
	api_id: String,
}
impl RemoteStore {
	/// Public Unkey endpoint.
	pub const DEFAULT_BASE_URL: &'static str = "https://api.unkey.dev";

	/// Creates a client for `api_id` at `base_url`, authenticating with `root_key`.
	pub fn new(base_url: Url, root_key: TokenSecret, api_id: impl Into<String>) -> Self {
		Self { client: ReqwestClient::default(), base_url, root_key, api_id: api_id.into() }
	}

	/// Parses `base_url` before delegating to [`RemoteStore::new`].
	pub fn from_url_str(
		base_url: &str,
		root_key: TokenSecret,
		api_id: impl Into<String>,
	) -> Result<Self, ConfigError> {
		let base_url =
			Url::parse(base_url).map_err(|source| ConfigError::InvalidEndpoint { source })?;

		Ok(Self::new(base_url, root_key, api_id))
	}

	/// Replaces the HTTP client, e.g. to set timeouts or proxies.
	pub fn with_client(mut self, client: ReqwestClient) -> Self {
		self.client = client;

		self
	}

	async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, StoreError>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		let bytes = self.send(path, body).await?;

		decode(&bytes)
	}

	async fn send<B>(&self, path: &str, body: &B) -> Result<Vec<u8>, StoreError>
	where
		B: ?Sized + Serialize,
	{
		let url = self
			.base_url
			.join(path)
			.map_err(|e| StoreError::Transport { message: format!("Invalid store URL: {e}") })?;
		let response = self
			.client
			.post(url)
			.bearer_auth(self.root_key.expose())
			.json(body)
			.send()
			.await
			.map_err(map_reqwest_error)?;
		let status = response.status();
		let bytes = response.bytes().await.map_err(map_reqwest_error)?.to_vec();

		if !status.is_success() {
			return Err(map_error_response(status.as_u16(), &bytes));
		}

		Ok(bytes)
	}
}
impl Debug for RemoteStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RemoteStore")
			.field("base_url", &self.base_url.as_str())
			.field("api_id", &self.api_id)
			.field("root_key", &self.root_key)
			.finish()
	}
}
impl TokenStore for RemoteStore {
	fn create(&self, request: CreateTokenRequest) -> StoreFuture<'_, CreatedToken> {
		Box::pin(async move {
			let body = CreateKeyBody {
				api_id: &self.api_id,
				prefix: &request.prefix,
				byte_length: request.byte_length,
				owner_id: request.owner.as_ref(),
				meta: &request.meta,
				expires: unix_millis(request.expires_at),
				ratelimit: RatelimitBody {
					r#async: false,
					limit: request.rate_limit.max_requests,
					duration: request.rate_limit.window_ms(),
				},
				enabled: request.enabled,
			};
			let created: CreateKeyResponse = self.post(CREATE_PATH, &body).await?;
			let id = TokenId::new(&created.key_id).map_err(|e| StoreError::Serialization {
				message: format!("Store returned an unusable key id: {e}"),
			})?;

			Ok(CreatedToken { id, secret: TokenSecret::new(created.key) })
		})
	}

	fn delete<'a>(&'a self, id: &'a TokenId) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.send(DELETE_PATH, &DeleteKeyBody { key_id: id.as_ref() }).await?;

			Ok(())
		})
	}

	fn verify<'a>(&'a self, secret: &'a TokenSecret) -> StoreFuture<'a, Verification> {
		Box::pin(async move {
			let body = VerifyKeyBody { api_id: &self.api_id, key: secret.expose() };
			let verified: VerifyKeyResponse = self.post(VERIFY_PATH, &body).await?;
			let rate_limit = verified.ratelimit.map(RateLimitState::try_from).transpose()?;

			Ok(Verification { valid: verified.valid, code: verified.code, rate_limit })
		})
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateKeyBody<'a> {
	api_id: &'a str,
	prefix: &'a str,
	byte_length: usize,
	owner_id: &'a str,
	meta: &'a TokenMeta,
	expires: i64,
	ratelimit: RatelimitBody,
	enabled: bool,
}

#[derive(Serialize)]
struct RatelimitBody {
	r#async: bool,
	limit: u32,
	duration: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateKeyResponse {
	key_id: String,
	key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteKeyBody<'a> {
	key_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyKeyBody<'a> {
	api_id: &'a str,
	key: &'a str,
}

#[derive(Deserialize)]
struct VerifyKeyResponse {
	valid: bool,
	#[serde(default)]
	code: Option<VerificationCode>,
	#[serde(default)]
	ratelimit: Option<RatelimitReport>,
}

#[derive(Deserialize)]
struct RatelimitReport {
	limit: u32,
	remaining: u32,
	/// Unix milliseconds.
	reset: i64,
}
impl TryFrom<RatelimitReport> for RateLimitState {
	type Error = StoreError;

	fn try_from(value: RatelimitReport) -> Result<Self, Self::Error> {
		let reset_at =
			OffsetDateTime::from_unix_timestamp_nanos(i128::from(value.reset) * 1_000_000)
				.map_err(|e| StoreError::Serialization {
					message: format!("Rate-limit reset is out of range: {e}"),
				})?;

		Ok(Self { limit: value.limit, remaining: value.remaining, reset_at })
	}
}

#[derive(Deserialize)]
struct ErrorEnvelope {
	error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
	code: Option<String>,
	message: String,
}

fn decode<T>(bytes: &[u8]) -> Result<T, StoreError>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|e| StoreError::Serialization {
		message: format!("{} at `{}`", e.inner(), e.path()),
	})
}

fn map_error_response(status: u16, bytes: &[u8]) -> StoreError {
	match serde_json::from_slice::<ErrorEnvelope>(bytes) {
		Ok(ErrorEnvelope { error }) =>
			StoreError::Backend { message: error.message, code: error.code, status: Some(status) },
		Err(_) => StoreError::Backend {
			message: format!("Store responded with HTTP {status}"),
			code: None,
			status: Some(status),
		},
	}
}

fn map_reqwest_error(err: ReqwestError) -> StoreError {
	if err.is_decode() {
		return StoreError::Serialization { message: err.to_string() };
	}

	StoreError::Transport { message: err.to_string() }
}

fn unix_millis(instant: OffsetDateTime) -> i64 {
	i64::try_from(instant.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn error_envelope_keeps_store_message_and_code() {
		let err = map_error_response(
			400,
			br#"{"error":{"code":"BAD_REQUEST","message":"ownerId is too long","docs":"x"}}"#,
		);

		assert_eq!(
			err,
			StoreError::Backend {
				message: "ownerId is too long".into(),
				code: Some("BAD_REQUEST".into()),
				status: Some(400),
			}
		);
	}

	#[test]
	fn non_envelope_errors_still_report_status() {
		let err = map_error_response(502, b"<html>bad gateway</html>");

		assert!(matches!(err, StoreError::Backend { status: Some(502), code: None, .. }));
		assert!(err.is_backend_failure());
	}

	#[test]
	fn decode_reports_the_failing_path() {
		let err = decode::<VerifyKeyResponse>(br#"{"valid":"yes"}"#)
			.err()
			.expect("A string `valid` flag must fail to decode.");

		match err {
			StoreError::Serialization { message } => assert!(message.contains("valid"), "{message}"),
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn unix_millis_matches_the_wire_format() {
		assert_eq!(unix_millis(macros::datetime!(2025-01-01 00:00:01.5 UTC)), 1_735_689_601_500);

		let state = RateLimitState::try_from(RatelimitReport {
			limit: 5,
			remaining: 4,
			reset: 1_735_689_601_500,
		})
		.expect("Reset timestamp should convert.");

		assert_eq!(state.reset_at, macros::datetime!(2025-01-01 00:00:01.5 UTC));
	}
}
