//! Axum HTTP surface: `POST /token`, `GET /page`, and `GET /healthz`.
//!
//! Every error response is JSON `{"message": ...}`. Throttled page requests also carry
//! `Retry-After` when the store reported when the window closes.

// crates.io
use axum::{
	Json, Router,
	body::Bytes,
	extract::{Query, State},
	http::{HeaderValue, StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;
// self
use crate::{
	_prelude::*,
	auth::{GuestId, OwnerId, TokenId},
	config::GateConfig,
	gate::{ContentGate, PageContent, Rejection},
	issuer::{CleanupOutcome, TokenIssuer},
};

/// Service label reported by the health endpoint.
pub const SERVICE_NAME: &str = "page-gate";

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
	/// Mints and rotates tokens.
	pub issuer: TokenIssuer,
	/// Guards page delivery.
	pub gate: ContentGate,
	/// Settings the handlers consult, such as default identity labels.
	pub config: Arc<GateConfig>,
}

/// Builds the router with request tracing attached.
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/token", post(issue_token))
		.route("/page", get(serve_page))
		.route("/healthz", get(health))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
}

/// `POST /token` body. Every field is optional; an empty body is accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequestBody {
	/// Owner label; the configured default when absent.
	pub owner_id: Option<String>,
	/// Guest label; the configured default when absent.
	pub guest_id: Option<String>,
	/// Previous token to rotate out.
	#[serde(alias = "oldKey")]
	pub old_token_id: Option<String>,
}

/// `POST /token` success body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponseBody {
	/// Secret to present as `key` on page requests.
	pub token: String,
	/// Identifier to send back as `oldTokenId` on the next rotation.
	pub token_id: String,
	/// Expiry instant.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}

/// `GET /page` query string.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
	/// Token secret.
	pub key: Option<String>,
	/// 1-based page number, unparsed.
	pub page: Option<String>,
}

/// Errors surfaced by the handlers.
#[derive(Debug, ThisError)]
pub enum ApiError {
	/// Malformed body, invalid identifier, or any token store failure, carrying its message.
	#[error("{0}")]
	BadRequest(String),
	/// Gate rejection, rendered with its own status and message.
	#[error(transparent)]
	Gate(#[from] Rejection),
	/// Server-side failure; details are logged, not returned.
	#[error("Failed to issue a token. Please try again later.")]
	Internal,
}
impl From<Error> for ApiError {
	fn from(e: Error) -> Self {
		match e {
			Error::Identifier(e) => Self::BadRequest(e.to_string()),
			Error::Storage(e) => {
				tracing::error!(error = ?e, "Token store failed to issue a token.");

				Self::BadRequest(e.to_string())
			},
			e @ Error::Config(_) => {
				tracing::error!(error = %e, "Token issuance failed.");

				Self::Internal
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = match &self {
			Self::BadRequest(_) => StatusCode::BAD_REQUEST,
			Self::Gate(rejection) => StatusCode::from_u16(rejection.status_code())
				.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
			Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
		};
		let retry_after = match &self {
			Self::Gate(rejection) => rejection.retry_after_secs(OffsetDateTime::now_utc()),
			_ => None,
		};
		let mut response = (status, Json(json!({ "message": self.to_string() }))).into_response();

		if let Some(secs) = retry_after {
			response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
		}

		response
	}
}

async fn issue_token(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<TokenResponseBody>, ApiError> {
	let body = parse_token_request(&body)?;
	let owner = non_empty(body.owner_id).map(OwnerId::new).transpose().map_err(Error::from)?;
	let guest = non_empty(body.guest_id).map(GuestId::new).transpose().map_err(Error::from)?;
	let old_token_id =
		non_empty(body.old_token_id).map(TokenId::new).transpose().map_err(Error::from)?;
	let identity = state.config.identity_or_default(owner, guest);
	let issuance = state.issuer.issue(identity, old_token_id).await?;

	if let CleanupOutcome::Failed { message } = &issuance.cleanup {
		tracing::debug!(%message, "Issued a token without deleting the previous one.");
	}

	let token = issuance.token;

	Ok(Json(TokenResponseBody {
		token: token.secret.expose().to_owned(),
		token_id: token.id().to_string(),
		expires_at: token.record.expires_at,
	}))
}

async fn serve_page(
	State(state): State<AppState>,
	Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
	let page = state.gate.handle_request(query.key.as_deref(), query.page.as_deref()).await?;

	Ok(page_response(page))
}

async fn health() -> Json<serde_json::Value> {
	Json(json!({ "ok": true, "service": SERVICE_NAME }))
}

fn parse_token_request(body: &[u8]) -> Result<TokenRequestBody, ApiError> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(TokenRequestBody::default());
	}

	serde_json::from_slice(body)
		.map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}.")))
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.filter(|value| !value.is_empty())
}

fn page_response(page: PageContent) -> Response {
	let content_type = HeaderValue::from_str(&page.media_type)
		.unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_MEDIA_TYPE));

	([(header::CONTENT_TYPE, content_type)], page.bytes).into_response()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{error::ConfigError, gate::FailureKind, store::StoreError};

	#[test]
	fn every_store_failure_is_a_bad_request_with_the_store_message() {
		let refusal = ApiError::from(Error::Storage(StoreError::Backend {
			message: "ownerId is too long".into(),
			code: Some("BAD_REQUEST".into()),
			status: Some(400),
		}));

		assert!(
			matches!(&refusal, ApiError::BadRequest(message) if message == "ownerId is too long")
		);

		let outage = ApiError::from(Error::Storage(StoreError::Backend {
			message: "internal".into(),
			code: None,
			status: Some(503),
		}));

		assert!(matches!(&outage, ApiError::BadRequest(message) if message == "internal"));

		let unreachable =
			ApiError::from(Error::Storage(StoreError::Transport { message: "reset".into() }));

		assert_eq!(unreachable.into_response().status(), StatusCode::BAD_REQUEST);
	}

	#[test]
	fn unusable_issuance_settings_are_internal_errors() {
		let err = ApiError::from(Error::Config(ConfigError::ExpiryOutOfRange {
			issued_at: OffsetDateTime::UNIX_EPOCH,
			ttl: Duration::MAX,
		}));

		assert!(matches!(err, ApiError::Internal));
		assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
	}

	#[test]
	fn token_bodies_accept_empty_input_and_legacy_field_names() {
		let empty = parse_token_request(b"  ").expect("Empty bodies should use defaults.");

		assert!(empty.owner_id.is_none() && empty.old_token_id.is_none());

		let legacy =
			parse_token_request(br#"{"oldKey":"key_1"}"#).expect("Legacy field should parse.");

		assert_eq!(legacy.old_token_id.as_deref(), Some("key_1"));
		assert!(matches!(parse_token_request(b"{"), Err(ApiError::BadRequest(_))));
	}

	#[test]
	fn gate_rejections_keep_their_status() {
		let response =
			ApiError::from(Rejection::Internal { failure: FailureKind::Document }).into_response();

		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

		let response = ApiError::from(Rejection::RateLimited {
			reset_at: Some(OffsetDateTime::now_utc() + Duration::seconds(2)),
		})
		.into_response();

		assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
		assert!(response.headers().contains_key(header::RETRY_AFTER));
	}
}
