//! The single choke point between a presented token and page content.
//!
//! Each request walks `AwaitingToken → Validating → {Serving, Rejected}` and keeps no state
//! afterwards. Request-shape problems are rejected before the store is consulted, and the page
//! range is checked only once the token is known to be valid, so an unauthorized caller never
//! learns how long the document is.

// std
use std::num::IntErrorKind;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	document::PageSource,
	obs::{self, OpKind, OpOutcome, OpSpan},
	validator::{AccessValidator, Validation},
};

/// Per-request gate states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
	/// Request received; inputs not yet checked.
	AwaitingToken,
	/// Inputs are well-formed; the store is being consulted.
	Validating,
	/// Token accepted; the page is being extracted.
	Serving,
	/// Request turned away.
	Rejected,
}

/// Rejection categories a caller can tell apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectionKind {
	/// Missing or malformed inputs; the store was never consulted.
	RequestShape,
	/// The token itself was refused.
	Authorization,
	/// Valid token, nonexistent page.
	Range,
	/// The store was unreachable or failed; retrying later may help.
	BackendFailure,
	/// Anything else that went wrong on the server side.
	UnknownFailure,
}

/// Server-side fault behind a [`Rejection::Internal`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
	/// Token store failure.
	Backend,
	/// Unclassified validation fault.
	Unknown,
	/// Page source could not load or slice the document.
	Document,
}

/// Caller-visible reason a request was not served.
///
/// `Display` renders the message shown to callers; failure details only reach the logs.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum Rejection {
	/// Token or page number absent.
	#[error("API key and page number required.")]
	MissingParameters,
	/// Page number is not a base-10 integer.
	#[error("Invalid page number. Page must be a whole number.")]
	MalformedPage,
	/// Unknown, disabled, or mismatched token.
	#[error("Invalid API key.")]
	InvalidKey,
	/// Token is past its expiry.
	#[error("The API key has expired. Please request a new key.")]
	ExpiredKey,
	/// Token exhausted its rate window.
	#[error("Too many requests. Please try again later.")]
	RateLimited {
		/// When the window closes, if known.
		reset_at: Option<OffsetDateTime>,
	},
	/// Page number outside `[1, total_pages]`.
	#[error("Invalid page number. This document has {total_pages} pages.")]
	PageOutOfRange {
		/// Pages the document actually holds.
		total_pages: usize,
	},
	/// Server-side failure.
	#[error("{}", internal_message(*failure))]
	Internal {
		/// Which component failed.
		failure: FailureKind,
	},
}
impl Rejection {
	/// Category of this rejection.
	pub fn kind(&self) -> RejectionKind {
		match self {
			Self::MissingParameters | Self::MalformedPage => RejectionKind::RequestShape,
			Self::InvalidKey | Self::ExpiredKey | Self::RateLimited { .. } =>
				RejectionKind::Authorization,
			Self::PageOutOfRange { .. } => RejectionKind::Range,
			Self::Internal { failure: FailureKind::Backend } => RejectionKind::BackendFailure,
			Self::Internal { .. } => RejectionKind::UnknownFailure,
		}
	}

	/// HTTP status code for this rejection.
	pub fn status_code(&self) -> u16 {
		match self {
			Self::MissingParameters | Self::MalformedPage | Self::PageOutOfRange { .. } => 400,
			Self::InvalidKey => 401,
			Self::ExpiredKey => 403,
			Self::RateLimited { .. } => 429,
			Self::Internal { .. } => 500,
		}
	}

	/// Whole seconds until a throttled caller may retry, rounded up and never below one.
	pub fn retry_after_secs(&self, now: OffsetDateTime) -> Option<u64> {
		let Self::RateLimited { reset_at: Some(reset_at) } = self else {
			return None;
		};
		let remaining = *reset_at - now;
		let mut secs = remaining.whole_seconds();

		if remaining.subsec_nanoseconds() > 0 {
			secs += 1;
		}

		Some(u64::try_from(secs).unwrap_or(0).max(1))
	}
}

fn internal_message(failure: FailureKind) -> &'static str {
	match failure {
		FailureKind::Backend => "Internal server error. Please try again later.",
		FailureKind::Unknown | FailureKind::Document => "An unexpected error occurred.",
	}
}

/// One page released by the gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageContent {
	/// Raw page bytes.
	pub bytes: Vec<u8>,
	/// Media type of the bytes.
	pub media_type: String,
	/// 1-based page number that was served.
	pub page_number: usize,
	/// Pages in the document.
	pub total_pages: usize,
}

/// Validates tokens, then slices pages out of a [`PageSource`].
#[derive(Clone)]
pub struct ContentGate {
	validator: AccessValidator,
	source: Arc<dyn PageSource>,
}
impl ContentGate {
	/// Creates a gate in front of `source`.
	pub fn new(validator: AccessValidator, source: Arc<dyn PageSource>) -> Self {
		Self { validator, source }
	}

	/// Serves `page` (1-based) to the holder of `token`, or explains why not.
	pub async fn handle_request(
		&self,
		token: Option<&str>,
		page: Option<&str>,
	) -> Result<PageContent, Rejection> {
		const KIND: OpKind = OpKind::Serve;

		let span = OpSpan::new(KIND, "handle_request");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.serve(token, page)).await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(rejection) => {
				transition(GateState::Rejected);

				let outcome = match rejection {
					Rejection::Internal { .. } => OpOutcome::Failure,
					_ => OpOutcome::Rejected,
				};

				obs::record_op_outcome(KIND, outcome);
			},
		}

		result
	}

	async fn serve(
		&self,
		token: Option<&str>,
		page: Option<&str>,
	) -> Result<PageContent, Rejection> {
		transition(GateState::AwaitingToken);

		let (secret, page_number) = parse_request(token, page)?;

		transition(GateState::Validating);

		match self.validator.validate(&secret).await {
			Validation::Valid => {},
			Validation::InvalidKey => return Err(Rejection::InvalidKey),
			Validation::ExpiredKey => return Err(Rejection::ExpiredKey),
			Validation::RateLimitExceeded { reset_at } =>
				return Err(Rejection::RateLimited { reset_at }),
			Validation::BackendError { detail } => {
				tracing::error!(%detail, "Token store failed during validation.");

				return Err(Rejection::Internal { failure: FailureKind::Backend });
			},
			Validation::UnknownError { detail } => {
				tracing::error!(%detail, "Unexpected fault during validation.");

				return Err(Rejection::Internal { failure: FailureKind::Unknown });
			},
		}

		transition(GateState::Serving);

		let document = self.source.load_document().await.map_err(document_failure)?;
		let total_pages = document.page_count();
		let index = page_number
			.checked_sub(1)
			.and_then(|index| usize::try_from(index).ok())
			.filter(|index| *index < total_pages)
			.ok_or(Rejection::PageOutOfRange { total_pages })?;
		let bytes = document.extract_page(index).await.map_err(document_failure)?;

		tracing::debug!(page_number, total_pages, "Serving page.");

		Ok(PageContent {
			bytes,
			media_type: document.media_type().to_owned(),
			page_number: index + 1,
			total_pages,
		})
	}
}
impl Debug for ContentGate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ContentGate").field("validator", &self.validator).finish_non_exhaustive()
	}
}

fn transition(state: GateState) {
	tracing::debug!(?state, "Gate transition.");
}

fn document_failure(err: crate::document::DocumentError) -> Rejection {
	tracing::error!(error = %err, "Page source failed.");

	Rejection::Internal { failure: FailureKind::Document }
}

// Surrounding whitespace is ignored and a leading sign is accepted. Integers too large for `i64`
// are still integers; they saturate and fail the range check.
fn parse_request(token: Option<&str>, page: Option<&str>) -> Result<(TokenSecret, i64), Rejection> {
	let token = token.filter(|token| !token.trim().is_empty());
	let page = page.map(str::trim).filter(|page| !page.is_empty());
	let (Some(token), Some(page)) = (token, page) else {
		return Err(Rejection::MissingParameters);
	};
	let page_number = match page.parse::<i64>() {
		Ok(number) => number,
		Err(e) => match e.kind() {
			IntErrorKind::PosOverflow => i64::MAX,
			IntErrorKind::NegOverflow => i64::MIN,
			_ => return Err(Rejection::MalformedPage),
		},
	};

	Ok((TokenSecret::new(token), page_number))
}
